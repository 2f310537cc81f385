// Account module
// Resolves accounts from card and phone identifiers and moves funds between
// them: deposits, withdrawals with overlimit fees and transfers.

mod repository;
mod requests;
pub mod resolver;
mod transactions;

pub use requests::{AccountIdentifier, TransactionRequest, TransferRequest};
pub use transactions::Ledger;
