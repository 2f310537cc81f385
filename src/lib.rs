// MiniBank ledger core
// Funds movement, account resolution and daily limit enforcement over a
// SQLite store.

pub mod account;
pub mod cache;
pub mod config;
pub mod database;
pub mod errors;
pub mod limits;
pub mod money;

pub use account::{AccountIdentifier, Ledger, TransactionRequest, TransferRequest};
pub use cache::{AccountsCache, InMemoryCache, NoopCache};
pub use database::models::{Account, TransactionRecord, TransactionType};
pub use errors::LedgerError;
pub use limits::{Clock, FixedClock, LimitCalculator, LimitPolicy, RateTable, SystemClock};
