// Domain error taxonomy shared by the resolver, the limit calculator and the
// funds movement engine, plus the translation of storage failures into it.

use log::error;
use rusqlite::ffi;
use thiserror::Error;

use crate::money::MoneyError;

/// Errors returned by ledger operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    /// Amount is zero, negative, too precise or too large to store
    #[error("Invalid amount: must be greater than zero with at most 4 decimal places")]
    InvalidAmount,
    /// Neither a card number nor a phone number was supplied
    #[error("Either card_number or phone_number must be provided")]
    MissingIdentifier,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Account is blocked")]
    AccountBlocked,
    /// Caller does not own the account
    #[error("Access denied")]
    AccessDenied,
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),
    /// The stored account currency disagrees with the requested one
    #[error("Account currency does not match {0}")]
    CurrencyMismatch(String),
    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,
    #[error("Insufficient funds")]
    InsufficientFunds,
    #[error("Insufficient funds including overlimit fee")]
    InsufficientFundsIncludingFee,
    /// Opaque persistence failure
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl LedgerError {
    /// Whether the error was raised by input validation, before any storage call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidAmount
                | LedgerError::MissingIdentifier
                | LedgerError::UnsupportedCurrency(_)
        )
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => LedgerError::AccountNotFound,
            rusqlite::Error::SqliteFailure(ffi::Error { code, extended_code }, ref message) => {
                match code {
                    // The only CHECK constraint in the schema is `balance >= 0`
                    ffi::ErrorCode::ConstraintViolation
                        if extended_code == ffi::SQLITE_CONSTRAINT_CHECK =>
                    {
                        LedgerError::InsufficientFunds
                    }
                    ffi::ErrorCode::DatabaseBusy | ffi::ErrorCode::DatabaseLocked => {
                        error!("Storage timed out waiting for a lock: {:?}", message);
                        LedgerError::DatabaseError("storage busy, operation timed out".to_string())
                    }
                    _ => {
                        error!("SQLite failure {:?} ({}): {:?}", code, extended_code, message);
                        LedgerError::DatabaseError(err.to_string())
                    }
                }
            }
            other => {
                error!("Unexpected storage error: {}", other);
                LedgerError::DatabaseError(other.to_string())
            }
        }
    }
}

impl From<r2d2::Error> for LedgerError {
    fn from(err: r2d2::Error) -> Self {
        error!("Failed to get a database connection: {}", err);
        LedgerError::DatabaseError(err.to_string())
    }
}

impl From<MoneyError> for LedgerError {
    fn from(_: MoneyError) -> Self {
        LedgerError::InvalidAmount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), Some("simulated".to_string()))
    }

    #[test]
    fn test_no_rows_is_account_not_found() {
        assert_eq!(
            LedgerError::from(rusqlite::Error::QueryReturnedNoRows),
            LedgerError::AccountNotFound
        );
    }

    #[test]
    fn test_check_constraint_is_insufficient_funds() {
        assert_eq!(
            LedgerError::from(sqlite_failure(ffi::SQLITE_CONSTRAINT_CHECK)),
            LedgerError::InsufficientFunds
        );
    }

    #[test]
    fn test_other_constraints_are_database_errors() {
        let err = LedgerError::from(sqlite_failure(ffi::SQLITE_CONSTRAINT_UNIQUE));
        assert!(matches!(err, LedgerError::DatabaseError(_)));
    }

    #[test]
    fn test_busy_is_database_error() {
        let err = LedgerError::from(sqlite_failure(ffi::SQLITE_BUSY));
        assert_eq!(
            err,
            LedgerError::DatabaseError("storage busy, operation timed out".to_string())
        );
    }

    #[test]
    fn test_money_errors_are_invalid_amount() {
        assert_eq!(LedgerError::from(MoneyError::Overflow), LedgerError::InvalidAmount);
    }

    #[test]
    fn test_validation_classification() {
        assert!(LedgerError::InvalidAmount.is_validation());
        assert!(LedgerError::UnsupportedCurrency("XYZ".into()).is_validation());
        assert!(!LedgerError::InsufficientFunds.is_validation());
    }
}
