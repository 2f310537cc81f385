use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Row;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::parse_timestamp;
use crate::money::from_minor_units;

pub type UserId = i64;
pub type AccountId = i64;

/// Transaction type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Transfer,
}

impl TransactionType {
    pub const ALL: [TransactionType; 3] = [
        TransactionType::Deposit,
        TransactionType::Withdraw,
        TransactionType::Transfer,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdraw => "withdraw",
            TransactionType::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "deposit" => Ok(TransactionType::Deposit),
            "withdraw" => Ok(TransactionType::Withdraw),
            "transfer" => Ok(TransactionType::Transfer),
            _ => Err(format!("Invalid transaction type: {}", s)),
        }
    }

    /// Whether this kind of operation counts against the daily limit
    pub fn counts_against_limit(&self) -> bool {
        !matches!(self, TransactionType::Deposit)
    }

    /// Kinds summed into a user's daily usage
    pub fn limit_counted() -> impl Iterator<Item = TransactionType> {
        Self::ALL.into_iter().filter(TransactionType::counts_against_limit)
    }
}

/// Account model - one per (user, currency)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub currency: String,
    pub balance: Decimal,
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Columns expected by `from_row`, prefixed for joins
    pub const COLUMNS: &'static str =
        "a.id, a.user_id, a.currency, a.balance, a.blocked, a.created_at, a.updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            currency: row.get(2)?,
            balance: from_minor_units(row.get(3)?),
            blocked: row.get(4)?,
            created_at: parse_timestamp(5, &row.get::<_, String>(5)?)?,
            updated_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
        })
    }
}

/// Card model
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Card {
    pub id: i64,
    pub account_id: AccountId,
    pub card_number: String,
    pub holder_name: String,
    pub expiry_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Transaction record - immutable once written
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: i64,
    pub account_id: AccountId,
    pub transaction_type: TransactionType,
    /// Requested amount, before any fee
    pub amount: Decimal,
    /// Overlimit fee moved together with `amount`
    pub fee: Decimal,
    pub currency: String,
    /// Receiving account of a transfer
    pub counterparty_account_id: Option<AccountId>,
    pub reference_id: String,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub const COLUMNS: &'static str = "t.id, t.account_id, t.type, t.amount, t.fee, t.currency, \
         t.counterparty_account_id, t.reference_id, t.created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let type_str: String = row.get(2)?;
        let transaction_type = TransactionType::from_str(&type_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?;

        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            transaction_type,
            amount: from_minor_units(row.get(3)?),
            fee: from_minor_units(row.get(4)?),
            currency: row.get(5)?,
            counterparty_account_id: row.get(6)?,
            reference_id: row.get(7)?,
            created_at: parse_timestamp(8, &row.get::<_, String>(8)?)?,
        })
    }

    /// Total balance movement on `account_id`
    pub fn total_debited(&self) -> Decimal {
        match self.transaction_type {
            TransactionType::Deposit => Decimal::ZERO,
            _ => self.amount + self.fee,
        }
    }
}

/// Daily spending limit of a user, expressed in base currency
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DailyLimit {
    pub id: i64,
    pub user_id: UserId,
    pub daily_amount: Decimal,
    pub last_reset: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyLimit {
    pub const COLUMNS: &'static str =
        "id, user_id, daily_amount, last_reset, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            daily_amount: from_minor_units(row.get(2)?),
            last_reset: parse_timestamp(3, &row.get::<_, String>(3)?)?,
            created_at: parse_timestamp(4, &row.get::<_, String>(4)?)?,
            updated_at: parse_timestamp(5, &row.get::<_, String>(5)?)?,
        })
    }
}
