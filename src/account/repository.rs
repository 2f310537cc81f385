// SQL for accounts and transaction records. Everything here returns raw
// rusqlite results; translation into domain errors happens in the callers.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::database::format_timestamp;
use crate::database::models::{Account, AccountId, TransactionRecord, TransactionType, UserId};

/// Account in `currency` reached through a card number
pub fn find_by_card(conn: &Connection, card_number: &str, currency: &str) -> rusqlite::Result<Option<Account>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM accounts a
             JOIN cards c ON c.account_id = a.id
             WHERE c.card_number = ?1 AND a.currency = ?2",
            Account::COLUMNS
        ),
        params![card_number, currency],
        Account::from_row,
    )
    .optional()
}

/// Account in `currency` of the user owning a phone number
pub fn find_by_phone(conn: &Connection, phone_number: &str, currency: &str) -> rusqlite::Result<Option<Account>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM accounts a
             JOIN users u ON u.id = a.user_id
             WHERE u.phone = ?1 AND a.currency = ?2",
            Account::COLUMNS
        ),
        params![phone_number, currency],
        Account::from_row,
    )
    .optional()
}

/// All accounts of a user, by currency
pub fn list_for_user(conn: &Connection, user_id: UserId) -> rusqlite::Result<Vec<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM accounts a WHERE a.user_id = ?1 ORDER BY a.currency",
        Account::COLUMNS
    ))?;

    let accounts = stmt
        .query_map(params![user_id], Account::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(accounts)
}

/// Stored currency of an account
pub fn currency_of(conn: &Connection, account_id: AccountId) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT currency FROM accounts WHERE id = ?1",
        params![account_id],
        |row| row.get(0),
    )
    .optional()
}

/// Add `amount` minor units. Returns the number of rows changed.
pub fn credit(
    conn: &Connection,
    account_id: AccountId,
    currency: &str,
    amount: i64,
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE accounts SET balance = balance + ?1, updated_at = ?2
         WHERE id = ?3 AND currency = ?4",
        params![amount, format_timestamp(&now), account_id, currency],
    )
}

/// Subtract `amount` minor units only if the balance covers it. Zero rows
/// changed means the guard failed.
pub fn debit_guarded(
    conn: &Connection,
    account_id: AccountId,
    currency: &str,
    amount: i64,
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE accounts SET balance = balance - ?1, updated_at = ?2
         WHERE id = ?3 AND currency = ?4 AND balance >= ?1",
        params![amount, format_timestamp(&now), account_id, currency],
    )
}

/// A record about to be appended
#[derive(Debug, Clone)]
pub struct NewRecord<'a> {
    pub account_id: AccountId,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub fee: i64,
    pub currency: &'a str,
    pub counterparty_account_id: Option<AccountId>,
    pub created_at: DateTime<Utc>,
}

/// Append a transaction record
pub fn insert_record(conn: &Connection, record: &NewRecord<'_>) -> rusqlite::Result<TransactionRecord> {
    let reference_id = Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO transactions
             (account_id, amount, fee, currency, type, counterparty_account_id, reference_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.account_id,
            record.amount,
            record.fee,
            record.currency,
            record.transaction_type.as_str(),
            record.counterparty_account_id,
            reference_id,
            format_timestamp(&record.created_at),
        ],
    )?;

    let id = conn.last_insert_rowid();
    conn.query_row(
        &format!("SELECT {} FROM transactions t WHERE t.id = ?1", TransactionRecord::COLUMNS),
        params![id],
        TransactionRecord::from_row,
    )
}

/// Records on any of a user's accounts, newest first. `limit` of -1 means
/// no limit.
pub fn history_for_user(
    conn: &Connection,
    user_id: UserId,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<TransactionRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM transactions t
         JOIN accounts a ON a.id = t.account_id
         WHERE a.user_id = ?1
         ORDER BY t.created_at DESC, t.id DESC
         LIMIT ?2 OFFSET ?3",
        TransactionRecord::COLUMNS
    ))?;

    let records = stmt
        .query_map(params![user_id, limit, offset], TransactionRecord::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}
