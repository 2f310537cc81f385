use anyhow::{Context, Result};
use log::debug;
use rusqlite::Connection;

/// Create the database schema
pub fn create_schema(conn: &mut Connection) -> Result<()> {
    debug!("Creating database schema");

    // Use a transaction to ensure all tables are created or none
    let tx = conn.transaction().context("Failed to start transaction for schema creation")?;

    // Create users table
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL,
            phone TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    ).context("Failed to create users table")?;

    // Create accounts table - one account per (user, currency), balance in minor units
    tx.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            currency TEXT NOT NULL,
            balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
            blocked INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, currency),
            FOREIGN KEY (user_id) REFERENCES users(id)
        )",
        [],
    ).context("Failed to create accounts table")?;

    // Create cards table
    tx.execute(
        "CREATE TABLE IF NOT EXISTS cards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            card_number TEXT NOT NULL UNIQUE,
            holder_name TEXT NOT NULL,
            expiry_date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        )",
        [],
    ).context("Failed to create cards table")?;

    // Create transactions table - append-only history
    tx.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            amount INTEGER NOT NULL,
            fee INTEGER NOT NULL DEFAULT 0,
            currency TEXT NOT NULL,
            type TEXT NOT NULL,
            counterparty_account_id INTEGER,
            reference_id TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            FOREIGN KEY (account_id) REFERENCES accounts(id),
            FOREIGN KEY (counterparty_account_id) REFERENCES accounts(id)
        )",
        [],
    ).context("Failed to create transactions table")?;

    // Create limits table - one daily limit per user, amount in base currency
    tx.execute(
        "CREATE TABLE IF NOT EXISTS limits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL UNIQUE,
            daily_amount INTEGER NOT NULL,
            last_reset TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
        )",
        [],
    ).context("Failed to create limits table")?;

    // Create indices for faster lookups
    tx.execute("CREATE INDEX IF NOT EXISTS idx_accounts_user_id ON accounts(user_id)", [])
        .context("Failed to create index on accounts.user_id")?;

    tx.execute("CREATE INDEX IF NOT EXISTS idx_cards_account_id ON cards(account_id)", [])
        .context("Failed to create index on cards.account_id")?;

    tx.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_account_created
         ON transactions(account_id, created_at)",
        [],
    ).context("Failed to create index on transactions.account_id")?;

    // History rows are never updated or deleted
    tx.execute_batch(
        "CREATE TRIGGER IF NOT EXISTS transactions_no_update
         BEFORE UPDATE ON transactions
         BEGIN
             SELECT RAISE(ABORT, 'transactions are append-only');
         END;
         CREATE TRIGGER IF NOT EXISTS transactions_no_delete
         BEFORE DELETE ON transactions
         BEGIN
             SELECT RAISE(ABORT, 'transactions are append-only');
         END;",
    ).context("Failed to create append-only triggers")?;

    tx.commit().context("Failed to commit schema creation transaction")?;

    debug!("Database schema created successfully");
    Ok(())
}
