// Provisioning helpers: the rows registration and administration normally
// create. The ledger itself only ever reads them.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

use super::models::{Account, AccountId, Card, UserId};
use super::format_timestamp;
use crate::money::to_minor_units;

/// A customer to register
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub full_name: String,
    pub phone: String,
    /// One account is opened per currency
    pub currencies: Vec<String>,
    /// Daily limit in base currency
    pub daily_limit: Decimal,
}

/// Result of a registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub user_id: UserId,
    pub accounts: Vec<Account>,
}

impl Registration {
    /// The account opened in `currency`
    pub fn account(&self, currency: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.currency == currency)
    }
}

/// Register a customer: user row, one empty account per currency and the
/// daily limit, all in one transaction
pub fn register_customer(
    conn: &mut Connection,
    customer: &NewCustomer,
    now: DateTime<Utc>,
) -> Result<Registration> {
    if customer.currencies.is_empty() {
        return Err(anyhow!("A customer needs at least one currency"));
    }
    let daily_minor = to_minor_units(customer.daily_limit).context("Invalid daily limit")?;
    if daily_minor < 0 {
        return Err(anyhow!("Daily limit cannot be negative"));
    }

    let timestamp = format_timestamp(&now);
    let tx = conn.transaction().context("Failed to start registration transaction")?;

    tx.execute(
        "INSERT INTO users (full_name, phone, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![customer.full_name, customer.phone, timestamp],
    ).context("Failed to insert user")?;
    let user_id = tx.last_insert_rowid();

    let mut accounts = Vec::with_capacity(customer.currencies.len());
    for currency in &customer.currencies {
        let currency = currency.trim().to_uppercase();
        tx.execute(
            "INSERT INTO accounts (user_id, currency, balance, blocked, created_at, updated_at)
             VALUES (?1, ?2, 0, 0, ?3, ?3)",
            params![user_id, currency, timestamp],
        ).context(format!("Failed to open {} account", currency))?;

        accounts.push(Account {
            id: tx.last_insert_rowid(),
            user_id,
            currency,
            balance: Decimal::ZERO,
            blocked: false,
            created_at: now,
            updated_at: now,
        });
    }

    tx.execute(
        "INSERT INTO limits (user_id, daily_amount, last_reset, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3, ?3)",
        params![user_id, daily_minor, timestamp],
    ).context("Failed to create daily limit")?;

    tx.commit().context("Failed to commit registration")?;

    info!("Registered user {} with {} accounts", user_id, accounts.len());
    Ok(Registration { user_id, accounts })
}

/// Attach a card to an account
pub fn issue_card(
    conn: &Connection,
    account_id: AccountId,
    card_number: &str,
    holder_name: &str,
    expiry_date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Card> {
    conn.execute(
        "INSERT INTO cards (account_id, card_number, holder_name, expiry_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            account_id,
            card_number,
            holder_name,
            expiry_date.format("%Y-%m-%d").to_string(),
            format_timestamp(&now)
        ],
    ).context("Failed to insert card")?;

    debug!("Issued card for account {}", account_id);
    Ok(Card {
        id: conn.last_insert_rowid(),
        account_id,
        card_number: card_number.to_string(),
        holder_name: holder_name.to_string(),
        expiry_date,
        created_at: now,
    })
}

/// Block or unblock an account
pub fn set_account_blocked(
    conn: &Connection,
    account_id: AccountId,
    blocked: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE accounts SET blocked = ?1, updated_at = ?2 WHERE id = ?3",
        params![blocked, format_timestamp(&now), account_id],
    ).context("Failed to update account block flag")?;

    if updated == 0 {
        return Err(anyhow!("Account {} not found", account_id));
    }
    Ok(())
}

/// Change a user's daily limit amount. The spend window and its
/// `last_reset` marker are left to the limit calculator.
pub fn set_daily_limit(
    conn: &Connection,
    user_id: UserId,
    daily_amount: Decimal,
    now: DateTime<Utc>,
) -> Result<()> {
    let daily_minor = to_minor_units(daily_amount).context("Invalid daily limit")?;
    if daily_minor < 0 {
        return Err(anyhow!("Daily limit cannot be negative"));
    }
    let updated = conn.execute(
        "UPDATE limits SET daily_amount = ?1, updated_at = ?2 WHERE user_id = ?3",
        params![daily_minor, format_timestamp(&now), user_id],
    ).context("Failed to update daily limit")?;

    if updated == 0 {
        return Err(anyhow!("No daily limit for user {}", user_id));
    }
    Ok(())
}

/// Remove a user's daily limit
pub fn remove_daily_limit(conn: &Connection, user_id: UserId) -> Result<()> {
    conn.execute("DELETE FROM limits WHERE user_id = ?1", params![user_id])
        .context("Failed to delete daily limit")?;
    Ok(())
}
