// Command handlers for the minibank binary. Each one prints its result and
// returns an error for main to report.

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use minibank_core::config::Config;
use minibank_core::database::provisioning::{self, NewCustomer};
use minibank_core::database::DbPool;
use minibank_core::{Account, Ledger, TransactionRecord, TransactionRequest, TransferRequest};

/// Register a customer with one account per currency
pub fn register(
    pool: &DbPool,
    config: &Config,
    full_name: &str,
    phone: &str,
    currencies: &[String],
    daily_limit: Option<Decimal>,
) -> Result<()> {
    let currencies = if currencies.is_empty() {
        config.ledger.rates.keys().cloned().collect()
    } else {
        currencies.to_vec()
    };

    let rates = config.ledger.rate_table()?;
    for currency in &currencies {
        if !rates.is_supported(&currency.trim().to_uppercase()) {
            return Err(anyhow!("Unsupported currency: {}", currency));
        }
    }

    let customer = NewCustomer {
        full_name: full_name.to_string(),
        phone: phone.to_string(),
        currencies,
        daily_limit: daily_limit.unwrap_or(config.ledger.default_daily_limit),
    };

    let mut conn = pool.get().context("Failed to get a database connection")?;
    let registration = provisioning::register_customer(&mut conn, &customer, Utc::now())?;

    println!("✅ Registered user {}", registration.user_id);
    print_accounts(&registration.accounts);
    Ok(())
}

/// Attach a card to an account
pub fn issue_card(pool: &DbPool, account_id: i64, number: &str, holder: &str, expiry: NaiveDate) -> Result<()> {
    let conn = pool.get().context("Failed to get a database connection")?;
    let card = provisioning::issue_card(&conn, account_id, number, holder, expiry, Utc::now())?;

    println!("✅ Card issued for account {} (expires {})", card.account_id, card.expiry_date);
    Ok(())
}

pub fn deposit(ledger: &Ledger, user_id: i64, request: &TransactionRequest) -> Result<()> {
    let record = ledger
        .deposit(user_id, request)
        .map_err(|e| anyhow!("Deposit failed: {}", e))?;
    print_receipt(&record);
    Ok(())
}

pub fn withdraw(ledger: &Ledger, user_id: i64, request: &TransactionRequest) -> Result<()> {
    let record = ledger
        .withdraw(user_id, request)
        .map_err(|e| anyhow!("Withdrawal failed: {}", e))?;
    print_receipt(&record);
    Ok(())
}

pub fn transfer(ledger: &Ledger, user_id: i64, request: &TransferRequest) -> Result<()> {
    let record = ledger
        .transfer(user_id, request)
        .map_err(|e| anyhow!("Transfer failed: {}", e))?;
    print_receipt(&record);
    Ok(())
}

pub fn history(ledger: &Ledger, user_id: i64, limit: Option<u32>, offset: u32) -> Result<()> {
    let records = match limit {
        Some(limit) => ledger.history_page(user_id, limit, offset),
        None => ledger.history(user_id),
    }
    .map_err(|e| anyhow!("Failed to load history: {}", e))?;

    if records.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!(
        "{:<27} {:<9} {:>8} {:>14} {:>10} {:<4}",
        "DATE", "TYPE", "ACCOUNT", "AMOUNT", "FEE", "CUR"
    );
    println!("{:-<27} {:-<9} {:->8} {:->14} {:->10} {:-<4}", "", "", "", "", "", "");
    for record in records {
        println!(
            "{:<27} {:<9} {:>8} {:>14} {:>10} {:<4}",
            record.created_at.to_rfc3339(),
            record.transaction_type.as_str(),
            record.account_id,
            record.amount,
            record.fee,
            record.currency
        );
    }
    Ok(())
}

pub fn accounts(ledger: &Ledger, user_id: i64) -> Result<()> {
    let accounts = ledger
        .accounts(user_id)
        .map_err(|e| anyhow!("Failed to load accounts: {}", e))?;

    if accounts.is_empty() {
        println!("No accounts found.");
        return Ok(());
    }
    print_accounts(&accounts);
    Ok(())
}

fn print_accounts(accounts: &[Account]) {
    println!("{:<8} {:<4} {:>16} {:<8}", "ID", "CUR", "BALANCE", "STATUS");
    println!("{:-<8} {:-<4} {:->16} {:-<8}", "", "", "", "");
    for account in accounts {
        println!(
            "{:<8} {:<4} {:>16} {:<8}",
            account.id,
            account.currency,
            account.balance,
            if account.blocked { "blocked" } else { "active" }
        );
    }
}

fn print_receipt(record: &TransactionRecord) {
    println!("✅ {} completed", record.transaction_type.as_str());
    println!("Reference: {}", record.reference_id);
    println!("Account: {}", record.account_id);
    if let Some(counterparty) = record.counterparty_account_id {
        println!("To account: {}", counterparty);
    }
    println!("Amount: {} {}", record.amount, record.currency);
    if record.fee > Decimal::ZERO {
        println!("Overlimit fee: {} {}", record.fee, record.currency);
    }
}
