use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::sync::Arc;

use super::repository::{self, NewRecord};
use super::requests::{AccountIdentifier, TransactionRequest, TransferRequest};
use super::resolver;
use crate::cache::{AccountsCache, CacheInvalidator};
use crate::config::Config;
use crate::database::models::{Account, TransactionRecord, TransactionType, UserId};
use crate::database::{begin_immediate, DbPool};
use crate::errors::LedgerError;
use crate::limits::{LimitCalculator, SystemClock};
use crate::money::to_minor_units;

/// Funds movement engine: deposits, withdrawals and transfers.
///
/// Each operation runs in one `BEGIN IMMEDIATE` transaction: the account is
/// resolved and checked, the overlimit fee is computed, the balance moves
/// under a guarded UPDATE and the record is appended. Any error rolls the
/// whole transaction back, including a daily limit reset.
pub struct Ledger {
    pool: DbPool,
    limits: LimitCalculator,
    invalidator: CacheInvalidator,
}

/// Validated amount, in both representations
#[derive(Debug, Clone, Copy)]
struct Amount {
    value: Decimal,
    minor: i64,
}

impl Ledger {
    pub fn new(pool: DbPool, limits: LimitCalculator, cache: Arc<dyn AccountsCache>) -> Self {
        Self {
            pool,
            limits,
            invalidator: CacheInvalidator::new(cache),
        }
    }

    /// Ledger wired from configuration, on the wall clock
    pub fn from_config(pool: DbPool, config: &Config, cache: Arc<dyn AccountsCache>) -> anyhow::Result<Self> {
        let rates = config.ledger.rate_table().context("Invalid rate table")?;
        let policy = config.ledger.limit_policy().context("Invalid limit policy")?;
        let limits = LimitCalculator::new(Arc::new(rates), policy, Arc::new(SystemClock));
        Ok(Self::new(pool, limits, cache))
    }

    pub fn limits(&self) -> &LimitCalculator {
        &self.limits
    }

    /// Credit an account of the caller
    pub fn deposit(&self, user_id: UserId, request: &TransactionRequest) -> Result<TransactionRecord, LedgerError> {
        self.try_deposit(user_id, request)
            .map_err(|e| rejected(TransactionType::Deposit, user_id, e))
    }

    /// Debit an account of the caller, plus any overlimit fee
    pub fn withdraw(&self, user_id: UserId, request: &TransactionRequest) -> Result<TransactionRecord, LedgerError> {
        self.try_withdraw(user_id, request)
            .map_err(|e| rejected(TransactionType::Withdraw, user_id, e))
    }

    /// Move funds between two accounts of the same currency. The caller must
    /// own the sending account and pays any overlimit fee.
    pub fn transfer(&self, user_id: UserId, request: &TransferRequest) -> Result<TransactionRecord, LedgerError> {
        self.try_transfer(user_id, request)
            .map_err(|e| rejected(TransactionType::Transfer, user_id, e))
    }

    /// Every record on the user's accounts, newest first
    pub fn history(&self, user_id: UserId) -> Result<Vec<TransactionRecord>, LedgerError> {
        let conn = self.pool.get()?;
        Ok(repository::history_for_user(&conn, user_id, -1, 0)?)
    }

    /// One page of `history`
    pub fn history_page(&self, user_id: UserId, limit: u32, offset: u32) -> Result<Vec<TransactionRecord>, LedgerError> {
        let conn = self.pool.get()?;
        Ok(repository::history_for_user(&conn, user_id, i64::from(limit), i64::from(offset))?)
    }

    /// Current accounts of a user
    pub fn accounts(&self, user_id: UserId) -> Result<Vec<Account>, LedgerError> {
        let conn = self.pool.get()?;
        resolver::accounts_for_user(&conn, user_id)
    }

    fn try_deposit(&self, user_id: UserId, request: &TransactionRequest) -> Result<TransactionRecord, LedgerError> {
        let amount = validate_amount(request.amount)?;
        let identifier = request.identifier()?;
        let currency = self.limits.rates().normalize(&request.currency)?;

        let now = self.limits.now();
        let mut conn = self.pool.get()?;
        let tx = begin_immediate(&mut conn)?;

        let account = resolver::resolve(&tx, &identifier, &currency)?;
        authorize(user_id, &account)?;
        // Fails with InvalidAmount if the new balance no longer fits in storage
        to_minor_units(account.balance + amount.value)?;

        if repository::credit(&tx, account.id, &currency, amount.minor, now)? == 0 {
            return Err(missed_update(&tx, account.id, &currency, LedgerError::AccountNotFound));
        }

        let record = repository::insert_record(
            &tx,
            &NewRecord {
                account_id: account.id,
                transaction_type: TransactionType::Deposit,
                amount: amount.minor,
                fee: 0,
                currency: &currency,
                counterparty_account_id: None,
                created_at: now,
            },
        )?;
        tx.commit()?;

        self.invalidator.invalidate(&[&account]);
        info!(
            "Deposit {} committed: {} {} to account {} by {}",
            record.reference_id,
            amount.value,
            currency,
            account.id,
            identifier.kind()
        );
        Ok(record)
    }

    fn try_withdraw(&self, user_id: UserId, request: &TransactionRequest) -> Result<TransactionRecord, LedgerError> {
        let amount = validate_amount(request.amount)?;
        let identifier = request.identifier()?;
        let currency = self.limits.rates().normalize(&request.currency)?;

        let now = self.limits.now();
        let mut conn = self.pool.get()?;
        let tx = begin_immediate(&mut conn)?;

        let account = resolver::resolve(&tx, &identifier, &currency)?;
        authorize(user_id, &account)?;

        let fee = self.debit_with_fee(&tx, user_id, &account, amount, &currency, now)?;

        let record = repository::insert_record(
            &tx,
            &NewRecord {
                account_id: account.id,
                transaction_type: TransactionType::Withdraw,
                amount: amount.minor,
                fee,
                currency: &currency,
                counterparty_account_id: None,
                created_at: now,
            },
        )?;
        tx.commit()?;

        self.invalidator.invalidate(&[&account]);
        info!(
            "Withdrawal {} committed: {} {} (fee {}, debited {}) from account {}",
            record.reference_id,
            record.amount,
            currency,
            record.fee,
            record.total_debited(),
            account.id
        );
        Ok(record)
    }

    fn try_transfer(&self, user_id: UserId, request: &TransferRequest) -> Result<TransactionRecord, LedgerError> {
        let amount = validate_amount(request.amount)?;
        let source = request.source()?;
        let destination = request.destination()?;
        let currency = self.limits.rates().normalize(&request.currency)?;

        let now = self.limits.now();
        let mut conn = self.pool.get()?;
        let tx = begin_immediate(&mut conn)?;

        let sender = resolver::resolve(&tx, &source, &currency)?;
        authorize(user_id, &sender)?;
        let receiver = resolve_receiver(&tx, &destination, &currency)?;

        if sender.id == receiver.id {
            return Err(LedgerError::SameAccountTransfer);
        }
        to_minor_units(receiver.balance + amount.value)?;

        let fee = self.debit_with_fee(&tx, user_id, &sender, amount, &currency, now)?;

        if repository::credit(&tx, receiver.id, &currency, amount.minor, now)? == 0 {
            return Err(missed_update(&tx, receiver.id, &currency, LedgerError::AccountNotFound));
        }

        let record = repository::insert_record(
            &tx,
            &NewRecord {
                account_id: sender.id,
                transaction_type: TransactionType::Transfer,
                amount: amount.minor,
                fee,
                currency: &currency,
                counterparty_account_id: Some(receiver.id),
                created_at: now,
            },
        )?;
        tx.commit()?;

        self.invalidator.invalidate(&[&sender, &receiver]);
        info!(
            "Transfer {} committed: {} {} (fee {}, debited {}) from account {} to account {}",
            record.reference_id,
            record.amount,
            currency,
            record.fee,
            record.total_debited(),
            sender.id,
            receiver.id
        );
        Ok(record)
    }

    /// Sufficiency checks, fee and the guarded debit shared by withdrawals
    /// and transfers. Returns the fee in minor units.
    fn debit_with_fee(
        &self,
        conn: &Connection,
        user_id: UserId,
        account: &Account,
        amount: Amount,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, LedgerError> {
        if amount.value > account.balance {
            return Err(LedgerError::InsufficientFunds);
        }

        let fee = self.limits.check_limit_and_fee_at(conn, user_id, amount.value, currency, now)?;
        if amount.value + fee > account.balance {
            debug!(
                "Account {} holds {} {}, needs {} plus fee {}",
                account.id, account.balance, currency, amount.value, fee
            );
            return Err(LedgerError::InsufficientFundsIncludingFee);
        }

        let fee = to_minor_units(fee)?;
        let total = amount.minor.checked_add(fee).ok_or(LedgerError::InvalidAmount)?;

        if repository::debit_guarded(conn, account.id, currency, total, now)? == 0 {
            return Err(missed_update(conn, account.id, currency, LedgerError::InsufficientFunds));
        }
        Ok(fee)
    }
}

/// The receiving side is only checked for existence and block status
fn resolve_receiver(
    conn: &Connection,
    identifier: &AccountIdentifier,
    currency: &str,
) -> Result<Account, LedgerError> {
    let receiver = resolver::resolve(conn, identifier, currency)?;
    if receiver.blocked {
        return Err(LedgerError::AccountBlocked);
    }
    Ok(receiver)
}

/// Ownership first, then the block flag
fn authorize(user_id: UserId, account: &Account) -> Result<(), LedgerError> {
    if account.user_id != user_id {
        return Err(LedgerError::AccessDenied);
    }
    if account.blocked {
        return Err(LedgerError::AccountBlocked);
    }
    Ok(())
}

fn validate_amount(value: Decimal) -> Result<Amount, LedgerError> {
    if value <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount);
    }
    let minor = to_minor_units(value)?;
    Ok(Amount { value, minor })
}

/// Explain a conditional UPDATE that changed no rows
fn missed_update(conn: &Connection, account_id: i64, currency: &str, otherwise: LedgerError) -> LedgerError {
    match repository::currency_of(conn, account_id) {
        Ok(None) => LedgerError::AccountNotFound,
        Ok(Some(stored)) if stored != currency => LedgerError::CurrencyMismatch(currency.to_string()),
        Ok(Some(_)) => otherwise,
        Err(e) => e.into(),
    }
}

fn rejected(operation: TransactionType, user_id: UserId, err: LedgerError) -> LedgerError {
    if err.is_validation() {
        debug!("Rejected {} for user {}: {}", operation.as_str(), user_id, err);
    } else {
        warn!("Rejected {} for user {}: {}", operation.as_str(), user_id, err);
    }
    err
}
