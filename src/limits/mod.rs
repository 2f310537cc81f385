// Daily limit and overlimit fee calculation
// Converts amounts to the base currency, tracks how much a user has spent
// today and prices the part of a transaction that goes over the daily limit.

mod rates;
pub mod repository;

pub use rates::RateTable;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, TimeZone, Utc};
use log::{debug, info, warn};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::sync::{Arc, PoisonError, RwLock};

use crate::database::models::UserId;
use crate::errors::LedgerError;
use crate::money::{from_minor_units, round_to_scale};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: RwLock::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *now = *now + by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// UTC+05:00
const DEFAULT_UTC_OFFSET_SECS: i32 = 5 * 3600;

/// Fee and calendar settings of the limit calculator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitPolicy {
    /// Fraction charged on the overlimit part (0.02 = 2%)
    pub overlimit_fee_rate: Decimal,
    /// Zone in which calendar days are counted
    pub timezone: FixedOffset,
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self {
            overlimit_fee_rate: Decimal::new(2, 2),
            timezone: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or(Utc.fix()),
        }
    }
}

/// True when `now` falls on a different calendar day than `last_reset`
pub fn is_new_day(last_reset: DateTime<Utc>, now: DateTime<Utc>, timezone: FixedOffset) -> bool {
    last_reset.with_timezone(&timezone).date_naive() != now.with_timezone(&timezone).date_naive()
}

/// UTC bounds `[start, end)` of the calendar day containing `now`
pub fn day_window(now: DateTime<Utc>, timezone: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = now.with_timezone(&timezone).date_naive().and_time(NaiveTime::MIN);
    let utc_midnight = local_midnight - Duration::seconds(i64::from(timezone.local_minus_utc()));
    let start = Utc.from_utc_datetime(&utc_midnight);
    (start, start + Duration::days(1))
}

/// Computes overlimit fees against each user's daily limit
pub struct LimitCalculator {
    rates: Arc<RateTable>,
    policy: LimitPolicy,
    clock: Arc<dyn Clock>,
}

impl LimitCalculator {
    pub fn new(rates: Arc<RateTable>, policy: LimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { rates, policy, clock }
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn convert_to_base(&self, amount: Decimal, currency: &str) -> Result<Decimal, LedgerError> {
        self.rates.convert_to_base(amount, currency)
    }

    /// Whether the spend window that started at `last_reset` is over
    pub fn is_new_day(&self, last_reset: DateTime<Utc>) -> bool {
        is_new_day(last_reset, self.now(), self.policy.timezone)
    }

    /// Overlimit fee for `amount` of `currency` spent by `user_id` now
    pub fn check_limit_and_fee(
        &self,
        conn: &Connection,
        user_id: UserId,
        amount: Decimal,
        currency: &str,
    ) -> Result<Decimal, LedgerError> {
        self.check_limit_and_fee_at(conn, user_id, amount, currency, self.now())
    }

    /// Overlimit fee for `amount` of `currency` spent by `user_id` at `now`.
    ///
    /// Resets the user's spend window when `now` is on a new day. Callers run
    /// this on the same storage transaction as the balance change so that a
    /// rejected operation does not move the reset marker either.
    pub fn check_limit_and_fee_at(
        &self,
        conn: &Connection,
        user_id: UserId,
        amount: Decimal,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<Decimal, LedgerError> {
        let amount_in_base = self.rates.convert_to_base(amount, currency)?;

        let limit = match repository::find_daily_limit(conn, user_id)? {
            Some(limit) => limit,
            None => {
                warn!("No daily limit provisioned for user {}, charging no fee", user_id);
                return Ok(Decimal::ZERO);
            }
        };

        // A last_reset on a later day than now (clock skew) is left alone and
        // today's usage is counted as usual
        let reset = is_new_day(limit.last_reset, now, self.policy.timezone)
            && repository::reset_daily_limit(conn, user_id, now)? > 0;

        let used_today = if reset {
            debug!("Daily limit window reset for user {}", user_id);
            Decimal::ZERO
        } else {
            self.usage_in_base(conn, user_id, now)?
        };

        let fee = self.overlimit_fee(used_today, amount_in_base, limit.daily_amount, currency)?;
        if fee > Decimal::ZERO {
            info!(
                "User {} over daily limit ({} + {} > {} {}), fee {} {}",
                user_id,
                used_today,
                amount_in_base,
                limit.daily_amount,
                self.rates.base_currency(),
                fee,
                currency
            );
        }

        Ok(fee)
    }

    /// Today's withdraw and transfer total of a user, in base currency
    pub fn usage_in_base(
        &self,
        conn: &Connection,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Decimal, LedgerError> {
        let (start, end) = day_window(now, self.policy.timezone);

        let mut total = Decimal::ZERO;
        for (currency, minor) in repository::usage_by_currency(conn, user_id, start, end)? {
            total += self.rates.convert_to_base(from_minor_units(minor), &currency)?;
        }

        Ok(total)
    }

    /// Fee on everything the day's usage, including this transaction, puts
    /// over `daily_amount`
    pub fn overlimit_fee(
        &self,
        used_today: Decimal,
        amount_in_base: Decimal,
        daily_amount: Decimal,
        currency: &str,
    ) -> Result<Decimal, LedgerError> {
        let total = used_today + amount_in_base;
        if total <= daily_amount {
            return Ok(Decimal::ZERO);
        }

        let overlimit_in_base = total - daily_amount;
        let overlimit = self.rates.convert_from_base(overlimit_in_base, currency)?;

        Ok(round_to_scale(overlimit * self.policy.overlimit_fee_rate))
    }
}
