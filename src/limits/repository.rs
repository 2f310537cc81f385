use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::format_timestamp;
use crate::database::models::{DailyLimit, TransactionType, UserId};

/// Load the daily limit of a user, if one was provisioned
pub fn find_daily_limit(conn: &Connection, user_id: UserId) -> rusqlite::Result<Option<DailyLimit>> {
    conn.query_row(
        &format!("SELECT {} FROM limits WHERE user_id = ?1", DailyLimit::COLUMNS),
        params![user_id],
        DailyLimit::from_row,
    )
    .optional()
}

/// Move `last_reset` forward to `now`. Never moves it backwards.
pub fn reset_daily_limit(conn: &Connection, user_id: UserId, now: DateTime<Utc>) -> rusqlite::Result<usize> {
    let timestamp = format_timestamp(&now);
    conn.execute(
        "UPDATE limits SET last_reset = ?1, updated_at = ?1 WHERE user_id = ?2 AND last_reset < ?1",
        params![timestamp, user_id],
    )
}

/// Quoted SQL list of the transaction types that count against the limit
fn limit_counted_types() -> String {
    TransactionType::limit_counted()
        .map(|kind| format!("'{}'", kind.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sum of limit-counted amounts per currency, in minor units, for records
/// created in `[start, end)`
pub fn usage_by_currency(
    conn: &Connection,
    user_id: UserId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> rusqlite::Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT t.currency, SUM(t.amount)
         FROM transactions t
         JOIN accounts a ON a.id = t.account_id
         WHERE a.user_id = ?1
           AND t.type IN ({})
           AND t.created_at >= ?2
           AND t.created_at < ?3
         GROUP BY t.currency",
        limit_counted_types()
    ))?;

    let rows = stmt.query_map(
        params![user_id, format_timestamp(&start), format_timestamp(&end)],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
    )?;

    let usage = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(usage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_counted_types_follow_transaction_type() {
        assert_eq!(limit_counted_types(), "'withdraw', 'transfer'");
    }
}
