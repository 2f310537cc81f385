use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use tempfile::tempdir;

use crate::config::DatabaseConfig;
use crate::database::provisioning::{self, NewCustomer};
use crate::database::{self, models::*};

/// Test fixture for database tests
fn setup_test_db() -> (tempfile::TempDir, database::DbPool) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db.db");

    let config = DatabaseConfig {
        path: db_path.to_str().unwrap().to_string(),
        max_connections: 2,
        busy_timeout_ms: 1000,
    };
    let pool = database::initialize(&config).unwrap();

    (dir, pool)
}

fn customer(phone: &str) -> NewCustomer {
    NewCustomer {
        full_name: "Test Customer".to_string(),
        phone: phone.to_string(),
        currencies: vec!["TJS".to_string(), "usd".to_string()],
        daily_limit: Decimal::from(1000),
    }
}

fn exists(conn: &Connection, kind: &str, name: &str) -> bool {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2)",
        params![kind, name],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn test_schema_creation() {
    let (_dir, pool) = setup_test_db();
    let conn = pool.get().unwrap();

    for table in ["users", "accounts", "cards", "transactions", "limits"] {
        assert!(exists(&conn, "table", table), "Table '{}' should exist", table);
    }

    for index in ["idx_accounts_user_id", "idx_cards_account_id", "idx_transactions_account_created"] {
        assert!(exists(&conn, "index", index), "Index '{}' should exist", index);
    }

    for trigger in ["transactions_no_update", "transactions_no_delete"] {
        assert!(exists(&conn, "trigger", trigger), "Trigger '{}' should exist", trigger);
    }
}

#[test]
fn test_schema_creation_is_idempotent() {
    let (_dir, pool) = setup_test_db();
    let mut conn = pool.get().unwrap();
    database::create_schema(&mut conn).unwrap();
}

#[test]
fn test_pool_connections_enforce_foreign_keys() {
    let (_dir, pool) = setup_test_db();
    let conn = pool.get().unwrap();

    let enabled: bool = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
    assert!(enabled);

    let result = conn.execute(
        "INSERT INTO accounts (user_id, currency, balance, blocked, created_at, updated_at)
         VALUES (999, 'TJS', 0, 0, 'x', 'x')",
        [],
    );
    assert!(result.is_err());
}

#[test]
fn test_register_customer() {
    let (_dir, pool) = setup_test_db();
    let mut conn = pool.get().unwrap();
    let now = Utc::now();

    let registration = provisioning::register_customer(&mut conn, &customer("+992900000001"), now).unwrap();

    assert_eq!(registration.accounts.len(), 2);
    let usd = registration.account("USD").unwrap();
    assert_eq!(usd.user_id, registration.user_id);
    assert_eq!(usd.balance, Decimal::ZERO);
    assert!(!usd.blocked);

    let limit: i64 = conn
        .query_row(
            "SELECT daily_amount FROM limits WHERE user_id = ?1",
            params![registration.user_id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(limit, 1000 * 10_000);
}

#[test]
fn test_register_customer_rolls_back_on_duplicate_phone() {
    let (_dir, pool) = setup_test_db();
    let mut conn = pool.get().unwrap();
    let now = Utc::now();

    provisioning::register_customer(&mut conn, &customer("+992900000001"), now).unwrap();
    assert!(provisioning::register_customer(&mut conn, &customer("+992900000001"), now).is_err());

    let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0)).unwrap();
    let accounts: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0)).unwrap();
    assert_eq!(users, 1);
    assert_eq!(accounts, 2);
}

#[test]
fn test_one_account_per_currency() {
    let (_dir, pool) = setup_test_db();
    let mut conn = pool.get().unwrap();

    let mut duplicate = customer("+992900000002");
    duplicate.currencies = vec!["TJS".to_string(), "tjs".to_string()];

    assert!(provisioning::register_customer(&mut conn, &duplicate, Utc::now()).is_err());
}

#[test]
fn test_issue_card() {
    let (_dir, pool) = setup_test_db();
    let mut conn = pool.get().unwrap();
    let registration = provisioning::register_customer(&mut conn, &customer("+992900000003"), Utc::now()).unwrap();
    let account = registration.account("TJS").unwrap();

    let expiry = NaiveDate::from_ymd_opt(2029, 12, 31).unwrap();
    let card = provisioning::issue_card(&conn, account.id, "8600123412341234", "TEST CUSTOMER", expiry, Utc::now())
        .unwrap();
    assert_eq!(card.account_id, account.id);

    // Card numbers are unique
    assert!(provisioning::issue_card(&conn, account.id, "8600123412341234", "TEST", expiry, Utc::now()).is_err());
}

#[test]
fn test_transactions_are_append_only() {
    let (_dir, pool) = setup_test_db();
    let mut conn = pool.get().unwrap();
    let registration = provisioning::register_customer(&mut conn, &customer("+992900000004"), Utc::now()).unwrap();
    let account = registration.account("TJS").unwrap();

    conn.execute(
        "INSERT INTO transactions (account_id, amount, fee, currency, type, reference_id, created_at)
         VALUES (?1, 10000, 0, 'TJS', 'deposit', 'ref-1', ?2)",
        params![account.id, database::format_timestamp(&Utc::now())],
    )
    .unwrap();

    assert!(conn.execute("UPDATE transactions SET amount = 1", []).is_err());
    assert!(conn.execute("DELETE FROM transactions", []).is_err());

    let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0)).unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_balance_cannot_go_negative() {
    let (_dir, pool) = setup_test_db();
    let mut conn = pool.get().unwrap();
    let registration = provisioning::register_customer(&mut conn, &customer("+992900000005"), Utc::now()).unwrap();
    let account = registration.account("TJS").unwrap();

    let err = conn
        .execute("UPDATE accounts SET balance = balance - 1 WHERE id = ?1", params![account.id])
        .unwrap_err();
    assert_eq!(crate::errors::LedgerError::from(err), crate::errors::LedgerError::InsufficientFunds);
}

#[test]
fn test_timestamp_round_trip_keeps_order() {
    let earlier: DateTime<Utc> = "2026-10-18T09:59:59.999999Z".parse().unwrap();
    let later: DateTime<Utc> = "2026-10-18T10:00:00Z".parse().unwrap();

    let (a, b) = (database::format_timestamp(&earlier), database::format_timestamp(&later));
    assert!(a < b);
    assert_eq!(b, "2026-10-18T10:00:00.000000Z");
    assert_eq!(database::parse_timestamp(0, &a).unwrap(), earlier);
}

#[test]
fn test_transaction_type_strings() {
    for kind in [TransactionType::Deposit, TransactionType::Withdraw, TransactionType::Transfer] {
        assert_eq!(TransactionType::from_str(kind.as_str()).unwrap(), kind);
    }
    assert!(TransactionType::from_str("refund").is_err());
    assert!(!TransactionType::Deposit.counts_against_limit());
    assert_eq!(
        TransactionType::limit_counted().collect::<Vec<_>>(),
        vec![TransactionType::Withdraw, TransactionType::Transfer]
    );
}

#[test]
fn test_set_daily_limit_keeps_reset_marker() {
    let (_dir, pool) = setup_test_db();
    let mut conn = pool.get().unwrap();
    let registered_at: DateTime<Utc> = "2026-10-18T10:00:00Z".parse().unwrap();
    let registration = provisioning::register_customer(&mut conn, &customer("+992900000006"), registered_at).unwrap();

    let later = registered_at + chrono::Duration::days(3);
    provisioning::set_daily_limit(&conn, registration.user_id, Decimal::from(2500), later).unwrap();

    let (daily_amount, last_reset): (i64, String) = conn
        .query_row(
            "SELECT daily_amount, last_reset FROM limits WHERE user_id = ?1",
            params![registration.user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(daily_amount, 2500 * 10_000);
    assert_eq!(database::parse_timestamp(1, &last_reset).unwrap(), registered_at);

    assert!(provisioning::set_daily_limit(&conn, registration.user_id, Decimal::from(-1), later).is_err());
    assert!(provisioning::set_daily_limit(&conn, 9999, Decimal::from(10), later).is_err());
}
