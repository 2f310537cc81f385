use log::debug;
use rusqlite::Connection;

use super::repository;
use super::requests::AccountIdentifier;
use crate::database::models::{Account, UserId};
use crate::errors::LedgerError;

/// Account in `currency` linked to a card. A card on an account of another
/// currency does not match.
pub fn resolve_by_card(conn: &Connection, card_number: &str, currency: &str) -> Result<Account, LedgerError> {
    repository::find_by_card(conn, card_number, currency)?.ok_or_else(|| {
        debug!("No {} account behind card", currency);
        LedgerError::AccountNotFound
    })
}

/// Account in `currency` of the user registered under a phone number
pub fn resolve_by_phone(conn: &Connection, phone_number: &str, currency: &str) -> Result<Account, LedgerError> {
    repository::find_by_phone(conn, phone_number, currency)?.ok_or_else(|| {
        debug!("No {} account behind phone number", currency);
        LedgerError::AccountNotFound
    })
}

pub fn resolve(conn: &Connection, identifier: &AccountIdentifier, currency: &str) -> Result<Account, LedgerError> {
    match identifier {
        AccountIdentifier::Card(card_number) => resolve_by_card(conn, card_number, currency),
        AccountIdentifier::Phone(phone_number) => resolve_by_phone(conn, phone_number, currency),
    }
}

pub fn accounts_for_user(conn: &Connection, user_id: UserId) -> Result<Vec<Account>, LedgerError> {
    Ok(repository::list_for_user(conn, user_id)?)
}
