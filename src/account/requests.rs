use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::LedgerError;

/// How a caller points at an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountIdentifier {
    Card(String),
    Phone(String),
}

impl AccountIdentifier {
    /// Pick the identifier out of optional card and phone inputs. Blank
    /// values count as absent and the card wins when both are present.
    pub fn from_parts(card_number: Option<&str>, phone_number: Option<&str>) -> Result<Self, LedgerError> {
        let present = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        if let Some(card) = present(card_number) {
            return Ok(AccountIdentifier::Card(card));
        }
        if let Some(phone) = present(phone_number) {
            return Ok(AccountIdentifier::Phone(phone));
        }
        Err(LedgerError::MissingIdentifier)
    }

    pub fn kind(&self) -> &str {
        match self {
            AccountIdentifier::Card(_) => "card",
            AccountIdentifier::Phone(_) => "phone",
        }
    }
}

/// Deposit or withdrawal input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub amount: Decimal,
    /// Blank means base currency
    #[serde(default)]
    pub currency: String,
    pub card_number: Option<String>,
    pub phone_number: Option<String>,
}

impl TransactionRequest {
    pub fn by_card(amount: Decimal, currency: &str, card_number: &str) -> Self {
        Self {
            amount,
            currency: currency.to_string(),
            card_number: Some(card_number.to_string()),
            phone_number: None,
        }
    }

    pub fn by_phone(amount: Decimal, currency: &str, phone_number: &str) -> Self {
        Self {
            amount,
            currency: currency.to_string(),
            card_number: None,
            phone_number: Some(phone_number.to_string()),
        }
    }

    pub fn identifier(&self) -> Result<AccountIdentifier, LedgerError> {
        AccountIdentifier::from_parts(self.card_number.as_deref(), self.phone_number.as_deref())
    }
}

/// Transfer input: one identifier for each side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub currency: String,
    pub from_card_number: Option<String>,
    pub from_phone_number: Option<String>,
    pub to_card_number: Option<String>,
    pub to_phone_number: Option<String>,
}

impl TransferRequest {
    pub fn new(amount: Decimal, currency: &str, from: AccountIdentifier, to: AccountIdentifier) -> Self {
        let split = |id: AccountIdentifier| match id {
            AccountIdentifier::Card(card) => (Some(card), None),
            AccountIdentifier::Phone(phone) => (None, Some(phone)),
        };
        let (from_card_number, from_phone_number) = split(from);
        let (to_card_number, to_phone_number) = split(to);

        Self {
            amount,
            currency: currency.to_string(),
            from_card_number,
            from_phone_number,
            to_card_number,
            to_phone_number,
        }
    }

    pub fn source(&self) -> Result<AccountIdentifier, LedgerError> {
        AccountIdentifier::from_parts(self.from_card_number.as_deref(), self.from_phone_number.as_deref())
    }

    pub fn destination(&self) -> Result<AccountIdentifier, LedgerError> {
        AccountIdentifier::from_parts(self.to_card_number.as_deref(), self.to_phone_number.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Some("8600"), Some("+992900"), Ok(AccountIdentifier::Card("8600".into())) ; "card wins")]
    #[test_case(None, Some(" +992900 "), Ok(AccountIdentifier::Phone("+992900".into())) ; "phone trimmed")]
    #[test_case(Some("  "), Some("+992900"), Ok(AccountIdentifier::Phone("+992900".into())) ; "blank card ignored")]
    #[test_case(Some(""), Some(""), Err(LedgerError::MissingIdentifier) ; "both blank")]
    #[test_case(None, None, Err(LedgerError::MissingIdentifier) ; "neither")]
    fn test_identifier_from_parts(
        card: Option<&str>,
        phone: Option<&str>,
        expected: Result<AccountIdentifier, LedgerError>,
    ) {
        assert_eq!(AccountIdentifier::from_parts(card, phone), expected);
    }

    #[test]
    fn test_transfer_request_sides() {
        let request = TransferRequest::new(
            Decimal::new(5, 0),
            "TJS",
            AccountIdentifier::Phone("+992900".into()),
            AccountIdentifier::Card("8600".into()),
        );
        assert_eq!(request.source(), Ok(AccountIdentifier::Phone("+992900".into())));
        assert_eq!(request.destination(), Ok(AccountIdentifier::Card("8600".into())));
    }

    #[test]
    fn test_request_deserializes_without_currency() {
        let request: TransactionRequest =
            serde_json::from_str(r#"{"amount":"10.5","card_number":"8600","phone_number":null}"#).unwrap();
        assert_eq!(request.currency, "");
        assert_eq!(request.amount, Decimal::new(105, 1));
    }
}
