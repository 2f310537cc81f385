use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::errors::LedgerError;

/// Exchange rates of the supported currencies against the base currency.
/// Built once from configuration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    base: String,
    rates: BTreeMap<String, Decimal>,
}

impl RateTable {
    pub fn new(base_currency: &str, rates: BTreeMap<String, Decimal>) -> Result<Self> {
        let base = base_currency.trim().to_uppercase();
        let rates: BTreeMap<String, Decimal> = rates
            .into_iter()
            .map(|(code, rate)| (code.trim().to_uppercase(), rate))
            .collect();

        for (code, rate) in &rates {
            if !is_currency_code(code) {
                return Err(anyhow!("Invalid currency code: {}", code));
            }
            if *rate <= Decimal::ZERO {
                return Err(anyhow!("Rate for {} must be positive", code));
            }
        }

        match rates.get(&base) {
            Some(rate) if *rate == Decimal::ONE => {}
            Some(rate) => return Err(anyhow!("Base currency {} must have rate 1, got {}", base, rate)),
            None => return Err(anyhow!("Base currency {} missing from rate table", base)),
        }

        Ok(Self { base, rates })
    }

    pub fn base_currency(&self) -> &str {
        &self.base
    }

    pub fn is_supported(&self, currency: &str) -> bool {
        self.rates.contains_key(currency)
    }

    /// Supported currency codes in alphabetical order
    pub fn currencies(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }

    pub fn rate(&self, currency: &str) -> Result<Decimal, LedgerError> {
        self.rates
            .get(currency)
            .copied()
            .ok_or_else(|| LedgerError::UnsupportedCurrency(currency.to_string()))
    }

    /// Canonical form of a requested currency. Blank means base currency.
    pub fn normalize(&self, currency: &str) -> Result<String, LedgerError> {
        let code = currency.trim().to_uppercase();
        if code.is_empty() {
            return Ok(self.base.clone());
        }
        if !self.is_supported(&code) {
            return Err(LedgerError::UnsupportedCurrency(code));
        }
        Ok(code)
    }

    pub fn convert_to_base(&self, amount: Decimal, currency: &str) -> Result<Decimal, LedgerError> {
        Ok(amount * self.rate(currency)?)
    }

    pub fn convert_from_base(&self, amount: Decimal, currency: &str) -> Result<Decimal, LedgerError> {
        Ok(amount / self.rate(currency)?)
    }
}

fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn table() -> RateTable {
        let mut rates = BTreeMap::new();
        rates.insert("TJS".to_string(), Decimal::ONE);
        rates.insert("usd".to_string(), d("9.21"));
        RateTable::new("tjs", rates).unwrap()
    }

    #[test]
    fn test_codes_are_upper_cased() {
        let rates = table();
        assert_eq!(rates.base_currency(), "TJS");
        assert!(rates.is_supported("USD"));
        assert_eq!(rates.currencies().collect::<Vec<_>>(), vec!["TJS", "USD"]);
    }

    #[test]
    fn test_convert_to_base() {
        let rates = table();
        assert_eq!(rates.convert_to_base(d("10"), "USD").unwrap(), d("92.1"));
        assert_eq!(rates.convert_to_base(d("10"), "TJS").unwrap(), d("10"));
        assert_eq!(
            rates.convert_to_base(d("10"), "GBP"),
            Err(LedgerError::UnsupportedCurrency("GBP".to_string()))
        );
    }

    #[test]
    fn test_convert_from_base() {
        let rates = table();
        assert_eq!(rates.convert_from_base(d("92.1"), "USD").unwrap(), d("10"));
    }

    #[test]
    fn test_normalize() {
        let rates = table();
        assert_eq!(rates.normalize(" usd ").unwrap(), "USD");
        assert_eq!(rates.normalize("").unwrap(), "TJS");
        assert_eq!(
            rates.normalize("eur"),
            Err(LedgerError::UnsupportedCurrency("EUR".to_string()))
        );
    }

    #[test]
    fn test_base_must_have_unit_rate() {
        let mut rates = BTreeMap::new();
        rates.insert("TJS".to_string(), d("1.5"));
        assert!(RateTable::new("TJS", rates).is_err());
    }

    #[test]
    fn test_base_must_be_present() {
        let mut rates = BTreeMap::new();
        rates.insert("USD".to_string(), d("9.21"));
        assert!(RateTable::new("TJS", rates).is_err());
    }

    #[test]
    fn test_rates_must_be_positive() {
        let mut rates = BTreeMap::new();
        rates.insert("TJS".to_string(), Decimal::ONE);
        rates.insert("USD".to_string(), Decimal::ZERO);
        assert!(RateTable::new("TJS", rates).is_err());
    }
}
