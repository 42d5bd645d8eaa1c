use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Status used by bank exports for completed operations.
pub const STATUS_OK: &str = "OK";

/// A single row of the source statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDateTime,
    pub description: String,
    pub amount: f64,
    pub currency: String,
    /// Amount charged to the account, in `payment_currency`.
    pub payment_amount: Option<f64>,
    pub payment_currency: Option<String>,
    pub category: Option<String>,
    pub card_number: Option<String>,
    pub status: Option<String>,
    pub cashback: Option<f64>,
    pub mcc: Option<String>,
    /// When set, `amount` is a number of shares priced in `currency`.
    pub ticker: Option<String>,
}

impl Transaction {
    pub fn new(date: NaiveDateTime, description: &str, amount: f64, currency: &str) -> Self {
        Self {
            date,
            description: description.to_string(),
            amount,
            currency: currency.trim().to_uppercase(),
            payment_amount: None,
            payment_currency: None,
            category: None,
            card_number: None,
            status: None,
            cashback: None,
            mcc: None,
            ticker: None,
        }
    }

    pub fn with_payment(mut self, amount: f64, currency: &str) -> Self {
        self.payment_amount = Some(amount);
        self.payment_currency = Some(currency.trim().to_uppercase());
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_ticker(mut self, ticker: &str) -> Self {
        self.ticker = Some(ticker.trim().to_uppercase());
        self
    }

    pub fn with_card(mut self, card_number: &str) -> Self {
        self.card_number = Some(card_number.to_string());
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn with_cashback(mut self, cashback: f64) -> Self {
        self.cashback = Some(cashback);
        self
    }

    pub fn day(&self) -> NaiveDate {
        self.date.date()
    }

    pub fn is_expense(&self) -> bool {
        self.amount < 0.0
    }

    /// Rows without a status column count as completed.
    pub fn is_completed(&self) -> bool {
        self.status
            .as_deref()
            .is_none_or(|s| s.trim().eq_ignore_ascii_case(STATUS_OK))
    }

    /// The row's value in `currency` when the statement already carries it.
    ///
    /// The account-side payment amount is preferred; a payment amount without
    /// a payment currency is taken to be in `currency`.
    pub fn amount_in(&self, currency: &str) -> Option<f64> {
        if let Some(payment) = self.payment_amount {
            let matches = self
                .payment_currency
                .as_deref()
                .is_none_or(|c| c.eq_ignore_ascii_case(currency));
            if matches {
                return Some(payment);
            }
        }
        self.currency
            .eq_ignore_ascii_case(currency)
            .then_some(self.amount)
    }

    pub fn category_or_default(&self) -> &str {
        self.category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or("Uncategorized")
    }
}

/// Rounds a monetary value to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(100.0 * 1.08), 108.0);
        assert_eq!(round2(-12.346), -12.35);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn test_status_and_category_defaults() {
        let tx = Transaction::new(at(2024, 1, 5), "Coffee", -3.5, "eur");
        assert_eq!(tx.currency, "EUR");
        assert!(tx.is_completed());
        assert!(tx.is_expense());
        assert_eq!(tx.category_or_default(), "Uncategorized");

        let failed = tx.clone().with_status("FAILED").with_category("Cafes");
        assert!(!failed.is_completed());
        assert_eq!(failed.category_or_default(), "Cafes");
        assert!(tx.with_status("ok").is_completed());
    }

    #[test]
    fn test_amount_in_prefers_payment_amount() {
        let abroad = Transaction::new(at(2024, 1, 5), "Coffee Paris", -5.0, "EUR")
            .with_payment(-480.0, "rub");
        assert_eq!(abroad.amount_in("RUB"), Some(-480.0));
        assert_eq!(abroad.amount_in("EUR"), Some(-5.0));
        assert_eq!(abroad.amount_in("USD"), None);

        let local = Transaction::new(at(2024, 1, 5), "Groceries", -300.0, "RUB");
        assert_eq!(local.amount_in("RUB"), Some(-300.0));
        assert_eq!(local.amount_in("USD"), None);

        let mut untagged = local.clone();
        untagged.payment_amount = Some(-310.0);
        assert_eq!(untagged.amount_in("USD"), Some(-310.0));
    }
}
