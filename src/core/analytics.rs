//! Read-only views over a loaded statement: search, category spending and
//! the overview page.
use crate::core::cache::RateCache;
use crate::core::quote::QuoteKey;
use crate::core::transaction::{Transaction, round2};
use chrono::{Datelike, Months, NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::{debug, warn};

/// Number of expenses listed on the overview page.
pub const TOP_EXPENSES: usize = 5;
/// Length of the window used by [`spending_by_category`].
pub const SPENDING_WINDOW_MONTHS: u32 = 3;

/// Case-insensitive substring search over descriptions.
///
/// A blank query matches nothing.
pub fn search<'a>(transactions: &'a [Transaction], query: &str) -> Vec<&'a Transaction> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let found: Vec<_> = transactions
        .iter()
        .filter(|tx| tx.description.to_lowercase().contains(&needle))
        .collect();
    debug!("Search '{}' matched {} transactions", query, found.len());
    found
}

/// Expenses in `category` dated within the three months ending at `end`.
pub fn spending_by_category<'a>(
    transactions: &'a [Transaction],
    category: &str,
    end: NaiveDateTime,
) -> Vec<&'a Transaction> {
    let start = end
        .checked_sub_months(Months::new(SPENDING_WINDOW_MONTHS))
        .unwrap_or(NaiveDateTime::MIN);
    // Lowercase rather than ASCII folding: bank exports use Cyrillic categories.
    let category = category.trim().to_lowercase();

    transactions
        .iter()
        .filter(|tx| tx.date >= start && tx.date <= end)
        .filter(|tx| {
            tx.category
                .as_deref()
                .is_some_and(|c| c.trim().to_lowercase() == category)
        })
        .filter(|tx| tx.is_expense())
        .collect()
}

pub fn greeting(hour: u32) -> &'static str {
    match hour {
        5..=11 => "Good morning",
        12..=17 => "Good afternoon",
        18..=22 => "Good evening",
        _ => "Good night",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardSummary {
    pub last_digits: String,
    pub total_spent: f64,
    pub cashback: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopTransaction {
    pub date: String,
    pub amount: f64,
    pub category: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyRate {
    pub currency: String,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockPrice {
    pub stock: String,
    pub price: f64,
}

/// Everything shown on the overview page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MainPage {
    pub greeting: String,
    pub cards: Vec<CardSummary>,
    pub top_transactions: Vec<TopTransaction>,
    pub currency_rates: Vec<CurrencyRate>,
    pub stock_prices: Vec<StockPrice>,
}

/// Completed transactions from the first day of `at`'s month up to `at`.
fn month_to_date(transactions: &[Transaction], at: NaiveDateTime) -> Vec<&Transaction> {
    let start = at
        .date()
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(at);
    transactions
        .iter()
        .filter(|tx| tx.date >= start && tx.date <= at && tx.is_completed())
        .collect()
}

/// A transaction with its amount expressed in the page currency.
///
/// `amount` is `None` when no rate could be found; such rows still count
/// towards cashback but not towards spending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValuedTransaction<'a> {
    pub transaction: &'a Transaction,
    pub amount: Option<f64>,
}

impl ValuedTransaction<'_> {
    fn expense(&self) -> Option<f64> {
        self.amount.filter(|a| *a < 0.0).map(f64::abs)
    }
}

/// Expresses every transaction in `currency`, using the statement's payment
/// amount when present and the operation-date rate otherwise.
pub async fn value_in<'a>(
    transactions: &[&'a Transaction],
    currency: &str,
    cache: &RateCache,
) -> Vec<ValuedTransaction<'a>> {
    let mut valued = Vec::with_capacity(transactions.len());
    for &tx in transactions {
        let amount = match tx.amount_in(currency) {
            Some(amount) => Some(amount),
            None => {
                let key = QuoteKey::currency(&tx.currency, currency, tx.day());
                match cache.get_or_fetch(&key).await {
                    Ok(quote) => Some(round2(tx.amount * quote.value)),
                    Err(e) => {
                        warn!("Leaving '{}' out of spending: {}", tx.description, e);
                        None
                    }
                }
            }
        };
        valued.push(ValuedTransaction {
            transaction: tx,
            amount,
        });
    }
    valued
}

/// Per-card spending and cashback, in order of first appearance.
pub fn card_summaries(transactions: &[ValuedTransaction]) -> Vec<CardSummary> {
    let mut cards: Vec<(String, f64, f64)> = Vec::new();
    for valued in transactions {
        let tx = valued.transaction;
        let Some(card) = tx.card_number.as_deref().map(str::trim).filter(|c| !c.is_empty()) else {
            continue;
        };
        let idx = match cards.iter().position(|(number, _, _)| number == card) {
            Some(idx) => idx,
            None => {
                cards.push((card.to_string(), 0.0, 0.0));
                cards.len() - 1
            }
        };
        let entry = &mut cards[idx];
        entry.1 += valued.expense().unwrap_or(0.0);
        entry.2 += tx.cashback.unwrap_or(0.0);
    }

    cards
        .into_iter()
        .map(|(number, spent, cashback)| CardSummary {
            last_digits: number.replace('*', ""),
            total_spent: round2(spent),
            cashback: round2(cashback.abs()),
        })
        .collect()
}

/// The largest expenses by absolute amount in the page currency.
pub fn top_expenses(transactions: &[ValuedTransaction], limit: usize) -> Vec<TopTransaction> {
    let mut expenses: Vec<(&Transaction, f64)> = transactions
        .iter()
        .filter_map(|v| v.expense().map(|amount| (v.transaction, amount)))
        .collect();
    expenses.sort_by(|a, b| b.1.total_cmp(&a.1));
    expenses
        .into_iter()
        .take(limit)
        .map(|(tx, amount)| TopTransaction {
            date: tx.date.format("%d.%m.%Y").to_string(),
            amount: round2(amount),
            category: tx.category.clone(),
            description: tx.description.clone(),
        })
        .collect()
}

/// Reference time for reports over `transactions`: the latest operation.
pub fn latest_date(transactions: &[Transaction]) -> Option<NaiveDateTime> {
    transactions.iter().map(|tx| tx.date).max()
}

/// Builds the overview page as of `at`, with amounts in `target_currency`.
///
/// Watched currencies are quoted against `target_currency`; the target itself
/// is not listed. Quotes that cannot be resolved are logged and left out.
pub async fn overview(
    transactions: &[Transaction],
    at: NaiveDateTime,
    target_currency: &str,
    user_currencies: &[String],
    user_stocks: &[String],
    cache: &RateCache,
) -> MainPage {
    let recent = month_to_date(transactions, at);
    debug!("{} completed transactions this month", recent.len());
    let valued = value_in(&recent, target_currency, cache).await;

    let mut currency_rates = Vec::new();
    for currency in user_currencies {
        if currency.trim().eq_ignore_ascii_case(target_currency) {
            continue;
        }
        let key = QuoteKey::currency(currency, target_currency, at.date());
        match cache.get_or_fetch(&key).await {
            Ok(quote) => currency_rates.push(CurrencyRate {
                currency: currency.trim().to_uppercase(),
                rate: round2(quote.value),
            }),
            Err(e) => warn!("Skipping rate for {}: {}", key, e),
        }
    }

    let mut stock_prices = Vec::new();
    for ticker in user_stocks {
        let key = QuoteKey::stock(ticker, at.date());
        match cache.get_or_fetch(&key).await {
            Ok(quote) => stock_prices.push(StockPrice {
                stock: ticker.trim().to_uppercase(),
                price: round2(quote.value),
            }),
            Err(e) => warn!("Skipping price for {}: {}", key, e),
        }
    }

    MainPage {
        greeting: greeting(at.hour()).to_string(),
        cards: card_summaries(&valued),
        top_transactions: top_expenses(&valued, TOP_EXPENSES),
        currency_rates,
        stock_prices,
    }
}
