//! Reads bank statements exported as spreadsheets.
//!
//! The first worksheet is used and its first row must be a header. Column
//! names are matched case-insensitively against English names and the
//! headers of Russian bank exports, so both layouts load without mapping.

use crate::core::error::FatalError;
use crate::core::transaction::Transaction;
use calamine::{Data, Reader, open_workbook_auto};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::path::Path;
use tracing::{debug, info};

const DATE: &[&str] = &["date", "дата операции"];
const DESCRIPTION: &[&str] = &["description", "описание"];
const AMOUNT: &[&str] = &["amount", "сумма операции"];
const CURRENCY: &[&str] = &["currency", "валюта операции"];
const PAYMENT_AMOUNT: &[&str] = &["payment_amount", "сумма платежа"];
const PAYMENT_CURRENCY: &[&str] = &["payment_currency", "валюта платежа"];
const CATEGORY: &[&str] = &["category", "категория"];
const CARD: &[&str] = &["card", "card_number", "номер карты"];
const STATUS: &[&str] = &["status", "статус"];
const CASHBACK: &[&str] = &["cashback", "кэшбэк", "кешбэк"];
const MCC: &[&str] = &["mcc"];
const TICKER: &[&str] = &["ticker", "symbol"];

const DATETIME_FORMATS: &[&str] = &[
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];
const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%Y-%m-%d"];

/// Column positions resolved from the header row.
#[derive(Debug)]
struct Columns {
    date: usize,
    description: usize,
    amount: usize,
    currency: usize,
    payment_amount: Option<usize>,
    payment_currency: Option<usize>,
    category: Option<usize>,
    card: Option<usize>,
    status: Option<usize>,
    cashback: Option<usize>,
    mcc: Option<usize>,
    ticker: Option<usize>,
}

impl Columns {
    fn from_header(header: &[Data]) -> Result<Self, FatalError> {
        let names: Vec<String> = header
            .iter()
            .map(|cell| cell_text(cell).unwrap_or_default().to_lowercase())
            .collect();
        let find = |aliases: &[&str]| names.iter().position(|n| aliases.contains(&n.as_str()));
        let require = |aliases: &[&str]| {
            find(aliases).ok_or_else(|| {
                FatalError::InputFormat(format!("Missing required column '{}'", aliases[0]))
            })
        };

        Ok(Self {
            date: require(DATE)?,
            description: require(DESCRIPTION)?,
            amount: require(AMOUNT)?,
            currency: require(CURRENCY)?,
            payment_amount: find(PAYMENT_AMOUNT),
            payment_currency: find(PAYMENT_CURRENCY),
            category: find(CATEGORY),
            card: find(CARD),
            status: find(STATUS),
            cashback: find(CASHBACK),
            mcc: find(MCC),
            ticker: find(TICKER),
        })
    }
}

/// Loads all transactions from the first worksheet of `path`.
pub fn load_transactions<P: AsRef<Path>>(path: P) -> Result<Vec<Transaction>, FatalError> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        FatalError::InputFormat(format!("Failed to open workbook {}: {e}", path.display()))
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| {
            FatalError::InputFormat(format!("Workbook {} has no worksheets", path.display()))
        })?
        .map_err(|e| {
            FatalError::InputFormat(format!("Failed to read worksheet in {}: {e}", path.display()))
        })?;

    let transactions = parse_rows(range.rows())?;
    info!(
        "Loaded {} transactions from {}",
        transactions.len(),
        path.display()
    );
    Ok(transactions)
}

/// Converts raw rows (header first) into transactions.
pub fn parse_rows<'a, I>(mut rows: I) -> Result<Vec<Transaction>, FatalError>
where
    I: Iterator<Item = &'a [Data]>,
{
    let Some(header) = rows.next() else {
        debug!("Worksheet is empty");
        return Ok(Vec::new());
    };
    let columns = Columns::from_header(header)?;

    let mut transactions = Vec::new();
    // Spreadsheet rows are 1-based and the header occupies the first one.
    for (row_number, row) in (2..).zip(rows) {
        if row.iter().all(|cell| cell_text(cell).is_none()) {
            continue;
        }
        transactions.push(parse_row(row, &columns, row_number)?);
    }
    Ok(transactions)
}

fn parse_row(row: &[Data], columns: &Columns, row_number: usize) -> Result<Transaction, FatalError> {
    let cell = |idx: usize| row.get(idx).unwrap_or(&Data::Empty);
    let optional_text = |idx: Option<usize>| idx.and_then(|i| cell_text(cell(i)));
    let invalid = |field: &str, value: &Data| {
        FatalError::InputFormat(format!(
            "Row {row_number}: invalid or missing {field} '{}'",
            cell_text(value).unwrap_or_default()
        ))
    };

    let date = cell_date(cell(columns.date)).ok_or_else(|| invalid("date", cell(columns.date)))?;
    let amount =
        cell_number(cell(columns.amount)).ok_or_else(|| invalid("amount", cell(columns.amount)))?;
    let currency = cell_text(cell(columns.currency))
        .ok_or_else(|| invalid("currency", cell(columns.currency)))?;
    let description = cell_text(cell(columns.description)).unwrap_or_default();

    let mut transaction = Transaction::new(date, &description, amount, &currency);
    transaction.payment_amount = columns.payment_amount.and_then(|i| cell_number(cell(i)));
    transaction.payment_currency = optional_text(columns.payment_currency).map(|c| c.to_uppercase());
    transaction.category = optional_text(columns.category);
    transaction.card_number = optional_text(columns.card);
    transaction.status = optional_text(columns.status);
    transaction.mcc = optional_text(columns.mcc);
    transaction.cashback = columns.cashback.and_then(|i| cell_number(cell(i)));
    transaction.ticker = optional_text(columns.ticker).map(|t| t.to_uppercase());
    Ok(transaction)
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        _ => String::new(),
    };
    if text.is_empty() { None } else { Some(text) }
}

fn cell_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => parse_number(s),
        _ => None,
    }
}

fn cell_date(cell: &Data) -> Option<NaiveDateTime> {
    match cell {
        Data::DateTime(dt) => from_excel_serial(dt.as_f64()),
        Data::Float(f) => from_excel_serial(*f),
        Data::Int(i) => from_excel_serial(*i as f64),
        Data::String(s) | Data::DateTimeIso(s) => parse_datetime(s),
        _ => None,
    }
}

/// Parses amounts such as `-1 234,56` or `99.90`.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Excel stores dates as days since 1899-12-30 with the time as a fraction.
fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let days = serial.trunc();
    let seconds = ((serial - days) * 86_400.0).round() as i64;
    NaiveDate::from_ymd_opt(1899, 12, 30)?
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::days(days as i64) + Duration::seconds(seconds))
}
