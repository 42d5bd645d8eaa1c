use super::{Summary, write_file};
use crate::core::enrichment::RowOutcome;
use anyhow::{Context, Result};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet, XlsxError};
use std::path::Path;
use tracing::debug;

pub const TRANSACTIONS_SHEET: &str = "Transactions";
pub const CATEGORIES_SHEET: &str = "Categories";

const MONEY_FORMAT: &str = "#,##0.00";
const RATE_FORMAT: &str = "0.0000##";

struct Formats {
    header: Format,
    money: Format,
    rate: Format,
    failed: Format,
    total_label: Format,
    total_money: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new()
                .set_bold()
                .set_background_color(Color::RGB(0xDDEBF7))
                .set_align(FormatAlign::Center),
            money: Format::new().set_num_format(MONEY_FORMAT),
            rate: Format::new().set_num_format(RATE_FORMAT),
            failed: Format::new().set_font_color(Color::Red),
            total_label: Format::new().set_bold(),
            total_money: Format::new().set_bold().set_num_format(MONEY_FORMAT),
        }
    }
}

/// Builds the workbook: one row per transaction followed by summary rows,
/// plus a sheet of per-category subtotals.
pub fn render_workbook(outcomes: &[RowOutcome], summary: &Summary) -> Result<Vec<u8>> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    write_transactions(sheet, outcomes, summary, &formats)
        .context("Failed to build transactions sheet")?;

    let sheet = workbook.add_worksheet();
    write_categories(sheet, summary, &formats).context("Failed to build categories sheet")?;

    workbook.save_to_buffer().context("Failed to encode workbook")
}

pub fn write_workbook(path: &Path, outcomes: &[RowOutcome], summary: &Summary) -> Result<()> {
    write_file(path, &render_workbook(outcomes, summary)?)?;
    debug!("Wrote workbook to {}", path.display());
    Ok(())
}

fn write_transactions(
    sheet: &mut Worksheet,
    outcomes: &[RowOutcome],
    summary: &Summary,
    formats: &Formats,
) -> Result<(), XlsxError> {
    sheet.set_name(TRANSACTIONS_SHEET)?;

    let converted_header = format!("Converted ({})", summary.target_currency);
    let headers = [
        "Date",
        "Description",
        "Category",
        "Amount",
        "Currency",
        converted_header.as_str(),
        "Rate",
        "Status",
        "Error",
    ];
    for (col, title) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &formats.header)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    for (col, width) in [12, 36, 18, 14, 10, 18, 12, 12, 18].into_iter().enumerate() {
        sheet.set_column_width(col as u16, width)?;
    }

    let mut row: u32 = 1;
    for outcome in outcomes {
        let tx = outcome.transaction();
        let date = tx.day().format("%Y-%m-%d").to_string();
        sheet.write_string(row, 0, &date)?;
        sheet.write_string(row, 1, tx.description.as_str())?;
        sheet.write_string(row, 2, tx.category.as_deref().unwrap_or(""))?;
        sheet.write_number_with_format(row, 3, tx.amount, &formats.money)?;
        sheet.write_string(row, 4, tx.currency.as_str())?;
        if let Some(converted) = outcome.converted_amount() {
            sheet.write_number_with_format(row, 5, converted, &formats.money)?;
        }
        if let Some(rate) = outcome.rate_used() {
            sheet.write_number_with_format(row, 6, rate, &formats.rate)?;
        }
        match outcome.error_reason() {
            None => {
                sheet.write_string(row, 7, "ok")?;
            }
            Some(reason) => {
                sheet.write_string_with_format(row, 7, "unenriched", &formats.failed)?;
                sheet.write_string_with_format(row, 8, reason, &formats.failed)?;
            }
        }
        row += 1;
    }

    // One blank row separates the data from the summary.
    row += 1;
    let total_label = format!("Total ({})", summary.target_currency);
    sheet.write_string_with_format(row, 0, &total_label, &formats.total_label)?;
    sheet.write_number_with_format(row, 5, summary.total_converted, &formats.total_money)?;
    sheet.write_string_with_format(row + 1, 0, "Enriched rows", &formats.total_label)?;
    sheet.write_number(row + 1, 5, summary.enriched as f64)?;
    sheet.write_string_with_format(row + 2, 0, "Unenriched rows", &formats.total_label)?;
    sheet.write_number(row + 2, 5, summary.unenriched as f64)?;
    Ok(())
}

fn write_categories(sheet: &mut Worksheet, summary: &Summary, formats: &Formats) -> Result<(), XlsxError> {
    sheet.set_name(CATEGORIES_SHEET)?;

    let total_header = format!("Total ({})", summary.target_currency);
    for (col, title) in ["Category", total_header.as_str(), "Transactions"]
        .iter()
        .enumerate()
    {
        sheet.write_string_with_format(0, col as u16, *title, &formats.header)?;
    }
    sheet.set_column_width(0, 24)?;
    sheet.set_column_width(1, 18)?;
    sheet.set_column_width(2, 14)?;

    let mut row: u32 = 1;
    for category in &summary.by_category {
        sheet.write_string(row, 0, category.category.as_str())?;
        sheet.write_number_with_format(row, 1, category.total, &formats.money)?;
        sheet.write_number(row, 2, category.count as f64)?;
        row += 1;
    }
    Ok(())
}
