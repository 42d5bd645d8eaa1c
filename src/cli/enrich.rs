use super::ui;
use crate::core::{EnrichmentEngine, EnrichmentOptions, RateCache, Transaction};
use crate::report::{self, Summary};
use anyhow::Result;
use comfy_table::Cell;
use std::path::Path;
use tracing::{info, warn};

impl Summary {
    pub fn display_as_table(&self) -> String {
        let target_currency = &self.target_currency;

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Category"),
            ui::header_cell(&format!("Total ({target_currency})")),
            ui::header_cell("Transactions"),
        ]);
        for category in &self.by_category {
            table.add_row(vec![
                Cell::new(&category.category),
                ui::signed_amount_cell(category.total),
                ui::count_cell(category.count),
            ]);
        }

        let mut output = format!(
            "{}\n\n",
            ui::style_text("Enriched transactions", ui::StyleType::Title)
        );
        output.push_str(&table.to_string());
        output.push_str(&format!(
            "\n\nTotal ({}): {}",
            ui::style_text(target_currency, ui::StyleType::TotalLabel),
            ui::style_text(&format!("{:.2}", self.total_converted), ui::StyleType::TotalValue)
        ));

        let unenriched_style = if self.unenriched > 0 {
            ui::StyleType::Error
        } else {
            ui::StyleType::Subtle
        };
        output.push_str(&format!(
            "\n{} enriched, {}",
            self.enriched,
            ui::style_text(&format!("{} unenriched", self.unenriched), unenriched_style)
        ));
        output
    }
}

/// Enriches `transactions` and writes both outputs.
pub async fn run(
    transactions: &[Transaction],
    cache: &RateCache,
    options: EnrichmentOptions,
    json_path: &Path,
    xlsx_path: &Path,
) -> Result<Summary> {
    let engine = EnrichmentEngine::new(cache, options);

    let pb = ui::new_progress_bar(transactions.len() as u64, true);
    pb.set_message("Resolving quotes...");
    let outcomes = engine.enrich(transactions, &|| pb.inc(1)).await;
    pb.finish_and_clear();

    let summary = Summary::from_outcomes(&outcomes, engine.target_currency());
    if summary.unenriched > 0 {
        warn!(
            "{} of {} transactions could not be enriched",
            summary.unenriched,
            summary.rows()
        );
    }

    report::write_outputs(json_path, xlsx_path, &outcomes, &summary)?;
    info!(
        "Wrote {} rows to {} and {}",
        summary.rows(),
        json_path.display(),
        xlsx_path.display()
    );

    println!("{}", summary.display_as_table());
    ui::print_separator();
    println!(
        "{}\n{}",
        ui::style_text(&json_path.display().to_string(), ui::StyleType::Subtle),
        ui::style_text(&xlsx_path.display().to_string(), ui::StyleType::Subtle)
    );
    Ok(summary)
}
