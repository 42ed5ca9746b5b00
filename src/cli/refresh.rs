use super::ui;
use crate::market::MarketDataEngine;
use crate::market::refresh::RefreshReport;
use anyhow::Result;
use comfy_table::Cell;

impl RefreshReport {
    pub fn display(&self) -> String {
        let mut output = format!(
            "Updated {} of {} symbols",
            ui::style_text(&self.updated_count.to_string(), ui::StyleType::TotalValue),
            self.total_symbols
        );
        if self.errors.is_empty() {
            return output;
        }

        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("Symbols"), ui::header_cell("Error")]);
        for batch in &self.errors {
            table.add_row(vec![Cell::new(batch.symbols.join(", ")), Cell::new(&batch.error)]);
        }
        output.push_str(&format!(
            "\n{}\n{}",
            ui::style_text(
                &format!("{} batch(es) failed", self.errors.len()),
                ui::StyleType::Error
            ),
            table
        ));
        output
    }
}

pub async fn run(engine: &MarketDataEngine) -> Result<()> {
    let pb = ui::new_spinner("Refreshing prices...");
    let report = engine.update_all_prices().await;
    pb.finish_and_clear();

    println!("{}", report.display());
    Ok(())
}
