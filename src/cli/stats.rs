use super::ui;
use crate::market::MarketDataEngine;
use crate::store::usage::ProviderUsageStat;
use anyhow::Result;
use comfy_table::Cell;

fn display_as_table(stats: &[ProviderUsageStat]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Provider"),
        ui::header_cell("Date"),
        ui::header_cell("Success"),
        ui::header_cell("Errors"),
    ]);
    for stat in stats {
        table.add_row(vec![
            Cell::new(&stat.provider),
            Cell::new(&stat.date_key),
            ui::number_cell(stat.success_count.to_string()),
            ui::number_cell(stat.error_count.to_string()),
        ]);
    }
    table.to_string()
}

pub async fn run(engine: &MarketDataEngine) -> Result<()> {
    let stats = engine.get_daily_stats().await;
    if stats.is_empty() {
        println!(
            "{}",
            ui::style_text("No provider calls recorded today", ui::StyleType::Subtle)
        );
        return Ok(());
    }
    println!("{}", display_as_table(&stats));
    Ok(())
}
