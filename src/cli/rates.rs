use super::ui;
use crate::core::currency::RatesMap;
use crate::market::MarketDataEngine;
use anyhow::Result;
use comfy_table::Cell;

fn display_as_table(base: &str, rates: &RatesMap) -> String {
    let mut sorted: Vec<_> = rates.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Currency"),
        ui::header_cell(&format!("Per 1 {base}")),
    ]);
    for (currency, rate) in sorted {
        table.add_row(vec![
            Cell::new(currency),
            ui::number_cell(format!("{rate:.4}")),
        ]);
    }
    table.to_string()
}

pub async fn run(engine: &MarketDataEngine) -> Result<()> {
    let pb = ui::new_spinner("Loading exchange rates...");
    let rates = engine.get_exchange_rates().await;
    pb.finish_and_clear();

    println!("{}", display_as_table(engine.base_currency(), &rates));
    Ok(())
}
