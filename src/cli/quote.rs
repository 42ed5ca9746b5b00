use super::ui;
use crate::core::price::{AssetType, PriceResult};
use crate::market::MarketDataEngine;
use anyhow::Result;
use comfy_table::Cell;

fn display_as_table(symbol: &str, price: &PriceResult) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Price"),
        ui::header_cell("Change"),
        ui::header_cell("Change (%)"),
    ]);
    table.add_row(vec![
        Cell::new(price.name.as_deref().unwrap_or(symbol)),
        ui::number_cell(format!("{:.4} {}", price.price, price.currency)),
        ui::signed_cell(price.change_24h, format!("{:+.4}", price.change_24h)),
        ui::change_cell(price.change_percent),
    ]);
    table.to_string()
}

pub async fn run(
    engine: &MarketDataEngine,
    symbol: &str,
    asset_type: AssetType,
    exchange: Option<&str>,
) -> Result<()> {
    let pb = ui::new_spinner(&format!("Resolving {symbol}..."));
    let price = engine.get_market_price(symbol, asset_type, exchange).await;
    pb.finish_and_clear();

    match price? {
        Some(price) => println!("{}", display_as_table(symbol, &price)),
        None => println!(
            "{}",
            ui::style_text(
                &format!("No price available for {symbol}"),
                ui::StyleType::Error
            )
        ),
    }
    Ok(())
}
