use super::ui;
use crate::market::MarketDataEngine;
use crate::market::valuation::{PortfolioMetrics, PriceSource};
use anyhow::{Context, Result};
use comfy_table::Cell;

impl PortfolioMetrics {
    pub fn display_as_table(&self) -> String {
        let base = &self.base_currency;
        let mut table = ui::new_styled_table();

        table.set_header(vec![
            ui::header_cell("Asset"),
            ui::header_cell("Type"),
            ui::header_cell("Quantity"),
            ui::header_cell("Price"),
            ui::header_cell(&format!("Value ({base})")),
            ui::header_cell("P/L"),
            ui::header_cell(&format!("Day ({base})")),
            ui::header_cell("Weight (%)"),
        ]);

        for asset in &self.per_asset_values {
            let name_display = match &asset.name {
                Some(name) if name != &asset.symbol => format!("{} ({})", name, asset.symbol),
                _ => asset.symbol.clone(),
            };
            let price_text = format!("{:.2} {}", asset.current_price, asset.currency);
            let price = match asset.price_source {
                PriceSource::Market => ui::number_cell(price_text),
                PriceSource::CostBasis => ui::fallback_cell(price_text),
            };

            table.add_row(vec![
                Cell::new(name_display),
                Cell::new(asset.asset_type.to_string()),
                ui::number_cell(format!("{:.4}", asset.quantity)),
                price,
                ui::number_cell(format!("{:.2}", asset.total_value_in_base)),
                ui::change_cell(asset.pl_percent),
                ui::signed_cell(
                    asset.daily_change_in_base,
                    format!("{:+.2}", asset.daily_change_in_base),
                ),
                ui::number_cell(format!("{:.2}%", asset.weight_percent)),
            ]);
        }

        let mut output = format!(
            "{}\n\n",
            ui::style_text("Portfolio valuation", ui::StyleType::Title)
        );
        output.push_str(&table.to_string());

        output.push_str(&format!(
            "\n\nTotal Value ({}): {}",
            ui::style_text(base, ui::StyleType::TotalLabel),
            ui::style_text(
                &format!("{:.2}", self.total_value_in_base),
                ui::StyleType::TotalValue
            )
        ));
        let pl_style = if self.total_pl_percent >= 0.0 {
            ui::StyleType::TotalValue
        } else {
            ui::StyleType::Error
        };
        output.push_str(&format!(
            "\nP/L: {}   Today: {}",
            ui::style_text(&format!("{:.2}%", self.total_pl_percent), pl_style),
            ui::style_text(
                &format!("{:+.2} {}", self.daily_change_in_base, base),
                ui::StyleType::Subtle
            )
        ));

        let fallbacks = self
            .per_asset_values
            .iter()
            .filter(|a| a.price_source == PriceSource::CostBasis)
            .count();
        if fallbacks > 0 {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    &format!("{fallbacks} asset(s) shown at cost basis, no market price available"),
                    ui::StyleType::Subtle
                )
            ));
        }
        output
    }
}

pub async fn run(engine: &MarketDataEngine) -> Result<()> {
    let positions = engine
        .tracked_positions()
        .await
        .context("Failed to load positions")?;
    if positions.is_empty() {
        println!("No positions configured.");
        return Ok(());
    }

    let pb = ui::new_spinner("Resolving prices...");
    let metrics = engine.get_portfolio_metrics(&positions, None).await;
    pb.finish_and_clear();

    println!("{}", metrics?.display_as_table());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::price::AssetType;
    use crate::market::valuation::ResolvedAssetValue;

    fn asset(symbol: &str, source: PriceSource) -> ResolvedAssetValue {
        ResolvedAssetValue {
            id: symbol.to_string(),
            symbol: symbol.to_string(),
            name: Some("Vodafone Group".to_string()),
            asset_type: AssetType::Stock,
            quantity: 100.0,
            buy_price: 60.0,
            current_price: 72.0,
            currency: "GBP".to_string(),
            price_source: source,
            total_value_native: 7200.0,
            total_value_in_base: 9000.0,
            cost_basis_in_base: 7500.0,
            pl_percent: 20.0,
            daily_change_in_base: 250.0,
            daily_change_percent: 2.86,
            weight_percent: 100.0,
            rank: 0,
        }
    }

    #[test]
    fn test_display_as_table() {
        let metrics = PortfolioMetrics {
            base_currency: "EUR".to_string(),
            total_value_in_base: 9000.0,
            total_cost_in_base: 7500.0,
            total_pl_percent: 20.0,
            daily_change_in_base: 250.0,
            per_asset_values: vec![asset("VOD.L", PriceSource::Market)],
        };
        let output = console::strip_ansi_codes(&metrics.display_as_table()).to_string();
        assert!(output.contains("Vodafone Group (VOD.L)"));
        assert!(output.contains("72.00 GBP"));
        assert!(output.contains("9000.00"));
        assert!(output.contains("Total Value (EUR): 9000.00"));
        assert!(!output.contains("cost basis"));
    }

    #[test]
    fn test_cost_basis_rows_are_flagged() {
        let metrics = PortfolioMetrics {
            base_currency: "EUR".to_string(),
            total_value_in_base: 9000.0,
            total_cost_in_base: 7500.0,
            total_pl_percent: 20.0,
            daily_change_in_base: 0.0,
            per_asset_values: vec![asset("VOD.L", PriceSource::CostBasis)],
        };
        let output = console::strip_ansi_codes(&metrics.display_as_table()).to_string();
        assert!(output.contains("1 asset(s) shown at cost basis"));
    }
}
