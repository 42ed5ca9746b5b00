//! Currency inference and conversion helpers.

use std::collections::HashMap;
use tracing::warn;

/// Currency code to rate relative to the base currency (base is always 1).
pub type RatesMap = HashMap<String, f64>;

/// Used when neither the symbol nor the provider names a currency.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Exchange suffixes and the currency their listings trade in. Checked in order.
const SUFFIX_RULES: &[(&[&str], &str)] = &[
    (
        &[".AS", ".DE", ".PA", ".MI", ".MC", ".BR", ".VI", ".MA", ".IR"],
        "EUR",
    ),
    (&[".L"], "GBP"),
    (&[".TO", ".V", ".CN", ".NE"], "CAD"),
    (&[".AX"], "AUD"),
    (&[".HK"], "HKD"),
    (&[".T"], "JPY"),
    (&[".SI"], "SGD"),
    (&[".SW"], "CHF"),
    (&[".JO"], "ZAR"),
    (&[".IS"], "TRY"),
];

/// Infers the trading currency from an exchange-qualified symbol.
///
/// Returns `None` when no suffix rule matches, meaning the provider-reported
/// currency should be used instead.
pub fn detect_currency(symbol: &str) -> Option<&'static str> {
    let upper = symbol.trim().to_uppercase();
    if upper.is_empty() {
        return None;
    }
    SUFFIX_RULES
        .iter()
        .find(|(suffixes, _)| suffixes.iter().any(|s| upper.ends_with(s)))
        .map(|(_, currency)| *currency)
}

/// Picks the currency for a quote: suffix rule first, then the provider's
/// claim, then [`DEFAULT_CURRENCY`].
pub fn normalize_currency(symbol: &str, provider_currency: Option<&str>) -> String {
    detect_currency(symbol)
        .map(str::to_string)
        .or_else(|| {
            provider_currency
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_uppercase)
        })
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

/// Rate that converts an amount in `from` into `to`.
///
/// A currency missing from `rates` yields 1 so a display never breaks on an
/// unknown code.
pub fn get_rate(from: &str, to: &str, rates: &RatesMap) -> f64 {
    if from == to {
        return 1.0;
    }
    match (rates.get(from), rates.get(to)) {
        (Some(from_rate), Some(to_rate)) if *from_rate > 0.0 => to_rate / from_rate,
        _ => {
            warn!(from, to, "No exchange rate available, using 1:1");
            1.0
        }
    }
}

pub fn convert_currency(amount: f64, from: &str, to: &str, rates: &RatesMap) -> f64 {
    amount * get_rate(from, to, rates)
}
