use crate::types::point::{FieldValue, MetricsPoint};
use crate::types::price::PriceTable;

/// Hashrate-per-power efficiency in kH per W.
/// Formula: `hashrate / power * 1000`, defined only for `power > 0` —
/// callers get `None` instead of a division error and omit the field.
pub fn efficiency(hashrate: f64, power: f64) -> Option<f64> {
    if power > 0.0 {
        Some(hashrate / power * 1000.0)
    } else {
        None
    }
}

/// Projected monthly power cost for a constant draw.
/// Formula: `power_watts / 1000 * price_per_kwh * 24 * 30`, with the kW
/// division last so round figures stay round (2000 W at 0.15 is exactly
/// 216.0, not 215.99999999999997).
pub fn monthly_power_cost(power_watts: f64, price_per_kwh: f64) -> f64 {
    power_watts * price_per_kwh * 24.0 * 30.0 / 1000.0
}

/// Mean of the recorded power prices. `None` on an empty sequence —
/// callers must not report an average over zero farms.
pub fn average_power_price(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    Some(prices.iter().sum::<f64>() / prices.len() as f64)
}

/// Shared total-payments aggregate used by every pool source: the summed
/// amounts, their count, and the sum converted through each price-table
/// currency. Nothing is emitted when the total is not positive.
pub fn total_payments_point(amounts: &[f64], prices: &PriceTable) -> Option<MetricsPoint> {
    let total: f64 = amounts.iter().sum();
    if total <= 0.0 {
        return None;
    }

    let mut point = MetricsPoint::new("agg_payments")
        .field("amount", FieldValue::Float(total))
        .field("count", FieldValue::Integer(amounts.len() as i64));
    for (currency, unit_price) in prices.iter() {
        point = point.field(currency.clone(), FieldValue::Float(total * unit_price));
    }
    Some(point)
}
