//! Exact scaling of integer subunit amounts (satoshis) to coins.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Number of decimal places between a subunit and one coin (10^8).
pub const SUBUNIT_SCALE: u32 = 8;

/// Converts an integer subunit amount to coins without binary rounding.
pub fn subunits_to_coins(subunits: i64) -> Decimal {
    Decimal::new(subunits, SUBUNIT_SCALE)
}

/// Gauge value for a coin amount. Gauges are `f64`; the conversion happens
/// once, from the exact decimal, so the result is the nearest double.
pub fn coins_to_gauge(coins: Decimal) -> f64 {
    coins.to_f64().unwrap_or(f64::NAN)
}
