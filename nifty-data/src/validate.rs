//! Sanity checks applied to aggregated data before the strategy layer consumes it.

use crate::model::{CandleSeries, OptionChainWindow};
use tracing::warn;

/// Range outside of which a NIFTY print is suspicious but still accepted.
const NORMAL_PRICE_RANGE: (f64, f64) = (10_000.0, 50_000.0);

pub const DEFAULT_MIN_STRIKES: usize = 3;
pub const DEFAULT_MIN_CANDLES: usize = 10;

/// Reject non-finite or non-positive prices; warn on prices outside the normal range.
pub fn validate_price(price: f64, name: &str) -> bool {
    if !price.is_finite() || price <= 0.0 {
        return false;
    }

    if price < NORMAL_PRICE_RANGE.0 || price > NORMAL_PRICE_RANGE.1 {
        warn!(%name, price, "price outside normal range");
    }

    true
}

/// At least `min_strikes` strikes, each a multiple of `strike_gap` and keyed consistently.
pub fn validate_strike_data(window: &OptionChainWindow, strike_gap: i64, min_strikes: usize) -> bool {
    if window.len() < min_strikes {
        return false;
    }

    window
        .strikes
        .iter()
        .all(|(strike, snapshot)| strike % strike_gap == 0 && snapshot.strike == *strike)
}

/// At least `min_candles` candles with `high >= low` on every row.
pub fn validate_candle_data(series: &CandleSeries, min_candles: usize) -> bool {
    series.len() >= min_candles && series.candles().iter().all(|candle| candle.high >= candle.low)
}
