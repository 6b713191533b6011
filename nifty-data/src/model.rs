use crate::error::DataError;
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate call/put open interest recorded for one minute bucket.
///
/// Serialised as `{"ce": .., "pe": ..}` so persisted snapshots stay readable across restarts.
#[derive(Clone, Copy, PartialEq, Debug, Constructor, Deserialize, Serialize)]
pub struct OiTotals {
    #[serde(rename = "ce")]
    pub call_oi: f64,
    #[serde(rename = "pe")]
    pub put_oi: f64,
}

/// Normalised per-strike option-chain reading.
#[derive(Clone, Copy, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct StrikeSnapshot {
    pub strike: i64,
    /// Minute-truncated time the snapshot was taken.
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "ce_oi")]
    pub call_oi: f64,
    #[serde(rename = "pe_oi")]
    pub put_oi: f64,
    #[serde(rename = "ce_vol")]
    pub call_volume: f64,
    #[serde(rename = "pe_vol")]
    pub put_volume: f64,
    #[serde(rename = "ce_ltp")]
    pub call_ltp: f64,
    #[serde(rename = "pe_ltp")]
    pub put_ltp: f64,
}

/// Option-chain strikes inside a symmetric band around the ATM strike.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct OptionChainWindow {
    pub atm_strike: i64,
    pub strikes: BTreeMap<i64, StrikeSnapshot>,
}

impl OptionChainWindow {
    /// Summed call/put open interest across every strike in the window.
    pub fn totals(&self) -> OiTotals {
        self.strikes
            .values()
            .fold(OiTotals::new(0.0, 0.0), |acc, snapshot| OiTotals {
                call_oi: acc.call_oi + snapshot.call_oi,
                put_oi: acc.put_oi + snapshot.put_oi,
            })
    }

    pub fn atm(&self) -> Option<&StrikeSnapshot> {
        self.strikes.get(&self.atm_strike)
    }

    pub fn len(&self) -> usize {
        self.strikes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty()
    }
}

/// One futures OHLCV candle.
#[derive(Clone, Copy, PartialEq, Debug, Deserialize, Serialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub oi: f64,
}

/// Candles with strictly increasing timestamps and `high >= low` on every row.
#[derive(Clone, PartialEq, Debug, Default, Serialize)]
pub struct CandleSeries(Vec<Candle>);

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self, DataError> {
        if let Some(candle) = candles.iter().find(|candle| candle.high < candle.low) {
            return Err(DataError::Validation(format!(
                "candle at {} has high {} below low {}",
                candle.timestamp, candle.high, candle.low
            )));
        }

        if let Some(pair) = candles
            .windows(2)
            .find(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(DataError::Validation(format!(
                "candle timestamps not strictly increasing: {} followed by {}",
                pair[0].timestamp, pair[1].timestamp
            )));
        }

        Ok(Self(candles))
    }

    pub fn candles(&self) -> &[Candle] {
        &self.0
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<Candle> {
        self.0
    }
}

/// Percentage change of call/put open interest against a past snapshot.
///
/// `found == false` means no snapshot existed for the requested minute; both percentages are
/// then `0.0` and must not be read as "unchanged".
#[derive(Clone, Copy, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct OiChange {
    pub call_pct: f64,
    pub put_pct: f64,
    pub found: bool,
}

impl OiChange {
    pub const NOT_FOUND: Self = Self {
        call_pct: 0.0,
        put_pct: 0.0,
        found: false,
    };

    /// Change from `(past_call, past_put)` to `(current_call, current_put)`. A non-positive past
    /// value reports `0.0` for that side.
    pub fn between(current: (f64, f64), past: (f64, f64)) -> Self {
        Self {
            call_pct: pct_change(current.0, past.0),
            put_pct: pct_change(current.1, past.1),
            found: true,
        }
    }
}

fn pct_change(current: f64, past: f64) -> f64 {
    if past > 0.0 {
        (current - past) / past * 100.0
    } else {
        0.0
    }
}

/// Snapshot-store health figures used to observe warm-up and repeated absences.
#[derive(Clone, Copy, PartialEq, Debug, Deserialize, Serialize)]
pub struct StoreStats {
    pub snapshot_count: u64,
    pub elapsed_minutes: f64,
    pub warmed_up_5m: bool,
    pub warmed_up_10m: bool,
    pub warmed_up_15m: bool,
}
