//! Upstox response payloads.
//!
//! Only the fields this crate consumes are modelled; unknown fields are ignored so additive
//! upstream schema changes do not break deserialisation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Standard `{"status": "success", "data": ...}` response envelope. A body without `data` is
/// rejected as malformed.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: Option<String>,
    pub data: T,
}

/// Market quote for one instrument.
///
/// See docs: <https://upstox.com/developer/api-documentation/v3/get-market-quote-ltp>
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct QuoteData {
    #[serde(default)]
    pub last_price: Option<f64>,
    #[serde(default)]
    pub instrument_token: Option<String>,
    #[serde(default)]
    pub volume: Option<f64>,
}

/// Quote responses keyed by instrument.
pub type QuoteMap = HashMap<String, QuoteData>;

/// Intraday candle response body.
#[derive(Clone, PartialEq, Debug, Default, Deserialize)]
pub struct CandleData {
    #[serde(default)]
    pub candles: Vec<RawCandle>,
}

/// Upstox candle row, newest first in the response.
///
/// See docs: <https://upstox.com/developer/api-documentation/v3/get-intra-day-candle-data>
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct RawCandle(
    pub String, // 0: Timestamp, eg/ "2025-01-07T09:15:00+05:30"
    pub f64,    // 1: Open
    pub f64,    // 2: High
    pub f64,    // 3: Low
    pub f64,    // 4: Close
    pub f64,    // 5: Volume
    pub f64,    // 6: Open interest
);

/// Option chain as returned by the endpoint: either a list of strikes or an object keyed by an
/// arbitrary id. Resolved to a flat list at the client boundary.
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(untagged)]
pub enum OptionChainPayload {
    List(Vec<OptionChainEntry>),
    Map(HashMap<String, OptionChainEntry>),
}

impl OptionChainPayload {
    pub fn into_entries(self) -> Vec<OptionChainEntry> {
        match self {
            OptionChainPayload::List(entries) => entries,
            OptionChainPayload::Map(entries) => entries.into_values().collect(),
        }
    }
}

/// One strike of the option chain.
///
/// See docs: <https://upstox.com/developer/api-documentation/get-pc-option-chain>
#[derive(Clone, PartialEq, Debug, Default, Deserialize)]
pub struct OptionChainEntry {
    #[serde(default)]
    pub strike_price: Option<f64>,
    #[serde(default)]
    pub call_options: Option<OptionLeg>,
    #[serde(default)]
    pub put_options: Option<OptionLeg>,
}

/// Call or put side of a strike. Fields are read flat when present, otherwise from the nested
/// `market_data` block.
#[derive(Clone, PartialEq, Debug, Default, Deserialize)]
pub struct OptionLeg {
    #[serde(default)]
    pub open_interest: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub last_price: Option<f64>,
    #[serde(default)]
    pub market_data: Option<LegMarketData>,
}

#[derive(Clone, PartialEq, Debug, Default, Deserialize)]
pub struct LegMarketData {
    #[serde(default)]
    pub oi: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub ltp: Option<f64>,
}

impl OptionLeg {
    pub fn open_interest(&self) -> f64 {
        self.open_interest
            .or_else(|| self.market_data.as_ref().and_then(|data| data.oi))
            .unwrap_or(0.0)
    }

    pub fn volume(&self) -> f64 {
        self.volume
            .or_else(|| self.market_data.as_ref().and_then(|data| data.volume))
            .unwrap_or(0.0)
    }

    pub fn last_price(&self) -> f64 {
        self.last_price
            .or_else(|| self.market_data.as_ref().and_then(|data| data.ltp))
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_chain_payload_list_and_map() {
        struct TestCase {
            input: &'static str,
            expected_strikes: Vec<f64>,
        }

        let tests = vec![
            // TC0: list-shaped payload
            TestCase {
                input: r#"
                    [
                        {"strike_price": 24150.0, "call_options": {"open_interest": 10}},
                        {"strike_price": 24200.0, "put_options": {"open_interest": 20}}
                    ]
                "#,
                expected_strikes: vec![24150.0, 24200.0],
            },
            // TC1: map-shaped payload
            TestCase {
                input: r#"
                    {
                        "a": {"strike_price": 24150.0},
                        "b": {"strike_price": 24200.0}
                    }
                "#,
                expected_strikes: vec![24150.0, 24200.0],
            },
            // TC2: empty list
            TestCase {
                input: "[]",
                expected_strikes: vec![],
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let payload = serde_json::from_str::<OptionChainPayload>(test.input)
                .unwrap_or_else(|error| panic!("TC{index} failed to deserialise: {error}"));
            let mut strikes = payload
                .into_entries()
                .into_iter()
                .filter_map(|entry| entry.strike_price)
                .collect::<Vec<_>>();
            strikes.sort_by(f64::total_cmp);
            assert_eq!(strikes, test.expected_strikes, "TC{} failed", index);
        }
    }

    #[test]
    fn test_option_leg_reads_flat_then_nested() {
        let leg = serde_json::from_str::<OptionLeg>(
            r#"{"open_interest": 1500, "market_data": {"oi": 99, "volume": 42, "ltp": 101.5}}"#,
        )
        .unwrap();

        assert_eq!(leg.open_interest(), 1500.0);
        assert_eq!(leg.volume(), 42.0);
        assert_eq!(leg.last_price(), 101.5);
        assert_eq!(OptionLeg::default().open_interest(), 0.0);
    }

    #[test]
    fn test_envelope_requires_data() {
        let result = serde_json::from_str::<Envelope<CandleData>>(r#"{"status": "success"}"#);
        assert!(result.is_err());

        let envelope = serde_json::from_str::<Envelope<CandleData>>(
            r#"{"status": "success", "data": {"candles": [["2025-01-07T09:15:00+05:30", 24200.0, 24210.5, 24195.0, 24205.0, 1200, 98000]]}}"#,
        )
        .unwrap();
        assert_eq!(envelope.data.candles.len(), 1);
        assert_eq!(envelope.data.candles[0].2, 24210.5);
    }
}
