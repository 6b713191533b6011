//! Data aggregator: turns gateway responses into validated domain snapshots.
//!
//! Every operation returns `None` for "no data this cycle" after logging why. Nothing here
//! propagates an error to the poll loop.

use crate::{
    client::{
        UpstoxClient,
        payload::{OptionChainEntry, RawCandle},
        transport::{HttpTransport, ReqwestTransport},
    },
    config::FetcherConfig,
    error::DataError,
    instrument::{
        calculate_atm_strike, format_expiry, futures_instrument_key, get_strike_range,
        next_weekly_expiry,
    },
    model::{Candle, CandleSeries, OptionChainWindow, StrikeSnapshot},
    time::{Clock, truncate_to_minute},
    validate::validate_price,
};
use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error, warn};

pub struct DataFetcher<Transport = ReqwestTransport> {
    client: Arc<UpstoxClient<Transport>>,
    config: FetcherConfig,
    clock: Arc<dyn Clock>,
}

impl<Transport> std::fmt::Debug for DataFetcher<Transport> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFetcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<Transport> DataFetcher<Transport>
where
    Transport: HttpTransport,
{
    pub fn new(
        client: Arc<UpstoxClient<Transport>>,
        config: FetcherConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Last traded price of the index.
    pub async fn fetch_spot(&self) -> Option<f64> {
        let quote = self
            .client
            .get_quote(&self.config.spot_key)
            .await
            .inspect_err(|error| warn!(key = %self.config.spot_key, %error, "spot fetch failed"))
            .ok()?;

        let Some(price) = quote.last_price else {
            error!(key = %self.config.spot_key, "spot quote has no last_price");
            return None;
        };

        if !validate_price(price, "spot") {
            error!(key = %self.config.spot_key, price, "rejecting invalid spot price");
            return None;
        }

        Some(price)
    }

    /// Today's intraday candles of the current futures contract, oldest first.
    pub async fn fetch_futures(&self) -> Option<CandleSeries> {
        let today = self.clock.now_ist().date_naive();
        let key = futures_instrument_key(
            &self.config.futures_segment,
            &self.config.futures_prefix,
            today,
            self.config.expiry_weekday,
        );

        let data = self
            .client
            .get_candles(&key, &self.config.candle_interval)
            .await
            .inspect_err(|error| warn!(%key, %error, "futures fetch failed"))
            .ok()?;

        if data.candles.is_empty() {
            debug!(%key, "no futures candles yet");
            return None;
        }

        parse_candles(data.candles)
            .inspect_err(|error| error!(%key, %error, "rejecting futures candles"))
            .ok()
    }

    /// Option chain for the next weekly expiry, restricted to the strike window around the
    /// ATM strike derived from `spot_price`.
    pub async fn fetch_option_chain(&self, spot_price: f64) -> Option<OptionChainWindow> {
        if !spot_price.is_finite() || spot_price <= 0.0 {
            error!(spot_price, "cannot derive ATM strike from invalid spot");
            return None;
        }

        let now = self.clock.now_ist();
        let expiry = format_expiry(next_weekly_expiry(
            now.date_naive(),
            self.config.expiry_weekday,
        ));

        let strike_gap = self.config.strike_gap;
        let Some((atm_strike, range)) = calculate_atm_strike(spot_price, strike_gap)
            .and_then(|atm| {
                get_strike_range(atm, self.config.strike_window, strike_gap)
                    .map(|range| (atm, range))
            })
        else {
            error!(
                spot_price,
                strike_gap,
                strike_window = self.config.strike_window,
                "strike window out of range"
            );
            return None;
        };

        let entries = self
            .client
            .get_option_chain(&self.config.index_key, &expiry)
            .await
            .inspect_err(|error| warn!(%expiry, %error, "option chain fetch failed"))
            .ok()?;

        let window = build_window(
            entries,
            atm_strike,
            range,
            self.config.strike_gap,
            truncate_to_minute(now).to_utc(),
        );

        if window.is_empty() {
            warn!(
                %expiry,
                atm_strike,
                min_strike = range.0,
                max_strike = range.1,
                "option chain has no strikes inside the window"
            );
            return None;
        }

        debug!(%expiry, atm_strike, strikes = window.len(), "option chain window built");
        Some(window)
    }
}

/// Parse upstream candle rows into an ascending, validated series.
///
/// Rows arrive newest first and are only reversed, never re-sorted, so rows out of order
/// upstream still fail validation.
fn parse_candles(rows: Vec<RawCandle>) -> Result<CandleSeries, DataError> {
    let candles = rows
        .into_iter()
        .rev()
        .map(parse_candle)
        .collect::<Result<Vec<_>, _>>()?;

    CandleSeries::new(candles)
}

fn parse_candle(
    RawCandle(timestamp, open, high, low, close, volume, oi): RawCandle,
) -> Result<Candle, DataError> {
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|error| DataError::Malformed(format!("candle timestamp {timestamp:?}: {error}")))?
        .to_utc();

    Ok(Candle {
        timestamp,
        open,
        high,
        low,
        close,
        volume,
        oi,
    })
}

/// Reshape chain entries into strike snapshots inside the inclusive `range`.
fn build_window(
    entries: Vec<OptionChainEntry>,
    atm_strike: i64,
    (min_strike, max_strike): (i64, i64),
    strike_gap: i64,
    timestamp: DateTime<Utc>,
) -> OptionChainWindow {
    let mut strikes = BTreeMap::new();

    for entry in entries {
        let Some(price) = entry.strike_price.filter(|price| price.is_finite()) else {
            continue;
        };

        if price.fract() != 0.0 {
            debug!(price, "skipping fractional strike");
            continue;
        }

        let strike = price as i64;
        if strike < min_strike || strike > max_strike {
            continue;
        }

        if strike % strike_gap != 0 {
            debug!(strike, strike_gap, "skipping strike off the strike grid");
            continue;
        }

        let call = entry.call_options.unwrap_or_default();
        let put = entry.put_options.unwrap_or_default();

        strikes.insert(
            strike,
            StrikeSnapshot {
                strike,
                timestamp: Some(timestamp),
                call_oi: call.open_interest(),
                put_oi: put.open_interest(),
                call_volume: call.volume(),
                put_volume: put.volume(),
                call_ltp: call.last_price(),
                put_ltp: put.last_price(),
            },
        );
    }

    OptionChainWindow {
        atm_strike,
        strikes,
    }
}
