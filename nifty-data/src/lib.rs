#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! # Nifty-Data
//! Data-acquisition layer of an intraday NIFTY options-signal bot.
//!
//! It polls the Upstox market-data gateway for the index spot price, the current futures
//! contract's intraday candles and the weekly option chain, and keeps a short rolling memory of
//! open-interest snapshots so callers can ask how open interest changed over the last N minutes.
//!
//! ## Components
//! * [`client::UpstoxClient`]: rate-limited, retrying accessor over the quote, intraday candle
//!   and option-chain endpoints.
//! * [`store::SnapshotStore`]: minute-bucketed snapshot memory over Redis with an in-process
//!   fallback, answering tolerant "N minutes ago" change queries.
//! * [`fetcher::DataFetcher`]: reshapes gateway payloads into validated
//!   [`model::CandleSeries`] and [`model::OptionChainWindow`] values.
//! * [`market::MarketClock`]: maps IST wall-clock time to a [`market::MarketPhase`].
//! * [`poller::Poller`]: one fetch-and-record cycle per tick, gated by the market phase.
//!
//! Every fetch has an explicit "no data this cycle" outcome. Only configuration errors are fatal.

/// Authenticated Upstox gateway client with rate limiting and retry/backoff.
pub mod client;

/// Per-component configuration and the environment loader.
pub mod config;

/// All [`Error`](std::error::Error)s generated in Nifty-Data.
pub mod error;

/// Aggregation of gateway payloads into domain snapshots.
pub mod fetcher;

/// Instrument keys, weekly expiry resolution and strike arithmetic.
pub mod instrument;

/// Market phases and trading-hour predicates in India Standard Time.
pub mod market;

/// Domain snapshots: open-interest totals, strike snapshots, candle series and change results.
pub mod model;

/// Market-phase gated poll cycle.
pub mod poller;

/// Time-windowed open-interest snapshot memory.
pub mod store;

/// Injectable wall clock and IST helpers.
pub mod time;

/// Sanity checks on prices, strike windows and candle series.
pub mod validate;

pub use client::UpstoxClient;
pub use config::BotConfig;
pub use fetcher::DataFetcher;
pub use market::{MarketClock, MarketPhase};
pub use poller::{CycleReport, Poller};
pub use store::SnapshotStore;
