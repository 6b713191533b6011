use crate::{
    client::transport::{HttpTransport, ReqwestTransport},
    fetcher::DataFetcher,
    market::MarketPhase,
    model::{OiChange, OiTotals},
    store::SnapshotStore,
    validate::{DEFAULT_MIN_STRIKES, validate_strike_data},
};
use futures::future::join_all;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::{debug, info, warn};

/// Outcome of one poll cycle, handed to the strategy layer.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct CycleReport {
    pub spot: f64,
    pub atm_strike: Option<i64>,
    pub futures_candles: usize,
    pub strikes_saved: usize,
    pub totals: Option<OiTotals>,
    /// True once the configured warm-up history exists
    pub warmed_up: bool,
    /// Change-queries are only answered once the store holds that much history
    pub change_5m: Option<OiChange>,
    pub change_10m: Option<OiChange>,
    pub change_15m: Option<OiChange>,
}

/// Drives one fetch-and-record cycle per tick, gated by the market phase.
pub struct Poller<Transport = ReqwestTransport> {
    fetcher: DataFetcher<Transport>,
    store: Arc<SnapshotStore>,
    warmup_minutes: u32,
    premarket_loaded: AtomicBool,
}

impl<Transport> std::fmt::Debug for Poller<Transport> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("fetcher", &self.fetcher)
            .field("store", &self.store)
            .field("warmup_minutes", &self.warmup_minutes)
            .finish_non_exhaustive()
    }
}

impl<Transport> Poller<Transport>
where
    Transport: HttpTransport,
{
    pub fn new(
        fetcher: DataFetcher<Transport>,
        store: Arc<SnapshotStore>,
        warmup_minutes: u32,
    ) -> Self {
        Self {
            fetcher,
            store,
            warmup_minutes,
            premarket_loaded: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn fetcher(&self) -> &DataFetcher<Transport> {
        &self.fetcher
    }

    /// Act on the current market phase. Returns a report only when a cycle ran and produced
    /// a spot price.
    pub async fn tick(&self, phase: MarketPhase) -> Option<CycleReport> {
        match phase {
            MarketPhase::Premarket => {
                if !self.premarket_loaded.swap(true, Ordering::Relaxed) {
                    info!(
                        backend = self.store.backend_name(),
                        "premarket: loading previous session data"
                    );
                }
                None
            }
            MarketPhase::Warmup | MarketPhase::Open => self.run_cycle().await,
            MarketPhase::Closed => {
                debug!("market closed, idle");
                None
            }
        }
    }

    /// Fetch spot, then futures and the option chain concurrently, and record open interest.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        let Some(spot) = self.fetcher.fetch_spot().await else {
            warn!("no spot price this cycle");
            return None;
        };

        let (candles, chain) = tokio::join!(
            self.fetcher.fetch_futures(),
            self.fetcher.fetch_option_chain(spot)
        );

        let mut report = CycleReport {
            spot,
            warmed_up: self.store.is_warmed_up(self.warmup_minutes),
            ..Default::default()
        };

        if let Some(series) = &candles {
            report.futures_candles = series.len();
        }

        // Thin or inconsistent windows are never recorded
        let chain = chain.filter(|window| {
            let valid = validate_strike_data(
                window,
                self.fetcher.config().strike_gap,
                DEFAULT_MIN_STRIKES,
            );
            if !valid {
                warn!(
                    strikes = window.len(),
                    atm_strike = window.atm_strike,
                    "option chain window failed validation, skipping save"
                );
            }
            valid
        });

        if let Some(window) = chain {
            let totals = window.totals();
            self.store.save_totals(totals.call_oi, totals.put_oi).await;
            join_all(
                window
                    .strikes
                    .iter()
                    .map(|(strike, snapshot)| self.store.save_strike(*strike, snapshot)),
            )
            .await;

            report.atm_strike = Some(window.atm_strike);
            report.strikes_saved = window.len();
            report.totals = Some(totals);
            report.change_5m = self.totals_change(totals, 5).await;
            report.change_10m = self.totals_change(totals, 10).await;
            report.change_15m = self.totals_change(totals, 15).await;
        }

        info!(
            spot,
            atm_strike = ?report.atm_strike,
            futures_candles = report.futures_candles,
            strikes_saved = report.strikes_saved,
            warmed_up = report.warmed_up,
            change_15m = ?report.change_15m,
            "poll cycle complete"
        );

        Some(report)
    }

    async fn totals_change(&self, totals: OiTotals, minutes: u32) -> Option<OiChange> {
        if !self.store.is_warmed_up(minutes) {
            return None;
        }
        Some(
            self.store
                .get_totals_change(totals.call_oi, totals.put_oi, minutes)
                .await,
        )
    }
}
