//! Time-windowed memory of open-interest snapshots.
//!
//! Snapshots are keyed by metric, optional strike and IST minute. Writes and reads go to the
//! persistent backend when one was reachable at construction, and fall back per operation to
//! the in-process [`MemoryBackend`] when it errors. The store is a best-effort cache: no
//! reconciliation between the two backends is attempted.

use crate::{
    config::StoreConfig,
    error::BackendError,
    model::{OiChange, OiTotals, StoreStats, StrikeSnapshot},
    time::{Clock, truncate_to_minute},
};
use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tracing::{debug, error, info, warn};

pub mod backend;
pub mod key;
pub mod memory;

use backend::{PersistentBackend, RedisBackend};
use key::SnapshotKeys;
use memory::MemoryBackend;

/// Minute offsets probed, in order, when the exact strike snapshot is missing.
pub const TOLERANCE_OFFSETS: [i64; 6] = [-1, 1, -2, 2, -3, 3];

pub struct SnapshotStore {
    config: StoreConfig,
    keys: SnapshotKeys,
    clock: Arc<dyn Clock>,
    persistent: Option<Arc<dyn PersistentBackend>>,
    memory: MemoryBackend,
    snapshot_count: AtomicU64,
    started_at: DateTime<chrono::Utc>,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("namespace", &self.config.namespace)
            .field("backend", &self.backend_name())
            .field("snapshot_count", &self.snapshot_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SnapshotStore {
    /// Connect to the configured backend URL, falling back to in-process memory when it is
    /// absent or unreachable.
    pub async fn connect(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        let persistent = match config.backend_url.as_deref() {
            Some(url) => match RedisBackend::connect(url, RedisBackend::DEFAULT_OP_TIMEOUT).await {
                Ok(backend) => Some(Arc::new(backend) as Arc<dyn PersistentBackend>),
                Err(error) => {
                    warn!(%error, "redis unavailable, using in-process memory");
                    None
                }
            },
            None => {
                info!("no backend configured, using in-process memory");
                None
            }
        };

        Self::with_backend(config, clock, persistent).await
    }

    /// Use `persistent` if its health probe succeeds, otherwise in-process memory only.
    pub async fn with_backend(
        config: StoreConfig,
        clock: Arc<dyn Clock>,
        persistent: Option<Arc<dyn PersistentBackend>>,
    ) -> Self {
        let persistent = match persistent {
            Some(backend) => match backend.ping().await {
                Ok(()) => {
                    info!(backend = backend.name(), "snapshot backend healthy");
                    Some(backend)
                }
                Err(error) => {
                    warn!(
                        backend = backend.name(),
                        %error,
                        "snapshot backend failed health probe, using in-process memory"
                    );
                    None
                }
            },
            None => None,
        };

        Self::build(config, clock, persistent)
    }

    /// In-process memory only.
    pub fn in_memory(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self::build(config, clock, None)
    }

    fn build(
        config: StoreConfig,
        clock: Arc<dyn Clock>,
        persistent: Option<Arc<dyn PersistentBackend>>,
    ) -> Self {
        Self {
            keys: SnapshotKeys::new(config.namespace.clone()),
            memory: MemoryBackend::new(config.ttl),
            snapshot_count: AtomicU64::new(0),
            started_at: clock.now(),
            config,
            clock,
            persistent,
        }
    }

    /// Name of the selected backend, eg/ `redis` or `memory`.
    pub fn backend_name(&self) -> &'static str {
        self.persistent
            .as_ref()
            .map(|backend| backend.name())
            .unwrap_or("memory")
    }

    /// Record aggregate call/put open interest for the current minute.
    pub async fn save_totals(&self, call_oi: f64, put_oi: f64) {
        let minute = self.current_minute();
        let key = self.keys.totals(minute);
        self.save(key, &OiTotals::new(call_oi, put_oi)).await;
    }

    /// Record a strike snapshot for the current minute.
    pub async fn save_strike(&self, strike: i64, data: &StrikeSnapshot) {
        let minute = self.current_minute();
        let key = self.keys.strike(strike, minute);
        let snapshot = StrikeSnapshot {
            strike,
            timestamp: Some(minute.to_utc()),
            ..*data
        };
        self.save(key, &snapshot).await;
    }

    /// Percentage change of the totals against the snapshot exactly `minutes_ago` minutes back.
    pub async fn get_totals_change(
        &self,
        current_call_oi: f64,
        current_put_oi: f64,
        minutes_ago: u32,
    ) -> OiChange {
        let target = self.target_minute(minutes_ago);

        match self.load::<OiTotals>(&self.keys.totals(target)).await {
            Some(past) => OiChange::between(
                (current_call_oi, current_put_oi),
                (past.call_oi, past.put_oi),
            ),
            None => OiChange::NOT_FOUND,
        }
    }

    /// Percentage change of a strike against the snapshot `minutes_ago` minutes back, accepting
    /// the nearest of [`TOLERANCE_OFFSETS`] when the exact minute is missing.
    pub async fn get_strike_change(
        &self,
        strike: i64,
        current: &StrikeSnapshot,
        minutes_ago: u32,
    ) -> OiChange {
        let target = self.target_minute(minutes_ago);

        let mut past = self.load::<StrikeSnapshot>(&self.keys.strike(strike, target)).await;

        if past.is_none() {
            for offset in TOLERANCE_OFFSETS {
                let probe = target + Duration::minutes(offset);
                past = self.load::<StrikeSnapshot>(&self.keys.strike(strike, probe)).await;
                if past.is_some() {
                    debug!(strike, minutes_ago, offset, "strike snapshot found within tolerance");
                    break;
                }
            }
        }

        match past {
            Some(past) => OiChange::between(
                (current.call_oi, current.put_oi),
                (past.call_oi, past.put_oi),
            ),
            None => OiChange::NOT_FOUND,
        }
    }

    /// True once `minutes` of wall-clock time have elapsed since the store was created.
    pub fn is_warmed_up(&self, minutes: u32) -> bool {
        self.elapsed_minutes() >= minutes as f64
    }

    pub fn get_stats(&self) -> StoreStats {
        StoreStats {
            snapshot_count: self.snapshot_count.load(Ordering::Relaxed),
            elapsed_minutes: self.elapsed_minutes(),
            warmed_up_5m: self.is_warmed_up(5),
            warmed_up_10m: self.is_warmed_up(10),
            warmed_up_15m: self.is_warmed_up(15),
        }
    }

    /// Purge expired in-process entries, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        self.memory.purge_expired(self.clock.now())
    }

    fn elapsed_minutes(&self) -> f64 {
        let elapsed = self.clock.now() - self.started_at;
        elapsed.num_milliseconds() as f64 / 60_000.0
    }

    fn current_minute(&self) -> DateTime<Tz> {
        truncate_to_minute(self.clock.now_ist())
    }

    fn target_minute(&self, minutes_ago: u32) -> DateTime<Tz> {
        truncate_to_minute(self.clock.now_ist() - Duration::minutes(minutes_ago as i64))
    }

    async fn save<T>(&self, key: String, snapshot: &T)
    where
        T: Serialize,
    {
        let value = match serde_json::to_string(snapshot).map_err(BackendError::from) {
            Ok(value) => value,
            Err(error) => {
                error!(%key, %error, "failed to serialise snapshot");
                return;
            }
        };

        self.put(key, value).await;
        self.snapshot_count.fetch_add(1, Ordering::Relaxed);
    }

    async fn put(&self, key: String, value: String) {
        if let Some(backend) = &self.persistent {
            match backend.set_ex(&key, &value, self.config.ttl).await {
                Ok(()) => return,
                Err(error) => log_fallback(backend.name(), "write", &key, &error),
            }
        }

        self.memory.insert(key, value, self.clock.now());
    }

    async fn load<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let raw = self.get_raw(key).await?;

        serde_json::from_str::<T>(&raw)
            .map_err(BackendError::from)
            .inspect_err(|error| error!(%key, %error, "discarding unreadable snapshot"))
            .ok()
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        if let Some(backend) = &self.persistent {
            match backend.get(key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(error) => log_fallback(backend.name(), "read", key, &error),
            }
        }

        self.memory.get(key, self.clock.now())
    }
}

fn log_fallback(backend: &str, operation: &str, key: &str, error: &BackendError) {
    if error.is_connectivity() {
        warn!(%backend, %operation, %key, %error, "backend unavailable, using in-process memory");
    } else {
        error!(%backend, %operation, %key, %error, "backend operation failed, using in-process memory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{IST, ManualClock};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicBool, AtomicUsize},
    };

    /// HashMap-backed persistent backend that can be switched to fail every operation.
    #[derive(Default)]
    struct FakeBackend {
        values: Mutex<HashMap<String, String>>,
        failing: AtomicBool,
        ping_fails: bool,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        fn failing() -> Self {
            Self {
                failing: AtomicBool::new(true),
                ..Default::default()
            }
        }

        fn check(&self) -> Result<(), BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(BackendError::Connection("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PersistentBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn ping(&self) -> Result<(), BackendError> {
            if self.ping_fails {
                Err(BackendError::Timeout)
            } else {
                Ok(())
            }
        }

        async fn set_ex(&self, key: &str, value: &str, _: std::time::Duration) -> Result<(), BackendError> {
            self.check()?;
            self.values.lock().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
            self.check()?;
            Ok(self.values.lock().get(key).cloned())
        }
    }

    fn market_open() -> DateTime<Utc> {
        IST.with_ymd_and_hms(2025, 1, 7, 10, 0, 30).unwrap().to_utc()
    }

    fn memory_store(clock: &ManualClock) -> SnapshotStore {
        SnapshotStore::in_memory(StoreConfig::default(), Arc::new(clock.clone()))
    }

    fn strike(call_oi: f64, put_oi: f64) -> StrikeSnapshot {
        StrikeSnapshot {
            call_oi,
            put_oi,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_totals_change_percentages() {
        let clock = ManualClock::new(market_open());
        let store = memory_store(&clock);

        store.save_totals(1_000.0, 2_000.0).await;
        clock.advance(Duration::minutes(15));

        let change = store.get_totals_change(1_100.0, 1_500.0, 15).await;

        assert!(change.found);
        assert_eq!(change.call_pct, (1_100.0 - 1_000.0) / 1_000.0 * 100.0);
        assert_eq!(change.put_pct, (1_500.0 - 2_000.0) / 2_000.0 * 100.0);
    }

    #[tokio::test]
    async fn test_totals_change_zero_past_is_zero() {
        let clock = ManualClock::new(market_open());
        let store = memory_store(&clock);

        store.save_totals(0.0, 500.0).await;
        clock.advance(Duration::minutes(5));

        let change = store.get_totals_change(1_000.0, 750.0, 5).await;

        assert!(change.found);
        assert_eq!(change.call_pct, 0.0);
        assert_eq!(change.put_pct, 50.0);
    }

    #[tokio::test]
    async fn test_totals_change_missing_is_not_found() {
        let clock = ManualClock::new(market_open());
        let store = memory_store(&clock);

        store.save_totals(1_000.0, 2_000.0).await;
        clock.advance(Duration::minutes(14));

        // Totals do not use the tolerance probe
        assert_eq!(store.get_totals_change(1.0, 1.0, 15).await, OiChange::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_same_minute_write_is_last_write_wins() {
        let clock = ManualClock::new(market_open());
        let store = memory_store(&clock);

        store.save_totals(1_000.0, 1_000.0).await;
        clock.advance(Duration::seconds(20));
        store.save_totals(2_000.0, 4_000.0).await;

        let change = store.get_totals_change(2_000.0, 4_000.0, 0).await;

        assert!(change.found);
        assert_eq!(change.call_pct, 0.0);
        assert_eq!(change.put_pct, 0.0);
        assert_eq!(store.get_stats().snapshot_count, 2);
    }

    #[tokio::test]
    async fn test_strike_change_prefers_negative_offset() {
        let clock = ManualClock::new(market_open());
        let store = memory_store(&clock);

        // t0 + 14m is target-1, t0 + 16m is target+1 once the clock sits at t0 + 30m
        clock.advance(Duration::minutes(14));
        store.save_strike(24200, &strike(1_000.0, 1_000.0)).await;
        clock.advance(Duration::minutes(2));
        store.save_strike(24200, &strike(2_000.0, 2_000.0)).await;
        clock.advance(Duration::minutes(14));

        let change = store.get_strike_change(24200, &strike(1_500.0, 1_500.0), 15).await;

        assert!(change.found);
        assert_eq!(change.call_pct, 50.0);
        assert_eq!(change.put_pct, 50.0);
    }

    #[tokio::test]
    async fn test_strike_change_tolerance_bounds() {
        struct TestCase {
            saved_minutes_before_now: i64,
            expected_found: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: exact minute
                saved_minutes_before_now: 15,
                expected_found: true,
            },
            TestCase {
                // TC1: three minutes late
                saved_minutes_before_now: 12,
                expected_found: true,
            },
            TestCase {
                // TC2: three minutes early
                saved_minutes_before_now: 18,
                expected_found: true,
            },
            TestCase {
                // TC3: four minutes out is beyond tolerance
                saved_minutes_before_now: 19,
                expected_found: false,
            },
            TestCase {
                // TC4: four minutes out the other way
                saved_minutes_before_now: 11,
                expected_found: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let clock = ManualClock::new(market_open());
            let store = memory_store(&clock);

            store.save_strike(24250, &strike(100.0, 100.0)).await;
            clock.advance(Duration::minutes(test.saved_minutes_before_now));

            let change = store.get_strike_change(24250, &strike(110.0, 90.0), 15).await;
            assert_eq!(change.found, test.expected_found, "TC{} failed", index);
        }
    }

    #[tokio::test]
    async fn test_strike_change_is_keyed_by_strike() {
        let clock = ManualClock::new(market_open());
        let store = memory_store(&clock);

        store.save_strike(24200, &strike(100.0, 100.0)).await;
        clock.advance(Duration::minutes(5));

        assert!(!store.get_strike_change(24250, &strike(1.0, 1.0), 5).await.found);
        assert!(store.get_strike_change(24200, &strike(1.0, 1.0), 5).await.found);
    }

    #[tokio::test]
    async fn test_failing_backend_matches_memory_only_store() {
        let memory_clock = ManualClock::new(market_open());
        let memory_only = memory_store(&memory_clock);

        let failing = Arc::new(FakeBackend::failing());
        let failing_clock = ManualClock::new(market_open());
        let fallback = SnapshotStore::with_backend(
            StoreConfig::default(),
            Arc::new(failing_clock.clone()),
            Some(failing.clone() as Arc<dyn PersistentBackend>),
        )
        .await;
        assert_eq!(fallback.backend_name(), "fake");

        let mut outputs = Vec::new();
        for (store, clock) in [(&memory_only, &memory_clock), (&fallback, &failing_clock)] {
            store.save_totals(1_000.0, 2_000.0).await;
            store.save_strike(24200, &strike(300.0, 400.0)).await;
            clock.advance(Duration::minutes(10));
            store.save_totals(1_200.0, 1_800.0).await;

            outputs.push((
                store.get_totals_change(1_200.0, 1_800.0, 10).await,
                store.get_strike_change(24200, &strike(330.0, 300.0), 9).await,
                store.get_strike_change(24200, &strike(330.0, 300.0), 30).await,
                store.get_stats(),
            ));
        }

        assert_eq!(outputs[0], outputs[1]);
        assert!(outputs[1].0.found);
        assert!(outputs[1].1.found);
        assert!(!outputs[1].2.found);
        assert!(failing.calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_failed_health_probe_selects_memory() {
        let clock = ManualClock::new(market_open());
        let backend = Arc::new(FakeBackend {
            ping_fails: true,
            ..Default::default()
        });

        let store = SnapshotStore::with_backend(
            StoreConfig::default(),
            Arc::new(clock.clone()),
            Some(backend.clone() as Arc<dyn PersistentBackend>),
        )
        .await;

        store.save_totals(1.0, 1.0).await;

        assert_eq!(store.backend_name(), "memory");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(store.get_totals_change(1.0, 1.0, 0).await.found);
    }

    #[tokio::test]
    async fn test_healthy_backend_receives_writes() {
        let clock = ManualClock::new(market_open());
        let backend = Arc::new(FakeBackend::default());
        let store = SnapshotStore::with_backend(
            StoreConfig::default().with_namespace("test"),
            Arc::new(clock.clone()),
            Some(backend.clone() as Arc<dyn PersistentBackend>),
        )
        .await;

        store.save_totals(10.0, 20.0).await;

        let values = backend.values.lock().clone();
        assert_eq!(
            values.get("test:total:20250107_1000").map(String::as_str),
            Some(r#"{"ce":10.0,"pe":20.0}"#)
        );
        assert!(store.memory.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_write_is_readable_after_backend_recovers() {
        let clock = ManualClock::new(market_open());
        let backend = Arc::new(FakeBackend::default());
        let store = SnapshotStore::with_backend(
            StoreConfig::default(),
            Arc::new(clock.clone()),
            Some(backend.clone() as Arc<dyn PersistentBackend>),
        )
        .await;

        backend.failing.store(true, Ordering::SeqCst);
        store.save_totals(100.0, 100.0).await;
        backend.failing.store(false, Ordering::SeqCst);
        clock.advance(Duration::minutes(5));

        // Backend misses, the in-process copy is still resident
        let change = store.get_totals_change(150.0, 50.0, 5).await;
        assert!(change.found);
        assert_eq!(change.call_pct, 50.0);
        assert_eq!(change.put_pct, -50.0);
    }

    #[tokio::test]
    async fn test_warm_up_and_stats() {
        let clock = ManualClock::new(market_open());
        let store = memory_store(&clock);

        assert!(!store.is_warmed_up(5));

        clock.advance(Duration::minutes(5));
        let stats = store.get_stats();
        assert!(stats.warmed_up_5m);
        assert!(!stats.warmed_up_10m);
        assert_eq!(stats.elapsed_minutes, 5.0);

        clock.advance(Duration::minutes(10));
        let stats = store.get_stats();
        assert!(stats.warmed_up_10m);
        assert!(stats.warmed_up_15m);
        assert_eq!(stats.snapshot_count, 0);
    }

    #[tokio::test]
    async fn test_cleanup_expires_fallback_entries() {
        let clock = ManualClock::new(market_open());
        let store = memory_store(&clock);

        store.save_totals(1.0, 1.0).await;
        clock.advance(Duration::seconds(14_400 + 1));

        assert_eq!(store.cleanup(), 1);
        assert!(store.memory.is_empty());
    }
}
