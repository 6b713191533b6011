//! Component configuration.
//!
//! Every component receives its own config struct at construction; [`BotConfig::from_env`]
//! is the only place that reads the process environment.

use crate::{error::ConfigError, instrument::InstrumentKey};
use chrono::Weekday;
use std::time::Duration;

pub const ENV_ACCESS_TOKEN: &str = "UPSTOX_ACCESS_TOKEN";
pub const ENV_REDIS_URL: &str = "REDIS_URL";
pub const ENV_SCAN_INTERVAL: &str = "SCAN_INTERVAL";
pub const ENV_BASE_URL: &str = "UPSTOX_BASE_URL";

/// Upstox API gateway client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL, eg/ `https://api.upstox.com`
    pub base_url: String,
    /// Bearer token sent with every request
    pub access_token: String,
    /// Minimum spacing between two dispatched requests
    pub min_request_interval: Duration,
    /// Attempts per call, including the first
    pub max_attempts: u32,
    /// Fixed delay after a transport failure or non-429 error status
    pub retry_delay: Duration,
    /// Base of the `base * 2^attempt` backoff applied after HTTP 429
    pub rate_limit_backoff: Duration,
    /// Upper bound on a single request
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.upstox.com".to_string(),
            access_token: String::new(),
            min_request_interval: Duration::from_millis(100),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            rate_limit_backoff: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Snapshot store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Persistent backend URL, eg/ `redis://127.0.0.1:6379`. `None` selects in-process memory.
    pub backend_url: Option<String>,
    /// Key prefix, eg/ `nifty` -> `nifty:total:20250107_0930`
    pub namespace: String,
    /// Lifetime of every snapshot
    pub ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            namespace: "nifty".to_string(),
            ttl: Duration::from_secs(14_400),
        }
    }
}

impl StoreConfig {
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Instruments and strike layout used by the data fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub spot_key: InstrumentKey,
    /// Underlying key passed to the option-chain endpoint
    pub index_key: InstrumentKey,
    /// Exchange segment of the futures contract, eg/ `NSE_FO`
    pub futures_segment: String,
    /// Contract name prefix, eg/ `NIFTY` -> `NIFTY25JANFUT`
    pub futures_prefix: String,
    pub candle_interval: String,
    pub strike_gap: i64,
    /// Strikes retained either side of ATM
    pub strike_window: u32,
    pub expiry_weekday: Weekday,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            spot_key: InstrumentKey::new("NSE_INDEX|Nifty 50"),
            index_key: InstrumentKey::new("NSE_INDEX|Nifty 50"),
            futures_segment: "NSE_FO".to_string(),
            futures_prefix: "NIFTY".to_string(),
            candle_interval: "1minute".to_string(),
            strike_gap: 50,
            strike_window: 2,
            expiry_weekday: Weekday::Tue,
        }
    }
}

impl FetcherConfig {
    pub fn with_strike_gap(mut self, strike_gap: i64) -> Self {
        self.strike_gap = strike_gap;
        self
    }

    pub fn with_strike_window(mut self, strike_window: u32) -> Self {
        self.strike_window = strike_window;
        self
    }
}

/// Full process configuration for the poll loop.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub client: ClientConfig,
    pub store: StoreConfig,
    pub fetcher: FetcherConfig,
    /// Time between two poll cycles
    pub scan_interval: Duration,
    /// History required before change-queries are reported
    pub warmup_minutes: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            store: StoreConfig::default(),
            fetcher: FetcherConfig::default(),
            scan_interval: Duration::from_secs(60),
            warmup_minutes: 10,
        }
    }
}

impl BotConfig {
    /// Build from the process environment. A missing access token is fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_token = lookup(ENV_ACCESS_TOKEN)
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::MissingCredential(ENV_ACCESS_TOKEN))?;

        let mut config = Self {
            client: ClientConfig::new(access_token),
            ..Default::default()
        };

        if let Some(base_url) = lookup(ENV_BASE_URL) {
            config.client.base_url = base_url;
        }

        config.store.backend_url = lookup(ENV_REDIS_URL).filter(|url| !url.trim().is_empty());

        if let Some(raw) = lookup(ENV_SCAN_INTERVAL) {
            let secs = raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: ENV_SCAN_INTERVAL,
                value: raw.clone(),
            })?;
            config.scan_interval = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would fail every cycle. A hung request must never be able to
    /// starve the next cycle, and strikes need a positive gap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetcher.strike_gap <= 0 {
            return Err(ConfigError::Invalid {
                name: "strike_gap",
                value: self.fetcher.strike_gap.to_string(),
            });
        }

        if self.client.request_timeout >= self.scan_interval {
            return Err(ConfigError::TimeoutNotBelowInterval {
                timeout: self.client.request_timeout,
                interval: self.scan_interval,
            });
        }
        Ok(())
    }
}
