//! Rate-limited, retrying accessor over the Upstox quote, intraday candle and option-chain
//! endpoints.
//!
//! Ordinary upstream trouble (timeouts, 429, 5xx, malformed bodies) is returned as a
//! [`DataError`] describing why there is no data this cycle; only configuration problems fail
//! construction.

use crate::{
    config::ClientConfig,
    error::{ConfigError, DataError},
    instrument::InstrumentKey,
};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub mod payload;
pub mod rate_limit;
pub mod transport;

use payload::{CandleData, Envelope, OptionChainEntry, OptionChainPayload, QuoteData, QuoteMap};
use rate_limit::RateLimiter;
use transport::{HttpTransport, ReqwestTransport};

const QUOTE_PATH: &[&str] = &["v3", "quote"];
const INTRADAY_CANDLE_PATH: &[&str] = &["v3", "historical-candle", "intraday"];
const OPTION_CHAIN_PATH: &[&str] = &["v2", "option", "chain"];

/// Upstox market-data gateway.
#[derive(Debug)]
pub struct UpstoxClient<Transport = ReqwestTransport> {
    config: ClientConfig,
    base_url: Url,
    transport: Transport,
    limiter: RateLimiter,
}

impl UpstoxClient<ReqwestTransport> {
    /// Construct a client over a pooled HTTPS connection.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let transport = ReqwestTransport::new(&config).map_err(|error| ConfigError::Invalid {
            name: "http_client",
            value: error.to_string(),
        })?;
        Self::with_transport(config, transport)
    }
}

impl<Transport> UpstoxClient<Transport>
where
    Transport: HttpTransport,
{
    pub fn with_transport(config: ClientConfig, transport: Transport) -> Result<Self, ConfigError> {
        if config.access_token.trim().is_empty() {
            return Err(ConfigError::MissingCredential(
                crate::config::ENV_ACCESS_TOKEN,
            ));
        }

        let base_url = Url::parse(&config.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ConfigError::Invalid {
                name: "base_url",
                value: config.base_url.clone(),
            })?;

        if config.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "max_attempts",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            limiter: RateLimiter::new(config.min_request_interval),
            config,
            base_url,
            transport,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Latest quote for `instrument`.
    pub async fn get_quote(&self, instrument: &InstrumentKey) -> Result<QuoteData, DataError> {
        let mut url = self.endpoint(QUOTE_PATH, &[]);
        url.query_pairs_mut().append_pair("symbol", instrument.as_str());

        let mut quotes = self.request::<QuoteMap>(url).await?;

        // Responses are keyed either by the requested key or its `SEGMENT:name` form
        let alternate = instrument.as_str().replacen('|', ":", 1);
        quotes
            .remove(instrument.as_str())
            .or_else(|| quotes.remove(&alternate))
            .or_else(|| {
                if quotes.len() == 1 {
                    quotes.into_values().next()
                } else {
                    None
                }
            })
            .ok_or_else(|| DataError::Empty {
                entity: format!("quote {instrument}"),
            })
    }

    /// Today's intraday candles for `instrument` at `interval`, eg/ `1minute`.
    pub async fn get_candles(
        &self,
        instrument: &InstrumentKey,
        interval: &str,
    ) -> Result<CandleData, DataError> {
        let url = self.endpoint(INTRADAY_CANDLE_PATH, &[instrument.as_str(), interval]);
        self.request::<CandleData>(url).await
    }

    /// Full option chain of `instrument` for `expiry_date` (`YYYY-MM-DD`).
    pub async fn get_option_chain(
        &self,
        instrument: &InstrumentKey,
        expiry_date: &str,
    ) -> Result<Vec<OptionChainEntry>, DataError> {
        let mut url = self.endpoint(OPTION_CHAIN_PATH, &[]);
        url.query_pairs_mut()
            .append_pair("instrument_key", instrument.as_str())
            .append_pair("expiry_date", expiry_date);

        self.request::<OptionChainPayload>(url)
            .await
            .map(OptionChainPayload::into_entries)
    }

    fn endpoint(&self, path: &[&str], params: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        let mut full_path = url.path().trim_end_matches('/').to_string();
        for segment in path.iter().chain(params) {
            full_path.push('/');
            full_path.push_str(&encode_segment(segment));
        }
        url.set_path(&full_path);
        url
    }

    /// Dispatch a GET through the rate limiter with the retry policy:
    /// - 429: back off `rate_limit_backoff * 2^attempt` then retry
    /// - other non-2xx, transport failure or timeout: wait `retry_delay` then retry
    /// - 2xx with an unparseable body: give up immediately (malformed)
    async fn request<T>(&self, url: Url) -> Result<T, DataError>
    where
        T: DeserializeOwned,
    {
        let max_attempts = self.config.max_attempts;
        let mut last_error = DataError::Transport("no attempt made".to_string());

        for attempt in 0..max_attempts {
            self.limiter.acquire().await;

            let error = match tokio::time::timeout(
                self.config.request_timeout,
                self.transport.get(&url),
            )
            .await
            {
                Ok(Ok(response)) if response.is_success() => {
                    return parse_envelope::<T>(&response.body).inspect_err(|error| {
                        warn!(url = %url.path(), %error, "discarding malformed upstream payload");
                    });
                }
                Ok(Ok(response)) if response.status == 429 => DataError::RateLimited,
                Ok(Ok(response)) => DataError::Status {
                    status: response.status,
                },
                Ok(Err(error)) => error,
                Err(_elapsed) => DataError::Timeout(self.config.request_timeout),
            };

            if !error.is_retryable() {
                return Err(error);
            }

            warn!(
                url = %url.path(),
                attempt = attempt + 1,
                max_attempts,
                %error,
                "upstream request failed"
            );

            if attempt + 1 < max_attempts {
                let delay = self.retry_delay(&error, attempt);
                debug!(delay_ms = delay.as_millis() as u64, "retrying upstream request");
                tokio::time::sleep(delay).await;
            }

            last_error = error;
        }

        Err(DataError::RetriesExhausted {
            url: url.path().to_string(),
            attempts: max_attempts,
            last: Box::new(last_error),
        })
    }

    fn retry_delay(&self, error: &DataError, attempt: u32) -> Duration {
        match error {
            DataError::RateLimited => self.config.rate_limit_backoff * 2u32.saturating_pow(attempt),
            _ => self.config.retry_delay,
        }
    }
}

/// Percent-encode every reserved byte of a path segment, eg/ `NSE_FO|NIFTY25JANFUT` ->
/// `NSE_FO%7CNIFTY25JANFUT`.
fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn parse_envelope<T>(body: &str) -> Result<T, DataError>
where
    T: DeserializeOwned,
{
    serde_json::from_str::<Envelope<T>>(body)
        .map(|envelope| envelope.data)
        .map_err(|error| DataError::Malformed(error.to_string()))
}
