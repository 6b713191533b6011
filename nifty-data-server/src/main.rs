use nifty_data::{
    BotConfig, DataFetcher, MarketClock, Poller, SnapshotStore, UpstoxClient,
    time::{Clock, SystemClock, format_time_ist},
};
use std::{process::ExitCode, sync::Arc};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    init_logging();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let client = match UpstoxClient::new(config.client.clone()) {
        Ok(client) => Arc::new(client),
        Err(error) => {
            error!(%error, "failed to construct Upstox client");
            return ExitCode::FAILURE;
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let market = MarketClock::new(clock.clone());

    let store = Arc::new(SnapshotStore::connect(config.store.clone(), clock.clone()).await);
    let fetcher = DataFetcher::new(client, config.fetcher.clone(), clock.clone());
    let poller = Poller::new(fetcher, store.clone(), config.warmup_minutes);

    info!(
        backend = store.backend_name(),
        scan_interval_secs = config.scan_interval.as_secs(),
        warmup_minutes = config.warmup_minutes,
        "starting NIFTY open-interest poller"
    );

    let mut ticker = interval(config.scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (phase, description) = market.market_status();
                debug!(
                    time = %format_time_ist(clock.now()),
                    %phase,
                    description,
                    "tick"
                );

                if let Some(report) = poller.tick(phase).await {
                    debug!(?report, "cycle report");
                }

                let purged = store.cleanup();
                if purged > 0 {
                    debug!(purged, "expired in-process snapshots purged");
                }
            }
            signal = &mut shutdown => {
                if let Err(error) = signal {
                    error!(%error, "failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    info!(stats = ?store.get_stats(), "shutting down");
    ExitCode::SUCCESS
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
