use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Single-slot limiter enforcing a minimum spacing between dispatched requests.
///
/// Callers reserve the next free slot under a short lock and then sleep outside of it, so
/// concurrent callers are serialised in dispatch time without holding the lock across an await.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until this caller may dispatch a request.
    pub async fn acquire(&self) {
        let slot = {
            let mut next_slot = self.next_slot.lock();
            let now = Instant::now();
            let slot = match *next_slot {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next_slot = Some(slot + self.interval);
            slot
        };

        let now = Instant::now();
        if slot > now {
            debug!(wait_ms = (slot - now).as_millis() as u64, "rate limiter delaying request");
            sleep_until(slot).await;
        }
    }
}
