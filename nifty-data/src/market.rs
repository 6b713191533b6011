//! Trading-day phases for the NSE derivatives session.
//!
//! Two independent views of the session are exposed on purpose: [`MarketPhase`] gates signal
//! generation, while [`is_market_open_at`] gates order eligibility. Their boundaries overlap
//! (e.g. 09:15-09:20 is both PREMARKET and "open") and must not be merged.

use crate::time::Clock;
use chrono::{NaiveTime, Timelike};
use derive_more::Display;
use serde::{Deserialize, Serialize};

const PREMARKET_START: (u32, u32) = (9, 10);
const PREMARKET_END: (u32, u32) = (9, 20);
const SIGNAL_START: (u32, u32) = (9, 25);
const MARKET_OPEN: (u32, u32) = (9, 15);
const MARKET_CLOSE: (u32, u32) = (15, 30);

/// Discrete phase of the trading day.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
pub enum MarketPhase {
    /// `[09:10, 09:20)`
    #[display("PREMARKET")]
    Premarket,
    /// `[09:20, 09:25)`
    #[display("WARMUP")]
    Warmup,
    /// `[09:25, 15:30)`
    #[display("OPEN")]
    Open,
    #[display("CLOSED")]
    Closed,
}

impl MarketPhase {
    pub fn description(&self) -> &'static str {
        match self {
            MarketPhase::Premarket => "Loading previous data",
            MarketPhase::Warmup => "Collecting data",
            MarketPhase::Open => "Monitoring signals",
            MarketPhase::Closed => "Market closed",
        }
    }

    /// Phases during which the poll cycle should fetch and record snapshots.
    pub fn is_collecting(&self) -> bool {
        matches!(self, MarketPhase::Warmup | MarketPhase::Open)
    }
}

fn minutes_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

fn within(time: NaiveTime, start: (u32, u32), end: (u32, u32)) -> bool {
    let minutes = minutes_of_day(time);
    minutes >= start.0 * 60 + start.1 && minutes < end.0 * 60 + end.1
}

/// Map an IST wall-clock time to its [`MarketPhase`].
pub fn market_phase_at(time: NaiveTime) -> MarketPhase {
    if within(time, PREMARKET_START, PREMARKET_END) {
        MarketPhase::Premarket
    } else if within(time, PREMARKET_END, SIGNAL_START) {
        MarketPhase::Warmup
    } else if within(time, SIGNAL_START, MARKET_CLOSE) {
        MarketPhase::Open
    } else {
        MarketPhase::Closed
    }
}

pub fn is_premarket_at(time: NaiveTime) -> bool {
    within(time, PREMARKET_START, PREMARKET_END)
}

pub fn is_signal_time_at(time: NaiveTime) -> bool {
    within(time, SIGNAL_START, MARKET_CLOSE)
}

/// Order-eligibility window `[09:15, 15:30)`.
pub fn is_market_open_at(time: NaiveTime) -> bool {
    within(time, MARKET_OPEN, MARKET_CLOSE)
}

/// [`Clock`]-driven view of the session predicates.
#[derive(Debug, Clone)]
pub struct MarketClock<C> {
    clock: C,
}

impl<C> MarketClock<C>
where
    C: Clock,
{
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn time_ist(&self) -> NaiveTime {
        self.clock.now_ist().time()
    }

    pub fn phase(&self) -> MarketPhase {
        market_phase_at(self.time_ist())
    }

    /// Current phase together with its human readable description.
    pub fn market_status(&self) -> (MarketPhase, &'static str) {
        let phase = self.phase();
        (phase, phase.description())
    }

    pub fn is_premarket(&self) -> bool {
        is_premarket_at(self.time_ist())
    }

    pub fn is_signal_time(&self) -> bool {
        is_signal_time_at(self.time_ist())
    }

    pub fn is_market_open(&self) -> bool {
        is_market_open_at(self.time_ist())
    }

    pub fn is_market_closed(&self) -> bool {
        !self.is_market_open()
    }
}
