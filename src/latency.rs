//! Latency monitor
//!
//! Strike-based hysteresis. HIGH needs `enter_strikes` consecutive samples at
//! or above the threshold; NORMAL needs the hold period to be over AND
//! `recovery_strikes` consecutive samples below it.

use std::time::Duration;
use tokio::time::Instant;

use crate::timers::deadline_after;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatencyMode {
    #[default]
    Normal,
    High,
}

impl LatencyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LatencyMode::Normal => "NORMAL",
            LatencyMode::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LatencyConfig {
    pub threshold_ms: u32,
    pub enter_strikes: u32,
    pub recovery_strikes: u32,
    pub hold: Duration,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            threshold_ms: 250,
            enter_strikes: 3,
            recovery_strikes: 3,
            hold: Duration::from_secs(30),
        }
    }
}

/// Mode change caused by a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyShift {
    EnteredHigh { ping_ms: u32 },
    Recovered { ping_ms: u32 },
}

#[derive(Debug)]
pub struct LatencyMonitor {
    config: LatencyConfig,
    mode: LatencyMode,
    high_strikes: u32,
    low_strikes: u32,
    hold_until: Option<Instant>,
    last_ping: Option<u32>,
}

impl LatencyMonitor {
    pub fn new(config: LatencyConfig) -> Self {
        Self {
            config,
            mode: LatencyMode::Normal,
            high_strikes: 0,
            low_strikes: 0,
            hold_until: None,
            last_ping: None,
        }
    }

    pub fn mode(&self) -> LatencyMode {
        self.mode
    }

    pub fn is_high(&self) -> bool {
        self.mode == LatencyMode::High
    }

    pub fn last_ping(&self) -> Option<u32> {
        self.last_ping
    }

    /// Feed one sample. `None` (no source available) is skipped entirely.
    pub fn sample(&mut self, ping_ms: Option<u32>, now: Instant) -> Option<LatencyShift> {
        let ping_ms = ping_ms?;
        self.last_ping = Some(ping_ms);

        if ping_ms >= self.config.threshold_ms {
            self.high_strikes += 1;
            self.low_strikes = 0;
            if self.mode == LatencyMode::Normal && self.high_strikes >= self.config.enter_strikes {
                self.mode = LatencyMode::High;
                self.hold_until = Some(deadline_after(now, self.config.hold));
                return Some(LatencyShift::EnteredHigh { ping_ms });
            }
        } else {
            self.low_strikes += 1;
            self.high_strikes = 0;
            let held = self.hold_until.is_some_and(|until| now < until);
            if self.mode == LatencyMode::High && !held && self.low_strikes >= self.config.recovery_strikes {
                self.mode = LatencyMode::Normal;
                self.hold_until = None;
                return Some(LatencyShift::Recovered { ping_ms });
            }
        }
        None
    }
}
