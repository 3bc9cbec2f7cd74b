//! Reconnect scheduling
//!
//! - Offline backoff: doubled on every failed liveness probe, capped, reset
//!   to base on the first successful probe
//! - Single pending reconnect: scheduling while a reconnect is pending is a
//!   no-op
//! - Kick classification: throttle-flavoured kicks get a longer fixed delay

use std::time::Duration;
use tokio::time::Instant;

use crate::timers::deadline_after;

/// Kind of disconnect, selects the reconnect delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectClass {
    /// Server-side connection throttling, needs a long cooldown
    Throttled,
    Ordinary,
}

impl DisconnectClass {
    /// Classify a kick reason (case-insensitive)
    pub fn from_kick(reason: &str) -> Self {
        if reason.to_lowercase().contains("throttl") {
            Self::Throttled
        } else {
            Self::Ordinary
        }
    }
}

/// Low-level decode failures that never surface as a session error event
pub fn is_partial_read(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("partialreaderror") || lower.contains("unexpected buffer end")
}

/// Why the live session is going away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    Kicked(String),
    Error(String),
    Ended(String),
    /// Low-level transport failure
    Transport(String),
    /// Event stream closed without an `Ended`
    StreamClosed,
}

impl Disconnect {
    /// Reconnect delay for this disconnect
    pub fn delay(&self, ordinary: Duration, throttled: Duration) -> Duration {
        match self {
            Disconnect::Kicked(reason) if DisconnectClass::from_kick(reason) == DisconnectClass::Throttled => throttled,
            _ => ordinary,
        }
    }
}

/// Exponential offline backoff
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
            failures: 0,
        }
    }

    /// Wait before the next retry, then double for the one after
    pub fn next_delay(&mut self) -> Duration {
        let wait = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.failures += 1;
        wait
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.failures = 0;
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// The one pending reconnect, if any
#[derive(Debug, Default)]
pub struct ReconnectSchedule {
    deadline: Option<Instant>,
}

impl ReconnectSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and changes nothing) if a reconnect is already pending
    pub fn schedule(&mut self, delay: Duration, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(deadline_after(now, delay));
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consume the pending reconnect if it is due
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(at) if now >= at => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.deadline = None;
    }
}

/// Seconds for log lines: whole seconds print without decimals
pub fn fmt_secs(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 == 0 {
        format!("{}", ms / 1000)
    } else {
        format!("{}", d.as_secs_f64())
    }
}
