//! Chat cooldown gate
//!
//! One gate per session. A closed gate either drops the line (idle command,
//! courtesy replies) or tells the caller how long to wait (solicitation).

use std::time::Duration;
use tokio::time::Instant;

/// What to do with a line that hits a closed gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPolicy {
    Skip,
    Defer(Solicitation),
}

/// Food solicitation lines, the only ones allowed to wait for the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Solicitation {
    Request,
    NeedMore,
}

/// Gate check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPermit {
    /// Send now, the cooldown has been restarted
    Open,
    /// Closed, reopens after this long
    Closed(Duration),
}

#[derive(Debug, Clone)]
pub struct ChatGate {
    cooldown: Duration,
    last_at: Option<Instant>,
}

impl ChatGate {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, last_at: None }
    }

    /// Claim the gate for one line
    pub fn try_claim(&mut self, now: Instant) -> ChatPermit {
        if let Some(last) = self.last_at {
            let elapsed = now.duration_since(last);
            if elapsed < self.cooldown {
                return ChatPermit::Closed(self.cooldown - elapsed);
            }
        }
        self.last_at = Some(now);
        ChatPermit::Open
    }

    pub fn last_at(&self) -> Option<Instant> {
        self.last_at
    }
}
