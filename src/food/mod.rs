//! Food logistics
//!
//! Two strategies, one per deployment:
//! - **Solicit**: ask players for food over chat while below the threshold
//! - **Seek**: search nearby containers and take one unit
//!
//! [`FoodPlan`] turns a safe-food count into at most one mode transition.

mod containers;
mod safety;
mod seek;
mod solicit;

pub use containers::{ContainerMemory, ScanCache};
pub use safety::{FoodSafety, FoodSummary, Verdict};
pub use seek::{pick_withdrawal, wander_offset, ChestSeeker, SeekOutcome, SeekReport};
pub use solicit::{classify_delivery, Delivery, Solicitor};

use std::time::Duration;
use tokio::time::Instant;

use crate::lifecycle::FoodMode;
use crate::timers::deadline_after;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoodStrategy {
    Solicit,
    Seek,
}

impl FoodStrategy {
    pub fn from_seek_enabled(enabled: bool) -> Self {
        if enabled {
            Self::Seek
        } else {
            Self::Solicit
        }
    }
}

/// Why a wanted search was not started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDeferral {
    Eating,
    HighLatency,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoodDecision {
    Hold,
    StartRequesting,
    StopRequesting,
    StartSeeking,
    Defer(SeekDeferral),
}

/// Conditions outside food logistics that gate a search
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanContext {
    pub eating: bool,
    pub high_latency: bool,
}

#[derive(Debug)]
pub struct FoodPlan {
    strategy: FoodStrategy,
    threshold: u32,
    seek_cooldown: Duration,
    next_seek_at: Option<Instant>,
}

impl FoodPlan {
    pub fn new(strategy: FoodStrategy, threshold: u32, seek_cooldown: Duration) -> Self {
        Self {
            strategy,
            threshold,
            seek_cooldown,
            next_seek_at: None,
        }
    }

    pub fn strategy(&self) -> FoodStrategy {
        self.strategy
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_low(&self, safe_count: u32) -> bool {
        safe_count < self.threshold
    }

    /// Transition wanted for `safe_count` given the current food mode
    pub fn evaluate(&self, safe_count: u32, mode: FoodMode, ctx: PlanContext, now: Instant) -> FoodDecision {
        let low = self.is_low(safe_count);
        match (self.strategy, mode) {
            (FoodStrategy::Solicit, FoodMode::None) if low => FoodDecision::StartRequesting,
            (FoodStrategy::Solicit, FoodMode::Requesting) if !low => FoodDecision::StopRequesting,
            (FoodStrategy::Seek, FoodMode::None) if low => {
                if ctx.eating {
                    FoodDecision::Defer(SeekDeferral::Eating)
                } else if ctx.high_latency {
                    FoodDecision::Defer(SeekDeferral::HighLatency)
                } else if self.next_seek_at.is_some_and(|at| now < at) {
                    FoodDecision::Defer(SeekDeferral::Cooldown)
                } else {
                    FoodDecision::StartSeeking
                }
            }
            _ => FoodDecision::Hold,
        }
    }

    /// A search ran out of time without food
    pub fn seek_failed(&mut self, now: Instant) {
        self.next_seek_at = Some(deadline_after(now, self.seek_cooldown));
    }
}
