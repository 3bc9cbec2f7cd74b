//! Hunger and health monitor
//!
//! Decides when an eat attempt is due. Health notifications are debounced;
//! attempts are gated by a fixed cooldown and by a backoff window after a
//! failed attempt.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::timers::deadline_after;

pub const EAT_COOLDOWN: Duration = Duration::from_millis(4000);
pub const HEALTH_DEBOUNCE: Duration = Duration::from_millis(2000);
pub const MAX_FOOD: u32 = 20;

#[derive(Debug, Clone)]
pub struct HungerConfig {
    pub hunger_threshold: u32,
    pub health_threshold: f32,
    pub eat_backoff: Duration,
}

/// Why an eat attempt is wanted
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EatTrigger {
    Hunger(u32),
    LowHealth(f32),
}

impl fmt::Display for EatTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EatTrigger::Hunger(t) => write!(f, "[HUNGER<={}]", t),
            EatTrigger::LowHealth(t) => write!(f, "[LOW_HEALTH<={}]", t),
        }
    }
}

/// Why a wanted attempt did not happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EatSkip {
    Backoff,
    Eating,
    Cooldown,
    Full,
}

#[derive(Debug)]
pub struct HungerMonitor {
    config: HungerConfig,
    last_health_check_at: Option<Instant>,
    last_eat_attempt_at: Option<Instant>,
    eat_backoff_until: Option<Instant>,
}

impl HungerMonitor {
    pub fn new(config: HungerConfig) -> Self {
        Self {
            config,
            last_health_check_at: None,
            last_eat_attempt_at: None,
            eat_backoff_until: None,
        }
    }

    /// True if this notification should be processed
    pub fn debounce(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_health_check_at {
            if now.duration_since(last) < HEALTH_DEBOUNCE {
                return false;
            }
        }
        self.last_health_check_at = Some(now);
        true
    }

    /// Hunger is checked before health
    pub fn trigger(&self, food: Option<u32>, health: Option<f32>) -> Option<EatTrigger> {
        if food.is_some_and(|f| f <= self.config.hunger_threshold) {
            return Some(EatTrigger::Hunger(self.config.hunger_threshold));
        }
        if health.is_some_and(|h| h <= self.config.health_threshold) {
            return Some(EatTrigger::LowHealth(self.config.health_threshold));
        }
        None
    }

    /// Gate an attempt; on success the attempt time is recorded
    pub fn admit(&mut self, food: Option<u32>, eating: bool, now: Instant) -> Result<(), EatSkip> {
        if self.in_backoff(now) {
            return Err(EatSkip::Backoff);
        }
        if eating {
            return Err(EatSkip::Eating);
        }
        if self
            .last_eat_attempt_at
            .is_some_and(|last| now.duration_since(last) < EAT_COOLDOWN)
        {
            return Err(EatSkip::Cooldown);
        }
        if food.is_some_and(|f| f >= MAX_FOOD) {
            return Err(EatSkip::Full);
        }
        self.last_eat_attempt_at = Some(now);
        Ok(())
    }

    /// Open the backoff window after a failed attempt
    pub fn fail(&mut self, now: Instant) {
        self.eat_backoff_until = Some(deadline_after(now, self.config.eat_backoff));
    }

    pub fn in_backoff(&self, now: Instant) -> bool {
        self.eat_backoff_until.is_some_and(|until| now < until)
    }
}
