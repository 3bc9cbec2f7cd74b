//! Mode controller
//!
//! `STARTUP -> IDLE <-> ACTIVE`, where ACTIVE is eating or a food mode.
//! Every transition is a guarded method; an illegal one (eating while
//! already eating, a second food mode) returns false and changes nothing.

use tracing::debug;

/// Food acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FoodMode {
    #[default]
    None,
    Requesting,
    Seeking,
}

impl FoodMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FoodMode::None => "none",
            FoodMode::Requesting => "requesting",
            FoodMode::Seeking => "seeking",
        }
    }
}

/// Externally visible mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Spawned, idle not asserted yet
    Startup,
    Idle,
    Eating,
    Seeking,
    /// Between an activity and the settle back to idle
    Active,
}

/// Last thing the agent did, for log context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Startup,
    Idle,
    EatAttempt,
    Eating,
    EatFinished,
    EatStopped,
    EatFailed,
    RequestFood,
    RequestComplete,
    SeekFood,
    SeekComplete,
    Wander,
}

impl Activity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::Startup => "startup",
            Activity::Idle => "idle",
            Activity::EatAttempt => "eat-attempt",
            Activity::Eating => "eating",
            Activity::EatFinished => "eat-finished",
            Activity::EatStopped => "eat-stopped",
            Activity::EatFailed => "eat-failed",
            Activity::RequestFood => "request-food",
            Activity::RequestComplete => "request-complete",
            Activity::SeekFood => "seek-food",
            Activity::SeekComplete => "seek-complete",
            Activity::Wander => "wander",
        }
    }
}

/// Result of trying to assert idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleTransition {
    Entered,
    AlreadyIdle,
    /// Eating or seeking took priority
    Preempted,
}

#[derive(Debug)]
pub struct ModeController {
    started: bool,
    idle: bool,
    eating: bool,
    food_mode: FoodMode,
    activity: Activity,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeController {
    pub fn new() -> Self {
        Self {
            started: false,
            idle: false,
            eating: false,
            food_mode: FoodMode::None,
            activity: Activity::Startup,
        }
    }

    pub fn mode(&self) -> Mode {
        if self.eating {
            Mode::Eating
        } else if self.food_mode == FoodMode::Seeking {
            Mode::Seeking
        } else if self.idle {
            Mode::Idle
        } else if !self.started {
            Mode::Startup
        } else {
            Mode::Active
        }
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn is_eating(&self) -> bool {
        self.eating
    }

    pub fn food_mode(&self) -> FoodMode {
        self.food_mode
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn set_activity(&mut self, activity: Activity) {
        self.activity = activity;
    }

    fn transition(&mut self, f: impl FnOnce(&mut Self)) {
        let before = self.mode();
        f(self);
        let after = self.mode();
        if before != after {
            debug!("Mode: {:?} -> {:?}", before, after);
        }
    }

    /// Go idle unless eating or seeking holds the agent
    pub fn assert_idle(&mut self) -> IdleTransition {
        if self.idle {
            return IdleTransition::AlreadyIdle;
        }
        if self.eating || self.food_mode == FoodMode::Seeking {
            return IdleTransition::Preempted;
        }
        self.transition(|m| {
            m.idle = true;
            m.started = true;
            m.activity = Activity::Idle;
        });
        IdleTransition::Entered
    }

    /// Returns true if the agent was idle
    pub fn release_idle(&mut self) -> bool {
        let was = self.idle;
        self.transition(|m| m.idle = false);
        was
    }

    /// IDLE -> EATING on the eat-start signal
    pub fn begin_eating(&mut self) -> bool {
        if self.eating {
            return false;
        }
        self.transition(|m| {
            m.eating = true;
            m.idle = false;
            m.started = true;
            m.activity = Activity::Eating;
        });
        true
    }

    /// Eat finished or stopped; false if not eating
    pub fn finish_eating(&mut self, activity: Activity) -> bool {
        if !self.eating {
            return false;
        }
        self.transition(|m| {
            m.eating = false;
            m.activity = activity;
        });
        true
    }

    /// Eat invocation failed, whether or not it ever started
    pub fn abort_eating(&mut self) {
        self.transition(|m| {
            m.eating = false;
            m.activity = Activity::EatFailed;
        });
    }

    /// NONE -> `mode`; false if a food mode is already active
    pub fn enter_food_mode(&mut self, mode: FoodMode) -> bool {
        if mode == FoodMode::None || self.food_mode != FoodMode::None {
            return false;
        }
        self.transition(|m| {
            m.food_mode = mode;
            m.started = true;
            m.activity = match mode {
                FoodMode::Seeking => Activity::SeekFood,
                _ => Activity::RequestFood,
            };
            if mode == FoodMode::Seeking {
                m.idle = false;
            }
        });
        true
    }

    /// Back to NONE, returning the mode that was left
    pub fn leave_food_mode(&mut self) -> Option<FoodMode> {
        let left = self.food_mode;
        if left == FoodMode::None {
            return None;
        }
        self.transition(|m| {
            m.food_mode = FoodMode::None;
            m.activity = match left {
                FoodMode::Seeking => Activity::SeekComplete,
                _ => Activity::RequestComplete,
            };
        });
        Some(left)
    }
}
