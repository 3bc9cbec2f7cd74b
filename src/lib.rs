//! AfkBot
//!
//! Unattended keep-alive agent for a block-world game server.
//!
//! # Features
//!
//! - **Reconnect**: liveness probe before every connect, exponential offline
//!   backoff, longer cooldown after throttle kicks
//! - **Idle**: sends the server's idle command once the agent settles
//! - **Hunger**: eats the best safe food when hunger or health drops
//! - **Food supply**: asks players for food, or searches nearby containers
//! - **Deliveries**: accepts safe food, tosses back anything unsafe
//! - **Latency**: HIGH/NORMAL mode with strikes and a hold window
//! - **Logging**: per-key dedup with suppressed-repeat counts
//!
//! # Architecture
//!
//! ```text
//! Orchestrator ──► LivenessProbe (server list ping)
//!      │
//!      ├──► SessionConnector ──► GameSession + event streams
//!      │
//!      └──► SessionRuntime
//!             ├── ModeController   (idle / eating / food mode)
//!             ├── HungerMonitor    (eat triggers, cooldowns)
//!             ├── LatencyMonitor   (HIGH / NORMAL)
//!             ├── FoodPlan         (solicit or seek)
//!             ├── ChestSeeker      (container search)
//!             └── SessionTimers    (cancelled on disconnect)
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod food;
pub mod hunger;
pub mod latency;
pub mod lifecycle;
pub mod logging;
pub mod messages;
pub mod orchestrator;
pub mod probe;
pub mod reconnect;
pub mod runtime;
pub mod session;
pub mod sim;
pub mod timers;

pub use chat::{ChatGate, ChatPolicy, Solicitation};
pub use config::Config;
pub use error::{ActionError, ProbeError, SessionError};
pub use food::{ContainerMemory, FoodSafety, FoodSummary, Verdict};
pub use hunger::{EatTrigger, HungerMonitor};
pub use latency::{LatencyMode, LatencyMonitor};
pub use lifecycle::{Activity, FoodMode, Mode, ModeController};
pub use logging::ThrottledLogger;
pub use messages::{MessagePools, Pool};
pub use orchestrator::Orchestrator;
pub use probe::{LivenessProbe, ServerListPing, ServerStatus};
pub use reconnect::{Backoff, Disconnect, ReconnectSchedule};
pub use runtime::SessionRuntime;
pub use session::{ConnectTarget, GameSession, SessionConnector, SessionEvent, SessionHandle};
pub use sim::SimWorld;
