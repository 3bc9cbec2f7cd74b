//! Capability traits at the integration boundary
//!
//! A transport adapter implements these once; the core never probes for
//! optional methods.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::world::{BlockPos, GameRegistry, ItemStack, Vec3};
use crate::error::{ActionError, SessionError};

/// Where and as whom to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub protocol_version: Option<String>,
}

impl ConnectTarget {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Events a live session delivers to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Login,
    Spawn,
    HealthChanged,
    /// Someone picked up a dropped item; `item` is `None` when unidentifiable
    ItemCollected {
        collector: u32,
        item: Option<ItemStack>,
    },
    Kicked(String),
    Error(String),
    Ended(String),
    EatStarted,
    EatFinished,
    EatStopped,
    EatFailed(String),
}

/// Round-trip latency as reported by the different layers, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySources {
    pub player_ping: Option<u32>,
    pub transport_ping: Option<u32>,
    pub transport_latency: Option<u32>,
}

impl LatencySources {
    /// First non-zero source in priority order. Zero means "not measured yet".
    pub fn best(&self) -> Option<u32> {
        [self.player_ping, self.transport_ping, self.transport_latency]
            .into_iter()
            .flatten()
            .find(|ms| *ms > 0)
    }
}

/// Movement restrictions for the navigator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementPolicy {
    pub can_dig: bool,
    pub allow_place: bool,
    pub scaffolding_blocks: Vec<u32>,
}

impl MovementPolicy {
    /// Walk only. Never breaks or places blocks.
    pub fn read_only() -> Self {
        Self {
            can_dig: false,
            allow_place: false,
            scaffolding_blocks: Vec::new(),
        }
    }
}

/// Goal-directed movement
#[async_trait]
pub trait Navigator: Send + Sync {
    fn configure(&self, policy: MovementPolicy);

    /// Resolves on arrival within `tolerance` blocks, errors on failure
    async fn goto(&self, target: BlockPos, tolerance: u32) -> Result<(), ActionError>;

    /// Drop the current goal
    fn stop(&self);
}

/// An opened container window
#[async_trait]
pub trait ContainerHandle: Send {
    fn items(&self) -> Vec<ItemStack>;

    async fn withdraw(&mut self, type_id: u32, metadata: u32, count: u32) -> Result<(), ActionError>;

    fn close(&mut self);
}

/// One live game session
#[async_trait]
pub trait GameSession: Send + Sync {
    fn username(&self) -> String;

    /// Own entity id, known after login
    fn entity_id(&self) -> Option<u32>;

    fn position(&self) -> Option<Vec3>;

    fn health(&self) -> Option<f32>;

    fn food(&self) -> Option<u32>;

    fn inventory(&self) -> Vec<ItemStack>;

    /// `None` when the protocol version has no registry data
    fn registry(&self) -> Option<Arc<GameRegistry>>;

    fn latency(&self) -> LatencySources;

    fn send_chat(&self, text: &str) -> Result<(), ActionError>;

    fn find_blocks(&self, block_ids: &[u32], center: Vec3, radius: u32) -> Vec<BlockPos>;

    async fn toss(&self, stack: &ItemStack) -> Result<(), ActionError>;

    /// Consume one unit of `food`; resolves when done
    async fn eat(&self, food: &ItemStack) -> Result<(), ActionError>;

    async fn open_container(&self, at: BlockPos) -> Result<Box<dyn ContainerHandle>, ActionError>;

    fn navigator(&self) -> Arc<dyn Navigator>;

    fn quit(&self, reason: &str);
}

/// Established session plus its event streams
pub struct SessionHandle {
    pub session: Arc<dyn GameSession>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    /// Low-level transport errors that bypass `SessionEvent::Error`
    pub transport_errors: mpsc::UnboundedReceiver<String>,
}

/// Factory for sessions
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, target: &ConnectTarget) -> Result<SessionHandle, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_priority() {
        let sources = LatencySources {
            player_ping: Some(120),
            transport_ping: Some(80),
            transport_latency: Some(60),
        };
        assert_eq!(sources.best(), Some(120));

        let sources = LatencySources {
            player_ping: None,
            transport_ping: Some(80),
            transport_latency: Some(60),
        };
        assert_eq!(sources.best(), Some(80));
    }

    #[test]
    fn test_latency_zero_is_absent() {
        let sources = LatencySources {
            player_ping: Some(0),
            transport_ping: None,
            transport_latency: Some(45),
        };
        assert_eq!(sources.best(), Some(45));
        assert_eq!(LatencySources::default().best(), None);
    }

    #[test]
    fn test_read_only_policy() {
        let policy = MovementPolicy::read_only();
        assert!(!policy.can_dig);
        assert!(!policy.allow_place);
        assert!(policy.scaffolding_blocks.is_empty());
    }
}
