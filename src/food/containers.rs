//! Container memory and scan cache
//!
//! Memory entries are advisory cooldowns keyed by block position. They expire
//! on their own and survive reconnects (the world layout does not change when
//! the connection drops), but not a process restart.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::session::{BlockPos, Vec3};
use crate::timers::deadline_after;

#[derive(Debug, Clone, Copy, Default)]
struct MemoryEntry {
    empty_until: Option<Instant>,
    unreachable_until: Option<Instant>,
}

impl MemoryEntry {
    fn blocked(&self, now: Instant) -> bool {
        self.empty_until.is_some_and(|t| now < t) || self.unreachable_until.is_some_and(|t| now < t)
    }
}

/// Process-wide container cooldowns, shared by clones
#[derive(Debug, Clone, Default)]
pub struct ContainerMemory {
    entries: Arc<Mutex<HashMap<BlockPos, MemoryEntry>>>,
}

impl ContainerMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_empty(&self, pos: BlockPos, cooldown: Duration, now: Instant) {
        let mut entries = self.entries.lock();
        entries.retain(|_, e| e.blocked(now));
        entries.entry(pos).or_default().empty_until = Some(deadline_after(now, cooldown));
    }

    pub fn mark_unreachable(&self, pos: BlockPos, cooldown: Duration, now: Instant) {
        let mut entries = self.entries.lock();
        entries.retain(|_, e| e.blocked(now));
        entries.entry(pos).or_default().unreachable_until = Some(deadline_after(now, cooldown));
    }

    /// False while either cooldown is running
    pub fn is_eligible(&self, pos: BlockPos, now: Instant) -> bool {
        self.entries.lock().get(&pos).map_or(true, |e| !e.blocked(now))
    }

    /// Eligible positions, nearest to `from` first
    pub fn candidates(&self, positions: &[BlockPos], from: Vec3, now: Instant) -> Vec<BlockPos> {
        let entries = self.entries.lock();
        let mut eligible: Vec<BlockPos> = positions
            .iter()
            .copied()
            .filter(|p| entries.get(p).map_or(true, |e| !e.blocked(now)))
            .collect();
        eligible.sort_by(|a, b| from.distance_to(a.center()).total_cmp(&from.distance_to(b.center())));
        eligible
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Short-lived result of a container scan
#[derive(Debug)]
pub struct ScanCache {
    ttl: Duration,
    scanned_at: Option<Instant>,
    positions: Vec<BlockPos>,
}

impl ScanCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            scanned_at: None,
            positions: Vec::new(),
        }
    }

    /// Cached positions if the scan is still fresh
    pub fn get(&self, now: Instant) -> Option<&[BlockPos]> {
        match self.scanned_at {
            Some(at) if now.duration_since(at) < self.ttl => Some(&self.positions),
            _ => None,
        }
    }

    pub fn store(&mut self, positions: Vec<BlockPos>, now: Instant) {
        self.positions = positions;
        self.scanned_at = Some(now);
    }

    pub fn invalidate(&mut self) {
        self.scanned_at = None;
    }
}
