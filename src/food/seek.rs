//! Autonomous container search
//!
//! Runs as one background task per search. It owns no agent state: it reads
//! the session, writes container memory and reports back with a
//! [`SeekReport`]. The agent always heads back to the origin before the
//! report is produced.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::containers::{ContainerMemory, ScanCache};
use super::safety::FoodSafety;
use crate::config::ChestScanConfig;
use crate::logging::ThrottledLogger;
use crate::session::{BlockPos, GameSession, ItemStack};
use crate::timers::{bounded, deadline_after};

const REACH_TOLERANCE: u32 = 2;
const HOME_TOLERANCE: u32 = 1;
const WANDER_FAIL_PAUSE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeekOutcome {
    Found {
        item: String,
        container: BlockPos,
        left_behind: u32,
    },
    /// Max search duration elapsed without food
    Exhausted,
    /// Own position unknown, nothing was attempted
    NoPosition,
}

#[derive(Debug, Clone)]
pub struct SeekReport {
    pub outcome: SeekOutcome,
    pub origin: Option<BlockPos>,
    pub visited: u32,
    pub wander_steps: u32,
    pub returned_home: bool,
    pub elapsed: Duration,
}

impl SeekReport {
    pub fn found(&self) -> bool {
        matches!(self.outcome, SeekOutcome::Found { .. })
    }
}

/// First safe-edible stack with more than one unit.
///
/// Taking one unit from such a stack always leaves one behind.
pub fn pick_withdrawal<'a>(items: &'a [ItemStack], safety: &FoodSafety) -> Option<&'a ItemStack> {
    items.iter().find(|s| s.count > 1 && safety.is_safe_edible(&s.name))
}

/// Random horizontal offset within `step`, never zero
pub fn wander_offset(step: u32) -> (i32, i32) {
    let step = step.max(1) as i32;
    let mut rng = rand::thread_rng();
    loop {
        let dx = rng.gen_range(-step..=step);
        let dz = rng.gen_range(-step..=step);
        if dx != 0 || dz != 0 {
            return (dx, dz);
        }
    }
}

pub struct ChestSeeker {
    session: Arc<dyn GameSession>,
    safety: FoodSafety,
    memory: ContainerMemory,
    config: ChestScanConfig,
    logger: ThrottledLogger,
    log_interval: Duration,
}

impl ChestSeeker {
    pub fn new(
        session: Arc<dyn GameSession>,
        safety: FoodSafety,
        memory: ContainerMemory,
        config: ChestScanConfig,
        logger: ThrottledLogger,
        log_interval: Duration,
    ) -> Self {
        Self {
            session,
            safety,
            memory,
            config,
            logger,
            log_interval,
        }
    }

    fn container_ids(&self) -> Vec<u32> {
        let Some(registry) = self.session.registry() else {
            return Vec::new();
        };
        self.config
            .container_blocks
            .iter()
            .filter_map(|name| registry.block_by_name(name))
            .collect()
    }

    /// Search until food is found or time runs out, then go home
    pub async fn run(self) -> SeekReport {
        let start = Instant::now();
        let deadline = deadline_after(start, self.config.max_seek_duration());
        let origin = self.session.position().map(|p| p.block());

        let mut report = SeekReport {
            outcome: SeekOutcome::Exhausted,
            origin,
            visited: 0,
            wander_steps: 0,
            returned_home: false,
            elapsed: Duration::ZERO,
        };

        if origin.is_none() {
            report.outcome = SeekOutcome::NoPosition;
            return report;
        }

        let ids = self.container_ids();
        let mut cache = ScanCache::new(self.config.scan_ttl());

        'search: while Instant::now() < deadline {
            let Some(here) = self.session.position() else {
                break;
            };

            let now = Instant::now();
            let positions = match cache.get(now) {
                Some(cached) => cached.to_vec(),
                None => {
                    let found = if ids.is_empty() {
                        Vec::new()
                    } else {
                        self.session.find_blocks(&ids, here, self.config.radius)
                    };
                    cache.store(found.clone(), now);
                    found
                }
            };

            let candidates = self.memory.candidates(&positions, here, now);
            if candidates.is_empty() {
                report.wander_steps += 1;
                self.wander(here.block()).await;
                cache.invalidate();
                continue;
            }

            for pos in candidates {
                if Instant::now() >= deadline {
                    break 'search;
                }
                report.visited += 1;
                if let Some(found) = self.visit(pos).await {
                    report.outcome = found;
                    break 'search;
                }
            }
        }

        if let Some(home) = origin {
            report.returned_home = self.return_home(home).await;
        }
        report.elapsed = start.elapsed();
        report
    }

    async fn wander(&self, from: BlockPos) {
        let (dx, dz) = wander_offset(self.config.wander_step_blocks);
        let target = from.offset(dx, 0, dz);
        let nav = self.session.navigator();
        debug!("Wandering to {} to find containers", target);

        if let Err(e) = bounded("wander", self.config.wander_timeout(), nav.goto(target, HOME_TOLERANCE)).await {
            nav.stop();
            debug!("Wander step failed: {}", e);
            tokio::time::sleep(WANDER_FAIL_PAUSE).await;
        }
    }

    async fn visit(&self, pos: BlockPos) -> Option<SeekOutcome> {
        let nav = self.session.navigator();
        if let Err(e) = bounded("navigate", self.config.hop_timeout(), nav.goto(pos, REACH_TOLERANCE)).await {
            nav.stop();
            self.memory
                .mark_unreachable(pos, self.config.unreachable_cooldown(), Instant::now());
            self.logger.info(
                "seek-unreachable",
                &format!("Container at {} unreachable: {}.", pos, e),
                self.log_interval,
            );
            return None;
        }

        let mut handle = match bounded("open", self.config.open_timeout(), self.session.open_container(pos)).await {
            Ok(handle) => handle,
            Err(e) => {
                self.memory
                    .mark_unreachable(pos, self.config.unreachable_cooldown(), Instant::now());
                self.logger.info(
                    "seek-open",
                    &format!("Could not open container at {}: {}.", pos, e),
                    self.log_interval,
                );
                return None;
            }
        };

        let items = handle.items();
        let outcome = match pick_withdrawal(&items, &self.safety).cloned() {
            None => {
                self.memory
                    .mark_empty(pos, self.config.empty_cooldown(), Instant::now());
                self.logger.info(
                    "seek-empty",
                    &format!("Container at {} has no spare safe food.", pos),
                    self.log_interval,
                );
                None
            }
            Some(stack) => {
                let withdrawal = handle.withdraw(stack.type_id, stack.metadata, 1);
                match bounded("withdraw", self.config.open_timeout(), withdrawal).await {
                    Ok(()) => Some(SeekOutcome::Found {
                        item: stack.name.clone(),
                        container: pos,
                        left_behind: stack.count - 1,
                    }),
                    Err(e) => {
                        self.memory
                            .mark_unreachable(pos, self.config.unreachable_cooldown(), Instant::now());
                        self.logger.info(
                            "seek-withdraw",
                            &format!("Withdraw from {} failed: {}.", pos, e),
                            self.log_interval,
                        );
                        None
                    }
                }
            }
        };

        handle.close();
        outcome
    }

    async fn return_home(&self, home: BlockPos) -> bool {
        let nav = self.session.navigator();
        match bounded("return", self.config.hop_timeout(), nav.goto(home, HOME_TOLERANCE)).await {
            Ok(()) => true,
            Err(e) => {
                nav.stop();
                self.logger.warn(
                    "seek-return",
                    &format!("Could not return to origin {}: {}.", home, e),
                    self.log_interval,
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FoodInfo, GameRegistry};
    use crate::sim::SimWorld;

    fn safety_for(world: &SimWorld) -> FoodSafety {
        FoodSafety::resolve(&["rotten_flesh".to_string()], &["poison".to_string()], Some(world.registry()))
    }

    fn seeker(world: &SimWorld, memory: &ContainerMemory, config: ChestScanConfig) -> ChestSeeker {
        let handle = world.open_session();
        ChestSeeker::new(
            handle.session,
            safety_for(world),
            memory.clone(),
            config,
            ThrottledLogger::new(),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_pick_withdrawal_leaves_one() {
        let registry = Arc::new(
            GameRegistry::new()
                .with_effect("poison", 19)
                .with_food(1, "bread", FoodInfo::new(5, 6.0))
                .with_food(2, "apple", FoodInfo::new(4, 2.4))
                .with_food(3, "spider_eye", FoodInfo::new(2, 3.2).with_effect(19, 1.0)),
        );
        let safety = FoodSafety::resolve(&[], &["poison".to_string()], Some(registry));

        let items = vec![
            ItemStack::new(3, "spider_eye", 10),
            ItemStack::new(1, "bread", 1),
            ItemStack::new(2, "apple", 3),
        ];
        assert_eq!(pick_withdrawal(&items, &safety).map(|s| s.name.as_str()), Some("apple"));
        assert!(pick_withdrawal(&items[..2], &safety).is_none());
    }

    #[test]
    fn test_wander_offset_never_zero() {
        for _ in 0..200 {
            let (dx, dz) = wander_offset(1);
            assert!(dx != 0 || dz != 0);
            assert!(dx.abs() <= 1 && dz.abs() <= 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_finds_bread_and_returns() {
        let world = SimWorld::new();
        let chest = BlockPos::new(4, 64, 2);
        world.place_container(chest, "chest", vec![world.stack("bread", 3)]);

        let memory = ContainerMemory::new();
        let report = seeker(&world, &memory, ChestScanConfig::default()).run().await;

        assert_eq!(
            report.outcome,
            SeekOutcome::Found {
                item: "bread".into(),
                container: chest,
                left_behind: 2
            }
        );
        assert!(report.returned_home);
        assert_eq!(world.container_count(chest, "bread"), 2);
        assert_eq!(world.inventory_count("bread"), 1);
        assert_eq!(Some(world.position().block()), report.origin);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_container_is_remembered() {
        let world = SimWorld::new();
        let chest = BlockPos::new(3, 64, 0);
        world.place_container(
            chest,
            "barrel",
            vec![world.stack("bread", 1), world.stack("rotten_flesh", 20)],
        );

        let memory = ContainerMemory::new();
        let config = ChestScanConfig {
            max_seek_duration_ms: 20_000,
            ..ChestScanConfig::default()
        };
        let report = seeker(&world, &memory, config).run().await;

        assert_eq!(report.outcome, SeekOutcome::Exhausted);
        assert_eq!(report.visited, 1);
        assert!(report.wander_steps > 0);
        assert!(!memory.is_eligible(chest, Instant::now()));
        assert_eq!(world.container_count(chest, "bread"), 1);
        assert!(report.returned_home);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_container_marked_unreachable() {
        let world = SimWorld::new();
        let blocked = BlockPos::new(-5, 64, 0);
        let open = BlockPos::new(9, 64, 0);
        world.place_container(blocked, "chest", vec![world.stack("cooked_beef", 8)]);
        world.place_container(open, "chest", vec![world.stack("apple", 2)]);
        world.block_path(blocked);

        let memory = ContainerMemory::new();
        let report = seeker(&world, &memory, ChestScanConfig::default()).run().await;

        assert_eq!(report.visited, 2);
        assert!(!memory.is_eligible(blocked, Instant::now()));
        assert!(matches!(report.outcome, SeekOutcome::Found { ref item, .. } if item == "apple"));
        assert_eq!(world.container_count(blocked, "cooked_beef"), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_position_does_nothing() {
        let world = SimWorld::new();
        world.clear_position();
        let memory = ContainerMemory::new();
        let report = seeker(&world, &memory, ChestScanConfig::default()).run().await;
        assert_eq!(report.outcome, SeekOutcome::NoPosition);
        assert!(!report.returned_home);
    }
}
