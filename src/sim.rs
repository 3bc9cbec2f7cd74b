//! In-memory game world
//!
//! Implements every capability trait against a scripted world so the whole
//! orchestrator can run without a server: `afkbot --simulate` and the
//! integration tests drive it. Timing uses `tokio::time`, so tests running on
//! a paused clock see deterministic durations.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{ActionError, ProbeError, SessionError};
use crate::probe::{LivenessProbe, ServerStatus};
use crate::session::{
    BlockPos, ConnectTarget, ContainerHandle, FoodInfo, GameRegistry, GameSession, ItemStack, LatencySources,
    MovementPolicy, Navigator, SessionConnector, SessionEvent, SessionHandle, Vec3,
};

/// Entity id of the agent itself
pub const SELF_ENTITY: u32 = 1;

const EAT_DURATION: Duration = Duration::from_millis(1600);
const OPEN_DURATION: Duration = Duration::from_millis(200);
const WALK_PER_BLOCK: Duration = Duration::from_millis(250);
const NO_PATH_AFTER: Duration = Duration::from_millis(500);

const ITEMS: &[(u32, &str)] = &[
    (1, "apple"),
    (2, "bread"),
    (3, "cooked_beef"),
    (4, "golden_apple"),
    (5, "rotten_flesh"),
    (6, "spider_eye"),
    (7, "pufferfish"),
    (8, "cobblestone"),
    (9, "poisonous_potato"),
    (10, "chicken"),
];

/// Registry shaped like a recent game version
pub fn standard_registry() -> GameRegistry {
    GameRegistry::new()
        .with_effect("slowness", 2)
        .with_effect("mining_fatigue", 4)
        .with_effect("instant_damage", 7)
        .with_effect("nausea", 9)
        .with_effect("regeneration", 10)
        .with_effect("blindness", 15)
        .with_effect("hunger", 17)
        .with_effect("weakness", 18)
        .with_effect("poison", 19)
        .with_effect("wither", 20)
        .with_effect("absorption", 22)
        .with_effect("unluck", 27)
        .with_effect("bad_omen", 31)
        .with_effect("darkness", 33)
        .with_food(1, "apple", FoodInfo::new(4, 2.4))
        .with_food(2, "bread", FoodInfo::new(5, 6.0))
        .with_food(3, "cooked_beef", FoodInfo::new(8, 12.8))
        .with_food(
            4,
            "golden_apple",
            FoodInfo::new(4, 9.6).with_effect(10, 1.0).with_effect(22, 1.0),
        )
        .with_food(5, "rotten_flesh", FoodInfo::new(4, 0.8).with_effect(17, 0.8))
        .with_food(6, "spider_eye", FoodInfo::new(2, 3.2).with_effect(19, 1.0))
        .with_food(
            7,
            "pufferfish",
            FoodInfo::new(1, 0.2)
                .with_effect(17, 1.0)
                .with_effect(9, 1.0)
                .with_effect(19, 1.0),
        )
        .with_item(8, "cobblestone")
        .with_food(9, "poisonous_potato", FoodInfo::new(2, 1.2).with_effect(19, 0.6))
        .with_food(10, "chicken", FoodInfo::new(2, 1.2).with_effect(17, 0.3))
        .with_block("chest", 54)
        .with_block("trapped_chest", 146)
        .with_block("barrel", 1208)
}

fn add_to(items: &mut Vec<ItemStack>, stack: ItemStack) {
    match items
        .iter_mut()
        .find(|s| s.type_id == stack.type_id && s.metadata == stack.metadata)
    {
        Some(existing) => existing.count += stack.count,
        None => items.push(stack),
    }
}

struct SimContainer {
    kind: String,
    items: Vec<ItemStack>,
}

struct WorldState {
    online: bool,
    position: Option<Vec3>,
    health: f32,
    food: u32,
    inventory: Vec<ItemStack>,
    containers: HashMap<BlockPos, SimContainer>,
    blocked: HashSet<BlockPos>,
    ping: Option<u32>,
    eat_failure: Option<String>,
    chat_log: Vec<String>,
    tossed: Vec<ItemStack>,
    connect_times: Vec<Instant>,
    probe_times: Vec<Instant>,
    policy: Option<MovementPolicy>,
    quits: u32,
    generation: u64,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    transport: Option<mpsc::UnboundedSender<String>>,
}

/// Shared handle to the simulated world
#[derive(Clone)]
pub struct SimWorld {
    state: Arc<Mutex<WorldState>>,
    registry: Arc<GameRegistry>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    /// Online server, agent at (0.5, 64, 0.5), full health and food, empty inventory
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WorldState {
                online: true,
                position: Some(Vec3::new(0.5, 64.0, 0.5)),
                health: 20.0,
                food: 20,
                inventory: Vec::new(),
                containers: HashMap::new(),
                blocked: HashSet::new(),
                ping: Some(40),
                eat_failure: None,
                chat_log: Vec::new(),
                tossed: Vec::new(),
                connect_times: Vec::new(),
                probe_times: Vec::new(),
                policy: None,
                quits: 0,
                generation: 0,
                events: None,
                transport: None,
            })),
            registry: Arc::new(standard_registry()),
        }
    }

    pub fn registry(&self) -> Arc<GameRegistry> {
        self.registry.clone()
    }

    /// Stack of a known item; unknown names get id 0
    pub fn stack(&self, name: &str, count: u32) -> ItemStack {
        let type_id = ITEMS.iter().find(|(_, n)| *n == name).map_or(0, |(id, _)| *id);
        ItemStack::new(type_id, name, count)
    }

    // ---- setup ----

    pub fn set_online(&self, online: bool) {
        self.state.lock().online = online;
    }

    pub fn set_food(&self, food: u32) {
        self.state.lock().food = food.min(20);
        self.emit(SessionEvent::HealthChanged);
    }

    pub fn set_health(&self, health: f32) {
        self.state.lock().health = health;
        self.emit(SessionEvent::HealthChanged);
    }

    pub fn set_ping(&self, ping: Option<u32>) {
        self.state.lock().ping = ping;
    }

    pub fn set_position(&self, position: Vec3) {
        self.state.lock().position = Some(position);
    }

    pub fn clear_position(&self) {
        self.state.lock().position = None;
    }

    pub fn give(&self, stack: ItemStack) {
        add_to(&mut self.state.lock().inventory, stack);
    }

    pub fn place_container(&self, at: BlockPos, kind: &str, items: Vec<ItemStack>) {
        self.state.lock().containers.insert(
            at,
            SimContainer {
                kind: kind.to_string(),
                items,
            },
        );
    }

    /// Navigation to `at` fails with no path
    pub fn block_path(&self, at: BlockPos) {
        self.state.lock().blocked.insert(at);
    }

    /// Every eat invocation is rejected with `reason`
    pub fn fail_eating(&self, reason: Option<&str>) {
        self.state.lock().eat_failure = reason.map(str::to_string);
    }

    // ---- inspection ----

    pub fn chat_log(&self) -> Vec<String> {
        self.state.lock().chat_log.clone()
    }

    pub fn inventory_count(&self, name: &str) -> u32 {
        self.state
            .lock()
            .inventory
            .iter()
            .filter(|s| s.name == name)
            .map(|s| s.count)
            .sum()
    }

    pub fn container_count(&self, at: BlockPos, name: &str) -> u32 {
        self.state.lock().containers.get(&at).map_or(0, |c| {
            c.items.iter().filter(|s| s.name == name).map(|s| s.count).sum()
        })
    }

    pub fn position(&self) -> Vec3 {
        self.state.lock().position.unwrap_or_default()
    }

    pub fn food(&self) -> u32 {
        self.state.lock().food
    }

    pub fn tossed(&self) -> Vec<ItemStack> {
        self.state.lock().tossed.clone()
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.state.lock().connect_times.clone()
    }

    pub fn probe_times(&self) -> Vec<Instant> {
        self.state.lock().probe_times.clone()
    }

    pub fn movement_policy(&self) -> Option<MovementPolicy> {
        self.state.lock().policy.clone()
    }

    pub fn quits(&self) -> u32 {
        self.state.lock().quits
    }

    // ---- injection ----

    /// Deliver an event to the live session, if any
    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.state.lock().events {
            let _ = tx.send(event);
        }
    }

    pub fn transport_error(&self, message: &str) {
        if let Some(tx) = &self.state.lock().transport {
            let _ = tx.send(message.to_string());
        }
    }

    /// Someone drops `stack` and `collector` picks it up
    pub fn drop_item_for_pickup(&self, collector: u32, stack: ItemStack) {
        if collector == SELF_ENTITY {
            self.give(stack.clone());
        }
        self.emit(SessionEvent::ItemCollected {
            collector,
            item: Some(stack),
        });
    }

    /// Server kicks the agent: `kicked` then `end`, then the stream closes
    pub fn kick(&self, reason: &str) {
        self.emit(SessionEvent::Kicked(reason.to_string()));
        self.end_session(reason);
    }

    pub fn end_session(&self, reason: &str) {
        self.emit(SessionEvent::Ended(reason.to_string()));
        let mut state = self.state.lock();
        state.events = None;
        state.transport = None;
    }

    /// Drain one food point every `every`
    pub fn spawn_hunger_drain(&self, every: Duration) -> JoinHandle<()> {
        let world = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                let food = world.food();
                world.set_food(food.saturating_sub(1));
            }
        })
    }

    // ---- capability plumbing ----

    /// Open a session directly: queues `Login` and `Spawn`
    pub fn open_session(&self) -> SessionHandle {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (transport_tx, transport_errors) = mpsc::unbounded_channel();
        let _ = events_tx.send(SessionEvent::Login);
        let _ = events_tx.send(SessionEvent::Spawn);

        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.events = Some(events_tx);
            state.transport = Some(transport_tx);
            state.generation
        };

        SessionHandle {
            session: Arc::new(SimSession {
                world: self.clone(),
                navigator: Arc::new(SimNavigator { world: self.clone() }),
                generation,
            }),
            events,
            transport_errors,
        }
    }

    pub fn connector(&self) -> SimConnector {
        SimConnector { world: self.clone() }
    }

    pub fn probe(&self) -> SimProbe {
        SimProbe { world: self.clone() }
    }
}

pub struct SimConnector {
    world: SimWorld,
}

#[async_trait]
impl SessionConnector for SimConnector {
    async fn connect(&self, _target: &ConnectTarget) -> Result<SessionHandle, SessionError> {
        {
            let mut state = self.world.state.lock();
            state.connect_times.push(Instant::now());
            if !state.online {
                return Err(SessionError::Connect("connection refused".into()));
            }
        }
        Ok(self.world.open_session())
    }
}

pub struct SimProbe {
    world: SimWorld,
}

#[async_trait]
impl LivenessProbe for SimProbe {
    async fn probe(&self, _target: &ConnectTarget) -> Result<ServerStatus, ProbeError> {
        let mut state = self.world.state.lock();
        state.probe_times.push(Instant::now());
        if !state.online {
            return Err(ProbeError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connect ECONNREFUSED",
            )));
        }
        Ok(ServerStatus {
            version_name: "sim".into(),
            protocol: 0,
            online_players: 1,
            max_players: 20,
            latency: state.ping.map(|ms| Duration::from_millis(ms as u64)),
        })
    }
}

pub struct SimNavigator {
    world: SimWorld,
}

#[async_trait]
impl Navigator for SimNavigator {
    fn configure(&self, policy: MovementPolicy) {
        self.world.state.lock().policy = Some(policy);
    }

    async fn goto(&self, target: BlockPos, _tolerance: u32) -> Result<(), ActionError> {
        let (blocked, from) = {
            let state = self.world.state.lock();
            (state.blocked.contains(&target), state.position)
        };
        if blocked {
            tokio::time::sleep(NO_PATH_AFTER).await;
            return Err(ActionError::NoPath(target.to_string()));
        }
        let Some(from) = from else {
            return Err(ActionError::Unavailable("position"));
        };

        let blocks = from.distance_to(target.center()).max(0.2);
        tokio::time::sleep(WALK_PER_BLOCK.mul_f64(blocks)).await;
        self.world.state.lock().position = Some(target.center());
        Ok(())
    }

    fn stop(&self) {}
}

pub struct SimContainerHandle {
    world: SimWorld,
    at: BlockPos,
}

#[async_trait]
impl ContainerHandle for SimContainerHandle {
    fn items(&self) -> Vec<ItemStack> {
        self.world
            .state
            .lock()
            .containers
            .get(&self.at)
            .map(|c| c.items.clone())
            .unwrap_or_default()
    }

    async fn withdraw(&mut self, type_id: u32, metadata: u32, count: u32) -> Result<(), ActionError> {
        let mut state = self.world.state.lock();
        let container = state
            .containers
            .get_mut(&self.at)
            .ok_or_else(|| ActionError::Rejected("container gone".into()))?;
        let idx = container
            .items
            .iter()
            .position(|s| s.type_id == type_id && s.metadata == metadata && s.count >= count)
            .ok_or_else(|| ActionError::Rejected("not enough items".into()))?;

        let mut taken = container.items[idx].clone();
        container.items[idx].count -= count;
        if container.items[idx].count == 0 {
            container.items.remove(idx);
        }
        taken.count = count;
        add_to(&mut state.inventory, taken);
        Ok(())
    }

    fn close(&mut self) {}
}

pub struct SimSession {
    world: SimWorld,
    navigator: Arc<SimNavigator>,
    generation: u64,
}

#[async_trait]
impl GameSession for SimSession {
    fn username(&self) -> String {
        "_AfkBot".to_string()
    }

    fn entity_id(&self) -> Option<u32> {
        Some(SELF_ENTITY)
    }

    fn position(&self) -> Option<Vec3> {
        self.world.state.lock().position
    }

    fn health(&self) -> Option<f32> {
        Some(self.world.state.lock().health)
    }

    fn food(&self) -> Option<u32> {
        Some(self.world.state.lock().food)
    }

    fn inventory(&self) -> Vec<ItemStack> {
        self.world.state.lock().inventory.clone()
    }

    fn registry(&self) -> Option<Arc<GameRegistry>> {
        Some(self.world.registry.clone())
    }

    fn latency(&self) -> LatencySources {
        LatencySources {
            player_ping: self.world.state.lock().ping,
            transport_ping: None,
            transport_latency: None,
        }
    }

    fn send_chat(&self, text: &str) -> Result<(), ActionError> {
        self.world.state.lock().chat_log.push(text.to_string());
        Ok(())
    }

    fn find_blocks(&self, block_ids: &[u32], center: Vec3, radius: u32) -> Vec<BlockPos> {
        let state = self.world.state.lock();
        state
            .containers
            .iter()
            .filter(|(_, c)| {
                self.world
                    .registry
                    .block_by_name(&c.kind)
                    .is_some_and(|id| block_ids.contains(&id))
            })
            .filter(|(pos, _)| center.distance_to(pos.center()) <= radius as f64)
            .map(|(pos, _)| *pos)
            .collect()
    }

    async fn toss(&self, stack: &ItemStack) -> Result<(), ActionError> {
        let mut state = self.world.state.lock();
        let idx = state
            .inventory
            .iter()
            .position(|s| s.type_id == stack.type_id)
            .ok_or_else(|| ActionError::Rejected(format!("no {} to toss", stack.name)))?;
        let removed = state.inventory.remove(idx);
        state.tossed.push(removed);
        Ok(())
    }

    async fn eat(&self, food: &ItemStack) -> Result<(), ActionError> {
        let failure = self.world.state.lock().eat_failure.clone();
        if let Some(reason) = failure {
            self.world.emit(SessionEvent::EatFailed(reason.clone()));
            return Err(ActionError::Rejected(reason));
        }

        self.world.emit(SessionEvent::EatStarted);
        tokio::time::sleep(EAT_DURATION).await;

        let points = self
            .world
            .registry
            .food_by_name(&food.name)
            .map_or(0, |f| f.food_points);
        {
            let mut state = self.world.state.lock();
            let Some(idx) = state.inventory.iter().position(|s| s.type_id == food.type_id) else {
                drop(state);
                self.world.emit(SessionEvent::EatStopped);
                return Err(ActionError::Rejected(format!("no {} left", food.name)));
            };
            state.inventory[idx].count -= 1;
            if state.inventory[idx].count == 0 {
                state.inventory.remove(idx);
            }
            state.food = (state.food + points).min(20);
            state.health = (state.health + 1.0).min(20.0);
        }

        self.world.emit(SessionEvent::HealthChanged);
        self.world.emit(SessionEvent::EatFinished);
        Ok(())
    }

    async fn open_container(&self, at: BlockPos) -> Result<Box<dyn ContainerHandle>, ActionError> {
        if !self.world.state.lock().containers.contains_key(&at) {
            return Err(ActionError::Rejected(format!("no container at {}", at)));
        }
        tokio::time::sleep(OPEN_DURATION).await;
        Ok(Box::new(SimContainerHandle {
            world: self.world.clone(),
            at,
        }))
    }

    fn navigator(&self) -> Arc<dyn Navigator> {
        self.navigator.clone()
    }

    fn quit(&self, _reason: &str) {
        let mut state = self.world.state.lock();
        state.quits += 1;
        if state.generation == self.generation {
            state.events = None;
            state.transport = None;
        }
    }
}
