//! Orchestrator Integration Tests
//!
//! Full agent runs against the simulated world on a paused clock.

use afkbot::session::BlockPos;
use afkbot::sim::SELF_ENTITY;
use afkbot::{Config, MessagePools, Orchestrator, SimWorld};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

fn test_pools() -> MessagePools {
    MessagePools {
        food_request: vec!["Food please?".into()],
        thank_you: vec!["Thanks!".into()],
        rejection: vec!["No thanks".into()],
        need_more: vec!["More please?".into()],
    }
}

struct Harness {
    start: Instant,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    fn start(world: &SimWorld, config: Config) -> Self {
        let orchestrator = Orchestrator::with_pools(
            config,
            test_pools(),
            Arc::new(world.connector()),
            Arc::new(world.probe()),
        );
        Self::spawn(orchestrator)
    }

    fn spawn(orchestrator: Orchestrator) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let start = Instant::now();
        let handle = tokio::spawn(orchestrator.run(rx));
        Self {
            start,
            shutdown,
            handle,
        }
    }

    async fn at(&self, secs: f64) {
        sleep_until(self.start + Duration::from_secs_f64(secs)).await;
    }

    fn offsets(&self, times: &[Instant]) -> Vec<u64> {
        times
            .iter()
            .map(|t| t.duration_since(self.start).as_secs())
            .collect()
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_settles_into_idle_with_read_only_movement() {
    let world = SimWorld::new();
    world.give(world.stack("bread", 10));
    let h = Harness::start(&world, Config::default());

    h.at(2.0).await;
    assert!(world.chat_log().is_empty());
    assert_eq!(world.movement_policy().map(|p| p.can_dig), Some(false));

    h.at(4.0).await;
    assert_eq!(world.chat_log(), vec!["/afk"]);
    assert_eq!(h.offsets(&world.probe_times()), vec![0]);
    assert_eq!(h.offsets(&world.connect_times()), vec![0]);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_offline_backoff_doubles_then_resets() {
    let world = SimWorld::new();
    world.set_online(false);
    let h = Harness::start(&world, Config::default());

    h.at(140.0).await;
    assert_eq!(h.offsets(&world.probe_times()), vec![0, 5, 15, 35, 75, 135]);
    assert!(world.connect_times().is_empty());

    world.set_online(true);
    h.at(196.0).await;
    assert_eq!(h.offsets(&world.connect_times()), vec![195]);

    // Backoff restarts from base after a successful probe
    world.set_online(false);
    world.end_session("socketClosed");
    h.at(300.0).await;
    assert_eq!(
        h.offsets(&world.probe_times()),
        vec![0, 5, 15, 35, 75, 135, 195, 199, 204, 214, 234, 274]
    );
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_throttled_kick_waits_longer() {
    let world = SimWorld::new();
    world.give(world.stack("bread", 10));
    let h = Harness::start(&world, Config::default());

    h.at(5.0).await;
    world.kick(r#"{"text":"Connection throttled! Please wait before reconnecting."}"#);

    h.at(34.0).await;
    assert_eq!(world.connect_times().len(), 1);

    h.at(36.0).await;
    assert_eq!(h.offsets(&world.connect_times()), vec![0, 35]);
    assert_eq!(world.quits(), 1);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_session_end_reconnects_and_idles_again() {
    let world = SimWorld::new();
    world.give(world.stack("bread", 10));
    let h = Harness::start(&world, Config::default());

    h.at(10.0).await;
    world.end_session("socketClosed");

    h.at(15.0).await;
    assert_eq!(h.offsets(&world.connect_times()), vec![0, 13]);
    assert_eq!(world.chat_log(), vec!["/afk"]);

    h.at(17.0).await;
    assert_eq!(world.chat_log(), vec!["/afk", "/afk"]);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_reconnects_once() {
    let world = SimWorld::new();
    world.give(world.stack("bread", 10));
    let h = Harness::start(&world, Config::default());

    h.at(10.0).await;
    world.transport_error("PartialReadError: Unexpected buffer end while reading VarInt");
    world.transport_error("PartialReadError: Unexpected buffer end while reading VarInt");

    h.at(14.0).await;
    assert_eq!(h.offsets(&world.connect_times()), vec![0, 13]);
    // The old session is closed before the new one opens
    assert_eq!(world.quits(), 1);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_silences_old_session() {
    let world = SimWorld::new();
    let h = Harness::start(&world, Config::default());

    // The food request is waiting out the chat cooldown when the link drops
    h.at(4.0).await;
    world.transport_error("read ECONNRESET");

    h.at(6.5).await;
    assert_eq!(world.chat_log(), vec!["/afk"]);
    assert_eq!(world.quits(), 1);
    assert_eq!(h.offsets(&world.connect_times()), vec![0]);

    h.at(12.0).await;
    assert_eq!(h.offsets(&world.connect_times()), vec![0, 7]);
    assert_eq!(world.chat_log(), vec!["/afk", "/afk", "Food please?"]);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_unsafe_delivery_is_rejected_and_tossed() {
    let world = SimWorld::new();
    world.give(world.stack("bread", 10));
    let h = Harness::start(&world, Config::default());

    h.at(5.0).await;
    world.drop_item_for_pickup(SELF_ENTITY, world.stack("spider_eye", 1));

    h.at(7.0).await;
    assert_eq!(world.chat_log(), vec!["/afk", "No thanks (negative effects)."]);
    assert_eq!(world.inventory_count("spider_eye"), 0);
    assert!(world.tossed().iter().any(|s| s.name == "spider_eye"));

    // Items picked up by someone else are ignored
    world.drop_item_for_pickup(SELF_ENTITY + 1, world.stack("rotten_flesh", 1));
    h.at(10.0).await;
    assert_eq!(world.chat_log().len(), 2);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_food_solicitation_sequence() {
    let world = SimWorld::new();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("messages.json");
    std::fs::write(
        &path,
        r#"{
            "foodRequest": ["Food please?"],
            "thankYou": ["Thanks!"],
            "rejection": ["No thanks"],
            "needMore": ["More please?"]
        }"#,
    )
    .unwrap();
    let config = Config {
        messages_path: path,
        ..Config::default()
    };
    let orchestrator = Orchestrator::new(config, Arc::new(world.connector()), Arc::new(world.probe()));
    let h = Harness::spawn(orchestrator);

    h.at(4.0).await;
    assert_eq!(world.chat_log(), vec!["/afk"]);

    h.at(5.0).await;
    assert_eq!(world.chat_log(), vec!["/afk", "Food please?"]);

    h.at(10.0).await;
    world.drop_item_for_pickup(SELF_ENTITY, world.stack("bread", 3));

    h.at(12.0).await;
    assert_eq!(
        world.chat_log(),
        vec!["/afk", "Food please?", "Thanks!", "More please?"]
    );

    // The interval restarts from the delivery
    h.at(50.0).await;
    assert_eq!(world.chat_log().len(), 4);
    h.at(56.0).await;
    assert_eq!(world.chat_log().len(), 5);

    h.at(60.0).await;
    world.drop_item_for_pickup(SELF_ENTITY, world.stack("bread", 3));

    h.at(200.0).await;
    assert_eq!(
        world.chat_log(),
        vec![
            "/afk",
            "Food please?",
            "Thanks!",
            "More please?",
            "Food please?",
            "Thanks!"
        ]
    );
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_need_more_dropped_when_second_delivery_covers_it() {
    let world = SimWorld::new();
    let h = Harness::start(&world, Config::default());

    h.at(10.0).await;
    world.drop_item_for_pickup(SELF_ENTITY, world.stack("bread", 3));
    h.at(10.5).await;
    world.drop_item_for_pickup(SELF_ENTITY, world.stack("bread", 3));

    h.at(20.0).await;
    assert_eq!(world.inventory_count("bread"), 6);
    assert_eq!(world.chat_log(), vec!["/afk", "Food please?", "Thanks!"]);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_request_dropped_when_food_arrives_during_cooldown() {
    let world = SimWorld::new();
    let h = Harness::start(&world, Config::default());

    h.at(3.2).await;
    world.drop_item_for_pickup(SELF_ENTITY, world.stack("bread", 6));

    h.at(60.0).await;
    assert_eq!(world.chat_log(), vec!["/afk"]);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_hunger_triggers_one_eat() {
    let world = SimWorld::new();
    world.give(world.stack("bread", 10));
    let h = Harness::start(&world, Config::default());

    h.at(5.0).await;
    world.set_food(8);

    h.at(10.0).await;
    assert_eq!(world.inventory_count("bread"), 9);
    assert_eq!(world.food(), 13);
    assert_eq!(world.chat_log(), vec!["/afk", "/afk"]);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_chest_search_takes_one_and_returns_home() {
    let world = SimWorld::new();
    let chest = BlockPos::new(4, 64, 2);
    world.place_container(chest, "chest", vec![world.stack("bread", 3)]);

    let mut config = Config::default();
    config.chest_scan.enabled = true;
    config.low_food_threshold_items = 1;
    let h = Harness::start(&world, config);

    h.at(20.0).await;
    assert_eq!(world.container_count(chest, "bread"), 2);
    assert_eq!(world.inventory_count("bread"), 1);
    assert_eq!(world.position().block(), BlockPos::new(0, 64, 0));
    assert_eq!(world.chat_log(), vec!["/afk", "/afk"]);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_eats_during_fruitless_chest_search() {
    let world = SimWorld::new();
    world.give(world.stack("bread", 5));
    let mut config = Config::default();
    config.chest_scan.enabled = true;
    let h = Harness::start(&world, config);

    h.at(5.0).await;
    world.set_food(2);

    h.at(10.0).await;
    assert_eq!(world.inventory_count("bread"), 4);
    assert_eq!(world.food(), 7);

    // Still hungry; the next attempt follows the search settling
    h.at(100.0).await;
    assert_eq!(world.inventory_count("bread"), 3);
    assert_eq!(world.food(), 12);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_high_latency_defers_chest_search() {
    let world = SimWorld::new();
    world.set_ping(Some(500));
    let chest = BlockPos::new(4, 64, 2);
    world.place_container(chest, "chest", vec![world.stack("bread", 3)]);

    let mut config = Config::default();
    config.chest_scan.enabled = true;
    config.low_food_threshold_items = 1;
    config.afk_delay_ms = 20_000;
    let h = Harness::start(&world, config);

    h.at(22.0).await;
    world.set_ping(Some(40));

    // Recovery waits out the hold window
    h.at(42.0).await;
    assert_eq!(world.container_count(chest, "bread"), 3);

    h.at(60.0).await;
    assert_eq!(world.container_count(chest, "bread"), 2);
    assert_eq!(world.inventory_count("bread"), 1);
    h.stop().await;
}
