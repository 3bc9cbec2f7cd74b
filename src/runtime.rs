//! Per-session runtime
//!
//! Owns everything that lives exactly as long as one session: agent state,
//! latency monitor, food plan, periodic timers and background tasks. All
//! handlers run on the orchestrator task; background work reports back
//! through `inbox` as [`Internal`] events.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chat::{ChatGate, ChatPermit, ChatPolicy, Solicitation};
use crate::config::Config;
use crate::error::ActionError;
use crate::food::{
    classify_delivery, wander_offset, ChestSeeker, ContainerMemory, Delivery, FoodDecision, FoodPlan, FoodSafety,
    FoodStrategy, FoodSummary, PlanContext, SeekOutcome, SeekReport, Solicitor,
};
use crate::hunger::{EatTrigger, HungerConfig, HungerMonitor};
use crate::latency::{LatencyConfig, LatencyMonitor, LatencyShift};
use crate::lifecycle::{Activity, FoodMode, IdleTransition, ModeController};
use crate::logging::ThrottledLogger;
use crate::messages::{MessagePools, Pool};
use crate::reconnect::{fmt_secs, is_partial_read, Disconnect};
use crate::session::{GameSession, ItemStack, MovementPolicy, SessionEvent, SessionHandle};
use crate::timers::{bounded, SessionTimers};

/// Pause between an activity ending and idle being re-asserted
pub const SETTLE_DELAY: Duration = Duration::from_millis(1000);
const TOSS_TIMEOUT: Duration = Duration::from_secs(5);

/// Results of scheduled and background work
#[derive(Debug)]
pub enum Internal {
    SpawnSettled,
    /// Settle after eating ended or failed
    EatSettled,
    SeekSettled,
    EatResolved(Result<(), ActionError>),
    Tossed {
        name: String,
        result: Result<(), ActionError>,
    },
    SeekFinished(SeekReport),
    /// Retry the food check after a search cooldown
    FoodRecheck,
    /// A solicitation line waiting out the chat cooldown
    DeferredChat {
        text: String,
        kind: Solicitation,
    },
    WalkFinished(Result<(), ActionError>),
}

/// Mutable per-session agent record
#[derive(Debug)]
pub struct AgentState {
    pub mode: ModeController,
    pub chat: ChatGate,
    pub hunger: HungerMonitor,
    pub last_known_safe_food: u32,
}

impl AgentState {
    pub fn new(config: &Config) -> Self {
        Self {
            mode: ModeController::new(),
            chat: ChatGate::new(config.chat_cooldown()),
            hunger: HungerMonitor::new(HungerConfig {
                hunger_threshold: config.hunger_threshold,
                health_threshold: config.health_threshold,
                eat_backoff: config.eat_backoff_on_fail(),
            }),
            last_known_safe_food: 0,
        }
    }
}

fn periodic(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

pub struct SessionRuntime {
    pub id: Uuid,
    session: Arc<dyn GameSession>,
    config: Arc<Config>,
    pools: Arc<MessagePools>,
    logger: ThrottledLogger,
    memory: ContainerMemory,

    state: AgentState,
    latency: LatencyMonitor,
    plan: FoodPlan,
    solicitor: Solicitor,
    safety: FoodSafety,

    timers: SessionTimers<Internal>,
    pub inbox: mpsc::UnboundedReceiver<Internal>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub transport_errors: mpsc::UnboundedReceiver<String>,

    pub heartbeat: Option<Interval>,
    pub ping_check: Option<Interval>,
    pub request_timer: Option<Interval>,
    pub random_walk: Option<Interval>,

    spawned: bool,
    walking: bool,
}

impl SessionRuntime {
    pub fn new(
        handle: SessionHandle,
        config: Arc<Config>,
        pools: Arc<MessagePools>,
        logger: ThrottledLogger,
        memory: ContainerMemory,
    ) -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        let session = handle.session;

        Self {
            id: Uuid::new_v4(),
            state: AgentState::new(&config),
            latency: LatencyMonitor::new(LatencyConfig {
                threshold_ms: config.high_ping_threshold_ms,
                enter_strikes: config.high_ping_strikes,
                recovery_strikes: config.high_ping_recovery_strikes,
                hold: config.high_ping_hold(),
            }),
            plan: FoodPlan::new(
                FoodStrategy::from_seek_enabled(config.chest_scan.enabled),
                config.low_food_threshold_items,
                config.chest_scan.seek_cooldown(),
            ),
            solicitor: Solicitor::new(config.food_request_period()),
            safety: FoodSafety::resolve(&config.banned_food, &config.negative_effects, session.registry()),
            timers: SessionTimers::new(tx),
            inbox,
            events: handle.events,
            transport_errors: handle.transport_errors,
            heartbeat: None,
            ping_check: Some(periodic(config.ping_check_period())),
            request_timer: None,
            random_walk: None,
            spawned: false,
            walking: false,
            session,
            config,
            pools,
            logger,
            memory,
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn session(&self) -> &Arc<dyn GameSession> {
        &self.session
    }

    /// Cancel everything and leave the session
    pub fn close(mut self, reason: &str) {
        self.timers.cancel_all();
        self.heartbeat = None;
        self.ping_check = None;
        self.request_timer = None;
        self.random_walk = None;
        self.session.quit(reason);
        debug!("Session {} closed: {}", self.id, reason);
    }

    // ---- dispatch ----

    /// Handle one session event; a returned disconnect goes to the reconnect scheduler
    pub fn handle_event(&mut self, event: SessionEvent) -> Option<Disconnect> {
        let conn = self.config.log_throttle_ms.connection();
        match event {
            SessionEvent::Login => {
                self.logger.info("login", "Bot has logged in.", conn);
            }
            SessionEvent::Spawn => self.on_spawn(),
            SessionEvent::HealthChanged => self.on_health(),
            SessionEvent::ItemCollected { collector, item } => {
                if self.session.entity_id() == Some(collector) {
                    if let Some(item) = item {
                        self.on_collect(item);
                    }
                }
            }
            SessionEvent::Kicked(reason) => {
                self.logger.info("kicked", &format!("Kicked: {}", reason), Duration::ZERO);
                return Some(Disconnect::Kicked(reason));
            }
            SessionEvent::Error(message) => {
                self.logger.warn("error", &format!("Error: {}", message), Duration::ZERO);
                return Some(Disconnect::Error(message));
            }
            SessionEvent::Ended(reason) => {
                self.logger.info("end", &format!("Disconnected: {}", reason), Duration::ZERO);
                return Some(Disconnect::Ended(reason));
            }
            SessionEvent::EatStarted => self.on_eat_started(),
            SessionEvent::EatFinished => self.on_eat_finished(),
            SessionEvent::EatStopped => {
                if self.state.mode.finish_eating(Activity::EatStopped) {
                    let food = self.session.food().map_or("?".to_string(), |f| f.to_string());
                    self.logger.info(
                        "eat-stop",
                        &format!("Auto-eat stopped. (food={})", food),
                        self.config.log_throttle_ms.no_food(),
                    );
                    if !self.state.mode.is_idle() {
                        self.timers.after(SETTLE_DELAY, Internal::EatSettled);
                    }
                }
            }
            SessionEvent::EatFailed(message) => {
                self.logger.info("eat-error", &format!("Auto-eat error: {}", message), Duration::ZERO);
                if self.state.mode.is_eating() {
                    self.state.mode.abort_eating();
                    self.timers.after(SETTLE_DELAY, Internal::EatSettled);
                }
            }
        }
        None
    }

    pub fn on_transport_error(&mut self, message: String) -> Disconnect {
        let partial = if is_partial_read(&message) { " (partial read)" } else { "" };
        self.logger.warn(
            "client-error",
            &format!("Client error{}: {}", partial, message),
            self.config.log_throttle_ms.connection(),
        );
        Disconnect::Transport(message)
    }

    pub fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::SpawnSettled => {
                self.enter_idle("AFK on after spawn.");
                self.check_food("spawn-afk");
            }
            Internal::EatSettled => {
                self.enter_idle("Returned to AFK.");
                self.check_food("eat-settled");
            }
            Internal::SeekSettled => {
                self.enter_idle("Returned to AFK after food search.");
                self.check_food("seek-complete");
                self.recheck_hunger();
            }
            Internal::FoodRecheck => {
                self.check_food("seek-retry");
                self.recheck_hunger();
            }
            Internal::EatResolved(result) => self.on_eat_resolved(result),
            Internal::Tossed { name, result } => {
                self.logger.info(
                    "food-reject",
                    &format!("Rejected {}. Tossed={}.", name, result.is_ok()),
                    self.config.log_throttle_ms.no_food(),
                );
                self.check_food("reject-food");
            }
            Internal::SeekFinished(report) => self.on_seek_finished(report),
            Internal::DeferredChat { text, kind } => self.on_deferred_chat(text, kind),
            Internal::WalkFinished(result) => {
                self.walking = false;
                if let Err(e) = result {
                    debug!("Random walk step failed: {}", e);
                }
            }
        }
    }

    // ---- idle and chat ----

    fn enter_idle(&mut self, reason: &str) {
        if self.state.mode.assert_idle() != IdleTransition::Entered {
            return;
        }
        if self.config.send_afk_chat && !self.config.afk_command.is_empty() {
            let command = self.config.afk_command.clone();
            self.chat(&command, ChatPolicy::Skip);
        }
        self.logger.info("afk-on", reason, self.config.log_throttle_ms.afk());
    }

    fn release_idle(&mut self, reason: &str) {
        if self.state.mode.release_idle() {
            self.logger.info("afk-off", reason, self.config.log_throttle_ms.afk());
        }
    }

    /// Send through the chat gate; returns true if sent now
    fn chat(&mut self, text: &str, policy: ChatPolicy) -> bool {
        if text.is_empty() {
            return false;
        }
        match self.state.chat.try_claim(Instant::now()) {
            ChatPermit::Open => {
                if let Err(e) = self.session.send_chat(text) {
                    warn!("Chat failed: {}", e);
                }
                true
            }
            ChatPermit::Closed(wait) => {
                match policy {
                    ChatPolicy::Skip => debug!("Chat skipped (cooldown): {}", text),
                    ChatPolicy::Defer(kind) => self.timers.after(
                        wait,
                        Internal::DeferredChat {
                            text: text.to_string(),
                            kind,
                        },
                    ),
                }
                false
            }
        }
    }

    /// Deferred solicitation only goes out while food is still short
    fn on_deferred_chat(&mut self, text: String, kind: Solicitation) {
        let count = self.safety.summarize(&self.session.inventory()).count;
        if self.state.mode.food_mode() != FoodMode::Requesting || !self.plan.is_low(count) {
            debug!("Dropped deferred {:?} (safe food {})", kind, count);
            return;
        }
        self.chat(&text, ChatPolicy::Defer(kind));
    }

    // ---- spawn ----

    fn on_spawn(&mut self) {
        self.logger.info(
            "spawn",
            &format!("Spawned. AFK in {}s...", fmt_secs(self.config.afk_delay())),
            self.config.log_throttle_ms.connection(),
        );

        if !self.spawned {
            self.spawned = true;
            self.session.navigator().configure(MovementPolicy::read_only());
            self.heartbeat = Some(periodic(self.config.status_period()));
            if self.config.random_walk.enabled {
                self.random_walk = Some(periodic(self.config.random_walk.period()));
            }
        }

        self.safety = FoodSafety::resolve(
            &self.config.banned_food,
            &self.config.negative_effects,
            self.session.registry(),
        );
        self.timers.after(self.config.afk_delay(), Internal::SpawnSettled);
    }

    // ---- food sufficiency ----

    /// Count safe food and apply at most one food-mode transition
    fn check_food(&mut self, reason: &str) -> FoodSummary {
        let summary = self.safety.summarize(&self.session.inventory());
        self.state.last_known_safe_food = summary.count;

        let ctx = PlanContext {
            eating: self.state.mode.is_eating(),
            high_latency: self.latency.is_high(),
        };
        match self
            .plan
            .evaluate(summary.count, self.state.mode.food_mode(), ctx, Instant::now())
        {
            FoodDecision::StartRequesting => self.start_requesting(reason, summary.count),
            FoodDecision::StopRequesting => self.stop_requesting(summary.count),
            FoodDecision::StartSeeking => self.start_seeking(reason, summary.count),
            FoodDecision::Defer(why) => debug!("Food search deferred: {:?}", why),
            FoodDecision::Hold => {}
        }
        summary
    }

    fn start_requesting(&mut self, reason: &str, count: u32) {
        if !self.state.mode.enter_food_mode(FoodMode::Requesting) {
            return;
        }
        self.session.navigator().stop();
        self.enter_idle("Switched to AFK for request mode.");

        self.logger.info(
            "request-start",
            &format!(
                "[{}] Food low (safeFoodItems={} < {}).",
                reason,
                count,
                self.plan.threshold()
            ),
            self.config.log_throttle_ms.no_food(),
        );

        self.request_timer = Some(periodic(self.solicitor.interval()));
        self.send_food_request("enter", ChatPolicy::Defer(Solicitation::Request));
    }

    fn stop_requesting(&mut self, count: u32) {
        if self.state.mode.leave_food_mode().is_none() {
            return;
        }
        self.session.navigator().stop();
        self.request_timer = None;
        self.logger.info(
            "request-stop",
            &format!("Food ok again (safeFoodItems={} >= {}).", count, self.plan.threshold()),
            self.config.log_throttle_ms.no_food(),
        );
    }

    fn send_food_request(&mut self, reason: &str, policy: ChatPolicy) {
        self.solicitor.mark_requested(Instant::now());
        let Some(message) = self.pools.pick(Pool::FoodRequest) else {
            return;
        };
        self.chat(&message, policy);
        self.logger.info(
            "food-request",
            &format!("[{}] {}", reason, message),
            self.config.log_throttle_ms.no_food(),
        );
    }

    pub fn on_request_tick(&mut self) {
        if self.state.mode.food_mode() != FoodMode::Requesting {
            return;
        }
        if self.solicitor.due(Instant::now()) {
            self.send_food_request("timer", ChatPolicy::Skip);
        }
    }

    fn start_seeking(&mut self, reason: &str, count: u32) {
        if self.state.mode.food_mode() != FoodMode::None {
            return;
        }
        self.release_idle("AFK off (searching for food).");
        if !self.state.mode.enter_food_mode(FoodMode::Seeking) {
            return;
        }
        self.session.navigator().stop();

        self.logger.info(
            "seek-start",
            &format!(
                "[{}] Food low (safeFoodItems={} < {}). Searching containers...",
                reason,
                count,
                self.plan.threshold()
            ),
            self.config.log_throttle_ms.no_food(),
        );

        let seeker = ChestSeeker::new(
            self.session.clone(),
            self.safety.clone(),
            self.memory.clone(),
            self.config.chest_scan.clone(),
            self.logger.clone(),
            self.config.log_throttle_ms.block(),
        );
        self.timers.run(async move { Internal::SeekFinished(seeker.run().await) });
    }

    fn on_seek_finished(&mut self, report: SeekReport) {
        let no_food = self.config.log_throttle_ms.no_food();
        match &report.outcome {
            SeekOutcome::Found {
                item,
                container,
                left_behind,
            } => {
                self.logger.info(
                    "seek-found",
                    &format!(
                        "Took 1 {} from container at {} ({} left). Visited {} in {}s.",
                        item,
                        container,
                        left_behind,
                        report.visited,
                        report.elapsed.as_secs()
                    ),
                    Duration::ZERO,
                );
            }
            SeekOutcome::Exhausted | SeekOutcome::NoPosition => {
                let cooldown = self.config.chest_scan.seek_cooldown();
                self.plan.seek_failed(Instant::now());
                self.timers.after(cooldown, Internal::FoodRecheck);
                self.logger.info(
                    "seek-failed",
                    &format!(
                        "No food found (visited={}, wander={}). Next search in {}s.",
                        report.visited,
                        report.wander_steps,
                        fmt_secs(cooldown)
                    ),
                    no_food,
                );
            }
        }
        if report.origin.is_some() && !report.returned_home {
            warn!("Search ended away from origin");
        }

        self.state.mode.leave_food_mode();
        self.timers.after(SETTLE_DELAY, Internal::SeekSettled);
    }

    // ---- hunger ----

    fn on_health(&mut self) {
        if !self.state.hunger.debounce(Instant::now()) {
            return;
        }

        let previous = self.state.last_known_safe_food;
        let summary = self.check_food("health-check");
        if summary.count != previous {
            self.logger.info(
                "food-count",
                &format!("Safe edible items: {}", summary),
                self.config.log_throttle_ms.no_food(),
            );
        }

        self.recheck_hunger();
    }

    fn recheck_hunger(&mut self) {
        if let Some(trigger) = self
            .state
            .hunger
            .trigger(self.session.food(), self.session.health())
        {
            self.try_eat(trigger);
        }
    }

    fn try_eat(&mut self, trigger: EatTrigger) {
        let food = self.session.food();
        if let Err(skip) = self
            .state
            .hunger
            .admit(food, self.state.mode.is_eating(), Instant::now())
        {
            debug!("{} Eat skipped: {:?}", trigger, skip);
            return;
        }
        self.state.mode.set_activity(Activity::EatAttempt);

        let Some(stack) = self.safety.best_food(&self.session.inventory()) else {
            self.logger.info(
                "no-food",
                &format!("{} No safe edible food in inventory.", trigger),
                self.config.log_throttle_ms.no_food(),
            );
            self.check_food("no-food-to-eat");
            return;
        };

        if self.state.mode.food_mode() == FoodMode::Seeking {
            self.session.navigator().stop();
        }

        let health = self.session.health().map_or("?".to_string(), |h| format!("{:.0}", h));
        let food = food.map_or("?".to_string(), |f| f.to_string());
        self.logger.info(
            "eat-attempt",
            &format!("{} Eating {}... (H={}, F={})", trigger, stack.name, health, food),
            self.config.log_throttle_ms.hunger(),
        );

        let session = self.session.clone();
        let limit = self.config.eat_timeout();
        self.timers.run(async move {
            Internal::EatResolved(bounded("eat", limit, async move { session.eat(&stack).await }).await)
        });
    }

    fn on_eat_started(&mut self) {
        if !self.state.mode.begin_eating() {
            return;
        }
        self.session.navigator().stop();
        self.logger.info("eat-start", "Bot started eating.", Duration::ZERO);
        self.logger.info("afk-off", "AFK off (eating).", self.config.log_throttle_ms.afk());
    }

    fn on_eat_finished(&mut self) {
        if !self.state.mode.finish_eating(Activity::EatFinished) {
            return;
        }
        let health = self.session.health().map_or("?".to_string(), |h| format!("{:.1}", h));
        let food = self.session.food().map_or("?".to_string(), |f| f.to_string());
        self.logger.info(
            "eat-finish",
            &format!("Finished eating. (health={}, food={})", health, food),
            Duration::ZERO,
        );
        self.timers.after(SETTLE_DELAY, Internal::EatSettled);
    }

    fn on_eat_resolved(&mut self, result: Result<(), ActionError>) {
        match result {
            Ok(()) => self.on_eat_finished(),
            Err(e) => {
                self.logger.info(
                    "eat-failed",
                    &format!("Eat failed: {}", e),
                    self.config.log_throttle_ms.no_food(),
                );
                self.state.hunger.fail(Instant::now());
                self.state.mode.abort_eating();
                if !self.state.mode.is_idle() {
                    self.timers.after(SETTLE_DELAY, Internal::EatSettled);
                }
            }
        }
    }

    // ---- deliveries ----

    fn on_collect(&mut self, item: ItemStack) {
        match classify_delivery(&self.safety, &item) {
            Delivery::Ignore => {}
            Delivery::Reject { name, verdict } => {
                if let Some(message) = self.pools.pick(Pool::Rejection) {
                    self.chat(&format!("{} ({}).", message, verdict.reason()), ChatPolicy::Skip);
                }

                let type_id = item.type_id;
                let stack = self
                    .session
                    .inventory()
                    .into_iter()
                    .find(|s| s.type_id == type_id)
                    .unwrap_or(item);
                let session = self.session.clone();
                self.timers.run(async move {
                    let result = bounded("toss", TOSS_TIMEOUT, session.toss(&stack)).await;
                    Internal::Tossed { name, result }
                });
            }
            Delivery::Accept { name } => {
                if let Some(thanks) = self.pools.pick(Pool::ThankYou) {
                    self.chat(&thanks, ChatPolicy::Skip);
                }
                self.logger.info("food-accept", &format!("Accepted: {}.", name), Duration::ZERO);

                let summary = self.check_food("received-food");
                if self.state.mode.food_mode() == FoodMode::Requesting && self.plan.is_low(summary.count) {
                    if let Some(more) = self.pools.pick(Pool::NeedMore) {
                        self.chat(&more, ChatPolicy::Defer(Solicitation::NeedMore));
                    }
                }

                self.solicitor.mark_requested(Instant::now());
                if let Some(timer) = self.request_timer.as_mut() {
                    timer.reset();
                }
            }
        }
    }

    // ---- periodic ----

    pub fn on_ping_check(&mut self) {
        let sample = self.session.latency().best();
        match self.latency.sample(sample, Instant::now()) {
            Some(LatencyShift::EnteredHigh { ping_ms }) => {
                self.logger.info(
                    "ping-high",
                    &format!(
                        "High ping ({}ms). Mode=HIGH. Last={}",
                        ping_ms,
                        self.state.mode.activity().as_str()
                    ),
                    self.config.log_throttle_ms.ping(),
                );
            }
            Some(LatencyShift::Recovered { ping_ms }) => {
                self.logger.info(
                    "ping-ok",
                    &format!("Ping recovered ({}ms). Mode=NORMAL.", ping_ms),
                    self.config.log_throttle_ms.ping(),
                );
                self.check_food("ping-recovered");
            }
            None => {}
        }
    }

    /// One-line status
    pub fn status_line(&self) -> String {
        let mode = &self.state.mode;
        let health = self.session.health().map_or("?".to_string(), |h| format!("{:.1}", h));
        let food = self.session.food().map_or("?".to_string(), |f| f.to_string());
        let ping = self
            .latency
            .last_ping()
            .map_or("?".to_string(), |p| format!("{}ms", p));
        format!(
            "Status: {} | health={} | food={} | ping={}({}) | eating={} | food_mode={} | safe_food={}",
            if mode.is_idle() { "AFK" } else { "ACTIVE" },
            health,
            food,
            ping,
            self.latency.mode().as_str(),
            if mode.is_eating() { "yes" } else { "no" },
            mode.food_mode().as_str(),
            self.state.last_known_safe_food
        )
    }

    pub fn on_heartbeat(&mut self) {
        self.logger.always(&self.status_line());
    }

    pub fn on_random_walk_tick(&mut self) {
        let mode = &self.state.mode;
        if self.walking
            || !mode.is_idle()
            || mode.is_eating()
            || mode.food_mode() != FoodMode::None
            || self.latency.is_high()
        {
            return;
        }
        let Some(here) = self.session.position() else {
            return;
        };

        let (dx, dz) = wander_offset(self.config.random_walk.radius() as u32);
        let target = here.block().offset(dx, 0, dz);
        self.walking = true;
        self.state.mode.set_activity(Activity::Wander);

        let nav = self.session.navigator();
        let limit = self.config.chest_scan.wander_timeout();
        self.timers.run(async move {
            let result = bounded("walk", limit, nav.goto(target, 0)).await;
            if result.is_err() {
                nav.stop();
            }
            Internal::WalkFinished(result)
        });
    }
}
