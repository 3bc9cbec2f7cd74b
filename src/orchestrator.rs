//! Top-level connection loop
//!
//! Owns at most one [`SessionRuntime`] at a time plus everything that must
//! outlive a session: the reconnect schedule, the offline backoff, the
//! container memory and the log throttle registry.
//!
//! ```text
//!   connect ──► probe ──ok──► connector ──► runtime ──► disconnect
//!     ▲           │                            │            │
//!     │         offline                      timers      schedule
//!     │           ▼                                         │
//!     └──── backoff delay ◄──────── reconnect deadline ◄────┘
//! ```

use anyhow::Result;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ProbeError, SessionError};
use crate::food::ContainerMemory;
use crate::logging::ThrottledLogger;
use crate::messages::MessagePools;
use crate::probe::LivenessProbe;
use crate::reconnect::{fmt_secs, Backoff, Disconnect, ReconnectSchedule};
use crate::runtime::SessionRuntime;
use crate::session::SessionConnector;

/// Upper bound on establishing a session
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one wait in the main loop
enum Step {
    Shutdown,
    Reconnect,
    Disconnected(Disconnect),
    Continue,
}

async fn tick_opt(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending::<()>().await,
    }
}

/// Resolves once shutdown is requested; never if the sender is gone
async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    let stopped = rx.wait_for(|stop| *stop).await.is_ok();
    if !stopped {
        pending::<()>().await;
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
    pools: Arc<MessagePools>,
    connector: Arc<dyn SessionConnector>,
    probe: Arc<dyn LivenessProbe>,
    logger: ThrottledLogger,
    memory: ContainerMemory,
    backoff: Backoff,
    schedule: ReconnectSchedule,
    runtime: Option<SessionRuntime>,
}

impl Orchestrator {
    pub fn new(config: Config, connector: Arc<dyn SessionConnector>, probe: Arc<dyn LivenessProbe>) -> Self {
        let pools = MessagePools::load(&config.messages_path);
        Self::with_pools(config, pools, connector, probe)
    }

    pub fn with_pools(
        config: Config,
        pools: MessagePools,
        connector: Arc<dyn SessionConnector>,
        probe: Arc<dyn LivenessProbe>,
    ) -> Self {
        let backoff = Backoff::new(config.offline_backoff_base(), config.offline_backoff_max());
        Self {
            config: Arc::new(config),
            pools: Arc::new(pools),
            connector,
            probe,
            logger: ThrottledLogger::new(),
            memory: ContainerMemory::new(),
            backoff,
            schedule: ReconnectSchedule::new(),
            runtime: None,
        }
    }

    pub fn memory(&self) -> &ContainerMemory {
        &self.memory
    }

    pub fn logger(&self) -> &ThrottledLogger {
        &self.logger
    }

    /// Run until `shutdown` flips to true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "Starting {} for {} as {}",
            self.config.agent_name,
            self.config.target().address(),
            self.config.connection.username
        );
        self.connect("startup").await;

        loop {
            let step = match self.runtime.as_mut() {
                Some(rt) => Self::wait_live(rt, &mut shutdown, self.schedule.deadline()).await,
                None => {
                    tokio::select! {
                        _ = shutdown_signal(&mut shutdown) => Step::Shutdown,
                        _ = sleep_until_opt(self.schedule.deadline()) => Step::Reconnect,
                    }
                }
            };

            match step {
                Step::Shutdown => break,
                Step::Reconnect => {
                    if self.schedule.take_due(Instant::now()) {
                        self.connect("reconnect").await;
                    }
                }
                Step::Disconnected(disconnect) => self.on_disconnect(disconnect),
                Step::Continue => {}
            }
        }

        if let Some(rt) = self.runtime.take() {
            rt.close("shutdown");
        }
        self.logger.always("Shutting down.");
        Ok(())
    }

    /// Wait for and handle the next thing that happens to a live session
    async fn wait_live(
        rt: &mut SessionRuntime,
        shutdown: &mut watch::Receiver<bool>,
        deadline: Option<Instant>,
    ) -> Step {
        tokio::select! {
            _ = shutdown_signal(shutdown) => Step::Shutdown,
            _ = sleep_until_opt(deadline) => Step::Reconnect,
            event = rt.events.recv() => match event {
                Some(event) => rt.handle_event(event).map_or(Step::Continue, Step::Disconnected),
                None => Step::Disconnected(Disconnect::StreamClosed),
            },
            Some(message) = rt.transport_errors.recv() => Step::Disconnected(rt.on_transport_error(message)),
            Some(internal) = rt.inbox.recv() => {
                rt.handle_internal(internal);
                Step::Continue
            }
            _ = tick_opt(&mut rt.ping_check) => {
                rt.on_ping_check();
                Step::Continue
            }
            _ = tick_opt(&mut rt.heartbeat) => {
                rt.on_heartbeat();
                Step::Continue
            }
            _ = tick_opt(&mut rt.request_timer) => {
                rt.on_request_tick();
                Step::Continue
            }
            _ = tick_opt(&mut rt.random_walk) => {
                rt.on_random_walk_tick();
                Step::Continue
            }
        }
    }

    /// Any classified disconnect ends the session; only the reconnect survives
    fn on_disconnect(&mut self, disconnect: Disconnect) {
        let delay = disconnect.delay(
            self.config.reconnect_delay(),
            self.config.throttled_reconnect_delay(),
        );
        self.schedule_reconnect(delay);

        if let Some(rt) = self.runtime.take() {
            rt.close("disconnected");
        }
    }

    fn schedule_reconnect(&mut self, delay: Duration) {
        if self.schedule.schedule(delay, Instant::now()) {
            self.logger.info(
                "reconnect",
                &format!("Reconnecting in {}s...", fmt_secs(delay)),
                self.config.log_throttle_ms.connection(),
            );
        } else {
            debug!("Reconnect already pending");
        }
    }

    /// Tear down any live session, probe, then establish a new one
    async fn connect(&mut self, reason: &str) {
        if let Some(rt) = self.runtime.take() {
            rt.close("reconnecting");
        }

        let target = self.config.target();
        let conn = self.config.log_throttle_ms.connection();

        if self.config.pre_connect_ping {
            self.logger.info(
                "probe",
                &format!("Pinging {}... ({})", target.address(), reason),
                conn,
            );
            let limit = self.config.ping_timeout();
            let probed = match tokio::time::timeout(limit, self.probe.probe(&target)).await {
                Ok(result) => result,
                Err(_) => Err(ProbeError::Timeout(limit)),
            };

            match probed {
                Ok(status) => {
                    self.backoff.reset();
                    debug!(
                        "Server {} ({} of {} players)",
                        status.version_name, status.online_players, status.max_players
                    );
                    self.logger.info("probe-ok", "Server online. Connecting...", conn);
                }
                Err(e) => {
                    let wait = self.backoff.next_delay();
                    self.logger.info(
                        "offline",
                        &format!(
                            "Server offline/unreachable: {}. Retrying in {}s...",
                            e,
                            wait.as_secs_f64().ceil() as u64
                        ),
                        conn,
                    );
                    self.schedule.schedule(wait, Instant::now());
                    return;
                }
            }
        } else {
            self.backoff.reset();
        }

        self.logger.info(
            "connect",
            &format!("Connecting to {} as {}...", target.address(), target.username),
            conn,
        );

        let connected = match tokio::time::timeout(CONNECT_TIMEOUT, self.connector.connect(&target)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::ConnectTimeout(CONNECT_TIMEOUT)),
        };

        match connected {
            Ok(handle) => {
                let rt = SessionRuntime::new(
                    handle,
                    self.config.clone(),
                    self.pools.clone(),
                    self.logger.clone(),
                    self.memory.clone(),
                );
                debug!("Session {} established", rt.id);
                self.runtime = Some(rt);
            }
            Err(e) => {
                self.logger.warn("connect-failed", &format!("Connect failed: {}", e), conn);
                self.schedule_reconnect(self.config.reconnect_delay());
            }
        }
    }
}
