//! Configuration management
//!
//! Loaded once at startup from an optional TOML file, then overlaid with
//! `AFKBOT_*` environment variables. Never mutated afterwards.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::ConnectTarget;

/// Longest delay or cooldown accepted from configuration (one day)
pub const MAX_DELAY_MS: u64 = 86_400_000;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Server to keep the agent on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// In-game identity
    pub username: String,
    /// Protocol version string, `None` lets the session negotiate
    pub protocol_version: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25565,
            username: "_AfkBot".to_string(),
            protocol_version: None,
        }
    }
}

/// Optional idle wandering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomWalkConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub radius: u32,
}

impl Default for RandomWalkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 15_000,
            radius: 6,
        }
    }
}

impl RandomWalkConfig {
    pub fn period(&self) -> Duration {
        ms(self.interval_ms.max(1000))
    }

    pub fn radius(&self) -> i32 {
        self.radius.max(1) as i32
    }
}

/// Per-category dedup windows for the throttled logger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogThrottleConfig {
    pub connection: u64,
    pub afk: u64,
    pub hunger: u64,
    pub no_food: u64,
    pub ping: u64,
    pub block: u64,
}

impl Default for LogThrottleConfig {
    fn default() -> Self {
        Self {
            connection: 3000,
            afk: 15_000,
            hunger: 30_000,
            no_food: 30_000,
            ping: 15_000,
            block: 30_000,
        }
    }
}

impl LogThrottleConfig {
    pub fn connection(&self) -> Duration {
        ms(self.connection)
    }

    pub fn afk(&self) -> Duration {
        ms(self.afk)
    }

    pub fn hunger(&self) -> Duration {
        ms(self.hunger)
    }

    pub fn no_food(&self) -> Duration {
        ms(self.no_food)
    }

    pub fn ping(&self) -> Duration {
        ms(self.ping)
    }

    pub fn block(&self) -> Duration {
        ms(self.block)
    }
}

/// Autonomous container search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChestScanConfig {
    pub enabled: bool,
    /// Scan radius in blocks
    pub radius: u32,
    /// How long one container scan stays valid
    pub interval_ms: u64,
    pub empty_cooldown_ms: u64,
    pub unreachable_cooldown_ms: u64,
    /// Pause after a fruitless search
    pub seek_cooldown_ms: u64,
    pub max_seek_duration_ms: u64,
    pub wander_step_blocks: u32,
    /// Bound on one navigation hop (container or home)
    pub hop_timeout_ms: u64,
    pub wander_timeout_ms: u64,
    /// Bound on opening a container and on one withdrawal
    pub open_timeout_ms: u64,
    /// Block names treated as containers
    pub container_blocks: Vec<String>,
}

impl Default for ChestScanConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            radius: 16,
            interval_ms: 10_000,
            empty_cooldown_ms: 300_000,
            unreachable_cooldown_ms: 120_000,
            seek_cooldown_ms: 60_000,
            max_seek_duration_ms: 60_000,
            wander_step_blocks: 8,
            hop_timeout_ms: 15_000,
            wander_timeout_ms: 8000,
            open_timeout_ms: 5000,
            container_blocks: vec![
                "chest".to_string(),
                "trapped_chest".to_string(),
                "barrel".to_string(),
            ],
        }
    }
}

impl ChestScanConfig {
    pub fn scan_ttl(&self) -> Duration {
        ms(self.interval_ms)
    }

    pub fn empty_cooldown(&self) -> Duration {
        ms(self.empty_cooldown_ms)
    }

    pub fn unreachable_cooldown(&self) -> Duration {
        ms(self.unreachable_cooldown_ms)
    }

    pub fn seek_cooldown(&self) -> Duration {
        ms(self.seek_cooldown_ms)
    }

    pub fn max_seek_duration(&self) -> Duration {
        ms(self.max_seek_duration_ms)
    }

    pub fn hop_timeout(&self) -> Duration {
        ms(self.hop_timeout_ms)
    }

    pub fn wander_timeout(&self) -> Duration {
        ms(self.wander_timeout_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        ms(self.open_timeout_ms)
    }
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,

    /// Name shown in every log line
    pub agent_name: String,

    /// Settle delay between spawn and the first AFK command
    pub afk_delay_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Fixed delay after a throttle-flavoured kick
    pub throttled_reconnect_delay_ms: u64,

    pub afk_command: String,
    pub send_afk_chat: bool,

    pub random_walk: RandomWalkConfig,

    pub pre_connect_ping: bool,
    pub ping_timeout_ms: u64,
    pub offline_backoff_base_ms: u64,
    pub offline_backoff_max_ms: u64,

    /// Eat when food level is at or below this (0-20)
    pub hunger_threshold: u32,
    /// Eat when health is at or below this (0-20)
    pub health_threshold: f32,

    /// Below this many safe-edible items the food strategy kicks in
    pub low_food_threshold_items: u32,
    pub food_request_interval_ms: u64,

    pub status_interval_ms: u64,

    pub ping_check_interval_ms: u64,
    pub high_ping_threshold_ms: u32,
    pub high_ping_strikes: u32,
    pub high_ping_recovery_strikes: u32,
    pub high_ping_hold_ms: u64,

    pub eat_timeout_ms: u64,
    pub eat_backoff_on_fail_ms: u64,

    pub chat_cooldown_ms: u64,

    pub messages_path: PathBuf,

    pub banned_food: Vec<String>,
    pub negative_effects: Vec<String>,

    pub log_throttle_ms: LogThrottleConfig,

    pub chest_scan: ChestScanConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            agent_name: "AFK".to_string(),
            afk_delay_ms: 3000,
            reconnect_delay_ms: 3000,
            throttled_reconnect_delay_ms: 30_000,
            afk_command: "/afk".to_string(),
            send_afk_chat: true,
            random_walk: RandomWalkConfig::default(),
            pre_connect_ping: true,
            ping_timeout_ms: 2000,
            offline_backoff_base_ms: 5000,
            offline_backoff_max_ms: 60_000,
            hunger_threshold: 10,
            health_threshold: 10.0,
            low_food_threshold_items: 6,
            food_request_interval_ms: 45_000,
            status_interval_ms: 60_000,
            ping_check_interval_ms: 5000,
            high_ping_threshold_ms: 250,
            high_ping_strikes: 3,
            high_ping_recovery_strikes: 3,
            high_ping_hold_ms: 30_000,
            eat_timeout_ms: 9000,
            eat_backoff_on_fail_ms: 7000,
            chat_cooldown_ms: 1500,
            messages_path: PathBuf::from("custom_messages/messages.json"),
            banned_food: ["rotten_flesh", "spider_eye", "poisonous_potato", "pufferfish"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            negative_effects: [
                "poison",
                "hunger",
                "slowness",
                "weakness",
                "wither",
                "blindness",
                "nausea",
                "mining_fatigue",
                "instant_damage",
                "darkness",
                "bad_omen",
                "unluck",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            log_throttle_ms: LogThrottleConfig::default(),
            chest_scan: ChestScanConfig::default(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, apply env overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file (missing keys take defaults)
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay `AFKBOT_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("AFKBOT_HOST") {
            self.connection.host = host;
        }

        if let Ok(port) = std::env::var("AFKBOT_PORT") {
            if let Ok(parsed) = port.parse() {
                self.connection.port = parsed;
            } else {
                tracing::warn!("Ignoring invalid AFKBOT_PORT={}", port);
            }
        }

        if let Ok(username) = std::env::var("AFKBOT_USERNAME") {
            self.connection.username = username;
        }

        if let Ok(version) = std::env::var("AFKBOT_PROTOCOL_VERSION") {
            self.connection.protocol_version = if version.is_empty() { None } else { Some(version) };
        }

        if let Ok(path) = std::env::var("AFKBOT_MESSAGES") {
            self.messages_path = PathBuf::from(path);
        }
    }

    /// Reject settings the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.connection.host.trim().is_empty() {
            bail!("connection.host is empty");
        }
        if self.connection.port == 0 {
            bail!("connection.port must be non-zero");
        }
        if self.connection.username.trim().is_empty() {
            bail!("connection.username is empty");
        }
        if self.offline_backoff_base_ms == 0 {
            bail!("offline_backoff_base_ms must be non-zero");
        }
        if self.offline_backoff_base_ms > self.offline_backoff_max_ms {
            bail!(
                "offline_backoff_base_ms ({}) exceeds offline_backoff_max_ms ({})",
                self.offline_backoff_base_ms,
                self.offline_backoff_max_ms
            );
        }
        if self.high_ping_strikes == 0 || self.high_ping_recovery_strikes == 0 {
            bail!("high ping strike counts must be at least 1");
        }
        for (name, value) in self.delays() {
            if value > MAX_DELAY_MS {
                bail!("{} ({}) exceeds the {} ms limit", name, value, MAX_DELAY_MS);
            }
        }
        Ok(())
    }

    fn delays(&self) -> [(&'static str, u64); 27] {
        let scan = &self.chest_scan;
        let throttle = &self.log_throttle_ms;
        [
            ("afk_delay_ms", self.afk_delay_ms),
            ("reconnect_delay_ms", self.reconnect_delay_ms),
            ("throttled_reconnect_delay_ms", self.throttled_reconnect_delay_ms),
            ("ping_timeout_ms", self.ping_timeout_ms),
            ("offline_backoff_max_ms", self.offline_backoff_max_ms),
            ("food_request_interval_ms", self.food_request_interval_ms),
            ("status_interval_ms", self.status_interval_ms),
            ("ping_check_interval_ms", self.ping_check_interval_ms),
            ("high_ping_hold_ms", self.high_ping_hold_ms),
            ("eat_timeout_ms", self.eat_timeout_ms),
            ("eat_backoff_on_fail_ms", self.eat_backoff_on_fail_ms),
            ("chat_cooldown_ms", self.chat_cooldown_ms),
            ("random_walk.interval_ms", self.random_walk.interval_ms),
            ("chest_scan.interval_ms", scan.interval_ms),
            ("chest_scan.empty_cooldown_ms", scan.empty_cooldown_ms),
            ("chest_scan.unreachable_cooldown_ms", scan.unreachable_cooldown_ms),
            ("chest_scan.seek_cooldown_ms", scan.seek_cooldown_ms),
            ("chest_scan.max_seek_duration_ms", scan.max_seek_duration_ms),
            ("chest_scan.hop_timeout_ms", scan.hop_timeout_ms),
            ("chest_scan.wander_timeout_ms", scan.wander_timeout_ms),
            ("chest_scan.open_timeout_ms", scan.open_timeout_ms),
            ("log_throttle_ms.connection", throttle.connection),
            ("log_throttle_ms.afk", throttle.afk),
            ("log_throttle_ms.hunger", throttle.hunger),
            ("log_throttle_ms.no_food", throttle.no_food),
            ("log_throttle_ms.ping", throttle.ping),
            ("log_throttle_ms.block", throttle.block),
        ]
    }

    /// Connection target handed to the session connector and the probe
    pub fn target(&self) -> ConnectTarget {
        ConnectTarget {
            host: self.connection.host.clone(),
            port: self.connection.port,
            username: self.connection.username.clone(),
            protocol_version: self.connection.protocol_version.clone(),
        }
    }

    pub fn afk_delay(&self) -> Duration {
        ms(self.afk_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        ms(self.reconnect_delay_ms)
    }

    pub fn throttled_reconnect_delay(&self) -> Duration {
        ms(self.throttled_reconnect_delay_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        ms(self.ping_timeout_ms)
    }

    pub fn offline_backoff_base(&self) -> Duration {
        ms(self.offline_backoff_base_ms)
    }

    pub fn offline_backoff_max(&self) -> Duration {
        ms(self.offline_backoff_max_ms)
    }

    pub fn food_request_period(&self) -> Duration {
        ms(self.food_request_interval_ms.max(5000))
    }

    pub fn status_period(&self) -> Duration {
        ms(self.status_interval_ms.clamp(5000, 60_000))
    }

    pub fn ping_check_period(&self) -> Duration {
        ms(self.ping_check_interval_ms.max(1000))
    }

    pub fn high_ping_hold(&self) -> Duration {
        ms(self.high_ping_hold_ms)
    }

    pub fn eat_timeout(&self) -> Duration {
        ms(self.eat_timeout_ms)
    }

    pub fn eat_backoff_on_fail(&self) -> Duration {
        ms(self.eat_backoff_on_fail_ms)
    }

    pub fn chat_cooldown(&self) -> Duration {
        ms(self.chat_cooldown_ms)
    }
}
