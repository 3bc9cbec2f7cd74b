//! Logging
//!
//! Two layers:
//! - [`ThrottledLogger`] decides whether a keyed status line is emitted at all
//!   and appends the suppressed-repeat count
//! - [`AgentFormat`] renders every `tracing` event as
//!   `[HH:MM:SS] [<agent>] [LEVEL] message`

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone)]
struct ThrottleEntry {
    last_at: Instant,
    last_message: String,
    suppressed: u32,
}

/// Outcome of offering a line to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admit {
    Emit { suppressed: u32 },
    Suppress,
}

/// Per-key dedup state
#[derive(Debug, Default)]
pub struct ThrottleRegistry {
    entries: HashMap<String, ThrottleEntry>,
}

impl ThrottleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress `message` if it repeats the key's last emitted line within
    /// `interval`. `last_at` only moves on emission.
    pub fn admit(&mut self, key: &str, message: &str, interval: Duration, now: Instant) -> Admit {
        match self.entries.get_mut(key) {
            Some(entry) => {
                let within = !interval.is_zero() && now.duration_since(entry.last_at) < interval;
                if within && entry.last_message == message {
                    entry.suppressed += 1;
                    return Admit::Suppress;
                }

                let suppressed = std::mem::take(&mut entry.suppressed);
                entry.last_at = now;
                entry.last_message = message.to_string();
                Admit::Emit { suppressed }
            }
            None => {
                self.entries.insert(
                    key.to_string(),
                    ThrottleEntry {
                        last_at: now,
                        last_message: message.to_string(),
                        suppressed: 0,
                    },
                );
                Admit::Emit { suppressed: 0 }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Render the line that is actually written
pub fn with_suffix(message: &str, suppressed: u32) -> String {
    if suppressed > 0 {
        format!("{} (suppressed {} repeats)", message, suppressed)
    } else {
        message.to_string()
    }
}

/// Keyed, rate-limited front of `tracing`
///
/// Clones share one registry for the whole process.
#[derive(Debug, Clone, Default)]
pub struct ThrottledLogger {
    registry: Arc<Mutex<ThrottleRegistry>>,
}

impl ThrottledLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `message` at `level` unless throttled under `key`.
    /// A `None` key always emits. Returns the line written, if any.
    pub fn log(&self, level: Level, key: Option<&str>, message: &str, interval: Duration) -> Option<String> {
        let line = match key {
            None => message.to_string(),
            Some(key) => match self.registry.lock().admit(key, message, interval, Instant::now()) {
                Admit::Suppress => return None,
                Admit::Emit { suppressed } => with_suffix(message, suppressed),
            },
        };

        if level == Level::ERROR {
            tracing::error!("{}", line);
        } else if level == Level::WARN {
            tracing::warn!("{}", line);
        } else if level == Level::DEBUG {
            tracing::debug!("{}", line);
        } else if level == Level::TRACE {
            tracing::trace!("{}", line);
        } else {
            tracing::info!("{}", line);
        }
        Some(line)
    }

    pub fn info(&self, key: &str, message: &str, interval: Duration) -> Option<String> {
        self.log(Level::INFO, Some(key), message, interval)
    }

    pub fn warn(&self, key: &str, message: &str, interval: Duration) -> Option<String> {
        self.log(Level::WARN, Some(key), message, interval)
    }

    pub fn debug(&self, key: &str, message: &str, interval: Duration) -> Option<String> {
        self.log(Level::DEBUG, Some(key), message, interval)
    }

    /// Bypass dedup
    pub fn always(&self, message: &str) {
        self.log(Level::INFO, None, message, Duration::ZERO);
    }
}

/// `[HH:MM:SS] [<agent>] [LEVEL] message`
pub struct AgentFormat {
    agent: String,
}

impl AgentFormat {
    pub fn new(agent: impl Into<String>) -> Self {
        Self { agent: agent.into() }
    }
}

impl<S, N> FormatEvent<S, N> for AgentFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        write!(writer, "[{}] [{}] [{}] ", stamp, self.agent, event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Max level from `RUST_LOG`, info by default
pub fn level_from_env() -> Level {
    std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO)
}

/// Install the global subscriber
pub fn init(agent: &str) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level_from_env())
        .with_ansi(false)
        .event_format(AgentFormat::new(agent))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
