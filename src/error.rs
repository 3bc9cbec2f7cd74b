//! Error types
//!
//! Connectivity failures are routed to the reconnect scheduler, action failures
//! are recovered with a local cooldown. Neither is ever fatal to the process.

use std::time::Duration;

/// Failure of a single in-game action (eat, navigate, open, withdraw, toss)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("{action} timed out after {}ms", .after.as_millis())]
    Timeout {
        action: &'static str,
        after: Duration,
    },

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("no path to {0}")]
    NoPath(String),

    #[error("capability unavailable: {0}")]
    Unavailable(&'static str),
}

impl ActionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Failure to establish or keep a game session
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connect timed out after {}s", .0.as_secs())]
    ConnectTimeout(Duration),

    #[error("session closed")]
    Closed,
}

/// Failure of the pre-connect liveness probe
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("no answer within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("bad status response: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = ActionError::Timeout {
            action: "eat",
            after: Duration::from_millis(9000),
        };
        assert_eq!(err.to_string(), "eat timed out after 9000ms");
        assert!(err.is_timeout());
        assert!(!ActionError::Rejected("busy".into()).is_timeout());
    }

    #[test]
    fn test_probe_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let err: ProbeError = io.into();
        assert_eq!(err.to_string(), "connection refused");
    }
}
