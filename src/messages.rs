//! Chat message pools
//!
//! Loaded from a JSON file with four arrays. Anything missing or malformed
//! degrades to empty pools, which turns the matching chat into a no-op.

use rand::seq::SliceRandom;
use serde_json::Value;
use std::path::Path;
use tracing::warn;

/// Which pool a line is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    FoodRequest,
    ThankYou,
    Rejection,
    NeedMore,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePools {
    pub food_request: Vec<String>,
    pub thank_you: Vec<String>,
    pub rejection: Vec<String>,
    pub need_more: Vec<String>,
}

fn normalize(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

impl MessagePools {
    /// Read pools from `path`, never failing
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Message pools unavailable ({}): {}. Chat replies disabled.", path.display(), e);
                return Self::default();
            }
        };

        match Self::from_json(&raw) {
            Some(pools) => pools,
            None => {
                warn!("Message pools in {} are malformed. Chat replies disabled.", path.display());
                Self::default()
            }
        }
    }

    /// Parse the pool document; `None` if it is not a JSON object
    pub fn from_json(raw: &str) -> Option<Self> {
        let parsed: Value = serde_json::from_str(raw).ok()?;
        let doc = parsed.as_object()?;
        Some(Self {
            food_request: normalize(doc.get("foodRequest")),
            thank_you: normalize(doc.get("thankYou")),
            rejection: normalize(doc.get("rejection")),
            need_more: normalize(doc.get("needMore")),
        })
    }

    pub fn pool(&self, pool: Pool) -> &[String] {
        match pool {
            Pool::FoodRequest => &self.food_request,
            Pool::ThankYou => &self.thank_you,
            Pool::Rejection => &self.rejection,
            Pool::NeedMore => &self.need_more,
        }
    }

    /// Random line from `pool`, `None` if it is empty
    pub fn pick(&self, pool: Pool) -> Option<String> {
        self.pool(pool).choose(&mut rand::thread_rng()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_full_document() {
        let pools = MessagePools::from_json(
            r#"{
                "foodRequest": ["anyone got food?", "hungry here"],
                "thankYou": ["thanks!"],
                "rejection": ["no thanks"],
                "needMore": ["a bit more please"]
            }"#,
        )
        .unwrap();

        assert_eq!(pools.food_request.len(), 2);
        assert_eq!(pools.pick(Pool::ThankYou).as_deref(), Some("thanks!"));
        assert!(pools.pool(Pool::FoodRequest).contains(&pools.pick(Pool::FoodRequest).unwrap()));
    }

    #[test]
    fn test_missing_and_bad_keys_are_empty() {
        let pools = MessagePools::from_json(r#"{"foodRequest": "not a list", "thankYou": []}"#).unwrap();
        assert!(pools.food_request.is_empty());
        assert!(pools.thank_you.is_empty());
        assert!(pools.rejection.is_empty());
        assert_eq!(pools.pick(Pool::NeedMore), None);
    }

    #[test]
    fn test_non_string_entries_are_stringified() {
        let pools = MessagePools::from_json(r#"{"needMore": [42, true, "ok"]}"#).unwrap();
        assert_eq!(pools.need_more, vec!["42", "true", "ok"]);
    }

    #[test]
    fn test_shipped_pools_load() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("custom_messages/messages.json");
        let pools = MessagePools::load(&path);
        assert!(!pools.food_request.is_empty());
        assert!(!pools.thank_you.is_empty());
        assert!(!pools.rejection.is_empty());
        assert!(!pools.need_more.is_empty());
    }

    #[test]
    fn test_malformed_file_degrades() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert_eq!(MessagePools::load(file.path()), MessagePools::default());

        assert!(MessagePools::from_json("[1, 2]").is_none());
    }

    #[test]
    fn test_missing_file_degrades() {
        let dir = tempfile::TempDir::new().unwrap();
        let pools = MessagePools::load(&dir.path().join("absent.json"));
        assert_eq!(pools, MessagePools::default());
    }
}
