//! Chat solicitation

use std::time::Duration;
use tokio::time::Instant;

use super::safety::{FoodSafety, Verdict};
use crate::session::ItemStack;

/// Request pacing while REQUESTING
#[derive(Debug)]
pub struct Solicitor {
    interval: Duration,
    last_request_at: Option<Instant>,
}

impl Solicitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request_at: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// A timer-driven request is due
    pub fn due(&self, now: Instant) -> bool {
        self.last_request_at
            .map_or(true, |last| now.duration_since(last) >= self.interval)
    }

    pub fn mark_requested(&mut self, now: Instant) {
        self.last_request_at = Some(now);
    }
}

/// What to do with an item someone handed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Accept { name: String },
    Reject { name: String, verdict: Verdict },
    /// Not resolvable against the registry
    Ignore,
}

pub fn classify_delivery(safety: &FoodSafety, item: &ItemStack) -> Delivery {
    let name = match safety.item_name(item.type_id) {
        Some(name) => name,
        None if !item.name.is_empty() && safety.has_registry() => item.name.clone(),
        None => return Delivery::Ignore,
    };

    match safety.verdict(&name) {
        Verdict::Safe => Delivery::Accept { name },
        verdict => Delivery::Reject { name, verdict },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FoodInfo, GameRegistry};
    use std::sync::Arc;

    #[test]
    fn test_due_and_reset() {
        let mut s = Solicitor::new(Duration::from_secs(45));
        let now = Instant::now();
        assert!(s.due(now));
        s.mark_requested(now);
        assert!(!s.due(now + Duration::from_secs(44)));
        assert!(s.due(now + Duration::from_secs(45)));
    }

    #[test]
    fn test_classify_delivery() {
        let registry = Arc::new(
            GameRegistry::new()
                .with_effect("poison", 19)
                .with_food(1, "bread", FoodInfo::new(5, 6.0))
                .with_food(2, "spider_eye", FoodInfo::new(2, 3.2).with_effect(19, 1.0))
                .with_item(3, "dirt"),
        );
        let safety = FoodSafety::resolve(&[], &["poison".to_string()], Some(registry));

        assert_eq!(
            classify_delivery(&safety, &ItemStack::new(1, "", 1)),
            Delivery::Accept { name: "bread".into() }
        );
        assert_eq!(
            classify_delivery(&safety, &ItemStack::new(2, "spider_eye", 1)),
            Delivery::Reject {
                name: "spider_eye".into(),
                verdict: Verdict::Unsafe
            }
        );
        assert_eq!(
            classify_delivery(&safety, &ItemStack::new(3, "dirt", 4)),
            Delivery::Reject {
                name: "dirt".into(),
                verdict: Verdict::NotEdible
            }
        );
        assert_eq!(classify_delivery(&safety, &ItemStack::new(99, "", 1)), Delivery::Ignore);

        let blind = FoodSafety::resolve(&[], &[], None);
        assert_eq!(classify_delivery(&blind, &ItemStack::new(1, "bread", 1)), Delivery::Ignore);
    }
}
