//! Food safety policy
//!
//! An item is safe-edible iff the registry knows it as food, it is not banned
//! and none of its consumption effects is on the negative-effect list.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::session::{GameRegistry, ItemStack};

const SUMMARY_TOP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    NotEdible,
    Unsafe,
}

impl Verdict {
    /// Short reason appended to a rejection message
    pub fn reason(&self) -> &'static str {
        match self {
            Verdict::Safe => "safe",
            Verdict::NotEdible => "not edible",
            Verdict::Unsafe => "negative effects",
        }
    }
}

/// Aggregated safe-edible inventory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoodSummary {
    pub count: u32,
    /// Largest stacks first, at most five
    pub top: Vec<(String, u32)>,
}

impl fmt::Display for FoodSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.count)?;
        if !self.top.is_empty() {
            let parts: Vec<String> = self.top.iter().map(|(name, n)| format!("{}x{}", name, n)).collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        Ok(())
    }
}

/// Safety filter resolved against one session's registry
#[derive(Debug, Clone, Default)]
pub struct FoodSafety {
    banned: HashSet<String>,
    negative_ids: HashSet<u32>,
    registry: Option<Arc<GameRegistry>>,
}

impl FoodSafety {
    /// Resolve negative effect names to this registry's ids.
    /// Names the registry does not know are ignored.
    pub fn resolve(banned: &[String], negative_effects: &[String], registry: Option<Arc<GameRegistry>>) -> Self {
        let negative_ids = match &registry {
            Some(registry) => negative_effects
                .iter()
                .filter_map(|name| registry.effect_by_name(name))
                .collect(),
            None => HashSet::new(),
        };

        Self {
            banned: banned.iter().cloned().collect(),
            negative_ids,
            registry,
        }
    }

    pub fn has_registry(&self) -> bool {
        self.registry.is_some()
    }

    pub fn verdict(&self, name: &str) -> Verdict {
        let Some(food) = self.registry.as_ref().and_then(|r| r.food_by_name(name)) else {
            return Verdict::NotEdible;
        };
        if self.banned.contains(name) {
            return Verdict::Unsafe;
        }
        if food.effects.iter().any(|e| self.negative_ids.contains(&e.effect_id)) {
            return Verdict::Unsafe;
        }
        Verdict::Safe
    }

    pub fn is_safe_edible(&self, name: &str) -> bool {
        self.verdict(name) == Verdict::Safe
    }

    /// Registry name for an item type id
    pub fn item_name(&self, type_id: u32) -> Option<String> {
        self.registry.as_ref()?.item_by_id(type_id).map(str::to_string)
    }

    /// Count safe-edible items. No registry means zero.
    pub fn summarize(&self, items: &[ItemStack]) -> FoodSummary {
        if self.registry.is_none() {
            return FoodSummary::default();
        }

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for item in items.iter().filter(|i| self.is_safe_edible(&i.name)) {
            *counts.entry(item.name.as_str()).or_default() += item.count;
        }

        let count = counts.values().sum();
        let mut top: Vec<(String, u32)> = counts.into_iter().map(|(n, c)| (n.to_string(), c)).collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(SUMMARY_TOP);

        FoodSummary { count, top }
    }

    /// Safe stack with the most food points
    pub fn best_food(&self, items: &[ItemStack]) -> Option<ItemStack> {
        let registry = self.registry.as_ref()?;
        items
            .iter()
            .filter(|i| i.count > 0 && self.is_safe_edible(&i.name))
            .max_by_key(|i| registry.food_by_name(&i.name).map(|f| f.food_points).unwrap_or(0))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FoodInfo;

    fn registry() -> Arc<GameRegistry> {
        Arc::new(
            GameRegistry::new()
                .with_effect("poison", 19)
                .with_effect("hunger", 17)
                .with_food(1, "golden_apple", FoodInfo::new(4, 9.6).with_effect(10, 1.0))
                .with_food(2, "pufferfish", FoodInfo::new(1, 0.2).with_effect(19, 1.0))
                .with_food(3, "rotten_flesh", FoodInfo::new(4, 0.8))
                .with_food(4, "bread", FoodInfo::new(5, 6.0))
                .with_food(5, "cooked_beef", FoodInfo::new(8, 12.8))
                .with_item(6, "cobblestone"),
        )
    }

    fn safety() -> FoodSafety {
        FoodSafety::resolve(
            &["rotten_flesh".to_string()],
            &["poison".to_string(), "not_in_this_version".to_string()],
            Some(registry()),
        )
    }

    #[test]
    fn test_classification() {
        let safety = safety();
        assert_eq!(safety.verdict("golden_apple"), Verdict::Safe);
        assert_eq!(safety.verdict("pufferfish"), Verdict::Unsafe);
        assert_eq!(safety.verdict("rotten_flesh"), Verdict::Unsafe);
        assert_eq!(safety.verdict("cobblestone"), Verdict::NotEdible);
        assert_eq!(safety.verdict("unknown_thing"), Verdict::NotEdible);
        assert_eq!(Verdict::Unsafe.reason(), "negative effects");
    }

    #[test]
    fn test_summary() {
        let items = vec![
            ItemStack::new(4, "bread", 3),
            ItemStack::new(4, "bread", 2),
            ItemStack::new(5, "cooked_beef", 1),
            ItemStack::new(2, "pufferfish", 9),
            ItemStack::new(6, "cobblestone", 64),
        ];
        let summary = safety().summarize(&items);
        assert_eq!(summary.count, 6);
        assert_eq!(summary.top[0], ("bread".to_string(), 5));
        assert_eq!(summary.to_string(), "6 (breadx5, cooked_beefx1)");
    }

    #[test]
    fn test_no_registry_is_zero() {
        let safety = FoodSafety::resolve(&[], &["poison".to_string()], None);
        let summary = safety.summarize(&[ItemStack::new(4, "bread", 10)]);
        assert_eq!(summary, FoodSummary::default());
        assert!(!safety.is_safe_edible("bread"));
        assert!(safety.best_food(&[ItemStack::new(4, "bread", 10)]).is_none());
    }

    #[test]
    fn test_best_food_prefers_food_points() {
        let items = vec![
            ItemStack::new(4, "bread", 10),
            ItemStack::new(5, "cooked_beef", 1),
            ItemStack::new(3, "rotten_flesh", 30),
        ];
        assert_eq!(safety().best_food(&items).map(|s| s.name), Some("cooked_beef".to_string()));
    }

    #[test]
    fn test_item_name() {
        assert_eq!(safety().item_name(4).as_deref(), Some("bread"));
        assert_eq!(safety().item_name(999), None);
    }
}
