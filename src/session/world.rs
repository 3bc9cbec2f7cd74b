//! World-facing value types shared by the session capability and the core

use std::collections::HashMap;
use std::fmt;

/// Continuous position in the world
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: Vec3) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Block containing this position
    pub fn block(&self) -> BlockPos {
        BlockPos::new(self.x.floor() as i32, self.y.floor() as i32, self.z.floor() as i32)
    }
}

/// Discrete block coordinate, also the key of container memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(self.x as f64 + 0.5, self.y as f64, self.z as f64 + 0.5)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

/// One inventory or container slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStack {
    pub type_id: u32,
    pub name: String,
    pub count: u32,
    pub metadata: u32,
}

impl ItemStack {
    pub fn new(type_id: u32, name: impl Into<String>, count: u32) -> Self {
        Self {
            type_id,
            name: name.into(),
            count,
            metadata: 0,
        }
    }
}

/// Status effect a food may apply when consumed
#[derive(Debug, Clone, PartialEq)]
pub struct FoodEffect {
    pub effect_id: u32,
    pub chance: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FoodInfo {
    pub food_points: u32,
    pub saturation: f32,
    pub effects: Vec<FoodEffect>,
}

impl FoodInfo {
    pub fn new(food_points: u32, saturation: f32) -> Self {
        Self {
            food_points,
            saturation,
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect_id: u32, chance: f32) -> Self {
        self.effects.push(FoodEffect { effect_id, chance });
        self
    }
}

/// Version-specific lookup tables exposed by the session
///
/// Ids are only meaningful for the protocol version the session negotiated,
/// so callers resolve names to ids per session.
#[derive(Debug, Clone, Default)]
pub struct GameRegistry {
    foods: HashMap<String, FoodInfo>,
    effects: HashMap<String, u32>,
    items: HashMap<u32, String>,
    blocks: HashMap<String, u32>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, type_id: u32, name: &str) -> Self {
        self.items.insert(type_id, name.to_string());
        self
    }

    pub fn with_food(mut self, type_id: u32, name: &str, info: FoodInfo) -> Self {
        self.items.insert(type_id, name.to_string());
        self.foods.insert(name.to_string(), info);
        self
    }

    pub fn with_effect(mut self, name: &str, effect_id: u32) -> Self {
        self.effects.insert(name.to_string(), effect_id);
        self
    }

    pub fn with_block(mut self, name: &str, block_id: u32) -> Self {
        self.blocks.insert(name.to_string(), block_id);
        self
    }

    pub fn food_by_name(&self, name: &str) -> Option<&FoodInfo> {
        self.foods.get(name)
    }

    pub fn effect_by_name(&self, name: &str) -> Option<u32> {
        self.effects.get(name).copied()
    }

    pub fn item_by_id(&self, type_id: u32) -> Option<&str> {
        self.items.get(&type_id).map(String::as_str)
    }

    pub fn block_by_name(&self, name: &str) -> Option<u32> {
        self.blocks.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.foods.is_empty() && self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_of_negative_coordinates() {
        let pos = Vec3::new(-0.5, 64.0, 10.9);
        assert_eq!(pos.block(), BlockPos::new(-1, 64, 10));
        assert_eq!(BlockPos::new(-1, 64, 10).to_string(), "-1,64,10");
    }

    #[test]
    fn test_distance() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 0.0);
        assert!((a.distance_to(b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_registry_lookups() {
        let registry = GameRegistry::new()
            .with_food(10, "bread", FoodInfo::new(5, 6.0))
            .with_item(20, "stone")
            .with_effect("poison", 19)
            .with_block("chest", 54);

        assert_eq!(registry.item_by_id(10), Some("bread"));
        assert_eq!(registry.item_by_id(20), Some("stone"));
        assert!(registry.food_by_name("bread").is_some());
        assert!(registry.food_by_name("stone").is_none());
        assert_eq!(registry.effect_by_name("poison"), Some(19));
        assert_eq!(registry.block_by_name("chest"), Some(54));
        assert!(!registry.is_empty());
        assert!(GameRegistry::new().is_empty());
    }
}
