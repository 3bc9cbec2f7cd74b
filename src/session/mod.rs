//! Game session capability
//!
//! The transport, entity model and pathfinding live behind these traits.

mod traits;
mod world;

pub use traits::{
    ConnectTarget, ContainerHandle, GameSession, LatencySources, MovementPolicy, Navigator,
    SessionConnector, SessionEvent, SessionHandle,
};
pub use world::{BlockPos, FoodEffect, FoodInfo, GameRegistry, ItemStack, Vec3};
