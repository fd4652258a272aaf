//! # Skirmish Core
//!
//! Deterministic simulation core for an autonomous two-faction skirmish.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No threads
//! - No floating-point math in simulation state (uses fixed-point)
//! - Randomness only from the match seed
//!
//! Two commanders build economies, research, raise armies and fight on a
//! generated map while an observer watches through [`snapshot::Snapshot`]
//! and steers only the clock (pause, resume, restart).
//!
//! ## Crate Structure
//!
//! - [`map_generation`] - Seeded, symmetric, always-connected maps
//! - [`terrain`], [`occupancy`], [`pathfinding`] - The grid and queries on it
//! - [`entities`], [`factions`], [`world`] - Authoritative state
//! - [`economy`], [`production`], [`movement`], [`combat`] - Per-tick systems
//! - [`commander`] - The AI that plays both sides
//! - [`simulation`] - The match clock
//! - [`tuning`] - Every tunable number

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod combat;
pub mod commander;
pub mod economy;
pub mod entities;
pub mod error;
pub mod factions;
pub mod kinds;
pub mod map_generation;
pub mod math;
pub mod movement;
pub mod occupancy;
pub mod pathfinding;
pub mod production;
pub mod simulation;
pub mod snapshot;
pub mod terrain;
pub mod tuning;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::commander::{CommanderContext, Directive};
    pub use crate::economy::{NodeId, ResourceNode};
    pub use crate::entities::{Building, EntityId, GuardArea, MoveStatus, Unit, UnitOrder};
    pub use crate::error::{GameError, InvariantViolation, OrderRejection, Result};
    pub use crate::factions::{Faction, FactionId};
    pub use crate::kinds::{BuildingKind, Producible, UnitKind};
    pub use crate::map_generation::{generate_map, GeneratedMap, MapConfig, SymmetryMode};
    pub use crate::math::{Fixed, TilePos, Vec2Fixed};
    pub use crate::simulation::{Match, Outcome, TickReport};
    pub use crate::snapshot::Snapshot;
    pub use crate::terrain::{TerrainKind, TileMap};
    pub use crate::tuning::{Tuning, TICKS_PER_SECOND};
    pub use crate::world::World;
}
