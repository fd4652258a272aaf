//! Error types for the skirmish simulation.
//!
//! Three tiers live here. [`GameError`] covers recoverable failures at the
//! crate boundary (bad tuning data, unknown handles). [`OrderRejection`] is
//! the no-op outcome of an order that cannot be carried out; the caller's
//! state is untouched. [`InvariantViolation`] names a broken world invariant
//! and is only ever raised as a panic by the tick validator.

use thiserror::Error;

use crate::entities::EntityId;
use crate::kinds::{BuildingKind, Producible};
use crate::math::TilePos;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for the simulation crate.
#[derive(Debug, Error)]
pub enum GameError {
    /// Tuning text could not be parsed.
    #[error("Failed to parse tuning data '{origin}': {message}")]
    TuningParse {
        /// Where the text came from (file name or `<inline>`).
        origin: String,
        /// Parser message.
        message: String,
    },

    /// Tuning parsed but a value is out of range.
    #[error("Invalid tuning value for {field}: {reason}")]
    InvalidTuning {
        /// Offending field path.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// An order was refused.
    #[error(transparent)]
    Rejected(#[from] OrderRejection),
}

/// Why an order was refused. A rejected order never changes state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderRejection {
    /// The faction cannot pay the cost up front.
    #[error("Insufficient resources: need {required}, have {available}")]
    InsufficientResources {
        /// Cost of the order.
        required: u32,
        /// Resources in the pool.
        available: u32,
    },

    /// The faction's tech level is below the kind's gate.
    #[error("Tech level {current} below required {required}")]
    TechLocked {
        /// Minimum tech level for the kind.
        required: u8,
        /// Faction's tech level.
        current: u8,
    },

    /// Research would push the tech level past its ceiling.
    #[error("Research already at maximum tech level {max}")]
    ResearchMaxed {
        /// Tech ceiling.
        max: u8,
    },

    /// The building kind cannot produce this item.
    #[error("{producer:?} cannot produce {item:?}")]
    WrongProducer {
        /// Kind of the building asked to produce.
        producer: BuildingKind,
        /// What was requested.
        item: Producible,
    },

    /// The producer's queue is at its length limit.
    #[error("Production queue full ({limit} entries)")]
    QueueFull {
        /// Queue length limit.
        limit: usize,
    },

    /// The faction already fields (or has queued) the maximum unit count.
    #[error("Unit cap of {cap} reached")]
    UnitCapReached {
        /// Per-faction unit cap.
        cap: u32,
    },

    /// The producer is still under construction.
    #[error("Building {0} is still under construction")]
    NotConstructed(EntityId),

    /// No entity with this id exists.
    #[error("Unknown entity {0}")]
    UnknownEntity(EntityId),

    /// The entity belongs to the other faction.
    #[error("Entity {0} is not owned by the ordering faction")]
    NotOwned(EntityId),

    /// The order does not apply to this entity (e.g. Harvest on a Tank).
    #[error("Order not applicable to entity {0}")]
    NotApplicable(EntityId),

    /// Destination tile is off the map or impassable.
    #[error("Destination {0} is not reachable terrain")]
    Unreachable(TilePos),

    /// Queue index out of range on cancel.
    #[error("No queue entry at index {0}")]
    NoSuchEntry(usize),

    /// The match already has a winner.
    #[error("Match is over")]
    MatchOver,
}

/// A broken world invariant. Raised only by the validator; never expected
/// in correct operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// Two buildings share a tile.
    #[error("Buildings {first} and {second} overlap at {tile}")]
    SolidOverlap {
        /// Shared tile.
        tile: TilePos,
        /// Lower id.
        first: EntityId,
        /// Higher id.
        second: EntityId,
    },

    /// A building stands on blocking terrain.
    #[error("Building {id} stands on blocking terrain at {tile}")]
    BuildingOnBlockedTerrain {
        /// Building id.
        id: EntityId,
        /// Its tile.
        tile: TilePos,
    },

    /// A unit stands on terrain its mask cannot enter.
    #[error("Unit {id} stands on impassable terrain at {tile}")]
    UnitOnBlockedTerrain {
        /// Unit id.
        id: EntityId,
        /// Its tile.
        tile: TilePos,
    },

    /// An entity is missing from its owner's roster, or listed by both.
    #[error("Ownership of entity {0} is inconsistent")]
    OwnershipMismatch(EntityId),

    /// A faction roster lists an id that does not exist.
    #[error("Faction roster references missing entity {0}")]
    DanglingRoster(EntityId),

    /// An entity with zero health survived its tick.
    #[error("Entity {0} is alive with zero health")]
    ZeroHealthAlive(EntityId),

    /// The occupancy index disagrees with entity positions.
    #[error("Occupancy index out of sync at {0}")]
    OccupancyDrift(TilePos),

    /// A node's depleted flag disagrees with its remaining yield.
    #[error("Resource node {0} depletion flag out of sync")]
    NodeDepletionDrift(u32),
}
