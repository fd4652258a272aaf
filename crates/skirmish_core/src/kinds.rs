//! Unit and building kinds.
//!
//! Kinds are plain tagged variants. Every per-kind number lives in the
//! stat tables of [`crate::tuning`]; behavior dispatches on the kind through
//! those tables rather than through trait objects.

use serde::{Deserialize, Serialize};

/// Mobile unit kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitKind {
    /// Unarmed harvester.
    Engineer,
    /// Cheap line infantry.
    Infantry,
    /// Fast skirmisher, effective against infantry.
    Ranger,
    /// Armored vehicle.
    Tank,
    /// Long-range siege gun, effective against buildings.
    Artillery,
}

impl UnitKind {
    /// Every unit kind, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Engineer,
        Self::Infantry,
        Self::Ranger,
        Self::Tank,
        Self::Artillery,
    ];

    /// Kinds that fight. Engineers never take Attack orders.
    pub const ARMY: [Self; 4] = [Self::Infantry, Self::Ranger, Self::Tank, Self::Artillery];

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Engineer => "engineer",
            Self::Infantry => "infantry",
            Self::Ranger => "ranger",
            Self::Tank => "tank",
            Self::Artillery => "artillery",
        }
    }

    /// True for the combat kinds.
    #[must_use]
    pub const fn is_army(self) -> bool {
        !matches!(self, Self::Engineer)
    }
}

/// Structure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BuildingKind {
    /// Headquarters. Given at match start, builds Engineers and structures.
    Hq,
    /// Resource drop-off.
    Refinery,
    /// Trains Infantry and Rangers.
    Barracks,
    /// Builds Tanks and Artillery.
    Factory,
    /// Researches tech levels.
    ResearchLab,
}

impl BuildingKind {
    /// Every building kind, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Hq,
        Self::Refinery,
        Self::Barracks,
        Self::Factory,
        Self::ResearchLab,
    ];

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hq => "hq",
            Self::Refinery => "refinery",
            Self::Barracks => "barracks",
            Self::Factory => "factory",
            Self::ResearchLab => "research_lab",
        }
    }

    /// Whether this kind's production queue accepts `item`.
    #[must_use]
    pub fn can_produce(self, item: Producible) -> bool {
        match (self, item) {
            (Self::Hq, Producible::Unit(UnitKind::Engineer)) => true,
            (Self::Hq, Producible::Building(kind)) => kind != Self::Hq,
            (Self::Barracks, Producible::Unit(UnitKind::Infantry | UnitKind::Ranger)) => true,
            (Self::Factory, Producible::Unit(UnitKind::Tank | UnitKind::Artillery)) => true,
            (Self::ResearchLab, Producible::Research) => true,
            _ => false,
        }
    }
}

/// Anything a production queue can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Producible {
    /// Train a unit.
    Unit(UnitKind),
    /// Fabricate a structure, placed near the producer on completion.
    Building(BuildingKind),
    /// Raise the faction's tech level by one.
    Research,
}

/// What a weapon is shooting at, for damage modifier lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetClass {
    /// A unit of the given kind.
    Unit(UnitKind),
    /// Any structure.
    Building,
}

/// Who is firing, for damage modifier lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackerClass {
    /// A unit of the given kind.
    Unit(UnitKind),
    /// A structure's turret.
    Building(BuildingKind),
}
