//! The two factions and their bookkeeping.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::economy::NodeId;
use crate::entities::EntityId;

/// Faction identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FactionId {
    /// First faction, north-west start.
    A,
    /// Second faction, the mirrored start.
    B,
}

impl FactionId {
    /// Both factions in update order.
    pub const BOTH: [Self; 2] = [Self::A, Self::B];

    /// Array index.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    /// The other faction.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::A => "Red Horizon",
            Self::B => "Blue Dawn",
        }
    }
}

impl fmt::Display for FactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-faction state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Faction {
    /// Identity.
    pub id: FactionId,
    /// Stored resources. Unsigned, so never negative.
    pub resources: u32,
    /// Tech level; only research completion raises it.
    pub tech_level: u8,
    /// Owned building ids.
    pub buildings: BTreeSet<EntityId>,
    /// Owned unit ids.
    pub units: BTreeSet<EntityId>,
    /// Resource nodes this faction has seen.
    pub known_nodes: BTreeSet<NodeId>,
    /// Running total of deposited resources, for income tracking.
    pub deposited_total: u64,
}

impl Faction {
    /// A fresh faction holding `starting_resources`.
    #[must_use]
    pub const fn new(id: FactionId, starting_resources: u32) -> Self {
        Self {
            id,
            resources: starting_resources,
            tech_level: 0,
            buildings: BTreeSet::new(),
            units: BTreeSet::new(),
            known_nodes: BTreeSet::new(),
            deposited_total: 0,
        }
    }

    /// Whether `amount` can be paid.
    #[must_use]
    pub const fn can_afford(&self, amount: u32) -> bool {
        self.resources >= amount
    }

    /// Pay `amount`, or return false and change nothing.
    pub fn spend(&mut self, amount: u32) -> bool {
        match self.resources.checked_sub(amount) {
            Some(rest) => {
                self.resources = rest;
                true
            }
            None => false,
        }
    }

    /// Add a refund.
    pub fn refund(&mut self, amount: u32) {
        self.resources = self.resources.saturating_add(amount);
    }

    /// Add harvested resources.
    pub fn deposit(&mut self, amount: u32) {
        self.resources = self.resources.saturating_add(amount);
        self.deposited_total += u64::from(amount);
    }

    /// Whether the faction has nothing left.
    #[must_use]
    pub fn is_eliminated(&self) -> bool {
        self.buildings.is_empty() && self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spend_never_goes_negative() {
        let mut f = Faction::new(FactionId::A, 30);
        assert!(!f.spend(50));
        assert_eq!(f.resources, 30);
        assert!(f.spend(30));
        assert_eq!(f.resources, 0);
    }

    #[test]
    fn test_deposits_count_toward_income() {
        let mut f = Faction::new(FactionId::B, 0);
        f.deposit(7);
        f.refund(3);
        assert_eq!(f.resources, 10);
        assert_eq!(f.deposited_total, 7);
    }

    #[test]
    fn test_opponents_pair_up() {
        assert_eq!(FactionId::A.opponent(), FactionId::B);
        assert_eq!(FactionId::B.opponent().index(), 0);
        assert_eq!(FactionId::A.to_string(), "Red Horizon");
    }
}
