//! Owned, read-only views of a match for renderers and drivers.
//!
//! A snapshot copies what an observer needs and nothing it could use to
//! change the match. The terrain grid never changes after generation, so it
//! is shared by `Arc` rather than copied every frame.

use std::sync::Arc;

use serde::Serialize;

use crate::entities::{EntityId, MoveStatus, UnitOrder};
use crate::factions::FactionId;
use crate::kinds::{BuildingKind, Producible, UnitKind};
use crate::math::{fixed_serde, Fixed, TilePos, Vec2Fixed};
use crate::movement::display_position;
use crate::simulation::Outcome;
use crate::terrain::TileMap;
use crate::tuning::TICKS_PER_SECOND;
use crate::world::World;

/// One unit as seen from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitView {
    /// Entity id.
    pub id: EntityId,
    /// Owner.
    pub owner: FactionId,
    /// Kind.
    pub kind: UnitKind,
    /// Current tile.
    pub tile: TilePos,
    /// Interpolated world position.
    pub position: Vec2Fixed,
    /// Remaining health.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Current order.
    pub order: UnitOrder,
    /// Movement status.
    pub status: MoveStatus,
    /// Resources carried (engineers).
    pub carried: u32,
}

/// One queue entry as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueView {
    /// What is being made.
    pub item: Producible,
    /// Completion, 0..=100.
    pub percentage: u32,
    /// Finished but waiting for a tile.
    pub stalled: bool,
}

/// One building as seen from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildingView {
    /// Entity id.
    pub id: EntityId,
    /// Owner.
    pub owner: FactionId,
    /// Kind.
    pub kind: BuildingKind,
    /// Tile.
    pub tile: TilePos,
    /// Remaining health.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Construction progress, 0 to 1.
    #[serde(with = "fixed_serde")]
    pub progress: Fixed,
    /// Production queue, head first.
    pub queue: Vec<QueueView>,
}

/// A resource node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeView {
    /// Tile.
    pub tile: TilePos,
    /// Yield left.
    pub remaining: u32,
    /// Exhausted.
    pub depleted: bool,
}

/// Per-faction summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactionSummary {
    /// Faction id.
    pub id: FactionId,
    /// Display name.
    pub name: &'static str,
    /// Stored resources.
    pub resources: u32,
    /// Tech level.
    pub tech_level: u8,
    /// Units alive.
    pub units: usize,
    /// Buildings standing.
    pub buildings: usize,
    /// Everything ever deposited.
    pub deposited_total: u64,
}

/// Everything an observer sees on one tick.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Ticks simulated so far.
    pub tick: u64,
    /// Match time in seconds.
    #[serde(with = "fixed_serde")]
    pub elapsed_seconds: Fixed,
    /// Whether the clock is frozen.
    pub paused: bool,
    /// Result, once decided.
    pub outcome: Option<Outcome>,
    /// Terrain grid.
    pub terrain: Arc<TileMap>,
    /// Start locations, A then B.
    pub anchors: [TilePos; 2],
    /// Resource nodes by id.
    pub nodes: Vec<NodeView>,
    /// Units, ascending id.
    pub units: Vec<UnitView>,
    /// Buildings, ascending id.
    pub buildings: Vec<BuildingView>,
    /// A then B.
    pub factions: [FactionSummary; 2],
}

impl Snapshot {
    /// Copy the observable state of `world`.
    #[must_use]
    pub fn capture(world: &World, tick: u64, paused: bool, outcome: Option<Outcome>) -> Self {
        let units = world
            .entities()
            .units()
            .map(|u| UnitView {
                id: u.id,
                owner: u.owner,
                kind: u.kind,
                tile: u.position,
                position: display_position(u),
                health: u.health,
                max_health: world.unit_stats(u.kind).max_health,
                order: u.order,
                status: u.nav.status,
                carried: u.harvest.as_ref().map_or(0, |c| c.carried),
            })
            .collect();

        let buildings = world
            .entities()
            .buildings()
            .map(|b| BuildingView {
                id: b.id,
                owner: b.owner,
                kind: b.kind,
                tile: b.position,
                health: b.health,
                max_health: world.building_stats(b.kind).max_health,
                progress: b.construction_progress(),
                queue: b
                    .queue
                    .iter()
                    .map(|e| QueueView {
                        item: e.item,
                        percentage: e.percentage(),
                        stalled: e.stalled_since.is_some(),
                    })
                    .collect(),
            })
            .collect();

        let nodes = world
            .nodes()
            .iter()
            .map(|n| NodeView {
                tile: n.position,
                remaining: n.remaining,
                depleted: n.depleted,
            })
            .collect();

        let factions = FactionId::BOTH.map(|id| {
            let record = world.faction(id);
            FactionSummary {
                id,
                name: id.name(),
                resources: record.resources,
                tech_level: record.tech_level,
                units: record.units.len(),
                buildings: record.buildings.len(),
                deposited_total: record.deposited_total,
            }
        });

        Self {
            tick,
            elapsed_seconds: Fixed::from_num(tick) / Fixed::from_num(TICKS_PER_SECOND),
            paused,
            outcome,
            terrain: world.map_handle(),
            anchors: [world.anchor(FactionId::A), world.anchor(FactionId::B)],
            nodes,
            units,
            buildings,
            factions,
        }
    }

    /// Summary for one faction.
    #[must_use]
    pub const fn faction(&self, id: FactionId) -> &FactionSummary {
        &self.factions[id.index()]
    }

    /// Total health of a faction's units.
    #[must_use]
    pub fn army_health(&self, owner: FactionId) -> u64 {
        self.units
            .iter()
            .filter(|u| u.owner == owner)
            .map(|u| u64::from(u.health))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_generation::MapConfig;
    use crate::simulation::Match;
    use crate::tuning::Tuning;

    fn small_match() -> Match {
        let tuning = Tuning {
            map: MapConfig::small(),
            ..Tuning::default()
        };
        Match::new(11, tuning).unwrap()
    }

    #[test]
    fn test_fresh_snapshot_shows_symmetric_bases() {
        let game = small_match();
        let snap = game.snapshot();
        assert_eq!(snap.tick, 0);
        assert_eq!(snap.elapsed_seconds, Fixed::ZERO);
        let (a, b) = (snap.faction(FactionId::A), snap.faction(FactionId::B));
        assert_eq!(a.resources, b.resources);
        assert_eq!(a.units, b.units);
        assert_eq!(a.name, "Red Horizon");
        assert_eq!(snap.buildings.len(), 2);
        assert!(snap.buildings.iter().all(|b| b.kind == BuildingKind::Hq));
        assert_eq!(snap.terrain.width(), 48);
    }

    #[test]
    fn test_elapsed_time_is_tick_over_rate() {
        let mut game = small_match();
        game.run(30);
        let snap = game.snapshot();
        assert_eq!(snap.elapsed_seconds, Fixed::from_num(1.5));
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = small_match().snapshot();
        let text = ron::to_string(&snap).unwrap();
        assert!(text.contains("Red Horizon"));
    }
}
