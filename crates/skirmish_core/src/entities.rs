//! Unit and building records and their storage.
//!
//! Records are plain data with an explicit state-machine field per concern
//! (order, navigation, harvest cycle, construction). Storage keeps them in
//! ordered maps so every system visits entities in ascending id order.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::economy::NodeId;
use crate::factions::FactionId;
use crate::kinds::{BuildingKind, UnitKind};
use crate::math::{Fixed, TilePos};
use crate::production::ProductionQueue;

/// Unique identifier for units and buildings. Never reused within a match.
pub type EntityId = u64;

/// An area a unit holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuardArea {
    /// Centre tile.
    pub center: TilePos,
    /// Radius in tiles.
    pub radius: u32,
}

/// A unit's current order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitOrder {
    /// No order.
    Idle,
    /// Walk to a tile.
    Move(TilePos),
    /// Gather from a resource node (engineers).
    Harvest(NodeId),
    /// Unload at a drop-off building (engineers).
    Deposit(EntityId),
    /// Engage an enemy. `None` while the previous target is gone and the
    /// unit is scanning for a new one.
    Attack {
        /// Current target.
        target: Option<EntityId>,
    },
    /// Hold an area, engaging enemies that enter sight.
    Guard(GuardArea),
}

/// Order an attacker falls back to when it runs out of targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Fallback {
    /// Stand still.
    #[default]
    Idle,
    /// Return to guarding.
    Guard(GuardArea),
}

impl Fallback {
    /// The order this fallback resumes.
    #[must_use]
    pub const fn to_order(self) -> UnitOrder {
        match self {
            Self::Idle => UnitOrder::Idle,
            Self::Guard(area) => UnitOrder::Guard(area),
        }
    }
}

/// Movement state reported to whoever issued the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MoveStatus {
    /// No destination.
    #[default]
    Holding,
    /// Following a path.
    EnRoute,
    /// Reached the destination.
    Arrived,
    /// Gave up after repeated failed re-plans.
    Blocked,
}

/// Path-following state of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Navigation {
    /// Where the unit is heading.
    pub destination: Option<TilePos>,
    /// Remaining waypoints, next one first. `None` until planned.
    pub path: Option<VecDeque<TilePos>>,
    /// Progress toward the next waypoint, 0..1.
    pub progress: Fixed,
    /// Consecutive re-plans that found no route.
    pub replan_failures: u8,
    /// Outcome reported to the order source.
    pub status: MoveStatus,
}

impl Navigation {
    /// Head for `destination`. Re-issuing the current destination keeps the
    /// existing path; anything else drops it for a fresh plan.
    pub fn set_destination(&mut self, destination: TilePos) {
        if self.destination == Some(destination) && self.status != MoveStatus::Blocked {
            return;
        }
        self.destination = Some(destination);
        self.path = None;
        self.progress = Fixed::ZERO;
        self.replan_failures = 0;
        self.status = MoveStatus::EnRoute;
    }

    /// Follow a moving goal. While en route the step under way is kept and
    /// the path is cut back to it, so movement re-plans from the next tile
    /// instead of starting over.
    pub fn retarget(&mut self, destination: TilePos) {
        if self.status == MoveStatus::EnRoute {
            if self.destination != Some(destination) {
                self.destination = Some(destination);
                self.path = self.next_waypoint().map(|next| VecDeque::from([next]));
            }
            return;
        }
        self.destination = Some(destination);
        self.path = None;
        self.progress = Fixed::ZERO;
        self.replan_failures = 0;
        self.status = MoveStatus::EnRoute;
    }

    /// Drop any destination and stand still.
    pub fn halt(&mut self) {
        self.destination = None;
        self.path = None;
        self.progress = Fixed::ZERO;
        self.replan_failures = 0;
        self.status = MoveStatus::Holding;
    }

    /// Next waypoint, if any.
    #[must_use]
    pub fn next_waypoint(&self) -> Option<TilePos> {
        self.path.as_ref().and_then(|p| p.front().copied())
    }
}

/// Where an engineer is in its harvest cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HarvestPhase {
    /// Waiting for work.
    #[default]
    Idle,
    /// Walking to a node.
    MovingToNode(NodeId),
    /// Gathering at a node.
    Harvesting(NodeId),
    /// Walking to a drop-off.
    MovingToDeposit(EntityId),
    /// Unloading at a drop-off.
    Depositing(EntityId),
}

/// Engineer-only harvest state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HarvestCycle {
    /// Current phase.
    pub phase: HarvestPhase,
    /// Resources carried.
    pub carried: u32,
    /// Node worked most recently, resumed after a deposit.
    pub last_node: Option<NodeId>,
}

/// A mobile unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// Unique id.
    pub id: EntityId,
    /// Owning faction, fixed for life.
    pub owner: FactionId,
    /// Kind; stats come from the tuning table.
    pub kind: UnitKind,
    /// Current tile.
    pub position: TilePos,
    /// Remaining health.
    pub health: u32,
    /// Current order.
    pub order: UnitOrder,
    /// What an Attack order falls back to.
    pub fallback: Fallback,
    /// Path-following state.
    pub nav: Navigation,
    /// Harvest state; `Some` for engineers only.
    pub harvest: Option<HarvestCycle>,
}

impl Unit {
    /// A fresh unit at full health with no order.
    #[must_use]
    pub fn new(id: EntityId, owner: FactionId, kind: UnitKind, position: TilePos, health: u32) -> Self {
        Self {
            id,
            owner,
            kind,
            position,
            health,
            order: UnitOrder::Idle,
            fallback: Fallback::Idle,
            nav: Navigation::default(),
            harvest: (kind == UnitKind::Engineer).then(HarvestCycle::default),
        }
    }

    /// Whether the unit is idle or guarding (free for new tasks).
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self.order, UnitOrder::Idle | UnitOrder::Guard(_))
    }
}

/// A structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Building {
    /// Unique id.
    pub id: EntityId,
    /// Owning faction, fixed for life.
    pub owner: FactionId,
    /// Kind; stats come from the tuning table.
    pub kind: BuildingKind,
    /// Tile the building occupies.
    pub position: TilePos,
    /// Remaining health.
    pub health: u32,
    /// Assembly ticks done.
    pub assembly_elapsed: u32,
    /// Assembly ticks needed. Zero for buildings placed complete.
    pub assembly_total: u32,
    /// Pending production.
    pub queue: ProductionQueue,
    /// Where finished units appear.
    pub rally_point: TilePos,
    /// Turret target, for armed buildings.
    pub attack_target: Option<EntityId>,
}

impl Building {
    /// A new building that assembles over `assembly_total` ticks.
    #[must_use]
    pub fn new(
        id: EntityId,
        owner: FactionId,
        kind: BuildingKind,
        position: TilePos,
        health: u32,
        assembly_total: u32,
    ) -> Self {
        Self {
            id,
            owner,
            kind,
            position,
            health,
            assembly_elapsed: 0,
            assembly_total,
            queue: ProductionQueue::default(),
            rally_point: position,
            attack_target: None,
        }
    }

    /// Whether assembly has finished.
    #[must_use]
    pub const fn is_constructed(&self) -> bool {
        self.assembly_elapsed >= self.assembly_total
    }

    /// Construction progress in `0..=1`.
    #[must_use]
    pub fn construction_progress(&self) -> Fixed {
        if self.assembly_total == 0 {
            return Fixed::ONE;
        }
        Fixed::from_num(self.assembly_elapsed.min(self.assembly_total))
            / Fixed::from_num(self.assembly_total)
    }

    /// Advance assembly by one tick. Returns true on the completing tick.
    pub fn tick_assembly(&mut self) -> bool {
        if self.is_constructed() {
            return false;
        }
        self.assembly_elapsed += 1;
        self.is_constructed()
    }
}

/// Either kind of entity, borrowed.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    /// A unit.
    Unit(&'a Unit),
    /// A building.
    Building(&'a Building),
}

impl EntityRef<'_> {
    /// Owning faction.
    #[must_use]
    pub const fn owner(&self) -> FactionId {
        match self {
            Self::Unit(u) => u.owner,
            Self::Building(b) => b.owner,
        }
    }

    /// Tile position.
    #[must_use]
    pub const fn position(&self) -> TilePos {
        match self {
            Self::Unit(u) => u.position,
            Self::Building(b) => b.position,
        }
    }

    /// Remaining health.
    #[must_use]
    pub const fn health(&self) -> u32 {
        match self {
            Self::Unit(u) => u.health,
            Self::Building(b) => b.health,
        }
    }
}

/// Storage for all units and buildings.
///
/// Ordered maps give deterministic iteration without re-sorting ids.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    units: BTreeMap<EntityId, Unit>,
    buildings: BTreeMap<EntityId, Building>,
    next_id: EntityId,
}

impl EntityStore {
    /// Empty storage; the first id handed out is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            units: BTreeMap::new(),
            buildings: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Reserve the next id.
    pub fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    /// The id the next allocation will return.
    #[must_use]
    pub const fn peek_next_id(&self) -> EntityId {
        self.next_id
    }

    /// Store a unit under its id.
    pub fn insert_unit(&mut self, unit: Unit) {
        self.units.insert(unit.id, unit);
    }

    /// Store a building under its id.
    pub fn insert_building(&mut self, building: Building) {
        self.buildings.insert(building.id, building);
    }

    /// Remove and return a unit.
    pub fn remove_unit(&mut self, id: EntityId) -> Option<Unit> {
        self.units.remove(&id)
    }

    /// Remove and return a building.
    pub fn remove_building(&mut self, id: EntityId) -> Option<Building> {
        self.buildings.remove(&id)
    }

    /// Unit by id.
    #[must_use]
    pub fn unit(&self, id: EntityId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Mutable unit by id.
    pub fn unit_mut(&mut self, id: EntityId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    /// Building by id.
    #[must_use]
    pub fn building(&self, id: EntityId) -> Option<&Building> {
        self.buildings.get(&id)
    }

    /// Mutable building by id.
    pub fn building_mut(&mut self, id: EntityId) -> Option<&mut Building> {
        self.buildings.get_mut(&id)
    }

    /// Either kind by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<EntityRef<'_>> {
        self.unit(id)
            .map(EntityRef::Unit)
            .or_else(|| self.building(id).map(EntityRef::Building))
    }

    /// Whether an entity with `id` is alive.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.units.contains_key(&id) || self.buildings.contains_key(&id)
    }

    /// Units in ascending id order.
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    /// Units in ascending id order, mutably.
    pub fn units_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        self.units.values_mut()
    }

    /// Buildings in ascending id order.
    pub fn buildings(&self) -> impl Iterator<Item = &Building> {
        self.buildings.values()
    }

    /// Buildings in ascending id order, mutably.
    pub fn buildings_mut(&mut self) -> impl Iterator<Item = &mut Building> {
        self.buildings.values_mut()
    }

    /// Snapshot of unit ids, for loops that mutate while iterating.
    #[must_use]
    pub fn unit_ids(&self) -> Vec<EntityId> {
        self.units.keys().copied().collect()
    }

    /// Snapshot of building ids.
    #[must_use]
    pub fn building_ids(&self) -> Vec<EntityId> {
        self.buildings.keys().copied().collect()
    }

    /// Number of units.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Number of buildings.
    #[must_use]
    pub fn building_count(&self) -> usize {
        self.buildings.len()
    }
}
