//! Authoritative match state.
//!
//! [`World`] owns the terrain, resource nodes, entities, faction records and
//! the occupancy index. Systems mutate it through the crate-internal fields
//! during their phase of a tick; outside code goes through the order and
//! spawn methods here, which keep the rosters and the occupancy index in
//! step with the entity records.
//!
//! Spawning onto a taken tile or blocking terrain is a programming error and
//! panics with the matching [`InvariantViolation`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::economy::{NodeId, ResourceNode};
use crate::entities::{
    Building, EntityId, EntityRef, EntityStore, Fallback, HarvestPhase, Unit, UnitOrder,
};
use crate::error::{InvariantViolation, OrderRejection};
use crate::factions::{Faction, FactionId};
use crate::kinds::{BuildingKind, Producible, UnitKind};
use crate::map_generation::GeneratedMap;
use crate::math::TilePos;
use crate::occupancy::Occupancy;
use crate::pathfinding::Spatial;
use crate::production;
use crate::terrain::{TerrainMask, TileMap};
use crate::tuning::{BuildingStats, Tuning, UnitStats};

/// Radius used by [`World::influence`] when callers have no preference.
pub const DEFAULT_INFLUENCE_RADIUS: u32 = 8;

/// The complete mutable state of one match.
#[derive(Debug, Clone)]
pub struct World {
    pub(crate) map: Arc<TileMap>,
    pub(crate) anchors: [TilePos; 2],
    pub(crate) nodes: Vec<ResourceNode>,
    pub(crate) store: EntityStore,
    pub(crate) factions: [Faction; 2],
    pub(crate) occupancy: Occupancy,
    pub(crate) tuning: Arc<Tuning>,
}

impl World {
    /// A world with terrain and anchors but no entities or nodes.
    ///
    /// Both factions start with the configured starting resources.
    #[must_use]
    pub fn empty(map: TileMap, anchors: [TilePos; 2], tuning: Arc<Tuning>) -> Self {
        let start = tuning.economy.starting_resources;
        let occupancy = Occupancy::new(map.width(), map.height());
        Self {
            map: Arc::new(map),
            anchors,
            nodes: Vec::new(),
            store: EntityStore::new(),
            factions: [Faction::new(FactionId::A, start), Faction::new(FactionId::B, start)],
            occupancy,
            tuning,
        }
    }

    /// Seed a fresh match from a generated map: one node per cache, an HQ on
    /// each anchor and the starting engineers beside it.
    #[must_use]
    pub fn from_generated(generated: GeneratedMap, tuning: Arc<Tuning>) -> Self {
        let mut world = Self::empty(generated.tiles, generated.anchors, tuning);
        for cache in &generated.caches {
            world.add_node(cache.position, cache.yield_amount);
        }
        for faction in FactionId::BOTH {
            let anchor = world.anchors[faction.index()];
            let hq = world.spawn_building(faction, BuildingKind::Hq, anchor, 0);
            for _ in 0..world.tuning.economy.starting_engineers {
                let radius = world.tuning.economy.spawn_radius.max(2);
                match world.free_unit_tile(anchor, radius) {
                    Some(tile) => {
                        world.spawn_unit(faction, UnitKind::Engineer, tile);
                    }
                    None => debug!(%faction, hq, "No room for a starting engineer"),
                }
            }
        }
        world
    }

    /// Add a resource node. Returns its id.
    pub fn add_node(&mut self, position: TilePos, yield_amount: u32) -> NodeId {
        let id = NodeId::try_from(self.nodes.len()).unwrap_or(NodeId::MAX);
        self.nodes.push(ResourceNode::new(position, yield_amount));
        id
    }

    // ---------------------------------------------------------------------
    // Read access
    // ---------------------------------------------------------------------

    /// Terrain grid.
    #[must_use]
    pub fn map(&self) -> &TileMap {
        &self.map
    }

    /// Shared handle to the terrain grid.
    #[must_use]
    pub fn map_handle(&self) -> Arc<TileMap> {
        Arc::clone(&self.map)
    }

    /// Start-zone anchor of a faction.
    #[must_use]
    pub const fn anchor(&self, faction: FactionId) -> TilePos {
        self.anchors[faction.index()]
    }

    /// Parameter table in force.
    #[must_use]
    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// All resource nodes, indexed by [`NodeId`].
    #[must_use]
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    /// One resource node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&ResourceNode> {
        self.nodes.get(id as usize)
    }

    /// Entity storage.
    #[must_use]
    pub const fn entities(&self) -> &EntityStore {
        &self.store
    }

    /// A unit by id.
    #[must_use]
    pub fn unit(&self, id: EntityId) -> Option<&Unit> {
        self.store.unit(id)
    }

    /// A building by id.
    #[must_use]
    pub fn building(&self, id: EntityId) -> Option<&Building> {
        self.store.building(id)
    }

    /// Faction record.
    #[must_use]
    pub const fn faction(&self, id: FactionId) -> &Faction {
        &self.factions[id.index()]
    }

    /// Mutable faction record, for scenario setup.
    pub fn faction_mut(&mut self, id: FactionId) -> &mut Faction {
        &mut self.factions[id.index()]
    }

    /// Occupancy index.
    #[must_use]
    pub const fn occupancy(&self) -> &Occupancy {
        &self.occupancy
    }

    /// Spatial query view over the current state.
    #[must_use]
    pub fn spatial(&self) -> Spatial<'_> {
        Spatial::new(&self.map, &self.occupancy, &self.tuning.movement)
    }

    /// Stats for a unit kind.
    #[must_use]
    pub fn unit_stats(&self, kind: UnitKind) -> &UnitStats {
        self.tuning.units.get(kind)
    }

    /// Stats for a building kind.
    #[must_use]
    pub fn building_stats(&self, kind: BuildingKind) -> &BuildingStats {
        self.tuning.buildings.get(kind)
    }

    /// Units owned by `faction`, ascending id.
    pub fn units_of(&self, faction: FactionId) -> impl Iterator<Item = &Unit> {
        self.factions[faction.index()]
            .units
            .iter()
            .filter_map(|id| self.store.unit(*id))
    }

    /// Buildings owned by `faction`, ascending id.
    pub fn buildings_of(&self, faction: FactionId) -> impl Iterator<Item = &Building> {
        self.factions[faction.index()]
            .buildings
            .iter()
            .filter_map(|id| self.store.building(*id))
    }

    /// The faction's first surviving HQ.
    #[must_use]
    pub fn hq_of(&self, faction: FactionId) -> Option<&Building> {
        self.buildings_of(faction).find(|b| b.kind == BuildingKind::Hq)
    }

    /// Number of `faction` structures within `radius` of `tile`.
    ///
    /// This is the per-tile influence map, computed on demand.
    #[must_use]
    pub fn influence(&self, tile: TilePos, faction: FactionId, radius: u32) -> u32 {
        let count = self
            .buildings_of(faction)
            .filter(|b| b.position.within(tile, radius))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// First tile within `radius` of `center` a new unit may stand on.
    #[must_use]
    pub fn free_unit_tile(&self, center: TilePos, radius: u32) -> Option<TilePos> {
        let spatial = self.spatial();
        spatial.nearest_tile(center, radius, |tile| {
            !spatial.is_blocked(tile, TerrainMask::GROUND) && !spatial.is_crowded(tile)
        })
    }

    // ---------------------------------------------------------------------
    // Spawning and removal
    // ---------------------------------------------------------------------

    /// Create a unit at full health.
    ///
    /// # Panics
    ///
    /// If `position` is off-map, impassable, or holds a building.
    pub fn spawn_unit(&mut self, owner: FactionId, kind: UnitKind, position: TilePos) -> EntityId {
        let id = self.store.allocate_id();
        if !self.map.is_passable(position, TerrainMask::GROUND) {
            panic!("{}", InvariantViolation::UnitOnBlockedTerrain { id, tile: position });
        }
        if let Some(existing) = self.occupancy.building_at(position) {
            panic!(
                "{}",
                InvariantViolation::SolidOverlap {
                    tile: position,
                    first: existing,
                    second: id,
                }
            );
        }
        let health = self.unit_stats(kind).max_health;
        self.store.insert_unit(Unit::new(id, owner, kind, position, health));
        self.factions[owner.index()].units.insert(id);
        self.occupancy.add_unit(position);
        id
    }

    /// Create a building that assembles over `assembly_ticks` (0 = complete).
    ///
    /// # Panics
    ///
    /// If `position` is off-map, blocking terrain, or already holds a
    /// building.
    pub fn spawn_building(
        &mut self,
        owner: FactionId,
        kind: BuildingKind,
        position: TilePos,
        assembly_ticks: u32,
    ) -> EntityId {
        let id = self.store.allocate_id();
        if !self.map.is_passable(position, TerrainMask::GROUND) {
            panic!("{}", InvariantViolation::BuildingOnBlockedTerrain { id, tile: position });
        }
        if let Err(existing) = self.occupancy.place_building(position, id) {
            panic!(
                "{}",
                InvariantViolation::SolidOverlap {
                    tile: position,
                    first: existing,
                    second: id,
                }
            );
        }
        let health = self.building_stats(kind).max_health;
        self.store
            .insert_building(Building::new(id, owner, kind, position, health, assembly_ticks));
        self.factions[owner.index()].buildings.insert(id);
        id
    }

    /// Remove an entity and every reference to it. Returns false if no such
    /// entity exists.
    pub(crate) fn remove_entity(&mut self, id: EntityId) -> bool {
        if let Some(unit) = self.store.remove_unit(id) {
            self.factions[unit.owner.index()].units.remove(&id);
            self.occupancy.remove_unit(unit.position);
        } else if let Some(building) = self.store.remove_building(id) {
            self.factions[building.owner.index()].buildings.remove(&id);
            self.occupancy.remove_building(building.position);
        } else {
            return false;
        }
        self.purge_references(id);
        true
    }

    /// Cancel orders that point at a removed entity.
    fn purge_references(&mut self, gone: EntityId) {
        for unit in self.store.units_mut() {
            match unit.order {
                UnitOrder::Attack { target: Some(t) } if t == gone => {
                    unit.order = UnitOrder::Attack { target: None };
                }
                UnitOrder::Deposit(b) if b == gone => {
                    unit.order = UnitOrder::Idle;
                    unit.nav.halt();
                    if let Some(cycle) = unit.harvest.as_mut() {
                        cycle.phase = HarvestPhase::Idle;
                    }
                }
                _ => {}
            }
        }
        for building in self.store.buildings_mut() {
            if building.attack_target == Some(gone) {
                building.attack_target = None;
            }
        }
    }

    /// Remove a friendly unit on purpose.
    pub fn disband(&mut self, faction: FactionId, unit: EntityId) -> Result<(), OrderRejection> {
        let owner = self
            .store
            .unit(unit)
            .map(|u| u.owner)
            .ok_or(OrderRejection::UnknownEntity(unit))?;
        if owner != faction {
            return Err(OrderRejection::NotOwned(unit));
        }
        self.remove_entity(unit);
        debug!(%faction, unit, "Unit disbanded");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Orders
    // ---------------------------------------------------------------------

    /// Give a unit a new order. A rejected order changes nothing.
    pub fn order_unit(
        &mut self,
        faction: FactionId,
        unit_id: EntityId,
        order: UnitOrder,
    ) -> Result<(), OrderRejection> {
        let unit = self
            .store
            .unit(unit_id)
            .ok_or(OrderRejection::UnknownEntity(unit_id))?;
        if unit.owner != faction {
            return Err(OrderRejection::NotOwned(unit_id));
        }
        let armed = self.unit_stats(unit.kind).is_armed();
        let is_engineer = unit.kind == UnitKind::Engineer;

        match order {
            UnitOrder::Idle => {}
            UnitOrder::Move(dest) => {
                if !self.map.is_passable(dest, TerrainMask::GROUND) {
                    return Err(OrderRejection::Unreachable(dest));
                }
            }
            UnitOrder::Harvest(node) => {
                if !is_engineer {
                    return Err(OrderRejection::NotApplicable(unit_id));
                }
                match self.node(node) {
                    Some(n) if !n.depleted => {}
                    _ => return Err(OrderRejection::NotApplicable(unit_id)),
                }
            }
            UnitOrder::Deposit(target) => {
                if !is_engineer {
                    return Err(OrderRejection::NotApplicable(unit_id));
                }
                let building = self
                    .store
                    .building(target)
                    .ok_or(OrderRejection::UnknownEntity(target))?;
                if building.owner != faction {
                    return Err(OrderRejection::NotOwned(target));
                }
                if !self.building_stats(building.kind).accepts_deposits {
                    return Err(OrderRejection::NotApplicable(target));
                }
            }
            UnitOrder::Attack { target } => {
                if !armed {
                    return Err(OrderRejection::NotApplicable(unit_id));
                }
                if let Some(target) = target {
                    let entity = self
                        .store
                        .get(target)
                        .ok_or(OrderRejection::UnknownEntity(target))?;
                    if entity.owner() == faction {
                        return Err(OrderRejection::NotApplicable(target));
                    }
                }
            }
            UnitOrder::Guard(area) => {
                if !armed {
                    return Err(OrderRejection::NotApplicable(unit_id));
                }
                if !self.map.in_bounds(area.center) {
                    return Err(OrderRejection::Unreachable(area.center));
                }
            }
        }

        let Some(unit) = self.store.unit_mut(unit_id) else {
            return Err(OrderRejection::UnknownEntity(unit_id));
        };
        match order {
            UnitOrder::Idle => {
                unit.nav.halt();
                unit.fallback = Fallback::Idle;
                if let Some(cycle) = unit.harvest.as_mut() {
                    cycle.phase = HarvestPhase::Idle;
                }
            }
            UnitOrder::Move(dest) => unit.nav.set_destination(dest),
            UnitOrder::Harvest(node) => {
                if let Some(cycle) = unit.harvest.as_mut() {
                    cycle.phase = HarvestPhase::MovingToNode(node);
                }
            }
            UnitOrder::Deposit(target) => {
                if let Some(cycle) = unit.harvest.as_mut() {
                    cycle.phase = HarvestPhase::MovingToDeposit(target);
                }
            }
            UnitOrder::Attack { .. } => {
                if let UnitOrder::Guard(area) = unit.order {
                    unit.fallback = Fallback::Guard(area);
                }
            }
            UnitOrder::Guard(area) => {
                unit.fallback = Fallback::Guard(area);
                if !unit.position.within(area.center, area.radius) {
                    unit.nav.set_destination(area.center);
                }
            }
        }
        if !is_engineer || !matches!(order, UnitOrder::Harvest(_) | UnitOrder::Deposit(_)) {
            if let Some(cycle) = unit.harvest.as_mut() {
                cycle.phase = HarvestPhase::Idle;
            }
        }
        unit.order = order;
        Ok(())
    }

    /// Queue an item at a building, paying its cost now.
    pub fn enqueue(
        &mut self,
        faction: FactionId,
        producer: EntityId,
        item: Producible,
    ) -> Result<(), OrderRejection> {
        production::enqueue(self, faction, producer, item)
    }

    /// Cancel a queue entry with a full refund.
    pub fn cancel(
        &mut self,
        faction: FactionId,
        producer: EntityId,
        index: usize,
    ) -> Result<(), OrderRejection> {
        production::cancel(self, faction, producer, index)
    }

    /// Set where a producer's units appear.
    pub fn set_rally_point(
        &mut self,
        faction: FactionId,
        producer: EntityId,
        tile: TilePos,
    ) -> Result<(), OrderRejection> {
        if !self.map.in_bounds(tile) {
            return Err(OrderRejection::Unreachable(tile));
        }
        let building = self
            .store
            .building_mut(producer)
            .ok_or(OrderRejection::UnknownEntity(producer))?;
        if building.owner != faction {
            return Err(OrderRejection::NotOwned(producer));
        }
        building.rally_point = tile;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------------

    /// Check every world invariant. Returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut expected_units: BTreeMap<TilePos, u16> = BTreeMap::new();
        let mut solids: BTreeMap<TilePos, EntityId> = BTreeMap::new();

        for building in self.store.buildings() {
            if building.health == 0 {
                return Err(InvariantViolation::ZeroHealthAlive(building.id));
            }
            if !self.map.is_passable(building.position, TerrainMask::GROUND) {
                return Err(InvariantViolation::BuildingOnBlockedTerrain {
                    id: building.id,
                    tile: building.position,
                });
            }
            if let Some(first) = solids.insert(building.position, building.id) {
                return Err(InvariantViolation::SolidOverlap {
                    tile: building.position,
                    first,
                    second: building.id,
                });
            }
            if self.occupancy.building_at(building.position) != Some(building.id) {
                return Err(InvariantViolation::OccupancyDrift(building.position));
            }
            self.check_roster(building.id, building.owner)?;
        }

        for unit in self.store.units() {
            if unit.health == 0 {
                return Err(InvariantViolation::ZeroHealthAlive(unit.id));
            }
            if !self.map.is_passable(unit.position, TerrainMask::GROUND) {
                return Err(InvariantViolation::UnitOnBlockedTerrain {
                    id: unit.id,
                    tile: unit.position,
                });
            }
            *expected_units.entry(unit.position).or_default() += 1;
            self.check_roster(unit.id, unit.owner)?;
        }

        for (tile, count) in &expected_units {
            if self.occupancy.units_at(*tile) != *count {
                return Err(InvariantViolation::OccupancyDrift(*tile));
            }
        }
        let counted: u64 = expected_units.values().map(|&n| u64::from(n)).sum();
        if counted != self.occupancy.unit_total() {
            let tile = expected_units.keys().next().copied().unwrap_or_default();
            return Err(InvariantViolation::OccupancyDrift(tile));
        }

        for faction in &self.factions {
            for id in faction.units.iter().chain(faction.buildings.iter()) {
                if !self.store.contains(*id) {
                    return Err(InvariantViolation::DanglingRoster(*id));
                }
            }
        }

        for (index, node) in self.nodes.iter().enumerate() {
            if node.depleted != (node.remaining == 0) {
                let id = NodeId::try_from(index).unwrap_or(NodeId::MAX);
                return Err(InvariantViolation::NodeDepletionDrift(id));
            }
        }
        Ok(())
    }

    fn check_roster(&self, id: EntityId, owner: FactionId) -> Result<(), InvariantViolation> {
        let mine = &self.factions[owner.index()];
        let theirs = &self.factions[owner.opponent().index()];
        let listed = mine.units.contains(&id) || mine.buildings.contains(&id);
        let foreign = theirs.units.contains(&id) || theirs.buildings.contains(&id);
        if listed && !foreign {
            Ok(())
        } else {
            Err(InvariantViolation::OwnershipMismatch(id))
        }
    }

    /// Entity by id, either kind.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<EntityRef<'_>> {
        self.store.get(id)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::open_world;
    use super::*;
    use crate::entities::GuardArea;
    use crate::map_generation::{generate_map, MapConfig};

    #[test]
    fn test_fresh_match_is_symmetric() {
        let tuning = Arc::new(Tuning::default());
        let map = generate_map(&MapConfig::small().with_seed(3));
        let world = World::from_generated(map, tuning);
        let a = world.faction(FactionId::A);
        let b = world.faction(FactionId::B);
        assert_eq!(a.resources, b.resources);
        assert_eq!(a.units.len(), b.units.len());
        assert_eq!(a.buildings.len(), 1);
        assert_eq!(b.buildings.len(), 1);
        assert!(world.hq_of(FactionId::A).is_some_and(Building::is_constructed));
        world.check_invariants().unwrap();
    }

    #[test]
    #[should_panic(expected = "overlap")]
    fn overlapping_buildings_panic() {
        let mut world = open_world(12, Tuning::default());
        world.spawn_building(FactionId::A, BuildingKind::Barracks, TilePos::new(4, 4), 0);
        world.spawn_building(FactionId::B, BuildingKind::Barracks, TilePos::new(4, 4), 0);
    }

    #[test]
    fn test_harvest_order_on_tank_is_rejected() {
        let mut world = open_world(12, Tuning::default());
        let node = world.add_node(TilePos::new(6, 6), 100);
        let tank = world.spawn_unit(FactionId::A, UnitKind::Tank, TilePos::new(2, 2));
        let before = world.unit(tank).cloned();
        assert_eq!(
            world.order_unit(FactionId::A, tank, UnitOrder::Harvest(node)),
            Err(OrderRejection::NotApplicable(tank))
        );
        assert_eq!(world.unit(tank).cloned(), before);
    }

    #[test]
    fn test_foreign_units_cannot_be_ordered() {
        let mut world = open_world(12, Tuning::default());
        let tank = world.spawn_unit(FactionId::B, UnitKind::Tank, TilePos::new(2, 2));
        assert_eq!(
            world.order_unit(FactionId::A, tank, UnitOrder::Move(TilePos::new(5, 5))),
            Err(OrderRejection::NotOwned(tank))
        );
    }

    #[test]
    fn test_attack_from_guard_remembers_the_area() {
        let mut world = open_world(12, Tuning::default());
        let tank = world.spawn_unit(FactionId::A, UnitKind::Tank, TilePos::new(2, 2));
        let enemy = world.spawn_unit(FactionId::B, UnitKind::Infantry, TilePos::new(8, 8));
        let area = GuardArea {
            center: TilePos::new(2, 2),
            radius: 3,
        };
        world.order_unit(FactionId::A, tank, UnitOrder::Guard(area)).unwrap();
        world
            .order_unit(FactionId::A, tank, UnitOrder::Attack { target: Some(enemy) })
            .unwrap();
        assert_eq!(world.unit(tank).map(|u| u.fallback), Some(Fallback::Guard(area)));
    }

    #[test]
    fn test_removal_clears_rosters_and_references() {
        let mut world = open_world(12, Tuning::default());
        let tank = world.spawn_unit(FactionId::A, UnitKind::Tank, TilePos::new(2, 2));
        let enemy = world.spawn_unit(FactionId::B, UnitKind::Infantry, TilePos::new(3, 2));
        world
            .order_unit(FactionId::A, tank, UnitOrder::Attack { target: Some(enemy) })
            .unwrap();
        assert!(world.remove_entity(enemy));
        assert!(!world.faction(FactionId::B).units.contains(&enemy));
        assert_eq!(
            world.unit(tank).map(|u| u.order),
            Some(UnitOrder::Attack { target: None })
        );
        assert_eq!(world.occupancy().units_at(TilePos::new(3, 2)), 0);
        world.check_invariants().unwrap();
    }

    #[test]
    fn test_disband_only_own_units() {
        let mut world = open_world(12, Tuning::default());
        let unit = world.spawn_unit(FactionId::A, UnitKind::Infantry, TilePos::new(2, 2));
        assert_eq!(
            world.disband(FactionId::B, unit),
            Err(OrderRejection::NotOwned(unit))
        );
        world.disband(FactionId::A, unit).unwrap();
        assert!(world.unit(unit).is_none());
        assert_eq!(world.disband(FactionId::A, unit), Err(OrderRejection::UnknownEntity(unit)));
    }

    #[test]
    fn test_influence_counts_nearby_structures() {
        let mut world = open_world(16, Tuning::default());
        world.spawn_building(FactionId::A, BuildingKind::Hq, TilePos::new(3, 3), 0);
        world.spawn_building(FactionId::A, BuildingKind::Barracks, TilePos::new(5, 3), 0);
        world.spawn_building(FactionId::B, BuildingKind::Hq, TilePos::new(12, 12), 0);
        assert_eq!(world.influence(TilePos::new(4, 4), FactionId::A, 3), 2);
        assert_eq!(world.influence(TilePos::new(4, 4), FactionId::B, 3), 0);
    }

    #[test]
    fn test_drifted_occupancy_is_detected() {
        let mut world = open_world(12, Tuning::default());
        world.spawn_unit(FactionId::A, UnitKind::Infantry, TilePos::new(2, 2));
        world.occupancy.add_unit(TilePos::new(7, 7));
        assert!(matches!(
            world.check_invariants(),
            Err(InvariantViolation::OccupancyDrift(_))
        ));
    }
}
