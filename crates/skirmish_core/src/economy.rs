//! Resource nodes and the engineer harvest cycle.
//!
//! Each engineer runs a small state machine, advanced once per tick:
//!
//! ```text
//! Idle -> MovingToNode -> Harvesting -> MovingToDeposit -> Depositing -> Idle
//! ```
//!
//! Harvesting gathers `harvest_rate` per tick, capped by the free carry
//! capacity and by what the node has left. A node that runs dry while an
//! engineer walks to it sends the engineer to the nearest undepleted node
//! its faction knows about, or back to Idle.
//!
//! All calculations use integer math for deterministic simulation.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::entities::{EntityId, HarvestCycle, HarvestPhase, UnitOrder};
use crate::factions::FactionId;
use crate::kinds::UnitKind;
use crate::math::TilePos;
use crate::world::World;

/// Index of a resource node in [`World::nodes`].
pub type NodeId = u32;

/// Engineers interact with nodes and drop-offs from this Chebyshev distance.
const INTERACTION_RANGE: u32 = 1;

/// A harvestable mineral cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Tile of the cache.
    pub position: TilePos,
    /// Yield left. Never increases.
    pub remaining: u32,
    /// Set once `remaining` hits zero; the node stays on the map.
    pub depleted: bool,
}

impl ResourceNode {
    /// A node holding `remaining` resources.
    #[must_use]
    pub const fn new(position: TilePos, remaining: u32) -> Self {
        Self {
            position,
            remaining,
            depleted: remaining == 0,
        }
    }

    /// Take up to `requested`. Returns the amount actually taken.
    pub fn extract(&mut self, requested: u32) -> u32 {
        let taken = requested.min(self.remaining);
        self.remaining -= taken;
        if self.remaining == 0 {
            self.depleted = true;
        }
        taken
    }
}

/// Events generated by the economy system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EconomyEvent {
    /// An engineer gathered from a node.
    Gathered {
        /// The engineer.
        engineer: EntityId,
        /// The node.
        node: NodeId,
        /// Amount gathered.
        amount: u32,
    },
    /// An engineer unloaded into its faction's pool.
    Deposited {
        /// The engineer.
        engineer: EntityId,
        /// Receiving building.
        building: EntityId,
        /// Owning faction.
        faction: FactionId,
        /// Amount deposited.
        amount: u32,
    },
    /// A node ran dry.
    NodeDepleted {
        /// The node.
        node: NodeId,
    },
}

/// Advance every engineer's harvest cycle by one tick.
///
/// Engineers under a Move, Attack or Guard order are left alone. Returns
/// the events that occurred, in engineer id order.
pub fn economy_system(world: &mut World) -> Vec<EconomyEvent> {
    let mut events = Vec::new();
    for id in world.store.unit_ids() {
        let Some(unit) = world.store.unit(id) else {
            continue;
        };
        if unit.kind != UnitKind::Engineer
            || !matches!(
                unit.order,
                UnitOrder::Idle | UnitOrder::Harvest(_) | UnitOrder::Deposit(_)
            )
        {
            continue;
        }
        advance_engineer(world, id, &mut events);
    }
    events
}

fn advance_engineer(world: &mut World, id: EntityId, events: &mut Vec<EconomyEvent>) {
    let Some(unit) = world.store.unit(id) else {
        return;
    };
    let owner = unit.owner;
    let position = unit.position;
    let cycle = unit.harvest.unwrap_or_default();
    let stats = world.unit_stats(UnitKind::Engineer);
    let (capacity, rate) = (stats.carry_capacity, stats.harvest_rate);

    let next = match cycle.phase {
        HarvestPhase::Idle => {
            if cycle.carried > 0 {
                nearest_drop_off(world, owner, position).map(HarvestPhase::MovingToDeposit)
            } else {
                nearest_known_node(world, owner, position).map(HarvestPhase::MovingToNode)
            }
        }
        HarvestPhase::MovingToNode(node) => {
            match world.node(node) {
                Some(n) if !n.depleted => {
                    if position.chebyshev(n.position) <= INTERACTION_RANGE {
                        Some(HarvestPhase::Harvesting(node))
                    } else {
                        Some(HarvestPhase::MovingToNode(node))
                    }
                }
                _ if cycle.carried > 0 => {
                    nearest_drop_off(world, owner, position).map(HarvestPhase::MovingToDeposit)
                }
                _ => nearest_known_node(world, owner, position).map(HarvestPhase::MovingToNode),
            }
        }
        HarvestPhase::Harvesting(node) => Some(HarvestPhase::Harvesting(node)),
        HarvestPhase::MovingToDeposit(building) => {
            if is_drop_off(world, owner, building) {
                let at = world.store.building(building).map(|b| b.position);
                match at {
                    Some(p) if position.chebyshev(p) <= INTERACTION_RANGE => {
                        Some(HarvestPhase::Depositing(building))
                    }
                    _ => Some(HarvestPhase::MovingToDeposit(building)),
                }
            } else {
                nearest_drop_off(world, owner, position).map(HarvestPhase::MovingToDeposit)
            }
        }
        HarvestPhase::Depositing(_) => {
            let resume = cycle
                .last_node
                .filter(|node| world.node(*node).is_some_and(|n| !n.depleted))
                .or_else(|| nearest_known_node(world, owner, position));
            resume.map(HarvestPhase::MovingToNode)
        }
    };

    let mut cycle = cycle;
    let mut phase = next.unwrap_or(HarvestPhase::Idle);

    // Work done on arrival happens in the same tick.
    match phase {
        HarvestPhase::Harvesting(node) => {
            let room = capacity.saturating_sub(cycle.carried);
            let gathered = world
                .nodes
                .get_mut(node as usize)
                .map_or(0, |n| n.extract(rate.min(room)));
            cycle.carried += gathered;
            if gathered > 0 {
                events.push(EconomyEvent::Gathered {
                    engineer: id,
                    node,
                    amount: gathered,
                });
            }
            let dry = world.node(node).map_or(true, |n| n.depleted);
            if dry && gathered > 0 {
                events.push(EconomyEvent::NodeDepleted { node });
            }
            if cycle.carried >= capacity || dry {
                phase = if cycle.carried > 0 {
                    nearest_drop_off(world, owner, position)
                        .map_or(HarvestPhase::Idle, HarvestPhase::MovingToDeposit)
                } else {
                    nearest_known_node(world, owner, position)
                        .map_or(HarvestPhase::Idle, HarvestPhase::MovingToNode)
                };
            }
        }
        HarvestPhase::Depositing(building) => {
            if cycle.carried > 0 {
                let amount = cycle.carried;
                cycle.carried = 0;
                world.factions[owner.index()].deposit(amount);
                events.push(EconomyEvent::Deposited {
                    engineer: id,
                    building,
                    faction: owner,
                    amount,
                });
                trace!(engineer = id, building, amount, "Deposit");
            }
        }
        _ => {}
    }

    commit(world, id, cycle, phase);
}

/// Write the new phase back, keeping the order and navigation in step.
fn commit(world: &mut World, id: EntityId, cycle: HarvestCycle, phase: HarvestPhase) {
    let node_tile = |world: &World, node: NodeId| world.node(node).map(|n| n.position);
    let target_tile = match phase {
        HarvestPhase::MovingToNode(node) => node_tile(world, node),
        HarvestPhase::MovingToDeposit(b) => world.store.building(b).map(|b| b.position),
        _ => None,
    };
    let Some(unit) = world.store.unit_mut(id) else {
        return;
    };
    let previous_node = match unit.order {
        UnitOrder::Harvest(node) => Some(node),
        _ => None,
    };
    unit.order = match phase {
        HarvestPhase::Idle => UnitOrder::Idle,
        HarvestPhase::MovingToNode(node) | HarvestPhase::Harvesting(node) => {
            UnitOrder::Harvest(node)
        }
        HarvestPhase::MovingToDeposit(b) | HarvestPhase::Depositing(b) => UnitOrder::Deposit(b),
    };
    match (phase, target_tile) {
        (HarvestPhase::MovingToNode(_) | HarvestPhase::MovingToDeposit(_), Some(tile)) => {
            unit.nav.set_destination(tile);
        }
        _ => unit.nav.halt(),
    }
    unit.harvest = Some(HarvestCycle {
        phase,
        carried: cycle.carried,
        last_node: previous_node.or(cycle.last_node),
    });
    if let HarvestPhase::MovingToNode(node) | HarvestPhase::Harvesting(node) = phase {
        if let Some(c) = unit.harvest.as_mut() {
            c.last_node = Some(node);
        }
    }
}

/// Whether `building` is a finished drop-off owned by `owner`.
fn is_drop_off(world: &World, owner: FactionId, building: EntityId) -> bool {
    world.store.building(building).is_some_and(|b| {
        b.owner == owner && b.is_constructed() && world.building_stats(b.kind).accepts_deposits
    })
}

/// Nearest finished drop-off of `owner`. Ties go to the lower id.
#[must_use]
pub fn nearest_drop_off(world: &World, owner: FactionId, from: TilePos) -> Option<EntityId> {
    world
        .buildings_of(owner)
        .filter(|b| b.is_constructed() && world.building_stats(b.kind).accepts_deposits)
        .min_by_key(|b| (from.distance_squared(b.position), b.id))
        .map(|b| b.id)
}

/// Nearest undepleted node `owner` knows about. Ties go to the lower id.
#[must_use]
pub fn nearest_known_node(world: &World, owner: FactionId, from: TilePos) -> Option<NodeId> {
    world.factions[owner.index()]
        .known_nodes
        .iter()
        .filter_map(|&id| world.node(id).map(|n| (id, n)))
        .filter(|(_, n)| !n.depleted)
        .min_by_key(|(id, n)| (from.distance_squared(n.position), *id))
        .map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::BuildingKind;
    use crate::tuning::Tuning;
    use crate::world::test_support::open_world;

    fn small_engineer_tuning() -> Tuning {
        let mut tuning = Tuning::default();
        tuning.units.engineer.carry_capacity = 5;
        tuning.units.engineer.harvest_rate = 1;
        tuning
    }

    #[test]
    fn test_node_extraction() {
        let mut node = ResourceNode::new(TilePos::new(0, 0), 10);
        assert_eq!(node.extract(4), 4);
        assert_eq!(node.extract(10), 6);
        assert_eq!(node.remaining, 0);
        assert!(node.depleted);
        assert_eq!(node.extract(1), 0);
    }

    #[test]
    fn test_short_node_fills_partial_load_then_returns() {
        let mut world = open_world(16, small_engineer_tuning());
        let hq = world.spawn_building(FactionId::A, BuildingKind::Hq, TilePos::new(2, 2), 0);
        let node = world.add_node(TilePos::new(8, 8), 3);
        let engineer = world.spawn_unit(FactionId::A, UnitKind::Engineer, TilePos::new(7, 8));
        world
            .order_unit(FactionId::A, engineer, UnitOrder::Harvest(node))
            .unwrap();

        for _ in 0..3 {
            economy_system(&mut world);
        }

        let unit = world.unit(engineer).unwrap();
        let cycle = unit.harvest.unwrap();
        assert_eq!(cycle.carried, 3);
        assert_eq!(cycle.phase, HarvestPhase::MovingToDeposit(hq));
        assert_eq!(unit.order, UnitOrder::Deposit(hq));
        assert!(world.node(node).unwrap().depleted);
        assert_eq!(world.node(node).unwrap().remaining, 0);
    }

    #[test]
    fn test_full_load_heads_home() {
        let mut world = open_world(16, small_engineer_tuning());
        let hq = world.spawn_building(FactionId::A, BuildingKind::Hq, TilePos::new(2, 2), 0);
        let node = world.add_node(TilePos::new(8, 8), 100);
        let engineer = world.spawn_unit(FactionId::A, UnitKind::Engineer, TilePos::new(8, 7));
        world
            .order_unit(FactionId::A, engineer, UnitOrder::Harvest(node))
            .unwrap();

        for _ in 0..5 {
            economy_system(&mut world);
        }
        let cycle = world.unit(engineer).unwrap().harvest.unwrap();
        assert_eq!(cycle.carried, 5);
        assert_eq!(cycle.phase, HarvestPhase::MovingToDeposit(hq));
        assert_eq!(world.node(node).unwrap().remaining, 95);
    }

    #[test]
    fn test_deposit_adds_to_pool_and_resumes() {
        let mut world = open_world(16, small_engineer_tuning());
        let hq = world.spawn_building(FactionId::A, BuildingKind::Hq, TilePos::new(4, 4), 0);
        let node = world.add_node(TilePos::new(10, 10), 100);
        let engineer = world.spawn_unit(FactionId::A, UnitKind::Engineer, TilePos::new(5, 4));
        if let Some(unit) = world.store.unit_mut(engineer) {
            unit.harvest = Some(HarvestCycle {
                phase: HarvestPhase::MovingToDeposit(hq),
                carried: 4,
                last_node: Some(node),
            });
            unit.order = UnitOrder::Deposit(hq);
        }
        let before = world.faction(FactionId::A).resources;

        let events = economy_system(&mut world);
        assert!(events.iter().any(|e| matches!(
            e,
            EconomyEvent::Deposited { amount: 4, .. }
        )));
        assert_eq!(world.faction(FactionId::A).resources, before + 4);
        assert_eq!(world.faction(FactionId::A).deposited_total, 4);

        economy_system(&mut world);
        let unit = world.unit(engineer).unwrap();
        assert_eq!(unit.harvest.unwrap().phase, HarvestPhase::MovingToNode(node));
        assert_eq!(unit.nav.destination, Some(TilePos::new(10, 10)));
    }

    #[test]
    fn test_depleted_target_retargets_nearest_known() {
        let mut world = open_world(20, small_engineer_tuning());
        world.spawn_building(FactionId::A, BuildingKind::Hq, TilePos::new(2, 2), 0);
        let far = world.add_node(TilePos::new(15, 15), 50);
        let near = world.add_node(TilePos::new(9, 9), 50);
        let gone = world.add_node(TilePos::new(6, 6), 10);
        world.faction_mut(FactionId::A).known_nodes.extend([far, near, gone]);
        let engineer = world.spawn_unit(FactionId::A, UnitKind::Engineer, TilePos::new(3, 5));
        world
            .order_unit(FactionId::A, engineer, UnitOrder::Harvest(gone))
            .unwrap();
        world.nodes[gone as usize].extract(10);

        economy_system(&mut world);
        let unit = world.unit(engineer).unwrap();
        assert_eq!(unit.order, UnitOrder::Harvest(near));
        assert_eq!(unit.harvest.unwrap().phase, HarvestPhase::MovingToNode(near));
    }

    #[test]
    fn test_depleted_target_with_nothing_known_goes_idle() {
        let mut world = open_world(12, small_engineer_tuning());
        let node = world.add_node(TilePos::new(6, 6), 1);
        let engineer = world.spawn_unit(FactionId::A, UnitKind::Engineer, TilePos::new(1, 5));
        world
            .order_unit(FactionId::A, engineer, UnitOrder::Harvest(node))
            .unwrap();
        world.nodes[node as usize].extract(1);

        economy_system(&mut world);
        let unit = world.unit(engineer).unwrap();
        assert_eq!(unit.order, UnitOrder::Idle);
        assert_eq!(unit.harvest.unwrap().phase, HarvestPhase::Idle);
        assert!(unit.nav.destination.is_none());
    }

    #[test]
    fn test_idle_engineer_picks_up_known_node() {
        let mut world = open_world(12, small_engineer_tuning());
        let node = world.add_node(TilePos::new(6, 6), 40);
        let engineer = world.spawn_unit(FactionId::A, UnitKind::Engineer, TilePos::new(1, 1));
        economy_system(&mut world);
        assert_eq!(world.unit(engineer).unwrap().order, UnitOrder::Idle);

        world.faction_mut(FactionId::A).known_nodes.insert(node);
        economy_system(&mut world);
        assert_eq!(world.unit(engineer).unwrap().order, UnitOrder::Harvest(node));
    }

    #[test]
    fn test_unfinished_refinery_is_not_a_drop_off() {
        let mut world = open_world(16, small_engineer_tuning());
        let hq = world.spawn_building(FactionId::A, BuildingKind::Hq, TilePos::new(12, 12), 0);
        world.spawn_building(FactionId::A, BuildingKind::Refinery, TilePos::new(3, 3), 50);
        assert_eq!(nearest_drop_off(&world, FactionId::A, TilePos::new(2, 2)), Some(hq));
    }
}
