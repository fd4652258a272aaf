//! Path following.
//!
//! A unit with a destination plans a route on demand and then walks it one
//! waypoint at a time. Progress toward the next waypoint accumulates each
//! tick as `speed * 100 / terrain cost` milli-tiles; a diagonal step needs
//! √2 tiles of progress. Positions only ever change to the next waypoint,
//! so a unit always stands on a whole tile.
//!
//! When the next waypoint has become solid or crowded the unit re-plans
//! around it. Consecutive failed plans are counted; at the configured limit
//! the unit gives up, holds, and reports [`MoveStatus::Blocked`].
//!
//! A retargeted unit finishes its current step and plans onward from there.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::{EntityId, MoveStatus, UnitOrder};
use crate::math::{Fixed, TilePos};
use crate::pathfinding::BASE_STEP_COST;
use crate::terrain::{TerrainKind, TerrainMask};
use crate::world::World;

/// √2 in I32F32.
const DIAGONAL_STEP: Fixed = Fixed::from_bits(6_074_001_000);

/// Events generated by the movement system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementEvent {
    /// A unit reached its destination.
    Arrived {
        /// The unit.
        unit: EntityId,
        /// Where it stopped.
        position: TilePos,
    },
    /// A unit gave up on its destination.
    Blocked {
        /// The unit.
        unit: EntityId,
        /// The destination it could not reach.
        destination: TilePos,
    },
}

enum Plan {
    Route(Vec<TilePos>),
    Failed,
}

/// Move every en-route unit by one tick.
pub fn movement_system(world: &mut World) -> Vec<MovementEvent> {
    let mut events = Vec::new();
    for id in world.store.unit_ids() {
        step_unit(world, id, &mut events);
    }
    events
}

fn step_unit(world: &mut World, id: EntityId, events: &mut Vec<MovementEvent>) {
    let Some(unit) = world.store.unit(id) else {
        return;
    };
    if unit.nav.status != MoveStatus::EnRoute {
        return;
    }
    let Some(destination) = unit.nav.destination else {
        return;
    };
    let position = unit.position;
    let speed = world.unit_stats(unit.kind).speed;

    if position == destination {
        arrive(world, id, events);
        return;
    }

    if unit.nav.path.is_none() {
        match plan(world, position, destination, None) {
            Plan::Route(route) if route.is_empty() => {
                arrive(world, id, events);
                return;
            }
            Plan::Route(route) => set_route(world, id, route),
            Plan::Failed => {
                fail(world, id, destination, events);
                return;
            }
        }
    }

    let Some(next) = world.store.unit(id).and_then(|u| u.nav.next_waypoint()) else {
        arrive(world, id, events);
        return;
    };

    let spatial = world.spatial();
    if spatial.is_blocked(next, TerrainMask::GROUND) || spatial.is_crowded(next) {
        match plan(world, position, destination, Some(next)) {
            Plan::Route(route) if route.is_empty() => arrive(world, id, events),
            Plan::Route(route) => set_route(world, id, route),
            Plan::Failed => fail(world, id, destination, events),
        }
        return;
    }

    let terrain_cost = match world.map.get(next) {
        Some(TerrainKind::Forest) => world.tuning.movement.forest_cost_percent,
        _ => BASE_STEP_COST,
    };
    let gained = Fixed::from_num(speed * BASE_STEP_COST / terrain_cost.max(1)) / 1000;
    let step_length = if next.x != position.x && next.y != position.y {
        DIAGONAL_STEP
    } else {
        Fixed::ONE
    };

    let Some(unit) = world.store.unit_mut(id) else {
        return;
    };
    unit.nav.progress += gained;
    if unit.nav.progress < step_length {
        return;
    }
    unit.nav.progress -= step_length;
    unit.position = next;
    let remaining = unit.nav.path.as_mut().map_or(0, |path| {
        path.pop_front();
        path.len()
    });
    world.occupancy.move_unit(position, next);
    if remaining == 0 {
        // A retargeted path stops short of the new destination.
        match plan(world, next, destination, None) {
            Plan::Route(route) if route.is_empty() => arrive(world, id, events),
            Plan::Route(route) => {
                if let Some(unit) = world.store.unit_mut(id) {
                    unit.nav.path = Some(VecDeque::from(route));
                }
            }
            Plan::Failed => fail(world, id, destination, events),
        }
    }
}

fn plan(world: &World, from: TilePos, to: TilePos, avoid: Option<TilePos>) -> Plan {
    let spatial = world.spatial();
    let route = match avoid {
        Some(tile) => spatial.find_path_avoiding(from, to, TerrainMask::GROUND, tile),
        None => spatial.find_path(from, to, TerrainMask::GROUND),
    };
    route.map_or(Plan::Failed, Plan::Route)
}

fn set_route(world: &mut World, id: EntityId, route: Vec<TilePos>) {
    if let Some(unit) = world.store.unit_mut(id) {
        unit.nav.path = Some(VecDeque::from(route));
        unit.nav.progress = Fixed::ZERO;
        unit.nav.replan_failures = 0;
    }
}

fn arrive(world: &mut World, id: EntityId, events: &mut Vec<MovementEvent>) {
    let Some(unit) = world.store.unit_mut(id) else {
        return;
    };
    unit.nav.path = None;
    unit.nav.progress = Fixed::ZERO;
    unit.nav.replan_failures = 0;
    unit.nav.status = MoveStatus::Arrived;
    if matches!(unit.order, UnitOrder::Move(_)) {
        unit.order = UnitOrder::Idle;
    }
    events.push(MovementEvent::Arrived {
        unit: id,
        position: unit.position,
    });
}

fn fail(world: &mut World, id: EntityId, destination: TilePos, events: &mut Vec<MovementEvent>) {
    let limit = world.tuning.movement.max_replan_failures;
    let Some(unit) = world.store.unit_mut(id) else {
        return;
    };
    unit.nav.path = None;
    unit.nav.progress = Fixed::ZERO;
    unit.nav.replan_failures = unit.nav.replan_failures.saturating_add(1);
    if unit.nav.replan_failures >= limit {
        unit.nav.status = MoveStatus::Blocked;
        debug!(unit = id, %destination, "Unit blocked, holding position");
        events.push(MovementEvent::Blocked {
            unit: id,
            destination,
        });
    }
}

/// Interpolated position between a unit's tile and its next waypoint, for
/// display.
#[must_use]
pub fn display_position(unit: &crate::entities::Unit) -> crate::math::Vec2Fixed {
    let here = unit.position.center();
    let Some(next) = unit.nav.next_waypoint() else {
        return here;
    };
    let step_length = if next.x != unit.position.x && next.y != unit.position.y {
        DIAGONAL_STEP
    } else {
        Fixed::ONE
    };
    here.lerp(next.center(), unit.nav.progress / step_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factions::FactionId;
    use crate::kinds::{BuildingKind, UnitKind};
    use crate::terrain::TileMap;
    use crate::tuning::Tuning;
    use crate::world::test_support::open_world;
    use std::sync::Arc;

    fn run_until_settled(world: &mut World, limit: usize) -> Vec<MovementEvent> {
        let mut all = Vec::new();
        for _ in 0..limit {
            all.extend(movement_system(world));
        }
        all
    }

    #[test]
    fn test_unit_walks_to_destination() {
        let mut world = open_world(16, Tuning::default());
        let unit = world.spawn_unit(FactionId::A, UnitKind::Infantry, TilePos::new(1, 1));
        let goal = TilePos::new(10, 4);
        world.order_unit(FactionId::A, unit, UnitOrder::Move(goal)).unwrap();

        let events = run_until_settled(&mut world, 400);
        assert!(events.contains(&MovementEvent::Arrived {
            unit,
            position: goal
        }));
        let unit = world.unit(unit).unwrap();
        assert_eq!(unit.position, goal);
        assert_eq!(unit.order, UnitOrder::Idle);
        assert_eq!(unit.nav.status, MoveStatus::Arrived);
        world.check_invariants().unwrap();
    }

    #[test]
    fn test_forest_slows_movement() {
        let grass = TileMap::from_rows(&["........"]);
        let forest = TileMap::from_rows(&[".ffffff."]);
        let mut ticks = Vec::new();
        for map in [grass, forest] {
            let mut world = World::empty(
                map,
                [TilePos::new(0, 0), TilePos::new(7, 0)],
                Arc::new(Tuning::default()),
            );
            let unit = world.spawn_unit(FactionId::A, UnitKind::Tank, TilePos::new(0, 0));
            world
                .order_unit(FactionId::A, unit, UnitOrder::Move(TilePos::new(7, 0)))
                .unwrap();
            let mut n = 0;
            while world.unit(unit).unwrap().position != TilePos::new(7, 0) {
                movement_system(&mut world);
                n += 1;
                assert!(n < 1000);
            }
            ticks.push(n);
        }
        assert!(ticks[1] > ticks[0]);
    }

    #[test]
    fn test_unreachable_destination_blocks() {
        let map = TileMap::from_rows(&["..~..", "..~..", "..~.."]);
        let mut world = World::empty(
            map,
            [TilePos::new(0, 0), TilePos::new(4, 0)],
            Arc::new(Tuning::default()),
        );
        let unit = world.spawn_unit(FactionId::A, UnitKind::Infantry, TilePos::new(0, 1));
        world
            .order_unit(FactionId::A, unit, UnitOrder::Move(TilePos::new(4, 1)))
            .unwrap();

        let limit = world.tuning().movement.max_replan_failures;
        let events = run_until_settled(&mut world, usize::from(limit) + 3);
        let blocked: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, MovementEvent::Blocked { .. }))
            .collect();
        assert_eq!(blocked.len(), 1);
        let unit = world.unit(unit).unwrap();
        assert_eq!(unit.nav.status, MoveStatus::Blocked);
        assert_eq!(unit.position, TilePos::new(0, 1));
        assert!(unit.nav.path.is_none());
    }

    #[test]
    fn test_new_building_on_route_forces_detour() {
        let mut world = open_world(12, Tuning::default());
        let unit = world.spawn_unit(FactionId::A, UnitKind::Tank, TilePos::new(1, 5));
        world
            .order_unit(FactionId::A, unit, UnitOrder::Move(TilePos::new(9, 5)))
            .unwrap();
        movement_system(&mut world);
        let next = world.unit(unit).unwrap().nav.next_waypoint().unwrap();
        world.spawn_building(FactionId::B, BuildingKind::Barracks, next, 0);

        run_until_settled(&mut world, 600);
        let unit = world.unit(unit).unwrap();
        assert_eq!(unit.position, TilePos::new(9, 5));
        world.check_invariants().unwrap();
    }

    #[test]
    fn test_solid_destination_stops_adjacent() {
        let mut world = open_world(12, Tuning::default());
        let hq = TilePos::new(8, 8);
        world.spawn_building(FactionId::A, BuildingKind::Hq, hq, 0);
        let unit = world.spawn_unit(FactionId::A, UnitKind::Engineer, TilePos::new(1, 1));
        world.order_unit(FactionId::A, unit, UnitOrder::Move(hq)).unwrap();
        run_until_settled(&mut world, 600);
        let unit = world.unit(unit).unwrap();
        assert_eq!(unit.position.chebyshev(hq), 1);
        assert_eq!(unit.nav.status, MoveStatus::Arrived);
        assert_eq!(unit.order, UnitOrder::Idle);
    }

    #[test]
    fn test_retarget_keeps_the_step_under_way() {
        let mut world = open_world(20, Tuning::default());
        let unit = world.spawn_unit(FactionId::A, UnitKind::Infantry, TilePos::new(2, 10));
        world
            .order_unit(FactionId::A, unit, UnitOrder::Move(TilePos::new(15, 10)))
            .unwrap();
        for _ in 0..5 {
            movement_system(&mut world);
        }
        let before = world.unit(unit).unwrap().nav.clone();
        assert!(before.progress > Fixed::ZERO);

        let goal = TilePos::new(16, 12);
        world.store.unit_mut(unit).unwrap().nav.retarget(goal);
        let nav = &world.unit(unit).unwrap().nav;
        assert_eq!(nav.progress, before.progress);
        assert_eq!(nav.next_waypoint(), before.next_waypoint());
        assert_eq!(nav.path.as_ref().map(VecDeque::len), Some(1));

        let events = run_until_settled(&mut world, 400);
        assert!(events.contains(&MovementEvent::Arrived {
            unit,
            position: goal
        }));
        assert_eq!(world.unit(unit).unwrap().position, goal);
    }

    #[test]
    fn test_display_position_interpolates() {
        let mut world = World::empty(
            TileMap::from_rows(&["........"]),
            [TilePos::new(0, 0), TilePos::new(7, 0)],
            Arc::new(Tuning::default()),
        );
        let unit = world.spawn_unit(FactionId::A, UnitKind::Tank, TilePos::new(1, 0));
        world
            .order_unit(FactionId::A, unit, UnitOrder::Move(TilePos::new(5, 0)))
            .unwrap();
        movement_system(&mut world);
        movement_system(&mut world);
        let u = world.unit(unit).unwrap();
        let shown = display_position(u);
        assert!(shown.x > u.position.center().x);
        assert_eq!(shown.y, u.position.center().y);
    }
}
