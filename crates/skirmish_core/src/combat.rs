//! Combat resolution.
//!
//! Once per tick, in three passes:
//!
//! 1. **Targeting.** Attackers drop dead or friendly targets and re-scan
//!    `rescan_radius` for the nearest enemy; with none found they revert to
//!    their fallback order. Guarding and idle armed units pick up enemies
//!    inside their vision. Finished armed buildings pick targets inside
//!    weapon range.
//! 2. **Fire.** Every attacker with its target in range and in sight adds
//!    its damage to a per-target total. Attackers out of range chase,
//!    following the target as it moves; one with no route to its target
//!    stands down.
//! 3. **Resolve.** Totals are applied at once, health clamps at zero, and
//!    everything at zero is removed before the phase ends.
//!
//! Damage is `damage * modifier / 100`, floored at `min_damage`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::{EntityId, EntityRef, Fallback, MoveStatus, UnitOrder};
use crate::factions::FactionId;
use crate::kinds::{AttackerClass, TargetClass};
use crate::math::TilePos;
use crate::pathfinding::has_line_of_sight;
use crate::tuning::Tuning;
use crate::world::World;

/// Events generated by the combat system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// One attacker's damage for this tick.
    Hit {
        /// Who fired.
        attacker: EntityId,
        /// Who was hit.
        target: EntityId,
        /// Damage after modifiers.
        amount: u32,
    },
    /// An entity reached zero health and was removed.
    Destroyed {
        /// The entity.
        entity: EntityId,
        /// Its owner.
        owner: FactionId,
    },
}

/// Damage one attack deals, after the kind-vs-kind modifier.
#[must_use]
pub fn scaled_damage(tuning: &Tuning, attacker: AttackerClass, base: u32, target: TargetClass) -> u32 {
    let percent = tuning.combat.modifier(attacker, target);
    (base * percent / 100).max(tuning.combat.min_damage)
}

/// Modifier class of a target.
#[must_use]
pub fn target_class(entity: &EntityRef<'_>) -> TargetClass {
    match entity {
        EntityRef::Unit(u) => TargetClass::Unit(u.kind),
        EntityRef::Building(_) => TargetClass::Building,
    }
}

/// Nearest enemy of `owner` within `radius` of `from`, units and buildings
/// alike. Ties go to the lower id.
#[must_use]
pub fn nearest_enemy(world: &World, owner: FactionId, from: TilePos, radius: u32) -> Option<EntityId> {
    let enemy = owner.opponent();
    let r2 = u64::from(radius) * u64::from(radius);
    let units = world.units_of(enemy).map(|u| (u.id, u.position));
    let buildings = world.buildings_of(enemy).map(|b| (b.id, b.position));
    units
        .chain(buildings)
        .map(|(id, pos)| (from.distance_squared(pos), id))
        .filter(|(d2, _)| *d2 <= r2)
        .min()
        .map(|(_, id)| id)
}

fn is_enemy_of(world: &World, owner: FactionId, target: EntityId) -> bool {
    world.entity(target).is_some_and(|e| e.owner() != owner)
}

fn in_range(from: TilePos, to: TilePos, range: u32) -> bool {
    from.distance_squared(to) <= u64::from(range) * u64::from(range)
}

struct Shot {
    attacker: EntityId,
    target: EntityId,
    amount: u32,
}

/// Run one tick of combat.
pub fn combat_system(world: &mut World) -> Vec<CombatEvent> {
    let mut shots = Vec::new();
    for id in world.store.unit_ids() {
        if let Some(shot) = unit_turn(world, id) {
            shots.push(shot);
        }
    }
    for id in world.store.building_ids() {
        if let Some(shot) = turret_turn(world, id) {
            shots.push(shot);
        }
    }
    resolve(world, shots)
}

fn unit_turn(world: &mut World, id: EntityId) -> Option<Shot> {
    let unit = world.store.unit(id)?;
    let stats = world.unit_stats(unit.kind);
    if !stats.is_armed() {
        return None;
    }
    let (owner, position, kind) = (unit.owner, unit.position, unit.kind);
    let (range, vision, damage, indirect) = (stats.range, stats.vision, stats.damage, stats.indirect_fire);
    let rescan = world.tuning.combat.rescan_radius;

    let target = match unit.order {
        UnitOrder::Attack { target } => {
            let live = target.filter(|t| is_enemy_of(world, owner, *t));
            match live.or_else(|| nearest_enemy(world, owner, position, rescan)) {
                Some(t) => t,
                None => {
                    stand_down(world, id, position);
                    return None;
                }
            }
        }
        UnitOrder::Idle | UnitOrder::Guard(_) => {
            let fallback = match unit.order {
                UnitOrder::Guard(area) => Fallback::Guard(area),
                _ => Fallback::Idle,
            };
            match nearest_enemy(world, owner, position, vision) {
                Some(t) => {
                    let unit = world.store.unit_mut(id)?;
                    unit.fallback = fallback;
                    t
                }
                None => return None,
            }
        }
        UnitOrder::Move(_) | UnitOrder::Harvest(_) | UnitOrder::Deposit(_) => return None,
    };

    let target_ref = world.entity(target)?;
    let target_pos = target_ref.position();
    let class = target_class(&target_ref);
    let can_fire = in_range(position, target_pos, range)
        && (indirect || has_line_of_sight(&world.map, position, target_pos));
    let amount = scaled_damage(&world.tuning, AttackerClass::Unit(kind), damage, class);

    let unit = world.store.unit_mut(id)?;
    unit.order = UnitOrder::Attack {
        target: Some(target),
    };
    if can_fire {
        unit.nav.halt();
        Some(Shot {
            attacker: id,
            target,
            amount,
        })
    } else if unit.nav.status == MoveStatus::Blocked {
        debug!(unit = id, enemy = target, "No route to target, standing down");
        stand_down(world, id, position);
        None
    } else {
        unit.nav.retarget(target_pos);
        None
    }
}

/// Revert an attacker to its fallback order.
fn stand_down(world: &mut World, id: EntityId, position: TilePos) {
    let Some(unit) = world.store.unit_mut(id) else {
        return;
    };
    let fallback = unit.fallback;
    unit.order = fallback.to_order();
    unit.nav.halt();
    if let Fallback::Guard(area) = fallback {
        if !position.within(area.center, area.radius) {
            unit.nav.set_destination(area.center);
        }
    }
}

fn turret_turn(world: &mut World, id: EntityId) -> Option<Shot> {
    let building = world.store.building(id)?;
    if !building.is_constructed() {
        return None;
    }
    let turret = world.building_stats(building.kind).turret?;
    let (owner, position, kind) = (building.owner, building.position, building.kind);

    let keep = building.attack_target.filter(|t| {
        is_enemy_of(world, owner, *t)
            && world
                .entity(*t)
                .is_some_and(|e| in_range(position, e.position(), turret.range))
    });
    let target = keep.or_else(|| nearest_enemy(world, owner, position, turret.range));
    if let Some(b) = world.store.building_mut(id) {
        b.attack_target = target;
    }
    let target = target?;
    let target_ref = world.entity(target)?;
    if !has_line_of_sight(&world.map, position, target_ref.position()) {
        return None;
    }
    let amount = scaled_damage(
        &world.tuning,
        AttackerClass::Building(kind),
        turret.damage,
        target_class(&target_ref),
    );
    Some(Shot {
        attacker: id,
        target,
        amount,
    })
}

fn resolve(world: &mut World, shots: Vec<Shot>) -> Vec<CombatEvent> {
    let mut events = Vec::with_capacity(shots.len());
    let mut totals: BTreeMap<EntityId, u32> = BTreeMap::new();
    for shot in shots {
        *totals.entry(shot.target).or_default() += shot.amount;
        events.push(CombatEvent::Hit {
            attacker: shot.attacker,
            target: shot.target,
            amount: shot.amount,
        });
    }

    let mut dead = Vec::new();
    for (target, amount) in totals {
        let health = if let Some(unit) = world.store.unit_mut(target) {
            unit.health = unit.health.saturating_sub(amount);
            unit.health
        } else if let Some(building) = world.store.building_mut(target) {
            building.health = building.health.saturating_sub(amount);
            building.health
        } else {
            continue;
        };
        if health == 0 {
            dead.push(target);
        }
    }

    for id in dead {
        let Some(owner) = world.entity(id).map(|e| e.owner()) else {
            continue;
        };
        world.remove_entity(id);
        debug!(entity = id, %owner, "Destroyed");
        events.push(CombatEvent::Destroyed { entity: id, owner });
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::GuardArea;
    use crate::kinds::{BuildingKind, UnitKind};
    use crate::terrain::TileMap;
    use crate::world::test_support::open_world;
    use std::sync::Arc;

    #[test]
    fn test_modifiers_scale_damage() {
        let tuning = Tuning::default();
        let ranger = AttackerClass::Unit(UnitKind::Ranger);
        assert_eq!(
            scaled_damage(&tuning, ranger, 2, TargetClass::Unit(UnitKind::Infantry)),
            3
        );
        assert_eq!(scaled_damage(&tuning, ranger, 2, TargetClass::Unit(UnitKind::Tank)), 1);
        assert_eq!(
            scaled_damage(&tuning, AttackerClass::Unit(UnitKind::Artillery), 5, TargetClass::Building),
            10
        );
        assert_eq!(
            scaled_damage(&tuning, ranger, 2, TargetClass::Unit(UnitKind::Engineer)),
            2
        );
    }

    #[test]
    fn test_mutual_kill_is_simultaneous() {
        let mut world = open_world(12, Tuning::default());
        let a = world.spawn_unit(FactionId::A, UnitKind::Infantry, TilePos::new(3, 3));
        let b = world.spawn_unit(FactionId::B, UnitKind::Infantry, TilePos::new(5, 3));
        for id in [a, b] {
            world.store.unit_mut(id).unwrap().health = 1;
        }
        let events = combat_system(&mut world);
        let destroyed = events
            .iter()
            .filter(|e| matches!(e, CombatEvent::Destroyed { .. }))
            .count();
        assert_eq!(destroyed, 2);
        assert!(world.unit(a).is_none());
        assert!(world.unit(b).is_none());
        world.check_invariants().unwrap();
    }

    #[test]
    fn test_removed_on_the_tick_health_hits_zero() {
        let mut world = open_world(12, Tuning::default());
        let shooter = world.spawn_unit(FactionId::A, UnitKind::Tank, TilePos::new(3, 3));
        let victim = world.spawn_unit(FactionId::B, UnitKind::Engineer, TilePos::new(5, 3));
        let damage = world.tuning().units.tank.damage;
        world.store.unit_mut(victim).unwrap().health = damage * 3;
        world
            .order_unit(FactionId::A, shooter, UnitOrder::Attack { target: Some(victim) })
            .unwrap();

        for tick in 1..=3 {
            combat_system(&mut world);
            match world.unit(victim) {
                Some(v) => {
                    assert!(tick < 3);
                    assert!(v.health > 0);
                }
                None => assert_eq!(tick, 3),
            }
        }
        assert!(world.unit(victim).is_none());
        // The shooter saw its target vanish and will re-scan.
        assert_eq!(
            world.unit(shooter).unwrap().order,
            UnitOrder::Attack { target: None }
        );
        combat_system(&mut world);
        assert_eq!(world.unit(shooter).unwrap().order, UnitOrder::Idle);
    }

    #[test]
    fn test_guard_acquires_then_falls_back() {
        let mut world = open_world(20, Tuning::default());
        let area = GuardArea {
            center: TilePos::new(4, 4),
            radius: 3,
        };
        let guard = world.spawn_unit(FactionId::A, UnitKind::Infantry, TilePos::new(4, 4));
        world.order_unit(FactionId::A, guard, UnitOrder::Guard(area)).unwrap();
        let intruder = world.spawn_unit(FactionId::B, UnitKind::Engineer, TilePos::new(8, 4));

        combat_system(&mut world);
        let unit = world.unit(guard).unwrap();
        assert_eq!(unit.order, UnitOrder::Attack { target: Some(intruder) });
        assert_eq!(unit.fallback, Fallback::Guard(area));

        world.remove_entity(intruder);
        combat_system(&mut world);
        assert_eq!(world.unit(guard).unwrap().order, UnitOrder::Guard(area));
    }

    #[test]
    fn test_out_of_range_attacker_chases() {
        let mut world = open_world(30, Tuning::default());
        let tank = world.spawn_unit(FactionId::A, UnitKind::Tank, TilePos::new(2, 2));
        let far = world.spawn_unit(FactionId::B, UnitKind::Engineer, TilePos::new(20, 2));
        world
            .order_unit(FactionId::A, tank, UnitOrder::Attack { target: Some(far) })
            .unwrap();
        let events = combat_system(&mut world);
        assert!(events.is_empty());
        assert_eq!(
            world.unit(tank).unwrap().nav.destination,
            Some(TilePos::new(20, 2))
        );
    }

    #[test]
    fn test_chaser_closes_on_a_moving_target() {
        let mut world = open_world(64, Tuning::default());
        let start = TilePos::new(2, 30);
        let chaser = world.spawn_unit(FactionId::A, UnitKind::Infantry, start);
        let runner = world.spawn_unit(FactionId::B, UnitKind::Tank, TilePos::new(12, 30));
        world
            .order_unit(FactionId::B, runner, UnitOrder::Move(TilePos::new(60, 30)))
            .unwrap();
        world
            .order_unit(FactionId::A, chaser, UnitOrder::Attack { target: Some(runner) })
            .unwrap();

        let gap = |world: &World| {
            let a = world.unit(chaser).unwrap().position;
            let b = world.unit(runner).unwrap().position;
            a.chebyshev(b)
        };
        let mut last = gap(&world);
        let mut fired = false;
        for _ in 0..6 {
            for _ in 0..100 {
                crate::movement::movement_system(&mut world);
                fired |= combat_system(&mut world)
                    .iter()
                    .any(|e| matches!(e, CombatEvent::Hit { attacker, .. } if *attacker == chaser));
            }
            if fired {
                break;
            }
            let now = gap(&world);
            assert!(now < last, "gap stuck at {now}");
            last = now;
        }
        assert!(fired);
        assert_ne!(world.unit(chaser).unwrap().position, start);
    }

    #[test]
    fn test_unreachable_target_is_given_up() {
        let rows = ["..~.....", "..~.....", "..~....."];
        let mut world = World::empty(
            TileMap::from_rows(&rows),
            [TilePos::new(0, 0), TilePos::new(7, 0)],
            Arc::new(Tuning::default()),
        );
        let chaser = world.spawn_unit(FactionId::A, UnitKind::Infantry, TilePos::new(0, 1));
        let target = world.spawn_unit(FactionId::B, UnitKind::Engineer, TilePos::new(7, 1));
        world
            .order_unit(FactionId::A, chaser, UnitOrder::Attack { target: Some(target) })
            .unwrap();

        let limit = usize::from(world.tuning().movement.max_replan_failures);
        for _ in 0..limit {
            combat_system(&mut world);
            crate::movement::movement_system(&mut world);
        }
        assert_eq!(world.unit(chaser).unwrap().nav.status, MoveStatus::Blocked);
        combat_system(&mut world);
        let unit = world.unit(chaser).unwrap();
        assert_eq!(unit.order, UnitOrder::Idle);
        assert_eq!(unit.nav.status, MoveStatus::Holding);
    }

    #[test]
    fn test_mountains_block_direct_fire_only() {
        let rows = ["...^....", "...^....", "...^...."];
        let tuning = Arc::new(Tuning::default());
        let mut world = World::empty(
            TileMap::from_rows(&rows),
            [TilePos::new(0, 0), TilePos::new(7, 0)],
            tuning,
        );
        let infantry = world.spawn_unit(FactionId::A, UnitKind::Infantry, TilePos::new(1, 1));
        let artillery = world.spawn_unit(FactionId::A, UnitKind::Artillery, TilePos::new(1, 0));
        let target = world.spawn_unit(FactionId::B, UnitKind::Tank, TilePos::new(5, 1));
        for id in [infantry, artillery] {
            world
                .order_unit(FactionId::A, id, UnitOrder::Attack { target: Some(target) })
                .unwrap();
        }
        let hits: Vec<_> = combat_system(&mut world)
            .into_iter()
            .filter_map(|e| match e {
                CombatEvent::Hit { attacker, .. } => Some(attacker),
                CombatEvent::Destroyed { .. } => None,
            })
            .collect();
        assert_eq!(hits, vec![artillery]);
    }

    #[test]
    fn test_hq_turret_defends() {
        let mut world = open_world(16, Tuning::default());
        let hq = world.spawn_building(FactionId::A, BuildingKind::Hq, TilePos::new(5, 5), 0);
        let raider = world.spawn_unit(FactionId::B, UnitKind::Infantry, TilePos::new(8, 5));
        let before = world.unit(raider).unwrap().health;
        combat_system(&mut world);
        assert!(world.unit(raider).unwrap().health < before);
        assert_eq!(world.building(hq).unwrap().attack_target, Some(raider));
    }

    #[test]
    fn test_unfinished_building_does_not_fire() {
        let mut world = open_world(16, Tuning::default());
        world.spawn_building(FactionId::A, BuildingKind::Hq, TilePos::new(5, 5), 40);
        let raider = world.spawn_unit(FactionId::B, UnitKind::Engineer, TilePos::new(7, 5));
        let before = world.unit(raider).unwrap().health;
        combat_system(&mut world);
        assert_eq!(world.unit(raider).unwrap().health, before);
    }
}
