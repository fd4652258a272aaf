//! Home defense and the attack force.
//!
//! Strength is health times damage summed over armed units; the enemy side
//! of the comparison only counts what intel has seen. An attack launches
//! once the available army is large enough and outweighs known enemy
//! strength by `attack_ratio_percent`. It then stays committed to its goal
//! until the goal is gone or the force has lost too much, at which point it
//! picks a new goal or, when the odds no longer hold, falls back home.
//!
//! Units whose movement reports [`MoveStatus::Blocked`] are reordered: an
//! attacker that cannot reach the goal leaves the force and heads home, and
//! a blocked home guard gets its order again.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::entities::{EntityId, GuardArea, MoveStatus, Unit, UnitOrder};
use crate::math::TilePos;
use crate::world::World;

use super::{CommanderContext, Directive};

/// Radius of the guard area used when marching on the enemy anchor.
const ANCHOR_GUARD_RADIUS: u32 = 4;

/// Where an attack is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AttackGoal {
    /// A sighted enemy entity.
    Entity {
        /// Target id.
        id: EntityId,
        /// Where it was last seen.
        position: TilePos,
    },
    /// The enemy start location, when nothing better is known.
    Anchor(TilePos),
}

/// A committed attack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AttackPlan {
    /// Current goal.
    pub goal: AttackGoal,
    /// Member strength when the goal was set.
    pub launch_strength: u64,
    /// Units in the attack.
    pub members: BTreeSet<EntityId>,
}

fn unit_strength(world: &World, unit: &Unit) -> u64 {
    u64::from(unit.health) * u64::from(world.unit_stats(unit.kind).damage)
}

/// Summed strength of the given units that are still alive.
#[must_use]
pub fn strength_of_units<'a>(world: &World, ids: impl IntoIterator<Item = &'a EntityId>) -> u64 {
    ids.into_iter()
        .filter_map(|id| world.unit(*id))
        .map(|u| unit_strength(world, u))
        .sum()
}

/// Summed strength of every known enemy.
#[must_use]
pub fn known_enemy_strength(ctx: &CommanderContext) -> u64 {
    ctx.sightings.values().map(|s| s.strength).sum()
}

fn odds_hold(world: &World, own: u64, enemy: u64) -> bool {
    let ratio = u64::from(world.tuning().commander.attack_ratio_percent);
    own > 0 && own * 100 >= ratio * enemy
}

/// Buildings first, then units, nearest to `from`; the enemy anchor if
/// nothing has been seen.
#[must_use]
pub fn choose_goal(world: &World, ctx: &CommanderContext, from: TilePos) -> AttackGoal {
    let nearest = |buildings: bool| {
        ctx.sightings
            .values()
            .filter(|s| s.is_building() == buildings)
            .min_by_key(|s| (s.position.distance_squared(from), s.id))
    };
    nearest(true)
        .or_else(|| nearest(false))
        .map_or_else(
            || AttackGoal::Anchor(world.anchor(ctx.faction().opponent())),
            |s| AttackGoal::Entity {
                id: s.id,
                position: s.position,
            },
        )
}

fn goal_order(goal: AttackGoal) -> UnitOrder {
    match goal {
        AttackGoal::Entity { id, .. } => UnitOrder::Attack { target: Some(id) },
        AttackGoal::Anchor(center) => UnitOrder::Guard(GuardArea {
            center,
            radius: ANCHOR_GUARD_RADIUS,
        }),
    }
}

fn is_blocked(unit: &Unit) -> bool {
    unit.nav.status == MoveStatus::Blocked
}

fn issue(world: &World, plan: &AttackPlan, out: &mut Vec<Directive>) {
    let order = goal_order(plan.goal);
    for unit in plan.members.iter().filter_map(|id| world.unit(*id)) {
        let engaged = matches!(unit.order, UnitOrder::Attack { target: Some(_) });
        if unit.order != order && !engaged {
            out.push(Directive::Order {
                unit: unit.id,
                order,
            });
        }
    }
}

/// Run defense, attack launch and attack steering.
pub fn plan(world: &World, ctx: &mut CommanderContext, out: &mut Vec<Directive>) {
    let faction = ctx.faction();
    let tuning = &world.tuning().commander;
    let home = world
        .hq_of(faction)
        .map_or_else(|| world.anchor(faction), |hq| hq.position);
    let home_guard = UnitOrder::Guard(GuardArea {
        center: home,
        radius: (tuning.defend_radius / 2).max(1),
    });
    let army: Vec<&Unit> = world
        .units_of(faction)
        .filter(|u| u.kind.is_army())
        .collect();

    let threat = ctx
        .sightings
        .values()
        .filter(|s| !s.is_building() && s.position.within(home, tuning.defend_radius))
        .min_by_key(|s| (s.position.distance_squared(home), s.id));
    if let Some(threat) = threat {
        let order = UnitOrder::Attack {
            target: Some(threat.id),
        };
        let attacking: BTreeSet<EntityId> = ctx
            .attack
            .as_ref()
            .map(|p| p.members.clone())
            .unwrap_or_default();
        for unit in army
            .iter()
            .filter(|u| u.is_available() && !attacking.contains(&u.id))
        {
            out.push(Directive::Order {
                unit: unit.id,
                order,
            });
        }
        debug!(%faction, threat = threat.id, "Defending home");
        return;
    }

    let own_strength: u64 = army.iter().map(|u| unit_strength(world, u)).sum();
    let enemy_strength = known_enemy_strength(ctx);

    if let Some(mut current) = ctx.attack.take() {
        let stranded: Vec<EntityId> = current
            .members
            .iter()
            .copied()
            .filter(|id| world.unit(*id).is_some_and(is_blocked))
            .collect();
        current
            .members
            .retain(|id| world.unit(*id).is_some() && !stranded.contains(id));
        if !stranded.is_empty() {
            debug!(%faction, count = stranded.len(), "Stranded attackers sent home");
            for id in &stranded {
                out.push(Directive::Order {
                    unit: *id,
                    order: home_guard,
                });
            }
        }
        if current.members.is_empty() {
            debug!(%faction, "Attack force lost");
            if !stranded.is_empty() {
                return;
            }
        } else {
            let survivors = strength_of_units(world, &current.members);
            let goal_gone = match current.goal {
                AttackGoal::Entity { id, .. } => !ctx.sightings.contains_key(&id),
                AttackGoal::Anchor(_) => !ctx.sightings.is_empty(),
            };
            let loss = u64::from(tuning.retarget_loss_percent);
            let depleted = survivors * 100 < loss * current.launch_strength;

            if depleted && !odds_hold(world, own_strength, enemy_strength) {
                info!(%faction, survivors, "Attack called off");
                for id in &current.members {
                    out.push(Directive::Order {
                        unit: *id,
                        order: home_guard,
                    });
                }
                return;
            }
            if goal_gone || depleted {
                current.goal = choose_goal(world, ctx, home);
                current.launch_strength = survivors;
                debug!(%faction, goal = ?current.goal, "Attack retargeted");
            }
            issue(world, &current, out);
            ctx.attack = Some(current);
            return;
        }
    }

    let available: BTreeSet<EntityId> = army
        .iter()
        .filter(|u| u.is_available())
        .map(|u| u.id)
        .collect();
    let group = usize::try_from(tuning.min_attack_group).unwrap_or(usize::MAX);
    let launch_strength = strength_of_units(world, &available);
    if available.len() < group || !odds_hold(world, launch_strength, enemy_strength) {
        for unit in army
            .iter()
            .filter(|u| u.order == UnitOrder::Idle || (u.order == home_guard && is_blocked(u)))
        {
            out.push(Directive::Order {
                unit: unit.id,
                order: home_guard,
            });
        }
        return;
    }
    let launched = AttackPlan {
        goal: choose_goal(world, ctx, home),
        launch_strength,
        members: available,
    };
    info!(
        %faction,
        size = launched.members.len(),
        goal = ?launched.goal,
        "Attack launched"
    );
    issue(world, &launched, out);
    ctx.attack = Some(launched);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commander::{apply, intel};
    use crate::factions::FactionId;
    use crate::kinds::{BuildingKind, UnitKind};
    use crate::movement::movement_system;
    use crate::terrain::TerrainKind;
    use crate::tuning::Tuning;
    use crate::world::test_support::open_world;
    use std::sync::Arc;

    fn home_with_army(size: u32) -> (World, Vec<EntityId>) {
        home_with_army_tuned(size, Tuning::default())
    }

    fn home_with_army_tuned(size: u32, tuning: Tuning) -> (World, Vec<EntityId>) {
        let mut world = open_world(48, tuning);
        world.spawn_building(FactionId::A, BuildingKind::Hq, TilePos::new(3, 3), 0);
        let army = (0..size)
            .map(|i| world.spawn_unit(FactionId::A, UnitKind::Infantry, TilePos::new(5 + i, 6)))
            .collect();
        (world, army)
    }

    #[test]
    fn test_small_army_guards_home() {
        let (world, army) = home_with_army(3);
        let mut ctx = CommanderContext::new(FactionId::A);
        let mut out = Vec::new();
        plan(&world, &mut ctx, &mut out);
        assert_eq!(out.len(), army.len());
        assert!(out.iter().all(|d| matches!(
            d,
            Directive::Order {
                order: UnitOrder::Guard(GuardArea { center, .. }),
                ..
            } if *center == TilePos::new(3, 3)
        )));
        assert!(ctx.attack_plan().is_none());
    }

    #[test]
    fn test_blind_attack_marches_on_enemy_anchor() {
        let (world, army) = home_with_army(6);
        let mut ctx = CommanderContext::new(FactionId::A);
        let mut out = Vec::new();
        plan(&world, &mut ctx, &mut out);

        let anchor = world.anchor(FactionId::B);
        let plan = ctx.attack_plan().unwrap();
        assert_eq!(plan.goal, AttackGoal::Anchor(anchor));
        assert_eq!(plan.members.len(), army.len());
        let marching = out
            .iter()
            .filter(|d| matches!(
                d,
                Directive::Order { order: UnitOrder::Guard(area), .. } if area.center == anchor
            ))
            .count();
        assert_eq!(marching, army.len());
    }

    #[test]
    fn test_no_attack_into_stronger_known_enemy() {
        let (mut world, _) = home_with_army(6);
        for x in 0..6 {
            world.spawn_unit(FactionId::B, UnitKind::Tank, TilePos::new(30 + x, 40));
        }
        let mut ctx = CommanderContext::new(FactionId::A);
        // A scout sees the tanks.
        world.spawn_unit(FactionId::A, UnitKind::Engineer, TilePos::new(33, 36));
        intel::observe(&mut world, &mut ctx, 0);
        assert_eq!(ctx.sightings().len(), 6);

        let mut out = Vec::new();
        plan(&world, &mut ctx, &mut out);
        assert!(ctx.attack_plan().is_none());
    }

    #[test]
    fn test_intruder_near_home_is_engaged() {
        let (mut world, army) = home_with_army(2);
        let intruder = world.spawn_unit(FactionId::B, UnitKind::Infantry, TilePos::new(9, 9));
        let mut ctx = CommanderContext::new(FactionId::A);
        intel::observe(&mut world, &mut ctx, 0);

        let mut out = Vec::new();
        plan(&world, &mut ctx, &mut out);
        let expected: Vec<_> = army
            .iter()
            .map(|&unit| Directive::Order {
                unit,
                order: UnitOrder::Attack {
                    target: Some(intruder),
                },
            })
            .collect();
        assert_eq!(out, expected);
        assert_eq!(apply(&mut world, FactionId::A, &out), army.len());
    }

    #[test]
    fn test_depleted_attack_falls_back_home() {
        let mut tuning = Tuning::default();
        tuning.commander.defend_radius = 4;
        let (mut world, army) = home_with_army_tuned(6, tuning);
        let mut ctx = CommanderContext::new(FactionId::A);
        let mut out = Vec::new();
        plan(&world, &mut ctx, &mut out);
        assert_eq!(apply(&mut world, FactionId::A, &out), army.len());

        for &id in &army[1..] {
            world.remove_entity(id);
        }
        // The survivor spots a strong enemy group far from home.
        for x in 0..3 {
            world.spawn_unit(FactionId::B, UnitKind::Tank, TilePos::new(8 + x, 12));
        }
        intel::observe(&mut world, &mut ctx, 1);
        assert!(!ctx.sightings().is_empty());

        let mut out = Vec::new();
        plan(&world, &mut ctx, &mut out);
        assert!(ctx.attack_plan().is_none());
        assert!(matches!(
            out.as_slice(),
            [Directive::Order { order: UnitOrder::Guard(area), .. }] if area.center == TilePos::new(3, 3)
        ));
    }

    fn walled_in(world: &mut World, at: TilePos) {
        let mut map = (*world.map).clone();
        for dy in -1..=1 {
            for dx in -1..=1 {
                if (dx, dy) != (0, 0) {
                    map.set(at.offset(dx, dy).unwrap(), TerrainKind::Water);
                }
            }
        }
        world.map = Arc::new(map);
    }

    fn settle_movement(world: &mut World) {
        for _ in 0..world.tuning().movement.max_replan_failures {
            movement_system(world);
        }
    }

    #[test]
    fn test_stranded_attacker_leaves_the_force() {
        let (mut world, army) = home_with_army(5);
        let island = TilePos::new(20, 20);
        walled_in(&mut world, island);
        let stranded = world.spawn_unit(FactionId::A, UnitKind::Infantry, island);
        let mut ctx = CommanderContext::new(FactionId::A);
        let mut out = Vec::new();
        plan(&world, &mut ctx, &mut out);
        assert_eq!(apply(&mut world, FactionId::A, &out), army.len() + 1);
        assert!(ctx.attack_plan().unwrap().members.contains(&stranded));

        settle_movement(&mut world);
        assert_eq!(world.unit(stranded).unwrap().nav.status, MoveStatus::Blocked);

        let mut out = Vec::new();
        plan(&world, &mut ctx, &mut out);
        let members = &ctx.attack_plan().unwrap().members;
        assert!(!members.contains(&stranded));
        assert_eq!(members.len(), army.len());
        assert!(out.iter().any(|d| matches!(
            d,
            Directive::Order { unit, order: UnitOrder::Guard(area) }
                if *unit == stranded && area.center == TilePos::new(3, 3)
        )));
    }

    #[test]
    fn test_blocked_home_guard_is_reordered() {
        let (mut world, army) = home_with_army(2);
        let island = TilePos::new(20, 20);
        walled_in(&mut world, island);
        let stranded = world.spawn_unit(FactionId::A, UnitKind::Infantry, island);
        let mut ctx = CommanderContext::new(FactionId::A);
        let mut out = Vec::new();
        plan(&world, &mut ctx, &mut out);
        assert_eq!(apply(&mut world, FactionId::A, &out), army.len() + 1);

        settle_movement(&mut world);
        assert_eq!(world.unit(stranded).unwrap().nav.status, MoveStatus::Blocked);

        let mut out = Vec::new();
        plan(&world, &mut ctx, &mut out);
        let reordered: Vec<EntityId> = out
            .iter()
            .filter_map(|d| match d {
                Directive::Order { unit, .. } => Some(*unit),
                _ => None,
            })
            .collect();
        assert_eq!(reordered, vec![stranded]);
        apply(&mut world, FactionId::A, &out);
        assert_eq!(world.unit(stranded).unwrap().nav.status, MoveStatus::EnRoute);
    }
}
