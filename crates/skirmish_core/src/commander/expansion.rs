//! Engineer count management.

use crate::entities::Building;
use crate::kinds::{Producible, UnitKind};
use crate::world::World;

use super::{Budget, CommanderContext, Directive};

/// Engineers wanted given the known undepleted nodes.
#[must_use]
pub fn engineer_target(world: &World, ctx: &CommanderContext) -> u32 {
    let tuning = &world.tuning().commander;
    let faction = world.faction(ctx.faction());
    let live_nodes = faction
        .known_nodes
        .iter()
        .filter_map(|id| world.node(*id))
        .filter(|node| !node.depleted)
        .count();
    let live_nodes = u32::try_from(live_nodes).unwrap_or(u32::MAX);
    let wanted = live_nodes
        .saturating_mul(tuning.engineers_per_node_percent)
        .div_ceil(100);
    wanted.clamp(tuning.min_engineers, tuning.max_engineers.max(tuning.min_engineers))
}

/// Engineers alive plus engineers queued.
#[must_use]
pub fn engineer_count(world: &World, ctx: &CommanderContext) -> u32 {
    let faction = ctx.faction();
    let alive = world
        .units_of(faction)
        .filter(|u| u.kind == UnitKind::Engineer)
        .count();
    let queued: usize = world
        .buildings_of(faction)
        .map(|b| b.queue.count_of(Producible::Unit(UnitKind::Engineer)))
        .sum();
    u32::try_from(alive + queued).unwrap_or(u32::MAX)
}

/// Queue at most one engineer per decision when below target.
pub fn plan(world: &World, ctx: &CommanderContext, budget: &mut Budget, out: &mut Vec<Directive>) {
    if engineer_count(world, ctx) >= engineer_target(world, ctx) {
        return;
    }
    let item = Producible::Unit(UnitKind::Engineer);
    let depth = world.tuning().commander.queue_depth;
    let producer = world
        .buildings_of(ctx.faction())
        .filter(|b| b.is_constructed() && b.kind.can_produce(item))
        .filter(|b| b.queue.len() < depth)
        .min_by_key(|b: &&Building| (b.queue.len(), b.id));
    let Some(producer) = producer else {
        return;
    };
    let cost = world.tuning().cost_of(item, world.faction(ctx.faction()).tech_level);
    if budget.try_spend(cost) {
        out.push(Directive::Enqueue {
            producer: producer.id,
            item,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factions::FactionId;
    use crate::kinds::BuildingKind;
    use crate::math::TilePos;
    use crate::tuning::Tuning;
    use crate::world::test_support::open_world;

    fn world_with_nodes(count: u32) -> World {
        let mut world = open_world(32, Tuning::default());
        for i in 0..count {
            let id = world.add_node(TilePos::new(4 + i, 10), 500);
            world.faction_mut(FactionId::A).known_nodes.insert(id);
        }
        world
    }

    #[test]
    fn test_target_scales_with_known_nodes() {
        let ctx = CommanderContext::new(FactionId::A);
        assert_eq!(engineer_target(&world_with_nodes(0), &ctx), 3);
        assert_eq!(engineer_target(&world_with_nodes(3), &ctx), 5);
        assert_eq!(engineer_target(&world_with_nodes(20), &ctx), 10);
    }

    #[test]
    fn test_queues_one_engineer_when_short() {
        let mut world = world_with_nodes(4);
        let hq = world.spawn_building(FactionId::A, BuildingKind::Hq, TilePos::new(2, 2), 0);
        let ctx = CommanderContext::new(FactionId::A);
        let mut budget = Budget::new(500);
        let mut out = Vec::new();
        plan(&world, &ctx, &mut budget, &mut out);
        assert_eq!(
            out,
            vec![Directive::Enqueue {
                producer: hq,
                item: Producible::Unit(UnitKind::Engineer)
            }]
        );
        assert_eq!(budget.spendable(), 450);
    }

    #[test]
    fn test_no_engineer_without_funds() {
        let mut world = world_with_nodes(4);
        world.spawn_building(FactionId::A, BuildingKind::Hq, TilePos::new(2, 2), 0);
        let ctx = CommanderContext::new(FactionId::A);
        let mut budget = Budget::new(10);
        let mut out = Vec::new();
        plan(&world, &ctx, &mut budget, &mut out);
        assert!(out.is_empty());
    }
}
