//! Army production toward the tech-level mix.

use std::collections::BTreeMap;

use crate::entities::EntityId;
use crate::kinds::{Producible, UnitKind};
use crate::world::World;

use super::{Budget, CommanderContext, Directive};

/// Army units alive or queued, per kind.
#[must_use]
pub fn army_counts(world: &World, ctx: &CommanderContext) -> BTreeMap<UnitKind, u32> {
    let faction = ctx.faction();
    let mut counts: BTreeMap<UnitKind, u32> = BTreeMap::new();
    for unit in world.units_of(faction).filter(|u| u.kind.is_army()) {
        *counts.entry(unit.kind).or_default() += 1;
    }
    for building in world.buildings_of(faction) {
        for entry in building.queue.iter() {
            if let Producible::Unit(kind) = entry.item {
                if kind.is_army() {
                    *counts.entry(kind).or_default() += 1;
                }
            }
        }
    }
    counts
}

/// Queue army units while the budget outside the reserve allows.
pub fn plan(world: &World, ctx: &CommanderContext, budget: &mut Budget, out: &mut Vec<Directive>) {
    let faction = ctx.faction();
    let tech = world.faction(faction).tech_level;
    let tuning = world.tuning();
    let Some(mix) = tuning.commander.mix_for(tech) else {
        return;
    };
    let depth = tuning.commander.queue_depth;

    let mut counts = army_counts(world, ctx);
    // Local queue lengths so several units can be planned in one pass.
    let mut queue_lens: BTreeMap<EntityId, usize> = world
        .buildings_of(faction)
        .filter(|b| b.is_constructed())
        .map(|b| (b.id, b.queue.len()))
        .collect();

    loop {
        let candidates = mix.weights.iter().filter(|(kind, weight)| {
            *weight > 0
                && tuning.units.get(*kind).min_tech <= tech
                && producer_for(world, &queue_lens, depth, *kind).is_some()
        });
        // Largest deficit: lowest count relative to weight.
        let choice = candidates.min_by(|(ka, wa), (kb, wb)| {
            let ca = u64::from(counts.get(ka).copied().unwrap_or(0));
            let cb = u64::from(counts.get(kb).copied().unwrap_or(0));
            (ca * u64::from(*wb))
                .cmp(&(cb * u64::from(*wa)))
                .then(ka.cmp(kb))
        });
        let Some(&(kind, _)) = choice else {
            return;
        };
        let Some(producer) = producer_for(world, &queue_lens, depth, kind) else {
            return;
        };
        let cost = tuning.cost_of(Producible::Unit(kind), tech);
        if !budget.try_spend(cost) {
            return;
        }
        out.push(Directive::Enqueue {
            producer,
            item: Producible::Unit(kind),
        });
        *counts.entry(kind).or_default() += 1;
        if let Some(len) = queue_lens.get_mut(&producer) {
            *len += 1;
        }
    }
}

/// Shortest-queue producer able to take `kind`.
fn producer_for(
    world: &World,
    queue_lens: &BTreeMap<EntityId, usize>,
    depth: usize,
    kind: UnitKind,
) -> Option<EntityId> {
    queue_lens
        .iter()
        .filter(|&(_, &len)| len < depth)
        .filter(|&(id, _)| {
            world
                .building(*id)
                .is_some_and(|b| b.kind.can_produce(Producible::Unit(kind)))
        })
        .min_by_key(|&(id, &len)| (len, *id))
        .map(|(id, _)| *id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factions::FactionId;
    use crate::kinds::BuildingKind;
    use crate::math::TilePos;
    use crate::tuning::Tuning;
    use crate::world::test_support::open_world;

    #[test]
    fn test_fills_barracks_to_queue_depth() {
        let mut world = open_world(24, Tuning::default());
        let barracks =
            world.spawn_building(FactionId::A, BuildingKind::Barracks, TilePos::new(5, 5), 0);
        let ctx = CommanderContext::new(FactionId::A);
        let mut budget = Budget::new(1000);
        let mut out = Vec::new();
        plan(&world, &ctx, &mut budget, &mut out);

        let infantry = Directive::Enqueue {
            producer: barracks,
            item: Producible::Unit(UnitKind::Infantry),
        };
        assert_eq!(out, vec![infantry; 2]);
        assert_eq!(budget.spendable(), 880);
    }

    #[test]
    fn test_respects_reserve() {
        let mut world = open_world(24, Tuning::default());
        world.spawn_building(FactionId::A, BuildingKind::Barracks, TilePos::new(5, 5), 0);
        let ctx = CommanderContext::new(FactionId::A);
        let mut budget = Budget::new(200);
        budget.reserve(150);
        let mut out = Vec::new();
        plan(&world, &ctx, &mut budget, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_mix_balances_by_weight() {
        let mut world = open_world(24, Tuning::default());
        world.faction_mut(FactionId::A).tech_level = 1;
        world.spawn_building(FactionId::A, BuildingKind::Barracks, TilePos::new(5, 5), 0);
        for x in [2, 3, 4, 5] {
            world.spawn_unit(FactionId::A, UnitKind::Infantry, TilePos::new(x, 10));
        }
        let ctx = CommanderContext::new(FactionId::A);
        let mut budget = Budget::new(1000);
        let mut out = Vec::new();
        plan(&world, &ctx, &mut budget, &mut out);
        // No factory, so tanks are out; rangers are furthest behind.
        assert_eq!(
            out.first(),
            Some(&Directive::Enqueue {
                producer: world.buildings_of(FactionId::A).next().unwrap().id,
                item: Producible::Unit(UnitKind::Ranger)
            })
        );
    }
}
