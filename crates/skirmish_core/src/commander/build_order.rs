//! Structure build order and research.
//!
//! The build order is a list of cumulative goals ("two Refineries") rather
//! than a script, so losing a building simply moves the pointer back.
//! Owned and queued structures both count toward a goal.

use std::collections::BTreeMap;

use tracing::debug;

use crate::entities::Building;
use crate::factions::FactionId;
use crate::kinds::{BuildingKind, Producible};
use crate::production::pending_research;
use crate::world::World;

use super::{Budget, CommanderContext, Directive};

/// Owned plus queued structures per kind.
#[must_use]
pub fn structure_counts(world: &World, faction: FactionId) -> BTreeMap<BuildingKind, u32> {
    let mut counts = BTreeMap::new();
    for building in world.buildings_of(faction) {
        *counts.entry(building.kind).or_insert(0) += 1;
        for entry in building.queue.iter() {
            if let Producible::Building(kind) = entry.item {
                *counts.entry(kind).or_insert(0) += 1;
            }
        }
    }
    counts
}

fn main_hq(world: &World, faction: FactionId) -> Option<&Building> {
    world
        .buildings_of(faction)
        .find(|b| b.kind == BuildingKind::Hq && b.is_constructed())
}

/// Advance the build order by at most one structure and queue research.
pub fn plan(
    world: &World,
    ctx: &mut CommanderContext,
    tick: u64,
    budget: &mut Budget,
    out: &mut Vec<Directive>,
) {
    let faction = ctx.faction();
    let tuning = &world.tuning().commander;
    ctx.skipped.retain(|_, retry_at| *retry_at > tick);

    let Some(hq) = main_hq(world, faction) else {
        return;
    };
    let mut counts = structure_counts(world, faction);

    if let Some(head) = hq.queue.head() {
        if let (Producible::Building(kind), Some(since)) = (head.item, head.stalled_since) {
            if tick.saturating_sub(since) >= tuning.placement_stall_ticks {
                debug!(%faction, ?kind, "Giving up on stalled placement");
                out.push(Directive::Cancel {
                    producer: hq.id,
                    index: 0,
                });
                budget.credit(head.cost);
                ctx.skipped.insert(kind, tick + tuning.skip_retry_ticks);
                if let Some(n) = counts.get_mut(&kind) {
                    *n = n.saturating_sub(1);
                }
            }
        }
    }

    let count = |kind: BuildingKind| counts.get(&kind).copied().unwrap_or(0);
    let tech = world.faction(faction).tech_level;

    ctx.build_pointer = tuning.build_order.len();
    let mut current = None;
    for (index, step) in tuning.build_order.iter().enumerate() {
        if count(step.kind) >= step.count || ctx.skipped.contains_key(&step.kind) {
            continue;
        }
        ctx.build_pointer = index;
        current = Some(step.kind);
        break;
    }

    let locked = |kind: BuildingKind| world.building_stats(kind).min_tech > tech;
    let current_locked = current.is_some_and(locked);
    let wants_lab = count(BuildingKind::ResearchLab) == 0
        && !ctx.skipped.contains_key(&BuildingKind::ResearchLab)
        && (ctx.income >= tuning.lab_income_threshold || current_locked);

    let next = if wants_lab {
        Some(BuildingKind::ResearchLab)
    } else if current_locked {
        None
    } else {
        current
    };

    // One structure in the HQ queue at a time.
    let building_queued = hq
        .queue
        .iter()
        .any(|e| matches!(e.item, Producible::Building(_)));
    if let Some(kind) = next.filter(|_| !building_queued) {
        let item = Producible::Building(kind);
        let cost = world.tuning().cost_of(item, tech);
        let room = hq.queue.len() < world.tuning().economy.max_queue_len;
        if !locked(kind) && room && budget.try_spend(cost) {
            out.push(Directive::Enqueue {
                producer: hq.id,
                item,
            });
        } else {
            budget.reserve(cost);
        }
    }

    queue_research(world, faction, budget, out);
}

fn queue_research(world: &World, faction: FactionId, budget: &mut Budget, out: &mut Vec<Directive>) {
    let tech = world.faction(faction).tech_level;
    let pending = pending_research(world, faction);
    let level = usize::from(tech) + pending;
    let Some(step) = world.tuning().tech.levels.get(level) else {
        return;
    };
    let lab = world
        .buildings_of(faction)
        .find(|b| b.kind == BuildingKind::ResearchLab && b.is_constructed() && b.queue.is_empty());
    if let Some(lab) = lab {
        if budget.try_spend(step.cost) {
            out.push(Directive::Enqueue {
                producer: lab.id,
                item: Producible::Research,
            });
        }
    }
}
