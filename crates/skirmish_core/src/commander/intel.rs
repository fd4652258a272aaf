//! What a commander knows.
//!
//! Vision comes from every owned unit and every completed building. Nodes
//! seen once stay known to the faction; enemy entities leave a [`Sighting`]
//! that survives until the entity dies, the spot is seen empty, or the
//! sighting ages past `sighting_ttl`.

use serde::Serialize;

use crate::entities::{EntityId, EntityRef};
use crate::kinds::TargetClass;
use crate::math::TilePos;
use crate::world::World;

use super::CommanderContext;

/// Last known state of an enemy entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Sighting {
    /// Enemy entity.
    pub id: EntityId,
    /// Where it was seen.
    pub position: TilePos,
    /// What it is.
    pub class: TargetClass,
    /// Health times damage; zero for unarmed entities.
    pub strength: u64,
    /// Tick it was last seen.
    pub last_seen: u64,
}

impl Sighting {
    /// Whether the sighting is a structure.
    #[must_use]
    pub const fn is_building(&self) -> bool {
        matches!(self.class, TargetClass::Building)
    }
}

/// Combat strength of a live entity.
#[must_use]
pub fn strength_of(world: &World, entity: &EntityRef<'_>) -> u64 {
    match entity {
        EntityRef::Unit(unit) => {
            u64::from(unit.health) * u64::from(world.unit_stats(unit.kind).damage)
        }
        EntityRef::Building(_) => 0,
    }
}

fn vision_sources(world: &World, ctx: &CommanderContext) -> Vec<(TilePos, u32)> {
    let faction = ctx.faction();
    let units = world
        .units_of(faction)
        .map(|u| (u.position, world.unit_stats(u.kind).vision));
    let buildings = world
        .buildings_of(faction)
        .filter(|b| b.is_constructed())
        .map(|b| (b.position, world.building_stats(b.kind).vision));
    units.chain(buildings).collect()
}

fn visible(sources: &[(TilePos, u32)], tile: TilePos) -> bool {
    sources.iter().any(|&(at, radius)| at.within(tile, radius))
}

/// Refresh known nodes and enemy sightings for one faction.
pub fn observe(world: &mut World, ctx: &mut CommanderContext, tick: u64) {
    let faction = ctx.faction();
    let sources = vision_sources(world, ctx);

    let newly_known: Vec<_> = world
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| visible(&sources, node.position))
        .filter_map(|(index, _)| u32::try_from(index).ok())
        .collect();
    world.factions[faction.index()].known_nodes.extend(newly_known);

    let enemy = faction.opponent();
    let seen: Vec<Sighting> = world
        .units_of(enemy)
        .map(EntityRef::Unit)
        .chain(world.buildings_of(enemy).map(EntityRef::Building))
        .filter(|e| visible(&sources, e.position()))
        .map(|e| Sighting {
            id: match e {
                EntityRef::Unit(u) => u.id,
                EntityRef::Building(b) => b.id,
            },
            position: e.position(),
            class: crate::combat::target_class(&e),
            strength: strength_of(world, &e),
            last_seen: tick,
        })
        .collect();
    for sighting in seen {
        ctx.sightings.insert(sighting.id, sighting);
    }

    let ttl = world.tuning().commander.sighting_ttl;
    ctx.sightings.retain(|id, s| {
        if s.last_seen == tick {
            return true;
        }
        world.entity(*id).is_some()
            && !visible(&sources, s.position)
            && tick.saturating_sub(s.last_seen) <= ttl
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factions::FactionId;
    use crate::kinds::{BuildingKind, UnitKind};
    use crate::tuning::Tuning;
    use crate::world::test_support::open_world;

    #[test]
    fn test_nodes_become_known_in_vision() {
        let mut world = open_world(40, Tuning::default());
        let near = world.add_node(TilePos::new(5, 5), 100);
        let far = world.add_node(TilePos::new(35, 35), 100);
        world.spawn_unit(FactionId::A, UnitKind::Engineer, TilePos::new(3, 3));
        let mut ctx = CommanderContext::new(FactionId::A);
        observe(&mut world, &mut ctx, 0);
        let known = &world.faction(FactionId::A).known_nodes;
        assert!(known.contains(&near));
        assert!(!known.contains(&far));
    }

    #[test]
    fn test_sighting_outlives_vision_until_ttl() {
        let mut tuning = Tuning::default();
        tuning.commander.sighting_ttl = 50;
        let mut world = open_world(40, tuning);
        let scout = world.spawn_unit(FactionId::A, UnitKind::Infantry, TilePos::new(10, 10));
        let enemy = world.spawn_unit(FactionId::B, UnitKind::Tank, TilePos::new(13, 10));
        let mut ctx = CommanderContext::new(FactionId::A);

        observe(&mut world, &mut ctx, 0);
        let sighting = ctx.sightings()[&enemy];
        assert_eq!(sighting.position, TilePos::new(13, 10));
        assert!(sighting.strength > 0);

        // The scout dies; the tank is out of every remaining view.
        world.remove_entity(scout);
        observe(&mut world, &mut ctx, 30);
        assert!(ctx.sightings().contains_key(&enemy));
        observe(&mut world, &mut ctx, 51);
        assert!(!ctx.sightings().contains_key(&enemy));
    }

    #[test]
    fn test_sighting_dropped_when_spot_seen_empty() {
        let mut world = open_world(40, Tuning::default());
        world.spawn_unit(FactionId::A, UnitKind::Infantry, TilePos::new(10, 10));
        let enemy = world.spawn_unit(FactionId::B, UnitKind::Infantry, TilePos::new(14, 10));
        let mut ctx = CommanderContext::new(FactionId::A);
        observe(&mut world, &mut ctx, 0);
        assert!(ctx.sightings().contains_key(&enemy));

        world.remove_entity(enemy);
        observe(&mut world, &mut ctx, 1);
        assert!(ctx.sightings().is_empty());
    }

    #[test]
    fn test_unfinished_buildings_give_no_vision() {
        let mut world = open_world(40, Tuning::default());
        world.spawn_building(FactionId::A, BuildingKind::Barracks, TilePos::new(10, 10), 50);
        let node = world.add_node(TilePos::new(12, 10), 100);
        let mut ctx = CommanderContext::new(FactionId::A);
        observe(&mut world, &mut ctx, 0);
        assert!(!world.faction(FactionId::A).known_nodes.contains(&node));
    }
}
