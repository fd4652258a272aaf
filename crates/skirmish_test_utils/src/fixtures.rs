//! Test fixtures and helpers.
//!
//! Hand-made worlds for scenario tests and small matches for anything that
//! needs the full clock.

use std::sync::Arc;

use fixed::types::I32F32;
use skirmish_core::entities::EntityId;
use skirmish_core::factions::FactionId;
use skirmish_core::kinds::UnitKind;
use skirmish_core::map_generation::MapConfig;
use skirmish_core::math::TilePos;
use skirmish_core::simulation::Match;
use skirmish_core::terrain::{TerrainKind, TileMap};
use skirmish_core::tuning::Tuning;
use skirmish_core::world::World;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Default tuning on a 48x48 map.
#[must_use]
pub fn small_tuning() -> Tuning {
    Tuning {
        map: MapConfig::small(),
        ..Tuning::default()
    }
}

/// A fresh match on a 48x48 map.
///
/// # Panics
///
/// Never with the shipped tuning.
#[must_use]
pub fn small_match(seed: u64) -> Match {
    Match::new(seed, small_tuning()).expect("shipped tuning is valid")
}

/// Open grass field of `size`×`size` with anchors in opposite corners and
/// nothing on it.
#[must_use]
pub fn open_field(size: u32, tuning: Tuning) -> World {
    let map = TileMap::filled(size, size, TerrainKind::Grass);
    World::empty(
        map,
        [TilePos::new(1, 1), TilePos::new(size - 2, size - 2)],
        Arc::new(tuning),
    )
}

/// World from glyph rows (`.` grass, `f` forest, `^` mountain, `~` water,
/// `$` cache), anchors at the given tiles.
#[must_use]
pub fn world_from_rows(rows: &[&str], anchors: [TilePos; 2], tuning: Tuning) -> World {
    World::empty(TileMap::from_rows(rows), anchors, Arc::new(tuning))
}

/// Spawn `count` units in a horizontal line starting at `start`.
pub fn spawn_line(
    world: &mut World,
    owner: FactionId,
    kind: UnitKind,
    start: TilePos,
    count: u32,
) -> Vec<EntityId> {
    (0..count)
        .map(|i| world.spawn_unit(owner, kind, TilePos::new(start.x + i, start.y)))
        .collect()
}

/// Summed health of a faction's units.
#[must_use]
pub fn total_unit_health(world: &World, owner: FactionId) -> u64 {
    world.units_of(owner).map(|u| u64::from(u.health)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_helper() {
        assert_eq!(fixed(5), I32F32::from_num(5));
    }

    #[test]
    fn test_spawn_line() {
        let mut world = open_field(16, Tuning::default());
        let ids = spawn_line(&mut world, FactionId::A, UnitKind::Infantry, TilePos::new(2, 3), 4);
        assert_eq!(ids.len(), 4);
        assert_eq!(world.unit(ids[3]).unwrap().position, TilePos::new(5, 3));
        assert_eq!(total_unit_health(&world, FactionId::A), 4 * 120);
        world.check_invariants().unwrap();
    }

    #[test]
    fn test_small_match_has_two_bases() {
        let game = small_match(1);
        assert!(game.world().hq_of(FactionId::A).is_some());
        assert!(game.world().hq_of(FactionId::B).is_some());
    }
}
