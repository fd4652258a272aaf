//! Proptest strategies.
//!
//! These strategies generate random but reproducible inputs for
//! property-based tests of map generation, pathfinding and whole matches.

use proptest::prelude::*;
use skirmish_core::kinds::UnitKind;
use skirmish_core::map_generation::{MapConfig, SymmetryMode};
use skirmish_core::math::TilePos;
use skirmish_core::terrain::{TerrainKind, TileMap};

/// Any match seed.
pub fn arb_seed() -> impl Strategy<Value = u64> {
    any::<u64>()
}

/// Any symmetry transform.
pub fn arb_symmetry() -> impl Strategy<Value = SymmetryMode> {
    prop_oneof![
        Just(SymmetryMode::Horizontal),
        Just(SymmetryMode::Vertical),
        Just(SymmetryMode::Rotational),
    ]
}

/// Small map configurations with random seed and symmetry.
pub fn arb_small_map_config() -> impl Strategy<Value = MapConfig> {
    (arb_seed(), arb_symmetry())
        .prop_map(|(seed, symmetry)| MapConfig::small().with_seed(seed).with_symmetry(symmetry))
}

/// A tile inside a `width`×`height` map.
pub fn arb_tile(width: u32, height: u32) -> impl Strategy<Value = TilePos> {
    (0..width, 0..height).prop_map(|(x, y)| TilePos::new(x, y))
}

/// Any armed unit kind.
pub fn arb_army_kind() -> impl Strategy<Value = UnitKind> {
    proptest::sample::select(UnitKind::ARMY.to_vec())
}

/// Terrain weighted toward open ground.
pub fn arb_terrain() -> impl Strategy<Value = TerrainKind> {
    prop_oneof![
        6 => Just(TerrainKind::Grass),
        2 => Just(TerrainKind::Forest),
        1 => Just(TerrainKind::Mountain),
        1 => Just(TerrainKind::Water),
    ]
}

/// Random `width`×`height` terrain grid.
pub fn arb_tile_map(width: u32, height: u32) -> impl Strategy<Value = TileMap> {
    let cells = (width * height) as usize;
    proptest::collection::vec(arb_terrain(), cells).prop_map(move |kinds| {
        let mut map = TileMap::filled(width, height, TerrainKind::Grass);
        for (index, kind) in kinds.into_iter().enumerate() {
            let index = index as u32;
            map.set(TilePos::new(index % width, index / width), kind);
        }
        map
    })
}
