//! Property tests for battlefield generation and path search.

use proptest::prelude::*;
use skirmish_core::map_generation::{generate_map, safe_template, validate_layout};
use skirmish_core::math::TilePos;
use skirmish_core::occupancy::Occupancy;
use skirmish_core::pathfinding::{reachable, Spatial};
use skirmish_core::terrain::TerrainMask;
use skirmish_core::tuning::MovementTuning;
use skirmish_test_utils::strategies::{arb_small_map_config, arb_tile, arb_tile_map};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_generated_maps_are_valid(config in arb_small_map_config()) {
        let map = generate_map(&config);
        prop_assert_eq!(
            validate_layout(&map.tiles, map.anchors, &map.caches, map.symmetry),
            Ok(())
        );
        for anchor in map.anchors {
            prop_assert!(map.tiles.is_passable(anchor, TerrainMask::GROUND));
        }
        prop_assert!(map.caches.len() >= 2);
        prop_assert_eq!(map.caches.len() % 2, 0);
    }

    #[test]
    fn test_generation_is_a_function_of_the_config(config in arb_small_map_config()) {
        prop_assert_eq!(generate_map(&config), generate_map(&config));
    }

    #[test]
    fn test_template_is_valid_for_every_symmetry(config in arb_small_map_config()) {
        let map = safe_template(&config);
        prop_assert!(map.from_template);
        prop_assert_eq!(
            validate_layout(&map.tiles, map.anchors, &map.caches, map.symmetry),
            Ok(())
        );
    }
}

proptest! {
    #[test]
    fn test_paths_are_walkable_steps(
        tiles in arb_tile_map(16, 16),
        start in arb_tile(16, 16),
        goal in arb_tile(16, 16),
    ) {
        prop_assume!(tiles.is_passable(start, TerrainMask::GROUND));
        prop_assume!(tiles.is_passable(goal, TerrainMask::GROUND));

        let occupancy = Occupancy::new(16, 16);
        let tuning = MovementTuning::default();
        let spatial = Spatial::new(&tiles, &occupancy, &tuning);
        let path = spatial.find_path(start, goal, TerrainMask::GROUND);

        prop_assert_eq!(
            path.is_some(),
            reachable(&tiles, start, goal, TerrainMask::GROUND)
        );
        if let Some(path) = path {
            let mut previous = start;
            for step in &path {
                prop_assert_eq!(previous.chebyshev(*step), 1);
                prop_assert!(tiles.is_passable(*step, TerrainMask::GROUND));
                previous = *step;
            }
            prop_assert_eq!(path.last().copied().unwrap_or(start), goal);
        }
    }

    #[test]
    fn test_ring_scan_starts_at_center(center in arb_tile(64, 64), radius in 0u32..6) {
        let mut scan = skirmish_core::pathfinding::ring_scan(center, radius);
        prop_assert_eq!(scan.next(), Some(center));
        for tile in scan {
            prop_assert!(tile.chebyshev(center) <= radius);
        }
    }
}

#[test]
fn test_unreachable_goal_has_no_path() {
    let tiles = skirmish_core::terrain::TileMap::from_rows(&[
        ".....~...",
        ".....~...",
        ".....~...",
    ]);
    let occupancy = Occupancy::new(tiles.width(), tiles.height());
    let tuning = MovementTuning::default();
    let spatial = Spatial::new(&tiles, &occupancy, &tuning);
    let (start, goal) = (TilePos::new(0, 1), TilePos::new(8, 1));
    assert!(!reachable(&tiles, start, goal, TerrainMask::GROUND));
    assert_eq!(spatial.find_path(start, goal, TerrainMask::GROUND), None);
}
