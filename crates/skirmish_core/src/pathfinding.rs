//! Grid path search and spatial queries.
//!
//! A* over the tile grid with 8-directional moves and a Chebyshev heuristic.
//! Terrain outside the mover's mask and tiles holding a building are hard
//! obstacles; tiles holding units cost extra but stay enterable. Diagonal
//! steps may not cut a blocked corner. Ties in the open set are broken by
//! tile coordinates so equal-cost searches always return the same route.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use crate::math::TilePos;
use crate::occupancy::Occupancy;
use crate::terrain::{TerrainKind, TerrainMask, TileMap};
use crate::tuning::MovementTuning;

/// Direction offsets for 8-directional movement.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),   // East
    (1, 1),   // Southeast
    (0, 1),   // South
    (-1, 1),  // Southwest
    (-1, 0),  // West
    (-1, -1), // Northwest
    (0, -1),  // North
    (1, -1),  // Northeast
];

/// Cost of one step onto open ground. Terrain costs are percentages of it.
pub const BASE_STEP_COST: u32 = 100;

/// Diagonal steps cost this percentage of a straight one.
const DIAGONAL_COST_PERCENT: u32 = 141;

/// Read-only view used to answer spatial queries within a tick.
#[derive(Debug, Clone, Copy)]
pub struct Spatial<'a> {
    /// Terrain grid.
    pub tiles: &'a TileMap,
    /// Current occupancy.
    pub occupancy: &'a Occupancy,
    /// Movement costs and search limits.
    pub tuning: &'a MovementTuning,
}

/// A node in the A* open set.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    pos: TilePos,
    f_score: u32,
    /// Lower coordinates win ties.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and we want the lowest f first.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn tie_breaker(pos: TilePos) -> u64 {
    ((pos.y as u64) << 32) | (pos.x as u64)
}

impl<'a> Spatial<'a> {
    /// Bundle the pieces of a spatial view.
    #[must_use]
    pub const fn new(tiles: &'a TileMap, occupancy: &'a Occupancy, tuning: &'a MovementTuning) -> Self {
        Self {
            tiles,
            occupancy,
            tuning,
        }
    }

    /// Whether `pos` is a hard obstacle for a mover with `mask`.
    #[must_use]
    pub fn is_blocked(&self, pos: TilePos, mask: TerrainMask) -> bool {
        !self.tiles.is_passable(pos, mask) || self.occupancy.building_at(pos).is_some()
    }

    /// Whether `pos` holds as many units as a tile can take.
    #[must_use]
    pub fn is_crowded(&self, pos: TilePos) -> bool {
        self.occupancy.units_at(pos) >= self.tuning.tile_unit_capacity
    }

    /// Cost of stepping onto `pos`, `None` when it is a hard obstacle.
    #[must_use]
    pub fn step_cost(&self, pos: TilePos, mask: TerrainMask) -> Option<u32> {
        if self.is_blocked(pos, mask) {
            return None;
        }
        let terrain = match self.tiles.get(pos)? {
            TerrainKind::Forest => self.tuning.forest_cost_percent,
            _ => BASE_STEP_COST,
        };
        let crowd = u32::from(self.occupancy.units_at(pos)) * self.tuning.crowd_penalty;
        Some(terrain + crowd)
    }

    /// Find a route from `start` to `goal` for a mover with `mask`.
    ///
    /// Returns the waypoints after `start`, ending on `goal`, or on the
    /// cheapest reachable neighbour of `goal` when `goal` itself is solid
    /// (a building or blocking terrain). An empty route means the mover is
    /// already there. `None` means no route within the search budget.
    #[must_use]
    pub fn find_path(&self, start: TilePos, goal: TilePos, mask: TerrainMask) -> Option<Vec<TilePos>> {
        self.search(start, goal, mask, None)
    }

    /// As [`Self::find_path`], additionally treating `avoid` as solid.
    #[must_use]
    pub fn find_path_avoiding(
        &self,
        start: TilePos,
        goal: TilePos,
        mask: TerrainMask,
        avoid: TilePos,
    ) -> Option<Vec<TilePos>> {
        self.search(start, goal, mask, Some(avoid))
    }

    fn search(
        &self,
        start: TilePos,
        goal: TilePos,
        mask: TerrainMask,
        avoid: Option<TilePos>,
    ) -> Option<Vec<TilePos>> {
        if !self.tiles.in_bounds(start) || !self.tiles.in_bounds(goal) {
            return None;
        }
        let solid = |pos: TilePos| self.is_blocked(pos, mask) || Some(pos) == avoid;
        // Solid goals are approached, not entered.
        let arrive_within = u32::from(solid(goal));
        if start.chebyshev(goal) <= arrive_within {
            return Some(Vec::new());
        }

        let heuristic =
            |pos: TilePos| pos.chebyshev(goal).saturating_sub(arrive_within) * BASE_STEP_COST;

        let mut open_set = BinaryHeap::new();
        let mut came_from: HashMap<TilePos, TilePos> = HashMap::new();
        let mut g_score: HashMap<TilePos, u32> = HashMap::new();
        g_score.insert(start, 0);
        open_set.push(AStarNode {
            pos: start,
            f_score: heuristic(start),
            tie_breaker: tie_breaker(start),
        });

        let mut expanded = 0u32;
        while let Some(current) = open_set.pop() {
            if current.pos.chebyshev(goal) <= arrive_within && current.pos != start {
                return Some(reconstruct_path(&came_from, start, current.pos));
            }
            expanded += 1;
            if expanded > self.tuning.max_search_nodes {
                return None;
            }

            let current_g = g_score.get(&current.pos).copied().unwrap_or(u32::MAX);
            if current.f_score > current_g.saturating_add(heuristic(current.pos)) {
                continue; // stale entry
            }

            for &(dx, dy) in &DIRECTIONS {
                let Some(next) = current.pos.offset(dx, dy) else {
                    continue;
                };
                if !self.tiles.in_bounds(next) || solid(next) {
                    continue;
                }
                if dx != 0 && dy != 0 {
                    let corner_a = current.pos.offset(dx, 0);
                    let corner_b = current.pos.offset(0, dy);
                    if corner_a.map_or(true, |p| solid(p)) || corner_b.map_or(true, |p| solid(p)) {
                        continue;
                    }
                }
                let Some(mut cost) = self.step_cost(next, mask) else {
                    continue;
                };
                if dx != 0 && dy != 0 {
                    cost = cost * DIAGONAL_COST_PERCENT / 100;
                }

                let tentative = current_g.saturating_add(cost);
                if tentative < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                    came_from.insert(next, current.pos);
                    g_score.insert(next, tentative);
                    open_set.push(AStarNode {
                        pos: next,
                        f_score: tentative.saturating_add(heuristic(next)),
                        tie_breaker: tie_breaker(next),
                    });
                }
            }
        }

        None
    }

    /// First tile, scanning outward ring by ring from `center` up to
    /// `max_radius`, that satisfies `accept`. Deterministic scan order.
    pub fn nearest_tile(
        &self,
        center: TilePos,
        max_radius: u32,
        mut accept: impl FnMut(TilePos) -> bool,
    ) -> Option<TilePos> {
        ring_scan(center, max_radius)
            .filter(|p| self.tiles.in_bounds(*p))
            .find(|p| accept(*p))
    }
}

/// Tiles around `center` ordered by Chebyshev ring, then row, then column.
pub fn ring_scan(center: TilePos, max_radius: u32) -> impl Iterator<Item = TilePos> {
    (0..=max_radius as i32).flat_map(move |r| {
        (-r..=r).flat_map(move |dy| {
            (-r..=r).filter_map(move |dx| {
                if dx.abs() != r && dy.abs() != r {
                    return None;
                }
                center.offset(dx, dy)
            })
        })
    })
}

fn reconstruct_path(
    came_from: &HashMap<TilePos, TilePos>,
    start: TilePos,
    end: TilePos,
) -> Vec<TilePos> {
    let mut path = vec![end];
    let mut current = end;
    while let Some(&prev) = came_from.get(&current) {
        if prev == start {
            break;
        }
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

/// Tiles reachable from `from` by a mover with `mask`, ignoring occupancy.
///
/// Uses cardinal steps only; with no corner cutting allowed, a diagonal
/// move is possible exactly when one of its cardinal detours is, so the
/// reachable set matches the path search.
#[must_use]
pub fn flood_fill(tiles: &TileMap, from: TilePos, mask: TerrainMask) -> Vec<bool> {
    let mut seen = vec![false; tiles.len()];
    if !tiles.is_passable(from, mask) {
        return seen;
    }
    let mut queue = VecDeque::from([from]);
    seen[tiles.index(from)] = true;
    while let Some(pos) = queue.pop_front() {
        for next in tiles.neighbors4(pos) {
            let i = tiles.index(next);
            if !seen[i] && tiles.is_passable(next, mask) {
                seen[i] = true;
                queue.push_back(next);
            }
        }
    }
    seen
}

/// Whether a walkable route joins `a` and `b` on bare terrain.
#[must_use]
pub fn reachable(tiles: &TileMap, a: TilePos, b: TilePos, mask: TerrainMask) -> bool {
    tiles.in_bounds(b) && flood_fill(tiles, a, mask)[tiles.index(b)]
}

/// Direct line of sight between two tiles. Mountains in between block it;
/// the end tiles themselves never do.
#[must_use]
pub fn has_line_of_sight(tiles: &TileMap, from: TilePos, to: TilePos) -> bool {
    let dx = (to.x as i64 - from.x as i64).abs();
    let dy = (to.y as i64 - from.y as i64).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx - dy;
    let (mut x, mut y) = (from.x as i64, from.y as i64);

    loop {
        if x == to.x as i64 && y == to.y as i64 {
            return true;
        }
        let here = TilePos::new(x as u32, y as u32);
        if here != from && tiles.get(here).is_some_and(TerrainKind::blocks_sight) {
            return false;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> MovementTuning {
        MovementTuning::default()
    }

    fn path(rows: &[&str], start: (u32, u32), goal: (u32, u32)) -> Option<Vec<TilePos>> {
        let tiles = TileMap::from_rows(rows);
        let occ = Occupancy::new(tiles.width(), tiles.height());
        let t = tuning();
        Spatial::new(&tiles, &occ, &t).find_path(
            TilePos::new(start.0, start.1),
            TilePos::new(goal.0, goal.1),
            TerrainMask::GROUND,
        )
    }

    #[test]
    fn test_straight_line_on_open_ground() {
        let route = path(&["......"], (0, 0), (5, 0)).unwrap();
        assert_eq!(route.len(), 5);
        assert_eq!(route.last(), Some(&TilePos::new(5, 0)));
        assert_eq!(route[0], TilePos::new(1, 0));
    }

    #[test]
    fn test_already_at_goal_is_empty_route() {
        assert_eq!(path(&["..."], (1, 0), (1, 0)), Some(Vec::new()));
    }

    #[test]
    fn test_routes_around_water() {
        let rows = [".....", ".~~~.", ".~.~.", ".....", "....."];
        let route = path(&rows, (2, 0), (2, 2)).unwrap();
        assert_eq!(route.last(), Some(&TilePos::new(2, 2)));
        let tiles = TileMap::from_rows(&rows);
        for step in &route {
            assert!(tiles.is_passable(*step, TerrainMask::GROUND));
        }
    }

    #[test]
    fn test_no_route_across_a_wall() {
        assert_eq!(path(&["..^..", "..^..", "..^.."], (0, 1), (4, 1)), None);
    }

    #[test]
    fn test_diagonal_may_not_cut_corners() {
        // Moving (0,0) -> (1,1) would squeeze between two mountains.
        let route = path(&[".^", "^."], (0, 0), (1, 1));
        assert_eq!(route, None);
    }

    #[test]
    fn test_solid_goal_is_approached() {
        let route = path(&["....^"], (0, 0), (4, 0)).unwrap();
        assert_eq!(route.last(), Some(&TilePos::new(3, 0)));
    }

    #[test]
    fn test_buildings_are_hard_obstacles() {
        let tiles = TileMap::from_rows(&["...", "...", "..."]);
        let mut occ = Occupancy::new(3, 3);
        for y in 0..3 {
            occ.place_building(TilePos::new(1, y), 10 + u64::from(y)).unwrap();
        }
        let t = tuning();
        let spatial = Spatial::new(&tiles, &occ, &t);
        assert_eq!(
            spatial.find_path(TilePos::new(0, 0), TilePos::new(2, 2), TerrainMask::GROUND),
            None
        );
    }

    #[test]
    fn test_units_are_soft_obstacles() {
        let tiles = TileMap::from_rows(&["...", "...", "..."]);
        let mut occ = Occupancy::new(3, 3);
        for y in 0..3 {
            for _ in 0..5 {
                occ.add_unit(TilePos::new(1, y));
            }
        }
        let t = tuning();
        let route = Spatial::new(&tiles, &occ, &t)
            .find_path(TilePos::new(0, 1), TilePos::new(2, 1), TerrainMask::GROUND)
            .unwrap();
        assert_eq!(route.last(), Some(&TilePos::new(2, 1)));
    }

    #[test]
    fn test_forest_is_avoided_when_cheaper_to_walk_around() {
        let rows = [".....", ".fff.", "....."];
        let route = path(&rows, (0, 1), (4, 1)).unwrap();
        let tiles = TileMap::from_rows(&rows);
        assert!(route
            .iter()
            .all(|p| tiles.get(*p) != Some(TerrainKind::Forest)));
    }

    #[test]
    fn test_avoid_tile_forces_detour() {
        let tiles = TileMap::from_rows(&["...", "...", "..."]);
        let occ = Occupancy::new(3, 3);
        let t = tuning();
        let route = Spatial::new(&tiles, &occ, &t)
            .find_path_avoiding(
                TilePos::new(0, 1),
                TilePos::new(2, 1),
                TerrainMask::GROUND,
                TilePos::new(1, 1),
            )
            .unwrap();
        assert!(!route.contains(&TilePos::new(1, 1)));
    }

    #[test]
    fn test_search_is_deterministic() {
        let rows = ["........", "..^^^...", "........", "...~~...", "........"];
        let a = path(&rows, (0, 0), (7, 4));
        let b = path(&rows, (0, 0), (7, 4));
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn test_search_budget_is_respected() {
        let tiles = TileMap::filled(64, 64, TerrainKind::Grass);
        let occ = Occupancy::new(64, 64);
        let t = MovementTuning {
            max_search_nodes: 3,
            ..tuning()
        };
        let spatial = Spatial::new(&tiles, &occ, &t);
        assert_eq!(
            spatial.find_path(TilePos::new(0, 0), TilePos::new(63, 63), TerrainMask::GROUND),
            None
        );
    }

    #[test]
    fn test_flood_fill_matches_walls() {
        let tiles = TileMap::from_rows(&["..~..", "..~..", "..~.."]);
        assert!(!reachable(&tiles, TilePos::new(0, 0), TilePos::new(4, 0), TerrainMask::GROUND));
        assert!(reachable(&tiles, TilePos::new(0, 0), TilePos::new(1, 2), TerrainMask::GROUND));
    }

    #[test]
    fn test_mountains_block_sight_but_water_does_not() {
        let tiles = TileMap::from_rows(&["..^..", ".....", "..~.."]);
        assert!(!has_line_of_sight(&tiles, TilePos::new(0, 0), TilePos::new(4, 0)));
        assert!(has_line_of_sight(&tiles, TilePos::new(0, 2), TilePos::new(4, 2)));
        assert!(has_line_of_sight(&tiles, TilePos::new(0, 1), TilePos::new(4, 1)));
    }

    #[test]
    fn test_ring_scan_starts_at_center_and_grows() {
        let tiles: Vec<_> = ring_scan(TilePos::new(5, 5), 1).collect();
        assert_eq!(tiles.len(), 9);
        assert_eq!(tiles[0], TilePos::new(5, 5));
        assert!(tiles[1..].iter().all(|p| p.chebyshev(TilePos::new(5, 5)) == 1));
    }
}
