//! Procedural battlefield generation.
//!
//! Produces a symmetric tile grid with:
//! - Height-field terrain classified into grass, forest, mountain and water
//! - Two start anchors that are twins under the declared symmetry
//! - A guaranteed walkable route between the anchors, carved if needed
//! - Mineral caches near each base plus contested caches biased toward the
//!   midline between the bases
//!
//! Generation is attempted a bounded number of times with derived seeds.
//! When no attempt validates, a deterministic template is returned instead,
//! so the caller always gets a playable map.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::math::{isqrt, TilePos};
use crate::pathfinding::reachable;
use crate::terrain::{TerrainKind, TerrainMask, TileMap};

/// Battlefield edge length used by matches.
pub const MAP_SIZE: u32 = 128;

/// Map configuration for procedural generation.
///
/// Heights and thresholds are in permille (0..=1000).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Map width in tiles.
    pub width: u32,
    /// Map height in tiles.
    pub height: u32,
    /// Seed for the first attempt. Later attempts derive their own.
    pub seed: u64,
    /// Transform the two halves of the map share.
    pub symmetry: SymmetryMode,
    /// Spacing of the coarse noise lattice, in tiles.
    pub feature_size: u32,
    /// Number of 3x3 smoothing passes.
    pub smoothing_passes: u32,
    /// Random jitter added per smoothing pass (permille, +/-).
    pub perturbation: u32,
    /// Height removed at the far corners, scaled by distance from centre.
    pub edge_falloff: u32,
    /// Heights below this are water.
    pub water_below: u32,
    /// Heights below this (and not water) are grass.
    pub grass_below: u32,
    /// Heights below this (and not grass) are forest; the rest is mountain.
    pub forest_below: u32,
    /// Distance of the first anchor from its map edges.
    pub start_inset: u32,
    /// Random anchor jitter (+/-), applied before mirroring.
    pub start_jitter: u32,
    /// Radius of the grass disc cleared around each anchor.
    pub start_clear_radius: u32,
    /// Route cost of converting one blocking tile into a land bridge.
    pub bridge_carve_cost: u32,
    /// Caches placed near each base.
    pub home_caches: u32,
    /// Minimum distance of a home cache from its anchor.
    pub home_cache_min: u32,
    /// Maximum distance of a home cache from its anchor.
    pub home_cache_max: u32,
    /// Yield of a home cache.
    pub home_cache_yield: u32,
    /// Contested cache pairs placed toward the midline.
    pub contested_caches: u32,
    /// Yield of a contested cache.
    pub contested_cache_yield: u32,
    /// Minimum distance between any two caches.
    pub cache_spacing: u32,
    /// Minimum distance of a contested cache from either anchor.
    pub base_clearance: u32,
    /// Fewer caches than this rejects the attempt.
    pub min_caches: u32,
    /// Sampling budget per cache.
    pub cache_sample_tries: u32,
    /// Attempts before falling back to the template.
    pub max_attempts: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: MAP_SIZE,
            height: MAP_SIZE,
            seed: 0,
            symmetry: SymmetryMode::Rotational,
            feature_size: 12,
            smoothing_passes: 4,
            perturbation: 60,
            edge_falloff: 220,
            water_below: 300,
            grass_below: 560,
            forest_below: 740,
            start_inset: 10,
            start_jitter: 2,
            start_clear_radius: 5,
            bridge_carve_cost: 6,
            home_caches: 3,
            home_cache_min: 6,
            home_cache_max: 12,
            home_cache_yield: 600,
            contested_caches: 6,
            contested_cache_yield: 900,
            cache_spacing: 5,
            base_clearance: 24,
            min_caches: 10,
            cache_sample_tries: 400,
            max_attempts: 8,
        }
    }
}

impl MapConfig {
    /// A small map for tests and quick runs.
    #[must_use]
    pub fn small() -> Self {
        Self {
            width: 48,
            height: 48,
            feature_size: 8,
            start_inset: 6,
            base_clearance: 10,
            contested_caches: 3,
            min_caches: 6,
            ..Default::default()
        }
    }

    /// Set the random seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the symmetry mode.
    #[must_use]
    pub const fn with_symmetry(mut self, symmetry: SymmetryMode) -> Self {
        self.symmetry = symmetry;
        self
    }
}

/// Symmetry transform shared by both halves of the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SymmetryMode {
    /// Left-right mirror (x -> w-1-x).
    Horizontal,
    /// Top-bottom mirror (y -> h-1-y).
    Vertical,
    /// 180-degree rotation about the centre.
    #[default]
    Rotational,
}

impl SymmetryMode {
    /// Image of `pos` under the transform.
    #[must_use]
    pub const fn twin(self, pos: TilePos, width: u32, height: u32) -> TilePos {
        match self {
            Self::Horizontal => TilePos::new(width - 1 - pos.x, pos.y),
            Self::Vertical => TilePos::new(pos.x, height - 1 - pos.y),
            Self::Rotational => TilePos::new(width - 1 - pos.x, height - 1 - pos.y),
        }
    }
}

/// A placed mineral cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSite {
    /// Tile of the cache.
    pub position: TilePos,
    /// Starting yield.
    pub yield_amount: u32,
    /// Placed toward the midline rather than next to a base.
    pub contested: bool,
}

/// Output of [`generate_map`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMap {
    /// Terrain grid.
    pub tiles: TileMap,
    /// Start anchors for factions A and B.
    pub anchors: [TilePos; 2],
    /// Mineral caches, each followed by its twin.
    pub caches: Vec<CacheSite>,
    /// Transform the layout satisfies.
    pub symmetry: SymmetryMode,
    /// Attempts consumed (0 when the template was used without any).
    pub attempts: u32,
    /// True when every attempt failed and the template was used.
    pub from_template: bool,
}

/// Why a layout was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutDefect {
    /// No walkable route between the anchors.
    Disconnected,
    /// A tile differs from its twin.
    Asymmetric(TilePos),
    /// A cache has no twin with equal yield.
    UnpairedCache(TilePos),
    /// Cache placement fell short.
    TooFewCaches {
        /// Caches placed.
        placed: u32,
        /// Caches required.
        required: u32,
    },
}

/// Generate a battlefield. Never fails; see the module docs.
#[must_use]
pub fn generate_map(config: &MapConfig) -> GeneratedMap {
    for attempt in 0..config.max_attempts {
        let mut rng = ChaCha8Rng::seed_from_u64(attempt_seed(config.seed, attempt));
        match try_generate(config, &mut rng) {
            Ok((tiles, anchors, caches)) => {
                info!(
                    seed = config.seed,
                    attempt,
                    caches = caches.len(),
                    "Generated battlefield"
                );
                return GeneratedMap {
                    tiles,
                    anchors,
                    caches,
                    symmetry: config.symmetry,
                    attempts: attempt + 1,
                    from_template: false,
                };
            }
            Err(defect) => {
                debug!(seed = config.seed, attempt, ?defect, "Map attempt rejected");
            }
        }
    }

    warn!(
        seed = config.seed,
        attempts = config.max_attempts,
        "No generated layout validated, using safe template"
    );
    let mut map = safe_template(config);
    map.attempts = config.max_attempts;
    map
}

/// Check the guarantees every battlefield must satisfy.
pub fn validate_layout(
    tiles: &TileMap,
    anchors: [TilePos; 2],
    caches: &[CacheSite],
    symmetry: SymmetryMode,
) -> Result<(), LayoutDefect> {
    let (w, h) = (tiles.width(), tiles.height());

    for index in 0..tiles.len() {
        let pos = tiles.pos_of(index);
        if tiles.get(pos) != tiles.get(symmetry.twin(pos, w, h)) {
            return Err(LayoutDefect::Asymmetric(pos));
        }
    }

    for cache in caches {
        let twin = symmetry.twin(cache.position, w, h);
        let paired = caches
            .iter()
            .any(|c| c.position == twin && c.yield_amount == cache.yield_amount);
        if !paired {
            return Err(LayoutDefect::UnpairedCache(cache.position));
        }
    }

    if !reachable(tiles, anchors[0], anchors[1], TerrainMask::GROUND) {
        return Err(LayoutDefect::Disconnected);
    }

    Ok(())
}

fn attempt_seed(seed: u64, attempt: u32) -> u64 {
    seed.wrapping_add(u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

type Layout = (TileMap, [TilePos; 2], Vec<CacheSite>);

fn try_generate(config: &MapConfig, rng: &mut ChaCha8Rng) -> Result<Layout, LayoutDefect> {
    let heights = height_field(config, rng);
    let mut tiles = classify(config, &heights);
    apply_symmetry(config.symmetry, &mut tiles);

    let anchors = place_anchors(config, Some(rng));
    clear_start_zones(config, &mut tiles, anchors);
    reserve_route(config, &mut tiles, anchors);

    let caches = scatter_caches(config, &mut tiles, anchors, rng);
    let placed = caches.len() as u32;
    if placed < config.min_caches {
        return Err(LayoutDefect::TooFewCaches {
            placed,
            required: config.min_caches,
        });
    }

    validate_layout(&tiles, anchors, &caches, config.symmetry)?;
    Ok((tiles, anchors, caches))
}

/// Value noise on a coarse lattice, bilinearly interpolated, then smoothed
/// with per-pass jitter and lowered toward the map edges.
fn height_field(config: &MapConfig, rng: &mut ChaCha8Rng) -> Vec<i32> {
    let (w, h) = (config.width as usize, config.height as usize);
    let step = config.feature_size.max(2) as usize;
    let lw = w / step + 2;
    let lh = h / step + 2;
    let lattice: Vec<i32> = (0..lw * lh).map(|_| rng.gen_range(0..=1000)).collect();

    let mut heights = vec![0i32; w * h];
    for y in 0..h {
        for x in 0..w {
            let (gx, gy) = (x / step, y / step);
            let (fx, fy) = ((x % step) as i32, (y % step) as i32);
            let s = step as i32;
            let at = |lx: usize, ly: usize| lattice[ly * lw + lx];
            let top = at(gx, gy) * (s - fx) + at(gx + 1, gy) * fx;
            let bottom = at(gx, gy + 1) * (s - fx) + at(gx + 1, gy + 1) * fx;
            heights[y * w + x] = (top * (s - fy) + bottom * fy) / (s * s);
        }
    }

    let jitter = config.perturbation as i32;
    for _ in 0..config.smoothing_passes {
        let mut next = vec![0i32; w * h];
        for y in 0..h {
            for x in 0..w {
                let mut sum = 0;
                let mut count = 0;
                for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                        sum += heights[ny * w + nx];
                        count += 1;
                    }
                }
                let noise = if jitter > 0 {
                    rng.gen_range(-jitter..=jitter)
                } else {
                    0
                };
                next[y * w + x] = (sum / count + noise).clamp(0, 1000);
            }
        }
        heights = next;
    }

    // Doubled coordinates keep the centre exact for even sizes.
    let max_dist = isqrt(sq(w as i64 - 1) + sq(h as i64 - 1)).max(1) as i64;
    for y in 0..h {
        for x in 0..w {
            let dx = 2 * x as i64 - (w as i64 - 1);
            let dy = 2 * y as i64 - (h as i64 - 1);
            let dist = isqrt(sq(dx) + sq(dy)) as i64;
            let drop = i64::from(config.edge_falloff) * dist / max_dist;
            heights[y * w + x] -= drop as i32;
        }
    }

    heights
}

const fn sq(v: i64) -> u64 {
    (v * v) as u64
}

fn classify(config: &MapConfig, heights: &[i32]) -> TileMap {
    let mut tiles = TileMap::filled(config.width, config.height, TerrainKind::Grass);
    for (index, &height) in heights.iter().enumerate() {
        let kind = if height < config.water_below as i32 {
            TerrainKind::Water
        } else if height < config.grass_below as i32 {
            TerrainKind::Grass
        } else if height < config.forest_below as i32 {
            TerrainKind::Forest
        } else {
            TerrainKind::Mountain
        };
        let pos = tiles.pos_of(index);
        tiles.set(pos, kind);
    }
    tiles
}

/// Copy each tile onto its twin; the lower index of every pair is the source.
fn apply_symmetry(symmetry: SymmetryMode, tiles: &mut TileMap) {
    let (w, h) = (tiles.width(), tiles.height());
    for index in 0..tiles.len() {
        let pos = tiles.pos_of(index);
        let twin = symmetry.twin(pos, w, h);
        if index < tiles.index(twin) {
            if let Some(kind) = tiles.get(pos) {
                tiles.set(twin, kind);
            }
        }
    }
}

fn place_anchors(config: &MapConfig, rng: Option<&mut ChaCha8Rng>) -> [TilePos; 2] {
    let jitter = config.start_jitter as i32;
    let j = match rng {
        Some(rng) if jitter > 0 => rng.gen_range(-jitter..=jitter),
        _ => 0,
    };
    let inset = config.start_inset as i32 + j;
    let inset = inset.clamp(1, (config.width.min(config.height) / 2) as i32 - 1) as u32;

    let first = match config.symmetry {
        SymmetryMode::Rotational => TilePos::new(inset, inset),
        SymmetryMode::Horizontal => TilePos::new(inset, config.height / 2),
        SymmetryMode::Vertical => TilePos::new(config.width / 2, inset),
    };
    let second = config.symmetry.twin(first, config.width, config.height);
    [first, second]
}

fn clear_start_zones(config: &MapConfig, tiles: &mut TileMap, anchors: [TilePos; 2]) {
    let r = config.start_clear_radius;
    for anchor in anchors {
        for_each_in_radius(tiles, anchor, r, |tiles, pos| {
            tiles.set(pos, TerrainKind::Grass);
        });
    }
}

fn for_each_in_radius(
    tiles: &mut TileMap,
    center: TilePos,
    radius: u32,
    mut f: impl FnMut(&mut TileMap, TilePos),
) {
    let r = radius as i32;
    for dy in -r..=r {
        for dx in -r..=r {
            if let Some(pos) = center.offset(dx, dy) {
                if tiles.in_bounds(pos) && center.within(pos, radius) {
                    f(tiles, pos);
                }
            }
        }
    }
}

/// Reserve the cheapest anchor-to-anchor route, carving through blocking
/// terrain where that is cheaper than going around. The route's twin is
/// treated the same way so the layout stays symmetric.
fn reserve_route(config: &MapConfig, tiles: &mut TileMap, anchors: [TilePos; 2]) {
    let Some(route) = cheapest_route(tiles, anchors[0], anchors[1], config.bridge_carve_cost)
    else {
        return;
    };
    let (w, h) = (tiles.width(), tiles.height());
    let mut carved = 0u32;
    for pos in route {
        for tile in [pos, config.symmetry.twin(pos, w, h)] {
            if !tiles.is_passable(tile, TerrainMask::GROUND) {
                tiles.set(tile, TerrainKind::Grass);
                carved += 1;
            }
            tiles.reserve(tile);
        }
    }
    if carved > 0 {
        debug!(carved, "Carved land bridge between start zones");
    }
}

/// 4-neighbour Dijkstra where passable tiles cost 1 and blocking tiles cost
/// `carve_cost`. Returns the tiles from `from` to `to` inclusive.
fn cheapest_route(
    tiles: &TileMap,
    from: TilePos,
    to: TilePos,
    carve_cost: u32,
) -> Option<Vec<TilePos>> {
    if !tiles.in_bounds(from) || !tiles.in_bounds(to) {
        return None;
    }
    let mut cost = vec![u32::MAX; tiles.len()];
    let mut came_from: Vec<Option<usize>> = vec![None; tiles.len()];
    let mut open = BinaryHeap::new();
    let start = tiles.index(from);
    let goal = tiles.index(to);
    cost[start] = 0;
    open.push(Reverse((0u32, start)));

    while let Some(Reverse((current_cost, current))) = open.pop() {
        if current == goal {
            break;
        }
        if current_cost > cost[current] {
            continue;
        }
        for next in tiles.neighbors4(tiles.pos_of(current)) {
            let step = if tiles.is_passable(next, TerrainMask::GROUND) {
                1
            } else {
                carve_cost.max(1)
            };
            let ni = tiles.index(next);
            let candidate = current_cost.saturating_add(step);
            if candidate < cost[ni] {
                cost[ni] = candidate;
                came_from[ni] = Some(current);
                open.push(Reverse((candidate, ni)));
            }
        }
    }

    if cost[goal] == u32::MAX {
        return None;
    }
    let mut route = vec![to];
    let mut cursor = goal;
    while let Some(prev) = came_from[cursor] {
        route.push(tiles.pos_of(prev));
        cursor = prev;
    }
    route.reverse();
    Some(route)
}

fn scatter_caches(
    config: &MapConfig,
    tiles: &mut TileMap,
    anchors: [TilePos; 2],
    rng: &mut ChaCha8Rng,
) -> Vec<CacheSite> {
    let (w, h) = (config.width, config.height);
    let mut caches: Vec<CacheSite> = Vec::new();

    let spaced = |caches: &[CacheSite], pos: TilePos| {
        caches
            .iter()
            .all(|c| !c.position.within(pos, config.cache_spacing.saturating_sub(1)))
    };
    let open_ground = |tiles: &TileMap, pos: TilePos| {
        matches!(
            tiles.get(pos),
            Some(TerrainKind::Grass | TerrainKind::Forest)
        ) && !tiles.is_reserved(pos)
    };

    // Home caches: a ring around the first anchor, mirrored to the second.
    let ring = config.home_cache_max as i32;
    for _ in 0..config.home_caches {
        for _ in 0..config.cache_sample_tries {
            let Some(pos) = anchors[0].offset(rng.gen_range(-ring..=ring), rng.gen_range(-ring..=ring))
            else {
                continue;
            };
            let twin = config.symmetry.twin(pos, w, h);
            let d2 = anchors[0].distance_squared(pos);
            let in_ring = d2 >= sq(i64::from(config.home_cache_min))
                && d2 <= sq(i64::from(config.home_cache_max));
            if !tiles.in_bounds(pos)
                || !in_ring
                || pos == twin
                || !open_ground(tiles, pos)
                || !spaced(&caches, pos)
                || !spaced(&caches, twin)
                || pos.within(twin, config.cache_spacing)
            {
                continue;
            }
            place_pair(tiles, &mut caches, pos, twin, config.home_cache_yield, false);
            break;
        }
    }

    // Contested caches: anywhere in the source half, accepted with a weight
    // that falls off with distance from the perpendicular bisector.
    let span = isqrt(anchors[0].distance_squared(anchors[1])).max(1);
    for _ in 0..config.contested_caches {
        for _ in 0..config.cache_sample_tries {
            let pos = TilePos::new(rng.gen_range(0..w), rng.gen_range(0..h));
            let twin = config.symmetry.twin(pos, w, h);
            if tiles.index(pos) >= tiles.index(twin) {
                continue;
            }
            let da = isqrt(anchors[0].distance_squared(pos));
            let db = isqrt(anchors[1].distance_squared(pos));
            let off_midline = da.abs_diff(db);
            let weight = 1000u64.saturating_sub(off_midline * 1000 / span);
            if rng.gen_range(0..1000u64) >= weight {
                continue;
            }
            if !open_ground(tiles, pos)
                || anchors.iter().any(|a| a.within(pos, config.base_clearance))
                || !spaced(&caches, pos)
                || !spaced(&caches, twin)
                || pos.within(twin, config.cache_spacing)
            {
                continue;
            }
            place_pair(tiles, &mut caches, pos, twin, config.contested_cache_yield, true);
            break;
        }
    }

    caches
}

fn place_pair(
    tiles: &mut TileMap,
    caches: &mut Vec<CacheSite>,
    pos: TilePos,
    twin: TilePos,
    yield_amount: u32,
    contested: bool,
) {
    for position in [pos, twin] {
        tiles.set(position, TerrainKind::MineralCache);
        caches.push(CacheSite {
            position,
            yield_amount,
            contested,
        });
    }
}

/// Deterministic fallback: open field, a central lake, two mirrored ridges
/// and fixed caches. Satisfies [`validate_layout`] for any config whose
/// dimensions fit the anchors.
#[must_use]
pub fn safe_template(config: &MapConfig) -> GeneratedMap {
    let (w, h) = (config.width, config.height);
    let mut tiles = TileMap::filled(w, h, TerrainKind::Grass);

    // Lake, in doubled coordinates so it is centred exactly.
    let lake = 2 * (w.min(h) / 10);
    for index in 0..tiles.len() {
        let pos = tiles.pos_of(index);
        let dx = 2 * pos.x as i64 - (w as i64 - 1);
        let dy = 2 * pos.y as i64 - (h as i64 - 1);
        if sq(dx) + sq(dy) <= u64::from(lake) * u64::from(lake) {
            tiles.set(pos, TerrainKind::Water);
        }
    }

    // One ridge in the source half; apply_symmetry supplies its twin.
    let ridge_y = h / 3;
    for x in (w / 4)..(w / 4 + w / 6) {
        tiles.set(TilePos::new(x, ridge_y), TerrainKind::Mountain);
    }
    for y in (h / 8)..(h / 8 + h / 10) {
        tiles.set(TilePos::new(w / 2 - 2, y), TerrainKind::Forest);
    }
    apply_symmetry(config.symmetry, &mut tiles);

    let anchors = place_anchors(config, None);
    clear_start_zones(config, &mut tiles, anchors);
    reserve_route(config, &mut tiles, anchors);

    let mut caches = Vec::new();
    let a = anchors[0];
    let toward_x: i32 = if a.x < w / 2 { 1 } else { -1 };
    let toward_y: i32 = if a.y < h / 2 { 1 } else { -1 };
    let home_offsets = [(7, 1), (1, 7), (6, 6)];
    for (dx, dy) in home_offsets {
        if let Some(pos) = a.offset(dx * toward_x, dy * toward_y) {
            let twin = config.symmetry.twin(pos, w, h);
            if tiles.in_bounds(pos) && pos != twin && !tiles.is_reserved(pos) {
                place_pair(&mut tiles, &mut caches, pos, twin, config.home_cache_yield, false);
            }
        }
    }

    let b = anchors[1];
    let (vx, vy) = (b.x as i64 - a.x as i64, b.y as i64 - a.y as i64);
    let (px, py) = (-vy.signum(), vx.signum());
    for (percent, side) in [(30i64, 8i64), (30, -8), (40, 0)] {
        let x = a.x as i64 + vx * percent / 100 + px * side;
        let y = a.y as i64 + vy * percent / 100 + py * side;
        if x < 0 || y < 0 {
            continue;
        }
        let pos = TilePos::new(x as u32, y as u32);
        let twin = config.symmetry.twin(pos, w, h);
        if tiles.in_bounds(pos)
            && pos != twin
            && tiles.get(pos).is_some_and(TerrainKind::is_buildable)
            && !tiles.is_reserved(pos)
        {
            place_pair(
                &mut tiles,
                &mut caches,
                pos,
                twin,
                config.contested_cache_yield,
                true,
            );
        }
    }

    GeneratedMap {
        tiles,
        anchors,
        caches,
        symmetry: config.symmetry,
        attempts: 0,
        from_template: true,
    }
}
