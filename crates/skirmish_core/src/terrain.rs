//! Terrain kinds and the immutable tile grid.

use serde::{Deserialize, Serialize};

use crate::math::TilePos;

/// Terrain classification of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TerrainKind {
    /// Open ground.
    #[default]
    Grass,
    /// Passable but slow.
    Forest,
    /// Impassable; blocks line of sight.
    Mountain,
    /// Impassable.
    Water,
    /// Harvestable deposit. Passable, never buildable.
    MineralCache,
}

impl TerrainKind {
    /// Single-bit mask for this kind.
    #[must_use]
    pub const fn bit(self) -> TerrainMask {
        TerrainMask(1 << self as u8)
    }

    /// Whether ground units may stand here.
    #[must_use]
    pub const fn is_ground_passable(self) -> bool {
        TerrainMask::GROUND.contains(self.bit())
    }

    /// Whether the tile interrupts direct-fire line of sight.
    #[must_use]
    pub const fn blocks_sight(self) -> bool {
        matches!(self, Self::Mountain)
    }

    /// Whether a structure may be placed on this terrain.
    #[must_use]
    pub const fn is_buildable(self) -> bool {
        matches!(self, Self::Grass | Self::Forest)
    }

    /// One-character glyph for debug renders.
    #[must_use]
    pub const fn glyph(self) -> char {
        match self {
            Self::Grass => '.',
            Self::Forest => 'f',
            Self::Mountain => '^',
            Self::Water => '~',
            Self::MineralCache => '$',
        }
    }
}

/// Set of terrain kinds a mover can enter.
///
/// ```
/// use skirmish_core::terrain::{TerrainKind, TerrainMask};
///
/// assert!(TerrainMask::GROUND.allows(TerrainKind::Forest));
/// assert!(!TerrainMask::GROUND.allows(TerrainKind::Water));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TerrainMask(u8);

impl TerrainMask {
    /// Nothing is enterable.
    pub const NONE: Self = Self(0);
    /// Grass, forest and mineral caches.
    pub const GROUND: Self = Self(0b1_0011);

    /// Union of two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if the mask admits `kind`.
    #[must_use]
    pub const fn allows(self, kind: TerrainKind) -> bool {
        self.contains(kind.bit())
    }
}

/// The battlefield grid. Row-major, fixed at generation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileMap {
    width: u32,
    height: u32,
    tiles: Vec<TerrainKind>,
    /// Tiles that must stay open (carved land bridges).
    reserved: Vec<bool>,
}

impl TileMap {
    /// A map filled with one terrain kind.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is zero.
    #[must_use]
    pub fn filled(width: u32, height: u32, kind: TerrainKind) -> Self {
        assert!(width > 0 && height > 0, "TileMap dimensions must be positive");
        let count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            tiles: vec![kind; count],
            reserved: vec![false; count],
        }
    }

    /// Parse a map from rows of glyphs (see [`TerrainKind::glyph`]).
    /// Unknown glyphs read as grass. Handy for hand-built test maps.
    #[must_use]
    pub fn from_rows(rows: &[&str]) -> Self {
        let height = rows.len() as u32;
        let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0) as u32;
        let mut map = Self::filled(width.max(1), height.max(1), TerrainKind::Grass);
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                let kind = match ch {
                    'f' => TerrainKind::Forest,
                    '^' => TerrainKind::Mountain,
                    '~' => TerrainKind::Water,
                    '$' => TerrainKind::MineralCache,
                    _ => TerrainKind::Grass,
                };
                map.set(TilePos::new(x as u32, y as u32), kind);
            }
        }
        map
    }

    /// Grid width in tiles.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in tiles.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Always false; maps have at least one tile.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Whether `pos` is on the map.
    #[must_use]
    pub const fn in_bounds(&self, pos: TilePos) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// Row-major index of an in-bounds tile.
    #[must_use]
    pub const fn index(&self, pos: TilePos) -> usize {
        (pos.y as usize) * (self.width as usize) + (pos.x as usize)
    }

    /// Tile coordinate of a row-major index.
    #[must_use]
    pub const fn pos_of(&self, index: usize) -> TilePos {
        TilePos::new(
            (index % self.width as usize) as u32,
            (index / self.width as usize) as u32,
        )
    }

    /// Terrain at `pos`, `None` off the map.
    #[must_use]
    pub fn get(&self, pos: TilePos) -> Option<TerrainKind> {
        self.in_bounds(pos).then(|| self.tiles[self.index(pos)])
    }

    /// Overwrite the terrain at `pos`. Out-of-bounds writes are ignored.
    pub fn set(&mut self, pos: TilePos, kind: TerrainKind) {
        if self.in_bounds(pos) {
            let i = self.index(pos);
            self.tiles[i] = kind;
        }
    }

    /// Mark a tile as reserved (never buildable).
    pub fn reserve(&mut self, pos: TilePos) {
        if self.in_bounds(pos) {
            let i = self.index(pos);
            self.reserved[i] = true;
        }
    }

    /// Whether `pos` is reserved.
    #[must_use]
    pub fn is_reserved(&self, pos: TilePos) -> bool {
        self.in_bounds(pos) && self.reserved[self.index(pos)]
    }

    /// Whether a mover with `mask` may stand on `pos`.
    #[must_use]
    pub fn is_passable(&self, pos: TilePos, mask: TerrainMask) -> bool {
        self.get(pos).is_some_and(|k| mask.allows(k))
    }

    /// Whether a structure may stand on `pos` (terrain only).
    #[must_use]
    pub fn is_buildable(&self, pos: TilePos) -> bool {
        self.get(pos).is_some_and(TerrainKind::is_buildable) && !self.is_reserved(pos)
    }

    /// Raw row-major terrain slice.
    #[must_use]
    pub fn tiles(&self) -> &[TerrainKind] {
        &self.tiles
    }

    /// Cardinal neighbours of `pos` that are on the map.
    pub fn neighbors4(&self, pos: TilePos) -> impl Iterator<Item = TilePos> + '_ {
        [(1, 0), (0, 1), (-1, 0), (0, -1)]
            .into_iter()
            .filter_map(move |(dx, dy)| pos.offset(dx, dy))
            .filter(|p| self.in_bounds(*p))
    }

    /// Count tiles of each kind, indexed by `TerrainKind as usize`.
    #[must_use]
    pub fn histogram(&self) -> [usize; 5] {
        let mut counts = [0usize; 5];
        for kind in &self.tiles {
            counts[*kind as usize] += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passability_follows_kind() {
        assert!(TerrainKind::Grass.is_ground_passable());
        assert!(TerrainKind::Forest.is_ground_passable());
        assert!(TerrainKind::MineralCache.is_ground_passable());
        assert!(!TerrainKind::Mountain.is_ground_passable());
        assert!(!TerrainKind::Water.is_ground_passable());
    }

    #[test]
    fn test_caches_are_not_buildable() {
        assert!(!TerrainKind::MineralCache.is_buildable());
        assert!(TerrainKind::Forest.is_buildable());
    }

    #[test]
    fn test_rows_parse_into_terrain() {
        let map = TileMap::from_rows(&[".f^", "~$."]);
        assert_eq!(map.width(), 3);
        assert_eq!(map.height(), 2);
        assert_eq!(map.get(TilePos::new(1, 0)), Some(TerrainKind::Forest));
        assert_eq!(map.get(TilePos::new(2, 0)), Some(TerrainKind::Mountain));
        assert_eq!(map.get(TilePos::new(0, 1)), Some(TerrainKind::Water));
        assert_eq!(map.get(TilePos::new(1, 1)), Some(TerrainKind::MineralCache));
        assert_eq!(map.get(TilePos::new(3, 0)), None);
    }

    #[test]
    fn test_reserved_tiles_are_not_buildable() {
        let mut map = TileMap::filled(4, 4, TerrainKind::Grass);
        let pos = TilePos::new(1, 1);
        assert!(map.is_buildable(pos));
        map.reserve(pos);
        assert!(!map.is_buildable(pos));
        assert!(map.is_passable(pos, TerrainMask::GROUND));
    }

    #[test]
    fn test_index_round_trips_positions() {
        let map = TileMap::filled(7, 5, TerrainKind::Grass);
        let pos = TilePos::new(6, 4);
        assert_eq!(map.pos_of(map.index(pos)), pos);
    }

    #[test]
    fn test_corner_has_two_neighbours() {
        let map = TileMap::filled(3, 3, TerrainKind::Grass);
        assert_eq!(map.neighbors4(TilePos::new(0, 0)).count(), 2);
        assert_eq!(map.neighbors4(TilePos::new(1, 1)).count(), 4);
    }
}
