//! Per-tile occupancy index.
//!
//! Buildings are hard obstacles and at most one may stand on a tile. Units
//! are soft: the index only counts them, so path search can price crowded
//! tiles and movement can detect a jammed waypoint. The index is updated
//! in place whenever a unit steps or an entity spawns or dies.

use crate::entities::EntityId;
use crate::math::TilePos;
use crate::terrain::TileMap;

/// Occupancy of every tile on the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupancy {
    width: u32,
    height: u32,
    buildings: Vec<Option<EntityId>>,
    units: Vec<u16>,
}

impl Occupancy {
    /// Empty index for a `width` x `height` map.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            buildings: vec![None; count],
            units: vec![0; count],
        }
    }

    fn index(&self, pos: TilePos) -> Option<usize> {
        (pos.x < self.width && pos.y < self.height)
            .then(|| (pos.y as usize) * (self.width as usize) + (pos.x as usize))
    }

    /// Building standing on `pos`, if any.
    #[must_use]
    pub fn building_at(&self, pos: TilePos) -> Option<EntityId> {
        self.index(pos).and_then(|i| self.buildings[i])
    }

    /// Number of units on `pos`.
    #[must_use]
    pub fn units_at(&self, pos: TilePos) -> u16 {
        self.index(pos).map_or(0, |i| self.units[i])
    }

    /// Record a building. Returns the current holder if the tile is taken.
    pub fn place_building(&mut self, pos: TilePos, id: EntityId) -> Result<(), EntityId> {
        let Some(i) = self.index(pos) else {
            return Err(id);
        };
        match self.buildings[i] {
            Some(existing) => Err(existing),
            None => {
                self.buildings[i] = Some(id);
                Ok(())
            }
        }
    }

    /// Clear a building record.
    pub fn remove_building(&mut self, pos: TilePos) {
        if let Some(i) = self.index(pos) {
            self.buildings[i] = None;
        }
    }

    /// Count a unit onto `pos`.
    pub fn add_unit(&mut self, pos: TilePos) {
        if let Some(i) = self.index(pos) {
            self.units[i] = self.units[i].saturating_add(1);
        }
    }

    /// Count a unit off `pos`.
    pub fn remove_unit(&mut self, pos: TilePos) {
        if let Some(i) = self.index(pos) {
            self.units[i] = self.units[i].saturating_sub(1);
        }
    }

    /// Move one unit's count from `from` to `to`.
    pub fn move_unit(&mut self, from: TilePos, to: TilePos) {
        self.remove_unit(from);
        self.add_unit(to);
    }

    /// Whether a building may go on `pos` right now: buildable terrain that
    /// is not reserved, no building, no units, and no other building on any
    /// of the eight neighbouring tiles.
    #[must_use]
    pub fn is_free_to_build(&self, tiles: &TileMap, pos: TilePos) -> bool {
        if !tiles.is_buildable(pos) || self.building_at(pos).is_some() || self.units_at(pos) > 0 {
            return false;
        }
        for dy in -1..=1 {
            for dx in -1..=1 {
                if let Some(n) = pos.offset(dx, dy) {
                    if self.building_at(n).is_some() {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Total units counted, for consistency checks.
    #[must_use]
    pub fn unit_total(&self) -> u64 {
        self.units.iter().map(|&n| u64::from(n)).sum()
    }
}
