//! Fixed-point math and tile coordinates.
//!
//! Simulation state never holds floats. Sub-tile movement progress and the
//! interpolated world positions handed to the snapshot use [`Fixed`]; grid
//! work uses [`TilePos`] with integer distances.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// 32 integer bits, 32 fractional bits.
pub type Fixed = I32F32;

/// A tile coordinate on the battlefield grid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TilePos {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
}

impl TilePos {
    /// Create a tile coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance in tiles.
    #[must_use]
    pub const fn distance_squared(self, other: Self) -> u64 {
        let dx = self.x.abs_diff(other.x) as u64;
        let dy = self.y.abs_diff(other.y) as u64;
        dx * dx + dy * dy
    }

    /// Chebyshev (king-move) distance in tiles.
    #[must_use]
    pub const fn chebyshev(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        if dx > dy {
            dx
        } else {
            dy
        }
    }

    /// Manhattan distance in tiles.
    #[must_use]
    pub const fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// True when `other` lies within `radius` tiles (Euclidean, inclusive).
    #[must_use]
    pub const fn within(self, other: Self, radius: u32) -> bool {
        self.distance_squared(other) <= (radius as u64) * (radius as u64)
    }

    /// Offset by a signed delta, returning `None` on underflow.
    #[must_use]
    pub fn offset(self, dx: i32, dy: i32) -> Option<Self> {
        let x = self.x.checked_add_signed(dx)?;
        let y = self.y.checked_add_signed(dy)?;
        Some(Self { x, y })
    }

    /// World-space centre of this tile.
    #[must_use]
    pub fn center(self) -> Vec2Fixed {
        let half = Fixed::from_num(1) / Fixed::from_num(2);
        Vec2Fixed::new(Fixed::from_num(self.x) + half, Fixed::from_num(self.y) + half)
    }
}

impl std::fmt::Display for TilePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Fixed-point 2D vector in world units (one tile = one unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Values are written as their raw bit pattern (i64) so a snapshot read back
/// by another process compares bit-for-bit.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bits.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bits.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Fixed::from_bits(i64::deserialize(deserializer)?))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Linear interpolation, `t` clamped to `0..=1`.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        let t = t.clamp(Fixed::ZERO, Fixed::ONE);
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

/// Integer square root (floor), used by map generation distances.
#[must_use]
pub fn isqrt(value: u64) -> u64 {
    if value < 2 {
        return value;
    }
    let mut low = 1u64;
    let mut high = value.min(u64::from(u32::MAX));
    while low < high {
        let mid = low + (high - low + 1) / 2;
        if mid * mid <= value {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    low
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_distances() {
        let a = TilePos::new(2, 3);
        let b = TilePos::new(5, 7);
        assert_eq!(a.distance_squared(b), 25);
        assert_eq!(a.chebyshev(b), 4);
        assert_eq!(a.manhattan(b), 7);
        assert!(a.within(b, 5));
        assert!(!a.within(b, 4));
    }

    #[test]
    fn test_tile_offset_rejects_underflow() {
        let origin = TilePos::new(0, 0);
        assert_eq!(origin.offset(-1, 0), None);
        assert_eq!(origin.offset(1, 2), Some(TilePos::new(1, 2)));
    }

    #[test]
    fn test_tile_center_is_half_offset() {
        let c = TilePos::new(3, 4).center();
        assert_eq!(c.x, Fixed::from_num(3.5));
        assert_eq!(c.y, Fixed::from_num(4.5));
    }

    #[test]
    fn test_integer_sqrt_floors() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(15), 3);
        assert_eq!(isqrt(16), 4);
        assert_eq!(isqrt(17), 4);
        assert_eq!(isqrt(128 * 128 * 2), 181);
    }

    #[test]
    fn test_lerp_clamps_parameter() {
        let a = Vec2Fixed::ZERO;
        let b = Vec2Fixed::new(Fixed::from_num(10), Fixed::from_num(4));
        assert_eq!(a.lerp(b, Fixed::from_num(2)), b);
        let mid = a.lerp(b, Fixed::from_num(0.5));
        assert_eq!(mid, Vec2Fixed::new(Fixed::from_num(5), Fixed::from_num(2)));
    }
}
