//! Hexagonal map geometry.
//!
//! Cells are addressed with offset coordinates: odd rows are shifted half
//! a cell to the right. The map wraps around on both axes, so every cell
//! has exactly six neighbours. The height must be even for the row
//! shift to stay consistent across the vertical seam.

use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coords {
    pub x: i16,
    pub y: i16,
}

impl Coords {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

/// Compass directions, numbered clockwise starting at north-east.
/// The numbering is part of the savegame format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    NorthEast = 1,
    East      = 2,
    SouthEast = 3,
    SouthWest = 4,
    West      = 5,
    NorthWest = 6,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Self::NorthEast),
            2 => Some(Self::East),
            3 => Some(Self::SouthEast),
            4 => Some(Self::SouthWest),
            5 => Some(Self::West),
            6 => Some(Self::NorthWest),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// One step counter-clockwise (6 -> 5 -> ... -> 1 -> 6).
    pub fn rotate_ccw(self) -> Self {
        match self {
            Self::NorthEast => Self::NorthWest,
            Self::East      => Self::NorthEast,
            Self::SouthEast => Self::East,
            Self::SouthWest => Self::SouthEast,
            Self::West      => Self::SouthWest,
            Self::NorthWest => Self::West,
        }
    }

    pub fn rotate_cw(self) -> Self {
        match self {
            Self::NorthEast => Self::East,
            Self::East      => Self::SouthEast,
            Self::SouthEast => Self::SouthWest,
            Self::SouthWest => Self::West,
            Self::West      => Self::NorthWest,
            Self::NorthWest => Self::NorthEast,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::NorthEast => Self::SouthWest,
            Self::East      => Self::West,
            Self::SouthEast => Self::NorthWest,
            Self::SouthWest => Self::NorthEast,
            Self::West      => Self::East,
            Self::NorthWest => Self::SouthEast,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Map {
    width:   u16,
    height:  u16,
    blocked: Vec<bool>,
}

impl Map {
    pub fn new(width: u16, height: u16) -> SimResult<Self> {
        let map = Self {
            width,
            height,
            blocked: vec![false; usize::from(width) * usize::from(height)],
        };
        map.validate()?;
        Ok(map)
    }

    /// Check the invariants a deserialized map might violate.
    pub fn validate(&self) -> SimResult<()> {
        if self.width < 2 || self.height < 2 || self.width > i16::MAX as u16 || self.height > i16::MAX as u16 {
            return Err(SimError::InvalidMap(format!(
                "size {}x{} out of range",
                self.width, self.height
            )));
        }
        if self.height % 2 != 0 {
            return Err(SimError::InvalidMap(format!(
                "height {} must be even",
                self.height
            )));
        }
        if self.blocked.len() != self.cell_count() {
            return Err(SimError::InvalidMap(format!(
                "{} terrain entries for {} cells",
                self.blocked.len(),
                self.cell_count()
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn cell_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }

    /// Wrap arbitrary coordinates onto the map.
    pub fn normalize(&self, x: i32, y: i32) -> Coords {
        Coords {
            x: x.rem_euclid(i32::from(self.width)) as i16,
            y: y.rem_euclid(i32::from(self.height)) as i16,
        }
    }

    /// Dense index of a (normalized) cell.
    pub fn index(&self, c: Coords) -> usize {
        let c = self.normalize(i32::from(c.x), i32::from(c.y));
        c.y as usize * usize::from(self.width) + c.x as usize
    }

    pub fn coords(&self, index: usize) -> Coords {
        let width = usize::from(self.width);
        Coords {
            x: (index % width) as i16,
            y: (index / width) as i16,
        }
    }

    pub fn neighbour(&self, c: Coords, dir: Direction) -> Coords {
        let (x, y) = (i32::from(c.x), i32::from(c.y));
        let odd = y & 1 == 1;
        let (nx, ny) = match dir {
            Direction::East      => (x + 1, y),
            Direction::West      => (x - 1, y),
            Direction::NorthEast => (if odd { x + 1 } else { x }, y - 1),
            Direction::NorthWest => (if odd { x } else { x - 1 }, y - 1),
            Direction::SouthEast => (if odd { x + 1 } else { x }, y + 1),
            Direction::SouthWest => (if odd { x } else { x - 1 }, y + 1),
        };
        self.normalize(nx, ny)
    }

    /// Walk `steps` cells in a straight line.
    pub fn walk(&self, mut c: Coords, dir: Direction, steps: u16) -> Coords {
        for _ in 0..steps {
            c = self.neighbour(c, dir);
        }
        c
    }

    pub fn is_blocked(&self, c: Coords) -> bool {
        self.blocked[self.index(c)]
    }

    pub fn set_blocked(&mut self, c: Coords, blocked: bool) {
        let index = self.index(c);
        self.blocked[index] = blocked;
    }

    /// Hex distance in steps, taking the shortest way around the seams.
    pub fn calc_distance(&self, a: Coords, b: Coords) -> u32 {
        let (w, h) = (i32::from(self.width), i32::from(self.height));
        let from = axial(i32::from(a.x), i32::from(a.y));
        let mut best = u32::MAX;
        for dy in [-h, 0, h] {
            for dx in [-w, 0, w] {
                let to = axial(i32::from(b.x) + dx, i32::from(b.y) + dy);
                let dq = to.0 - from.0;
                let dr = to.1 - from.1;
                let d = (dq.abs() + dr.abs() + (dq + dr).abs()) / 2;
                best = best.min(d as u32);
            }
        }
        best
    }
}

/// Offset (odd rows shifted right) to axial coordinates.
fn axial(x: i32, y: i32) -> (i32, i32) {
    (x - (y - (y & 1)) / 2, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbours_are_symmetric_and_one_step_away() {
        let map = Map::new(16, 12).unwrap();
        for index in 0..map.cell_count() {
            let c = map.coords(index);
            for dir in Direction::ALL {
                let n = map.neighbour(c, dir);
                assert_eq!(map.neighbour(n, dir.opposite()), c, "{c:?} {dir:?}");
                assert_eq!(map.calc_distance(c, n), 1);
            }
        }
    }

    #[test]
    fn rotation_cycles_through_all_six() {
        let mut d = Direction::East;
        for _ in 0..6 {
            d = d.rotate_ccw();
        }
        assert_eq!(d, Direction::East);
        assert_eq!(Direction::NorthEast.rotate_ccw(), Direction::NorthWest);
        assert_eq!(Direction::from_index(7), None);
    }

    #[test]
    fn odd_height_is_rejected() {
        assert!(matches!(Map::new(8, 7), Err(SimError::InvalidMap(_))));
    }
}
