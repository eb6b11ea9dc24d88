//! Hexagonal areas and their boundary traversals.
//!
//! A hex ring of radius R has six corners, `R` steps from the centre in
//! each compass direction. Walking from one corner to the next
//! counter-clockwise corner takes `R` steps in a fixed direction, and the
//! direction of the following edge is one counter-clockwise rotation
//! further. Both traversals below are that edge walk:
//!
//!   - `RingRegion` walks all six edges: exactly `6R` cells.
//!   - `DifferenceRegion` walks the two edges facing the direction an
//!     area moved in: exactly the `2R + 1` cells it gained (or lost).
//!
//! Radii must stay below half the map size, or the wrapping seams make
//! an area overlap itself.

use crate::map::{Coords, Direction, Map};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub center: Coords,
    pub radius: u16,
}

impl Area {
    pub const fn new(center: Coords, radius: u16) -> Self {
        Self { center, radius }
    }
}

/// Transient iterator state for one traversal. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionCursor {
    pub current:           Coords,
    pub direction:         Direction,
    pub remaining_in_edge: u16,
    pub passed_corner:     bool,
}

/// The cells an area gains (or loses) when its centre moves one step.
pub struct DifferenceRegion<'m> {
    map:       &'m Map,
    radius:    u16,
    cursor:    RegionCursor,
    unyielded: bool,
    finished:  bool,
}

impl<'m> DifferenceRegion<'m> {
    /// Cells of `area` moved one step towards `dir` that `area` lacked.
    pub fn entering(map: &'m Map, area: Area, dir: Direction) -> Self {
        let moved_center = map.neighbour(area.center, dir);
        // Start at the corner clockwise of the leading corner, then walk
        // towards the leading corner and on to the counter-clockwise one.
        let start = map.walk(moved_center, dir.rotate_cw(), area.radius);
        Self {
            map,
            radius: area.radius,
            cursor: RegionCursor {
                current:           start,
                direction:         dir.rotate_ccw(),
                remaining_in_edge: area.radius,
                passed_corner:     false,
            },
            unyielded: true,
            finished:  false,
        }
    }

    /// Cells of `area` that are no longer covered once it moved towards `dir`.
    pub fn leaving(map: &'m Map, area: Area, dir: Direction) -> Self {
        let moved = Area::new(map.neighbour(area.center, dir), area.radius);
        Self::entering(map, moved, dir.opposite())
    }

    pub fn cursor(&self) -> &RegionCursor {
        &self.cursor
    }

    /// Step to the next cell. Returns false once both edges are exhausted.
    fn advance(&mut self) -> bool {
        if self.finished {
            return false;
        }
        if self.cursor.remaining_in_edge > 0 {
            self.cursor.current = self.map.neighbour(self.cursor.current, self.cursor.direction);
            self.cursor.remaining_in_edge -= 1;
            return true;
        }
        if !self.cursor.passed_corner {
            self.cursor.passed_corner = true;
            self.cursor.direction = self.cursor.direction.rotate_ccw();
            self.cursor.remaining_in_edge = self.radius;
            return self.advance();
        }
        self.finished = true;
        false
    }
}

impl Iterator for DifferenceRegion<'_> {
    type Item = Coords;

    fn next(&mut self) -> Option<Coords> {
        if self.unyielded {
            self.unyielded = false;
            return Some(self.cursor.current);
        }
        self.advance().then_some(self.cursor.current)
    }
}

/// Every cell at exactly `radius` steps from the centre.
pub struct RingRegion<'m> {
    map:        &'m Map,
    area:       Area,
    cursor:     RegionCursor,
    edges_left: u8,
}

impl<'m> RingRegion<'m> {
    pub fn new(map: &'m Map, area: Area) -> Self {
        let start = map.walk(area.center, Direction::NorthEast, area.radius);
        Self {
            map,
            area,
            cursor: RegionCursor {
                current:           start,
                direction:         Direction::NorthEast.rotate_ccw().rotate_ccw(),
                remaining_in_edge: area.radius,
                passed_corner:     false,
            },
            // A zero ring is the centre alone, handed out as one "edge".
            edges_left: if area.radius == 0 { 1 } else { 6 },
        }
    }
}

impl Iterator for RingRegion<'_> {
    type Item = Coords;

    fn next(&mut self) -> Option<Coords> {
        if self.edges_left == 0 {
            return None;
        }
        let cell = self.cursor.current;
        if self.area.radius == 0 {
            self.edges_left = 0;
            return Some(cell);
        }
        self.cursor.current = self.map.neighbour(cell, self.cursor.direction);
        self.cursor.remaining_in_edge -= 1;
        if self.cursor.remaining_in_edge == 0 {
            self.edges_left -= 1;
            self.cursor.direction = self.cursor.direction.rotate_ccw();
            self.cursor.remaining_in_edge = self.area.radius;
            self.cursor.passed_corner = true;
        }
        Some(cell)
    }
}

/// All cells of an area, centre first, then ring by ring.
pub fn area_cells(map: &Map, area: Area) -> Vec<Coords> {
    (0..=area.radius)
        .flat_map(move |r| RingRegion::new(map, Area::new(area.center, r)))
        .collect()
}
