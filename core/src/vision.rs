//! Per-player visibility.
//!
//! Every cell keeps a count of how many of the player's viewers cover
//! it. A moving viewer only touches the `2R + 1` cells it gains and the
//! `2R + 1` it loses, never its whole area.

use crate::{
    map::{Coords, Direction, Map},
    region::{area_cells, Area, DifferenceRegion},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vision {
    seen_by: Vec<u16>,
}

impl Vision {
    pub fn new(cell_count: usize) -> Self {
        Self { seen_by: vec![0; cell_count] }
    }

    pub fn cell_count(&self) -> usize {
        self.seen_by.len()
    }

    pub fn see_area(&mut self, map: &Map, area: Area) {
        for c in area_cells(map, area) {
            self.see(map, c);
        }
    }

    pub fn unsee_area(&mut self, map: &Map, area: Area) {
        for c in area_cells(map, area) {
            self.unsee(map, c);
        }
    }

    /// Move a viewer's area one step. Returns the area after the move.
    pub fn move_area(&mut self, map: &Map, area: Area, dir: Direction) -> Area {
        for c in DifferenceRegion::entering(map, area, dir) {
            self.see(map, c);
        }
        for c in DifferenceRegion::leaving(map, area, dir) {
            self.unsee(map, c);
        }
        Area::new(map.neighbour(area.center, dir), area.radius)
    }

    pub fn is_visible(&self, map: &Map, c: Coords) -> bool {
        self.seen_by[map.index(c)] > 0
    }

    pub fn viewers(&self, map: &Map, c: Coords) -> u16 {
        self.seen_by[map.index(c)]
    }

    pub fn visible_cells(&self) -> usize {
        self.seen_by.iter().filter(|&&n| n > 0).count()
    }

    fn see(&mut self, map: &Map, c: Coords) {
        let index = map.index(c);
        self.seen_by[index] = self.seen_by[index].saturating_add(1);
    }

    fn unsee(&mut self, map: &Map, c: Coords) {
        let index = map.index(c);
        debug_assert!(self.seen_by[index] > 0, "unsee of unseen cell {c:?}");
        self.seen_by[index] = self.seen_by[index].saturating_sub(1);
    }
}
