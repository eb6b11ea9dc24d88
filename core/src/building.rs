//! Home buildings: where workers spawn and deliver their wares.

use crate::{
    map::Coords,
    object::ObjectId,
    types::{PlayerNumber, WareName},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub id:       ObjectId,
    pub owner:    PlayerNumber,
    pub position: Coords,
    /// BTreeMap so stock iterates (and serializes) in the same order everywhere.
    pub stock:    BTreeMap<WareName, u32>,
}

impl Building {
    pub fn new(id: ObjectId, owner: PlayerNumber, position: Coords) -> Self {
        Self {
            id,
            owner,
            position,
            stock: BTreeMap::new(),
        }
    }

    pub fn store_ware(&mut self, ware: WareName) {
        *self.stock.entry(ware).or_insert(0) += 1;
    }

    pub fn stock_of(&self, ware: &str) -> u32 {
        self.stock.get(ware).copied().unwrap_or(0)
    }
}
