//! Everything an acting actor may touch besides the other actors.

use crate::{
    building::Building,
    cmdqueue::CommandQueue,
    event::SimEvent,
    map::{Direction, Map},
    object::Arena,
    pathfield::PathfieldPool,
    program::ProgramLibrary,
    region::Area,
    rng::SimRng,
    types::{PlayerNumber, SimTime},
    vision::Vision,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct World {
    pub time:       SimTime,
    pub map:        Map,
    pub rng:        SimRng,
    pub queue:      CommandQueue,
    pub pathfields: PathfieldPool,
    pub buildings:  Arena<Building>,
    pub visions:    BTreeMap<PlayerNumber, Vision>,
    pub programs:   Arc<ProgramLibrary>,
    pub events:     Vec<SimEvent>,
}

impl World {
    pub fn new(map: Map, rng: SimRng, programs: Arc<ProgramLibrary>) -> Self {
        Self {
            time:       0,
            pathfields: PathfieldPool::new(map.cell_count()),
            map,
            rng,
            queue:      CommandQueue::new(),
            buildings:  Arena::new(),
            visions:    BTreeMap::new(),
            programs,
            events:     Vec::new(),
        }
    }

    pub fn emit(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    pub fn see_area(&mut self, player: PlayerNumber, area: Area) {
        let cells = self.map.cell_count();
        self.visions
            .entry(player)
            .or_insert_with(|| Vision::new(cells))
            .see_area(&self.map, area);
    }

    pub fn unsee_area(&mut self, player: PlayerNumber, area: Area) {
        if let Some(vision) = self.visions.get_mut(&player) {
            vision.unsee_area(&self.map, area);
        }
    }

    /// Incrementally move one viewer of `player` a step towards `dir`.
    pub fn move_viewer(&mut self, player: PlayerNumber, area: Area, dir: Direction) -> Area {
        let cells = self.map.cell_count();
        self.visions
            .entry(player)
            .or_insert_with(|| Vision::new(cells))
            .move_area(&self.map, area, dir)
    }

    pub fn vision(&self, player: PlayerNumber) -> Option<&Vision> {
        self.visions.get(&player)
    }
}
