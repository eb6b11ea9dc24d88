//! Simulation clock: tick state, pause and the network time grant.
//!
//! In lockstep the network layer decides how far a peer may run: it
//! grants time only once every peer's commands up to that tick are
//! known. The clock never advances past the grant.

use crate::types::{RunId, SimTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimClock {
    pub run_id:        RunId,
    pub current_tick:  SimTime,
    pub granted_until: SimTime,
    pub paused:        bool,
}

impl SimClock {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            current_tick:  0,
            granted_until: 0,
            paused:        true,
        }
    }

    /// Advance one tick. Returns the new tick number.
    /// Panics if called while paused or past the grant; callers check `can_advance` first.
    pub fn advance(&mut self) -> SimTime {
        assert!(!self.paused, "advance() called on paused clock");
        assert!(self.can_advance(), "advance() past granted time {}", self.granted_until);
        self.current_tick += 1;
        self.current_tick
    }

    /// Allow running up to `tick`. Grants never move backwards.
    pub fn grant(&mut self, tick: SimTime) {
        self.granted_until = self.granted_until.max(tick);
    }

    pub fn can_advance(&self) -> bool {
        self.current_tick < self.granted_until
    }

    pub fn pause(&mut self)  { self.paused = true;  }
    pub fn resume(&mut self) { self.paused = false; }
}
