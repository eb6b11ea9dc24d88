//! Reusable pathfinding scratch memory.
//!
//! A search needs one record per map cell. Clearing a whole array for
//! every search would cost O(cells), so each container carries a
//! generation stamp instead: a cell's record is valid for the current
//! search only if its stamp equals the container's. Starting a new
//! search is a single increment; the real clear happens once every
//! 2^32 searches, when the stamp wraps.
//!
//! RULE: A container is reused only when the pool holds the sole
//! reference to it. Handles are `Rc`s; dropping a handle releases it.
//! Everything runs on the simulation thread, so the reference count is
//! the whole exclusion mechanism.

use crate::{
    error::{SimError, SimResult},
    map::Direction,
};
use std::cell::{RefCell, RefMut};
use std::rc::Rc;

/// Nested searches deeper than this indicate runaway recursion.
pub const PATHFIELD_POOL_CAPACITY: usize = 8;

/// Heap position of a cell that has been taken off the open list.
pub const CLOSED: usize = usize::MAX;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pathfield {
    pub cycle:       u32,
    pub real_cost:   u32,
    pub estim_cost:  u32,
    pub backlink:    Option<Direction>,
    pub heap_cookie: usize,
}

impl Pathfield {
    pub fn cost(&self) -> u32 {
        self.real_cost.saturating_add(self.estim_cost)
    }
}

#[derive(Debug)]
pub struct Pathfields {
    fields: Vec<Pathfield>,
    cycle:  u32,
}

impl Pathfields {
    fn new(cell_count: usize) -> Self {
        Self {
            fields: vec![Pathfield::default(); cell_count],
            cycle:  1,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn generation(&self) -> u32 {
        self.cycle
    }

    pub fn is_visited(&self, index: usize) -> bool {
        self.fields[index].cycle == self.cycle
    }

    /// The record for `index`, or None if this search never touched it.
    pub fn get(&self, index: usize) -> Option<&Pathfield> {
        let field = &self.fields[index];
        (field.cycle == self.cycle).then_some(field)
    }

    /// Claim a cell for the current search, wiping any stale record.
    pub fn visit(&mut self, index: usize) -> &mut Pathfield {
        let cycle = self.cycle;
        let field = &mut self.fields[index];
        if field.cycle != cycle {
            *field = Pathfield { cycle, ..Pathfield::default() };
        }
        field
    }

    /// Raw record access without a generation check; callers must have
    /// visited the cell in this search.
    pub fn field(&self, index: usize) -> &Pathfield {
        &self.fields[index]
    }

    pub fn field_mut(&mut self, index: usize) -> &mut Pathfield {
        &mut self.fields[index]
    }

    fn next_generation(&mut self) {
        self.cycle = self.cycle.wrapping_add(1);
        if self.cycle == 0 {
            log::debug!("pathfield generation wrapped; clearing {} cells", self.fields.len());
            self.fields.fill(Pathfield::default());
            self.cycle = 1;
        }
    }
}

/// A search's exclusive claim on one container.
#[derive(Debug)]
pub struct PathfieldsHandle(Rc<RefCell<Pathfields>>);

impl PathfieldsHandle {
    pub fn borrow_mut(&self) -> RefMut<'_, Pathfields> {
        self.0.borrow_mut()
    }

    pub fn generation(&self) -> u32 {
        self.0.borrow().generation()
    }
}

#[derive(Debug, Default)]
pub struct PathfieldPool {
    containers: Vec<Rc<RefCell<Pathfields>>>,
    cell_count: usize,
}

impl PathfieldPool {
    pub fn new(cell_count: usize) -> Self {
        Self {
            containers: Vec::new(),
            cell_count,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    /// Containers created so far.
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Containers currently held by a search.
    pub fn in_use(&self) -> usize {
        self.containers
            .iter()
            .filter(|c| Rc::strong_count(c) > 1)
            .count()
    }

    pub fn allocate(&mut self) -> SimResult<PathfieldsHandle> {
        if let Some(free) = self.containers.iter().find(|c| Rc::strong_count(c) == 1) {
            free.borrow_mut().next_generation();
            return Ok(PathfieldsHandle(Rc::clone(free)));
        }
        if self.containers.len() < PATHFIELD_POOL_CAPACITY {
            let fresh = Rc::new(RefCell::new(Pathfields::new(self.cell_count)));
            self.containers.push(Rc::clone(&fresh));
            return Ok(PathfieldsHandle(fresh));
        }
        log::error!("pathfield pool exhausted; runaway nested pathfinding");
        Err(SimError::PathfieldPoolExhausted {
            capacity: PATHFIELD_POOL_CAPACITY,
        })
    }

    /// Drop every container when the map changes size. Outstanding
    /// handles keep their (now orphaned) container until released.
    pub fn resize(&mut self, cell_count: usize) {
        if cell_count != self.cell_count {
            log::debug!("pathfield pool resized {} -> {cell_count} cells", self.cell_count);
            self.containers.clear();
            self.cell_count = cell_count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_wraparound_clears_stale_marks() {
        let mut pool = PathfieldPool::new(16);
        {
            let handle = pool.allocate().unwrap();
            let mut fields = handle.borrow_mut();
            fields.cycle = u32::MAX;
            fields.visit(3).real_cost = 42;
            assert!(fields.is_visited(3));
        }

        let handle = pool.allocate().unwrap();
        let fields = handle.borrow_mut();
        assert_eq!(fields.generation(), 1);
        assert!((0..16).all(|i| !fields.is_visited(i)));
        assert_eq!(fields.field(3).real_cost, 0, "wraparound must really clear");
    }

    #[test]
    fn stale_record_is_wiped_on_visit() {
        let mut pool = PathfieldPool::new(4);
        {
            let handle = pool.allocate().unwrap();
            let mut fields = handle.borrow_mut();
            let f = fields.visit(2);
            f.real_cost = 7;
            f.backlink = Some(Direction::East);
        }
        let handle = pool.allocate().unwrap();
        let mut fields = handle.borrow_mut();
        assert!(fields.get(2).is_none());
        let f = fields.visit(2);
        assert_eq!(f.real_cost, 0);
        assert_eq!(f.backlink, None);
    }
}
