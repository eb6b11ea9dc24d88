//! A* search over the hex map.
//!
//! Scratch memory comes from the PathfieldPool; the open list is a
//! binary heap of cell indices whose positions are mirrored into each
//! cell's `heap_cookie`, so improving a queued cell is a sift-up rather
//! than a duplicate push. Ties on cost are broken by cell index, which
//! keeps the chosen path identical on every peer.

use crate::{
    error::SimResult,
    map::{Coords, Direction, Map},
    pathfield::{PathfieldPool, Pathfields, CLOSED},
};
use serde::{Deserialize, Serialize};

/// Cost of one step on open terrain.
pub const BASE_STEP_COST: u32 = 1800;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub start: Coords,
    pub steps: Vec<Direction>,
}

impl Path {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn end(&self, map: &Map) -> Coords {
        self.steps
            .iter()
            .fold(self.start, |c, &dir| map.neighbour(c, dir))
    }
}

/// Shortest path from `start` to `goal` over unblocked cells, or None
/// if the goal cannot be reached.
pub fn find_path(
    map: &Map,
    pool: &mut PathfieldPool,
    start: Coords,
    goal: Coords,
) -> SimResult<Option<Path>> {
    let start = map.normalize(i32::from(start.x), i32::from(start.y));
    let goal = map.normalize(i32::from(goal.x), i32::from(goal.y));
    if start == goal {
        return Ok(Some(Path { start, steps: Vec::new() }));
    }
    if map.is_blocked(goal) {
        return Ok(None);
    }

    let handle = pool.allocate()?;
    let mut guard = handle.borrow_mut();
    let fields: &mut Pathfields = &mut guard;
    let mut open = OpenList::default();

    let start_index = map.index(start);
    let goal_index = map.index(goal);
    let estimate = |c: Coords| map.calc_distance(c, goal) * BASE_STEP_COST;

    let origin = fields.visit(start_index);
    origin.estim_cost = estimate(start);
    open.push(fields, start_index);

    while let Some(current) = open.pop(fields) {
        if current == goal_index {
            return Ok(Some(trace_back(map, fields, start, goal)));
        }
        let here = map.coords(current);
        let cost_here = fields.field(current).real_cost;

        for dir in Direction::ALL {
            let next = map.neighbour(here, dir);
            if map.is_blocked(next) {
                continue;
            }
            let next_index = map.index(next);
            let cost = cost_here + BASE_STEP_COST;

            if fields.is_visited(next_index) {
                let known = fields.field(next_index);
                if known.heap_cookie == CLOSED || cost >= known.real_cost {
                    continue;
                }
                let known = fields.field_mut(next_index);
                known.real_cost = cost;
                known.backlink = Some(dir);
                open.decrease_key(fields, next_index);
            } else {
                let fresh = fields.visit(next_index);
                fresh.real_cost = cost;
                fresh.estim_cost = estimate(next);
                fresh.backlink = Some(dir);
                open.push(fields, next_index);
            }
        }
    }
    Ok(None)
}

fn trace_back(map: &Map, fields: &Pathfields, start: Coords, goal: Coords) -> Path {
    let mut steps = Vec::new();
    let mut at = goal;
    while at != start {
        let Some(dir) = fields.field(map.index(at)).backlink else {
            break;
        };
        steps.push(dir);
        at = map.neighbour(at, dir.opposite());
    }
    steps.reverse();
    Path { start, steps }
}

#[derive(Default)]
struct OpenList {
    heap: Vec<usize>,
}

impl OpenList {
    fn key(fields: &Pathfields, index: usize) -> (u32, usize) {
        (fields.field(index).cost(), index)
    }

    fn push(&mut self, fields: &mut Pathfields, index: usize) {
        self.heap.push(index);
        let pos = self.heap.len() - 1;
        fields.field_mut(index).heap_cookie = pos;
        self.sift_up(fields, pos);
    }

    fn pop(&mut self, fields: &mut Pathfields) -> Option<usize> {
        if self.heap.is_empty() {
            return None;
        }
        let top = self.heap.swap_remove(0);
        fields.field_mut(top).heap_cookie = CLOSED;
        if !self.heap.is_empty() {
            fields.field_mut(self.heap[0]).heap_cookie = 0;
            self.sift_down(fields, 0);
        }
        Some(top)
    }

    fn decrease_key(&mut self, fields: &mut Pathfields, index: usize) {
        let pos = fields.field(index).heap_cookie;
        self.sift_up(fields, pos);
    }

    fn sift_up(&mut self, fields: &mut Pathfields, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if Self::key(fields, self.heap[pos]) >= Self::key(fields, self.heap[parent]) {
                break;
            }
            self.swap(fields, pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, fields: &mut Pathfields, mut pos: usize) {
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < self.heap.len()
                && Self::key(fields, self.heap[left]) < Self::key(fields, self.heap[smallest])
            {
                smallest = left;
            }
            if right < self.heap.len()
                && Self::key(fields, self.heap[right]) < Self::key(fields, self.heap[smallest])
            {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(fields, pos, smallest);
            pos = smallest;
        }
    }

    fn swap(&mut self, fields: &mut Pathfields, a: usize, b: usize) {
        self.heap.swap(a, b);
        fields.field_mut(self.heap[a]).heap_cookie = a;
        fields.field_mut(self.heap[b]).heap_cookie = b;
    }
}
