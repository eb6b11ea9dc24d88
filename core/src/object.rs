//! Generational object storage.
//!
//! RULE: Nothing holds a Rust reference to another simulation object
//! across a tick. Cross-object links are ObjectIds, resolved through
//! the arena every time they are used. Destroying an object bumps its
//! slot's generation, so every outstanding id for it stops resolving.
//!
//! Slot reuse is LIFO and the free list is part of the saved state,
//! so every peer hands out the same ids for the same command stream.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub index:      u32,
    pub generation: u32,
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Slot<T> {
    generation: u32,
    live:       bool,
    /// None while live means the object is checked out for its own act.
    value:      Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free:  Vec<u32>,
    live:  usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free:  Vec::new(),
            live:  0,
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Insert an object that needs to know its own id.
    pub fn insert_with(&mut self, build: impl FnOnce(ObjectId) -> T) -> ObjectId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    live:       false,
                    value:      None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let id = ObjectId {
            index,
            generation: slot.generation,
        };
        slot.live = true;
        slot.value = Some(build(id));
        self.live += 1;
        id
    }

    pub fn insert(&mut self, value: T) -> ObjectId {
        self.insert_with(|_| value)
    }

    fn slot(&self, id: ObjectId) -> Option<&Slot<T>> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.live && s.generation == id.generation)
    }

    fn slot_mut(&mut self, id: ObjectId) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.live && s.generation == id.generation)
    }

    /// True while the object exists, even if it is checked out.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.slot(id).is_some()
    }

    pub fn get(&self, id: ObjectId) -> Option<&T> {
        self.slot(id).and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        self.slot_mut(id).and_then(|s| s.value.as_mut())
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<T> {
        let slot = self.slot_mut(id)?;
        let value = slot.value.take()?;
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(value)
    }

    /// Take an object out so it can act while the rest of the arena is
    /// borrowed. It still counts as existing; lookups of it return None
    /// until it is restored.
    pub fn checkout(&mut self, id: ObjectId) -> Option<T> {
        self.slot_mut(id).and_then(|s| s.value.take())
    }

    pub fn restore(&mut self, id: ObjectId, value: T) {
        if let Some(slot) = self.slot_mut(id) {
            slot.value = Some(value);
        }
    }

    /// Objects in slot order, which is the same on every peer.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let value = slot.value.as_ref().filter(|_| slot.live)?;
            Some((
                ObjectId {
                    index:      index as u32,
                    generation: slot.generation,
                },
                value,
            ))
        })
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Any slot left checked out, e.g. in a savegame taken mid-act.
    pub fn has_checked_out(&self) -> bool {
        self.slots.iter().any(|s| s.live && s.value.is_none())
    }

    /// Check the slot bookkeeping of an arena that came from outside,
    /// e.g. a savegame. Every dead slot is on the free list exactly once,
    /// the free list names nothing else, and the live count is right.
    pub fn validate(&self) -> Result<(), String> {
        let mut listed = vec![false; self.slots.len()];
        for &index in &self.free {
            let Some(slot) = self.slots.get(index as usize) else {
                return Err(format!(
                    "free slot {index} is out of range ({} slots)",
                    self.slots.len()
                ));
            };
            if slot.live {
                return Err(format!("free slot {index} is live"));
            }
            if std::mem::replace(&mut listed[index as usize], true) {
                return Err(format!("slot {index} is on the free list twice"));
            }
        }
        for (index, slot) in self.slots.iter().enumerate() {
            if !slot.live && !listed[index] {
                return Err(format!("dead slot {index} is not on the free list"));
            }
            if !slot.live && slot.value.is_some() {
                return Err(format!("dead slot {index} still holds a value"));
            }
        }
        let live = self.slots.iter().filter(|s| s.live).count();
        if live != self.live {
            return Err(format!("live count {} but {live} live slots", self.live));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_ids_never_resolve_again() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        assert_eq!(arena.remove(a), Some("a"));
        let b = arena.insert("b");
        assert_eq!(a.index, b.index, "slot is reused");
        assert_ne!(a, b);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&"b"));
    }

    #[test]
    fn bookkeeping_survives_churn() {
        let mut arena = Arena::new();
        let ids: Vec<ObjectId> = (0..6).map(|i| arena.insert(i)).collect();
        arena.remove(ids[1]);
        arena.remove(ids[4]);
        arena.insert(9);
        assert_eq!(arena.validate(), Ok(()));
    }

    #[test]
    fn broken_bookkeeping_is_reported() {
        let mut arena = Arena::new();
        let a = arena.insert(1u32);
        let b = arena.insert(2u32);
        arena.remove(b);

        let mut out_of_range = arena.clone();
        out_of_range.free = vec![99];
        assert!(out_of_range.validate().unwrap_err().contains("out of range"));

        let mut live_on_free_list = arena.clone();
        live_on_free_list.free.push(a.index);
        assert!(live_on_free_list.validate().unwrap_err().contains("is live"));

        let mut listed_twice = arena.clone();
        listed_twice.free.push(b.index);
        assert!(listed_twice.validate().unwrap_err().contains("twice"));

        let mut forgotten = arena.clone();
        forgotten.free.clear();
        assert!(forgotten.validate().unwrap_err().contains("not on the free list"));

        let mut miscounted = arena;
        miscounted.live = 0;
        assert!(miscounted.validate().unwrap_err().contains("live count"));
    }

    #[test]
    fn checked_out_object_still_exists() {
        let mut arena = Arena::new();
        let a = arena.insert(1u32);
        let value = arena.checkout(a).unwrap();
        assert!(arena.contains(a));
        assert_eq!(arena.get(a), None);
        assert!(arena.has_checked_out());
        arena.restore(a, value + 1);
        assert_eq!(arena.get(a), Some(&2));
    }
}
