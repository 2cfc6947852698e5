// Handles and pools - Generational object storage
//
// Every GPU object lives in a Pool slot and is referred to by a typed Handle.
// A handle is (slot index, generation). Removing an object bumps the slot's
// generation, so handles issued before the removal stop resolving even after
// the slot is reused by a new object.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Typed generational index. Copyable, carries no ownership.
///
/// The default handle has generation 0 and is never valid.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// The invalid handle
    pub const fn null() -> Self {
        Self::new(0, 0)
    }

    pub fn is_valid(&self) -> bool {
        self.generation != 0
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

// Manual impls so that the tag type does not need to implement anything

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = std::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "Handle<{}>({}v{})", short, self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Arena of `T` addressed by `Handle<Tag>`.
///
/// Slots are never moved or shrunk, so growing the pool never invalidates a
/// live handle.
pub struct Pool<T, Tag = T> {
    slots: Vec<Slot<T>>,
    free_indices: Vec<u32>,
    _marker: PhantomData<fn() -> Tag>,
}

impl<T, Tag> Default for Pool<T, Tag> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Tag> Pool<T, Tag> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_indices: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_indices: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Insert a value and return a handle that has never been issued before
    pub fn emplace(&mut self, value: T) -> Handle<Tag> {
        if let Some(index) = self.free_indices.pop() {
            // Generation was already bumped when the slot was freed
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        Handle::new(index, 1)
    }

    pub fn get(&self, handle: Handle<Tag>) -> Option<&T> {
        if !handle.is_valid() {
            return None;
        }
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle<Tag>) -> Option<&mut T> {
        if !handle.is_valid() {
            return None;
        }
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, handle: Handle<Tag>) -> bool {
        self.get(handle).is_some()
    }

    /// Remove the occupant and invalidate every handle to it
    pub fn remove(&mut self, handle: Handle<Tag>) -> Option<T> {
        if !handle.is_valid() {
            return None;
        }
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;

        slot.generation = slot.generation.wrapping_add(1);
        if slot.generation == 0 {
            slot.generation = 1;
        }
        self.free_indices.push(handle.index);
        Some(value)
    }

    /// Live handle for a slot index, or the null handle if the slot is empty
    pub fn handle_for_index(&self, index: u32) -> Handle<Tag> {
        match self.slots.get(index as usize) {
            Some(slot) if slot.value.is_some() => Handle::new(index, slot.generation),
            _ => Handle::null(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<Tag>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::new(i as u32, slot.generation), value))
        })
    }

    pub fn handles(&self) -> Vec<Handle<Tag>> {
        self.iter().map(|(h, _)| h).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    enum Thing {}

    #[test]
    fn default_handle_is_invalid() {
        let h: Handle<Thing> = Handle::default();
        assert!(!h.is_valid());
        assert_eq!(h, Handle::null());

        let pool: Pool<u32, Thing> = Pool::new();
        assert!(pool.get(h).is_none());
    }

    #[test]
    fn first_generation_is_one() {
        let mut pool: Pool<&str, Thing> = Pool::new();
        let h = pool.emplace("a");
        assert!(h.is_valid());
        assert_eq!(h.index(), 0);
        assert_eq!(h.generation(), 1);
        assert_eq!(pool.get(h), Some(&"a"));
    }

    #[test]
    fn removed_handle_never_resolves_after_slot_reuse() {
        let mut pool: Pool<u32, Thing> = Pool::new();
        let old = pool.emplace(7);
        assert_eq!(pool.remove(old), Some(7));
        assert!(pool.get(old).is_none());

        let new = pool.emplace(9);
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());
        assert!(pool.get(old).is_none());
        assert_eq!(pool.get(new), Some(&9));
    }

    #[test]
    fn double_remove_is_a_no_op() {
        let mut pool: Pool<u32, Thing> = Pool::new();
        let h = pool.emplace(1);
        let other = pool.emplace(2);
        assert!(pool.remove(h).is_some());
        assert!(pool.remove(h).is_none());
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get(other), Some(&2));
    }

    #[test]
    fn growing_keeps_existing_handles() {
        let mut pool: Pool<usize, Thing> = Pool::with_capacity(1);
        let handles: Vec<_> = (0..100).map(|i| pool.emplace(i)).collect();
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(pool.get(*h), Some(&i));
        }
    }

    #[test]
    fn handle_for_index_tracks_generation() {
        let mut pool: Pool<u8, Thing> = Pool::new();
        let h = pool.emplace(3);
        assert_eq!(pool.handle_for_index(0), h);
        pool.remove(h);
        assert!(!pool.handle_for_index(0).is_valid());
        assert!(!pool.handle_for_index(42).is_valid());
    }

    #[test]
    fn handles_hash_on_index_and_generation() {
        let mut pool: Pool<u8, Thing> = Pool::new();
        let a = pool.emplace(1);
        pool.remove(a);
        let b = pool.emplace(2);

        let set: HashSet<_> = [a, b, b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn iter_skips_vacant_slots() {
        let mut pool: Pool<u8, Thing> = Pool::new();
        let a = pool.emplace(1);
        let b = pool.emplace(2);
        let c = pool.emplace(3);
        pool.remove(b);

        let live: Vec<_> = pool.iter().map(|(h, v)| (h, *v)).collect();
        assert_eq!(live, vec![(a, 1), (c, 3)]);
        assert_eq!(pool.handles(), vec![a, c]);
    }
}
