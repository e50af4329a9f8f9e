//! Generation-checked slot arena.
//!
//! Transactions reference each other through [`TxnId`] handles into an
//! arena owned by the cache instead of through owning pointers. A slot's
//! generation is bumped when it is freed, so a handle held past the
//! removal of its value resolves to nothing rather than to whatever value
//! reuses the slot.

use crate::common::TxnId;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    /// Indices of empty slots (LIFO for locality).
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store the value built by `make`, which is handed the value's own
    /// handle.
    pub(crate) fn insert_with(&mut self, make: impl FnOnce(TxnId) -> T) -> (TxnId, &mut T) {
        let id = match self.free.pop() {
            Some(index) => TxnId::new(index, self.slots[index as usize].generation),
            None => {
                let index = u32::try_from(self.slots.len()).expect("transaction arena overflow");
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                TxnId::new(index, 0)
            }
        };
        self.len += 1;

        let slot = &mut self.slots[id.index as usize];
        debug_assert!(slot.value.is_none());
        (id, slot.value.insert(make(id)))
    }

    pub(crate) fn get(&self, id: TxnId) -> Option<&T> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: TxnId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub(crate) fn contains(&self, id: TxnId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn remove(&mut self, id: TxnId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(value)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (TxnId, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (TxnId::new(index as u32, slot.generation), value))
        })
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert<T>(arena: &mut Arena<T>, value: T) -> TxnId {
        arena.insert_with(|_| value).0
    }

    #[test]
    fn test_insert_get_remove() {
        let mut arena = Arena::new();
        let a = insert(&mut arena, "a");
        let b = insert(&mut arena, "b");

        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));

        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.len(), 1);
        assert!(!arena.contains(a));
        assert_eq!(arena.remove(a), None);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut arena = Arena::new();
        let old = insert(&mut arena, 1);
        arena.remove(old);

        let new = insert(&mut arena, 2);
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());

        assert_eq!(arena.get(old), None);
        assert_eq!(arena.get(new), Some(&2));
        assert_eq!(arena.remove(old), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_get_mut_and_iter() {
        let mut arena = Arena::new();
        let a = insert(&mut arena, 10);
        let b = insert(&mut arena, 20);
        *arena.get_mut(a).unwrap() += 1;
        arena.remove(b);

        let items: Vec<(TxnId, i32)> = arena.iter().map(|(id, v)| (id, *v)).collect();
        assert_eq!(items, vec![(a, 11)]);
    }

    #[test]
    fn test_insert_with_sees_own_handle() {
        let mut arena = Arena::new();
        let stale = insert(&mut arena, TxnId::new(0, 0));
        arena.remove(stale);

        let (id, value) = arena.insert_with(|id| id);
        assert_eq!(*value, id);
        assert_eq!(arena.get(id), Some(&id));
        assert_ne!(id, stale);
    }
}
