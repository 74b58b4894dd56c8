//! Tile registry: the owned map from tile key to tile record.
//!
//! Iteration follows insertion order. Removal leaves a tombstone so that
//! positions of the remaining entries do not shift while a pass is walking
//! the slots; tombstones are compacted away outside of passes.

use super::types::TileRecord;
use crate::{core::grid::TileKey, prelude::HashMap};

const COMPACT_THRESHOLD: usize = 64;

/// What a [`TileRegistry::for_each`] visitor wants done with the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Keep,
    Remove,
}

#[derive(Debug, Default)]
pub struct TileRegistry {
    slots: Vec<Option<(TileKey, TileRecord)>>,
    index: HashMap<TileKey, usize>,
    next_id: u64,
}

impl TileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &TileKey) -> Option<&TileRecord> {
        let slot = *self.index.get(key)?;
        self.slots[slot].as_ref().map(|(_, record)| record)
    }

    pub fn get_mut(&mut self, key: &TileKey) -> Option<&mut TileRecord> {
        let slot = *self.index.get(key)?;
        self.slots[slot].as_mut().map(|(_, record)| record)
    }

    /// Inserts a record under `key`, stamping it with a fresh id. An existing
    /// record for the key is dropped and returned; the new one goes to the
    /// end of the iteration order.
    pub fn put(&mut self, key: TileKey, mut record: TileRecord) -> (u64, Option<TileRecord>) {
        let replaced = self.remove(&key);
        self.next_id += 1;
        record.id = self.next_id;
        self.index.insert(key.clone(), self.slots.len());
        self.slots.push(Some((key, record)));
        (self.next_id, replaced)
    }

    /// Removes and returns the record for `key`
    pub fn remove(&mut self, key: &TileKey) -> Option<TileRecord> {
        let slot = self.index.remove(key)?;
        let removed = self.slots[slot].take().map(|(_, record)| record);
        self.maybe_compact();
        removed
    }

    /// Snapshot of the live keys in iteration order
    pub fn keys(&self) -> Vec<TileKey> {
        self.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileKey, &TileRecord)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|(key, record)| (key, record)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&TileKey, &mut TileRecord)> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.as_mut().map(|(key, record)| (&*key, record)))
    }

    /// Visits every entry once in insertion order. The visitor may mutate the
    /// record and ask for it to be removed; removed entries are returned in
    /// the order they were visited.
    pub fn for_each<F>(&mut self, mut visit: F) -> Vec<(TileKey, TileRecord)>
    where
        F: FnMut(&TileKey, &mut TileRecord) -> Visit,
    {
        let mut removed = Vec::new();
        for slot in 0..self.slots.len() {
            let decision = match self.slots[slot].as_mut() {
                Some((key, record)) => visit(key, record),
                None => continue,
            };
            if decision == Visit::Remove {
                if let Some((key, record)) = self.slots[slot].take() {
                    self.index.remove(&key);
                    removed.push((key, record));
                }
            }
        }
        self.maybe_compact();
        removed
    }

    /// Removes every entry, returning them in iteration order
    pub fn drain(&mut self) -> Vec<(TileKey, TileRecord)> {
        self.index.clear();
        self.slots.drain(..).flatten().collect()
    }

    fn maybe_compact(&mut self) {
        let tombstones = self.slots.len() - self.index.len();
        if tombstones < COMPACT_THRESHOLD || tombstones < self.index.len() {
            return;
        }
        self.slots.retain(|slot| slot.is_some());
        for (position, slot) in self.slots.iter().enumerate() {
            if let Some((key, _)) = slot {
                self.index.insert(key.clone(), position);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::TileCoord;
    use crate::layers::tile::types::TileElement;

    fn record(x: i32) -> (TileKey, TileRecord) {
        let coords = TileCoord::new(x, 0, 1);
        (
            TileKey::from(coords),
            TileRecord::new(coords, TileElement::default()),
        )
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut registry = TileRegistry::new();
        for x in [3, 1, 2] {
            let (key, rec) = record(x);
            registry.put(key, rec);
        }
        let xs: Vec<_> = registry.iter().map(|(_, r)| r.coords.x).collect();
        assert_eq!(xs, vec![3, 1, 2]);
    }

    #[test]
    fn test_removal_mid_pass_visits_each_live_entry_once() {
        let mut registry = TileRegistry::new();
        for x in 0..6 {
            let (key, rec) = record(x);
            registry.put(key, rec);
        }
        let mut seen = Vec::new();
        let removed = registry.for_each(|_, rec| {
            seen.push(rec.coords.x);
            rec.retain = true;
            if rec.coords.x % 2 == 0 {
                Visit::Remove
            } else {
                Visit::Keep
            }
        });
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(removed.len(), 3);
        assert_eq!(registry.len(), 3);
        assert!(registry.iter().all(|(_, r)| r.retain && r.coords.x % 2 == 1));
    }

    #[test]
    fn test_identity_is_never_reused() {
        let mut registry = TileRegistry::new();
        let (key, rec) = record(7);
        let (first, _) = registry.put(key.clone(), rec.clone());
        assert!(registry.remove(&key).is_some());
        assert!(registry.get(&key).is_none());
        let (second, _) = registry.put(key.clone(), rec);
        assert_ne!(first, second);
        assert_eq!(registry.get(&key).unwrap().id, second);
    }

    #[test]
    fn test_compaction_keeps_lookups_valid() {
        let mut registry = TileRegistry::new();
        for x in 0..200 {
            let (key, rec) = record(x);
            registry.put(key, rec);
        }
        for x in 0..150 {
            registry.remove(&TileKey::from(TileCoord::new(x, 0, 1)));
        }
        assert_eq!(registry.len(), 50);
        for x in 150..200 {
            let key = TileKey::from(TileCoord::new(x, 0, 1));
            assert_eq!(registry.get(&key).unwrap().coords.x, x);
        }
        let xs: Vec<_> = registry.iter().map(|(_, r)| r.coords.x).collect();
        assert_eq!(xs, (150..200).collect::<Vec<_>>());
    }
}
