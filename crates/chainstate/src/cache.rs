//! Bounded cache of persisted entries in front of the `Utxo` column.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use vgld_primitives::outpoint::OutPoint;
use vgld_storage::{Column, KeyValueStore, WriteBatch};

use crate::utxo::{OutPointKey, UtxoEntry};
use crate::view::{UtxoCacher, UtxoViewpoint, ViewError, ViewFilteredSet};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UtxoCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct CachedEntry {
    bytes: Vec<u8>,
    stamp: u64,
}

/// Least recently used map of encoded entries. Touching an entry pushes a new
/// stamp onto `order`; stale stamps are skipped at eviction time.
struct EntryLru {
    entries: HashMap<OutPointKey, CachedEntry>,
    order: VecDeque<(OutPointKey, u64)>,
    capacity: usize,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl EntryLru {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, key: &OutPointKey) -> Option<&[u8]> {
        if self.capacity == 0 {
            return None;
        }
        let stamp = self.bump_stamp();
        let entry = self.entries.get_mut(key)?;
        entry.stamp = stamp;
        self.order.push_back((*key, stamp));
        Some(entry.bytes.as_slice())
    }

    fn insert(&mut self, key: OutPointKey, bytes: Vec<u8>) {
        if self.capacity == 0 {
            return;
        }
        let stamp = self.bump_stamp();
        self.entries.insert(key, CachedEntry { bytes, stamp });
        self.order.push_back((key, stamp));
        self.evict();
    }

    fn remove(&mut self, key: &OutPointKey) {
        self.entries.remove(key);
    }

    fn bump_stamp(&mut self) -> u64 {
        self.clock = self.clock.wrapping_add(1);
        self.clock
    }

    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            let Some((key, stamp)) = self.order.pop_front() else {
                break;
            };
            if self.entries.get(&key).is_some_and(|entry| entry.stamp == stamp) {
                self.entries.remove(&key);
            }
        }
        // Stale stamps pile up on hot keys; drop them once they dominate.
        if self.order.len() > self.capacity.saturating_mul(4).max(64) {
            let entries = &self.entries;
            self.order
                .retain(|(key, stamp)| entries.get(key).is_some_and(|e| e.stamp == *stamp));
        }
    }
}

/// The persistent cacher views are bound to. Entries are read through an
/// in-memory LRU of their encoded form; writes are staged into the caller's
/// batch and folded into the LRU only after the batch is durable.
pub struct UtxoCache<S> {
    store: S,
    lru: Mutex<EntryLru>,
}

impl<S> UtxoCache<S> {
    pub fn new(store: S, capacity: usize) -> Self {
        Self {
            store,
            lru: Mutex::new(EntryLru::new(capacity)),
        }
    }

    pub fn stats(&self) -> UtxoCacheStats {
        match self.lru.lock() {
            Ok(lru) => UtxoCacheStats {
                hits: lru.hits,
                misses: lru.misses,
                entries: lru.entries.len(),
            },
            Err(_) => UtxoCacheStats::default(),
        }
    }
}

impl<S: KeyValueStore> UtxoCache<S> {
    /// Loads one entry, preferring the in-memory copy.
    pub fn fetch_entry(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, ViewError> {
        let key = OutPointKey::new(outpoint);
        if let Ok(mut lru) = self.lru.lock() {
            match lru.get(&key).map(UtxoEntry::decode) {
                Some(decoded) => {
                    lru.hits = lru.hits.saturating_add(1);
                    return Ok(Some(decoded?));
                }
                None => lru.misses = lru.misses.saturating_add(1),
            }
        }

        let bytes = match self.store.get(Column::Utxo, key.as_bytes())? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let entry = UtxoEntry::decode(&bytes)?;
        if let Ok(mut lru) = self.lru.lock() {
            lru.insert(key, bytes);
        }
        Ok(Some(entry))
    }

    /// Stages every modified entry of `view`: unspent entries are written,
    /// spent ones deleted unless they never reached the store.
    pub fn write_view(&self, view: &UtxoViewpoint, batch: &mut WriteBatch) {
        for (outpoint, slot) in view.entries() {
            let Some(entry) = slot else {
                continue;
            };
            if !entry.is_modified() {
                continue;
            }
            let key = OutPointKey::new(outpoint);
            if entry.is_spent() {
                if !entry.is_fresh() {
                    batch.delete(Column::Utxo, key.as_bytes());
                }
                continue;
            }
            batch.put(Column::Utxo, key.as_bytes(), entry.encode());
        }
    }

    /// Mirrors a committed view into the LRU, then prunes the view.
    pub fn finish_commit(&self, view: &mut UtxoViewpoint) {
        if let Ok(mut lru) = self.lru.lock() {
            for (outpoint, slot) in view.entries() {
                let Some(entry) = slot else {
                    continue;
                };
                if !entry.is_modified() {
                    continue;
                }
                let key = OutPointKey::new(outpoint);
                if entry.is_spent() {
                    lru.remove(&key);
                } else {
                    lru.insert(key, entry.encode());
                }
            }
        }
        view.prune();
    }
}

impl<S: KeyValueStore> UtxoCacher for UtxoCache<S> {
    fn fetch_entries(
        &self,
        set: &ViewFilteredSet,
        view: &mut UtxoViewpoint,
    ) -> Result<(), ViewError> {
        let mut found = 0usize;
        for outpoint in set.iter() {
            let entry = self.fetch_entry(outpoint)?;
            found += usize::from(entry.is_some());
            view.insert_fetched(*outpoint, entry);
        }
        vgld_log::log_trace!("fetched {} of {} requested utxos", found, set.len());
        Ok(())
    }
}
