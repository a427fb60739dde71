use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::{Column, KeyValueStore, PrefixVisitor, StoreError, WriteBatch, WriteOp};

type ColumnMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory backend. All columns sit behind one lock so a batch is applied
/// atomically with respect to readers.
pub struct MemoryStore {
    columns: RwLock<Vec<ColumnMap>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            columns: RwLock::new(vec![ColumnMap::new(); Column::ALL.len()]),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys stored in `column`.
    pub fn len(&self, column: Column) -> Result<usize, StoreError> {
        let guard = self.columns.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard[column.index()].len())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.columns.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard[column.index()].get(key).cloned())
    }

    fn for_each_prefix(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'_>,
    ) -> Result<(), StoreError> {
        let guard = self.columns.read().map_err(|_| StoreError::Poisoned)?;
        let start: (Bound<&[u8]>, Bound<&[u8]>) = (Bound::Included(prefix), Bound::Unbounded);
        for (key, value) in guard[column.index()].range::<[u8], _>(start) {
            if !key.starts_with(prefix) {
                break;
            }
            visitor(key, value)?;
        }
        Ok(())
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut guard = self.columns.write().map_err(|_| StoreError::Poisoned)?;
        for op in batch.iter() {
            let map = &mut guard[op.column().index()];
            match op {
                WriteOp::Put { key, value, .. } => {
                    map.insert(key.to_vec(), value.clone());
                }
                WriteOp::Delete { key, .. } => {
                    map.remove(key.as_slice());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_applies_in_order() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(Column::Utxo, b"a", vec![1]);
        batch.delete(Column::Utxo, b"a");
        batch.put(Column::Utxo, b"b", vec![2]);
        store.write_batch(&batch).expect("write");
        assert_eq!(store.get(Column::Utxo, b"a").expect("get"), None);
        assert_eq!(store.get(Column::Utxo, b"b").expect("get"), Some(vec![2]));
        assert_eq!(store.get(Column::Meta, b"b").expect("get"), None);
    }

    #[test]
    fn prefix_scan_stops_at_prefix_end() {
        let store = MemoryStore::new();
        for key in [&b"aa"[..], b"ab", b"b", b"a"] {
            store.put(Column::Block, key, key).expect("put");
        }
        let keys: Vec<Vec<u8>> = store
            .scan_prefix(Column::Block, b"a")
            .expect("scan")
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"aa".to_vec(), b"ab".to_vec()]);
        assert_eq!(store.len(Column::Block).expect("len"), 4);
    }
}
