//! Column-oriented key/value storage used by the ledger.
//!
//! Every mutation goes through a [`WriteBatch`], which backends apply
//! atomically. [`update`] wraps the common "stage writes, commit only if the
//! closure succeeds" pattern.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

pub mod memory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Backend(String),
    Poisoned,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(message) => write!(f, "{message}"),
            StoreError::Poisoned => write!(f, "store lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Column {
    /// Compressed unspent entries keyed by serialized outpoint.
    Utxo,
    /// Spent-output journals keyed by block hash.
    SpendJournal,
    /// Serialized blocks keyed by block hash.
    Block,
    /// Big-endian height to block hash.
    HeightIndex,
    Meta,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Column::Utxo,
        Column::SpendJournal,
        Column::Block,
        Column::HeightIndex,
        Column::Meta,
    ];

    pub const fn index(self) -> usize {
        match self {
            Column::Utxo => 0,
            Column::SpendJournal => 1,
            Column::Block => 2,
            Column::HeightIndex => 3,
            Column::Meta => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Column::Utxo => "utxo",
            Column::SpendJournal => "spend_journal",
            Column::Block => "block",
            Column::HeightIndex => "height_index",
            Column::Meta => "meta",
        }
    }
}

/// Keys are outpoints (37 bytes), hashes or short meta names; they rarely
/// spill to the heap.
pub type KeyBuf = SmallVec<[u8; 40]>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        column: Column,
        key: KeyBuf,
        value: Vec<u8>,
    },
    Delete {
        column: Column,
        key: KeyBuf,
    },
}

impl WriteOp {
    pub fn column(&self) -> Column {
        match self {
            WriteOp::Put { column, .. } | WriteOp::Delete { column, .. } => *column,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: Column, key: &[u8], value: Vec<u8>) {
        self.ops.push(WriteOp::Put {
            column,
            key: KeyBuf::from_slice(key),
            value,
        });
    }

    pub fn delete(&mut self, column: Column, key: &[u8]) {
        self.ops.push(WriteOp::Delete {
            column,
            key: KeyBuf::from_slice(key),
        });
    }

    pub fn append(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    pub fn iter(&self) -> impl Iterator<Item = &WriteOp> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

pub type PrefixVisitor<'a> = dyn FnMut(&[u8], &[u8]) -> Result<(), StoreError> + 'a;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Visits every entry of `column` whose key starts with `prefix`, in key
    /// order.
    fn for_each_prefix(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'_>,
    ) -> Result<(), StoreError>;

    /// Applies every operation in `batch` or none of them.
    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError>;

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.put(column, key, value.to_vec());
        self.write_batch(&batch)
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(column, key);
        self.write_batch(&batch)
    }

    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut out = Vec::new();
        self.for_each_prefix(column, prefix, &mut |key, value| {
            out.push((key.to_vec(), value.to_vec()));
            Ok(())
        })?;
        Ok(out)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.as_ref().get(column, key)
    }

    fn for_each_prefix(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'_>,
    ) -> Result<(), StoreError> {
        self.as_ref().for_each_prefix(column, prefix, visitor)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        self.as_ref().write_batch(batch)
    }
}

/// Runs `f` against a fresh batch and commits it only when `f` succeeds. A
/// failed closure leaves the store untouched.
pub fn update<S, T, E, F>(store: &S, f: F) -> Result<T, E>
where
    S: KeyValueStore + ?Sized,
    E: From<StoreError>,
    F: FnOnce(&mut WriteBatch) -> Result<T, E>,
{
    let mut batch = WriteBatch::new();
    match f(&mut batch) {
        Ok(value) => {
            store.write_batch(&batch)?;
            vgld_log::log_trace!("committed batch of {} ops", batch.len());
            Ok(value)
        }
        Err(err) => {
            vgld_log::log_debug!("discarding batch of {} ops after failure", batch.len());
            Err(err)
        }
    }
}

/// Read-only handle handed to [`view`] closures.
pub struct ReadTx<'a, S: ?Sized> {
    store: &'a S,
}

impl<S: KeyValueStore + ?Sized> ReadTx<'_, S> {
    pub fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.get(column, key)
    }

    pub fn for_each_prefix(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'_>,
    ) -> Result<(), StoreError> {
        self.store.for_each_prefix(column, prefix, visitor)
    }
}

/// Runs `f` with read-only access to the store.
pub fn view<S, T, E, F>(store: &S, f: F) -> Result<T, E>
where
    S: KeyValueStore + ?Sized,
    F: FnOnce(&ReadTx<'_, S>) -> Result<T, E>,
{
    f(&ReadTx { store })
}
