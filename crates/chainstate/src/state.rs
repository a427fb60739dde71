//! Persistent chain state: the tip, the unspent output set and the spend
//! journals, mutated one block at a time under the chain lock.

use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use vgld_consensus::{AgendaFlags, Hash256};
use vgld_primitives::block::Block;
use vgld_primitives::encoding::DecodeError;
use vgld_primitives::hash::hash_to_hex;
use vgld_primitives::outpoint::{OutPoint, TxTree};
use vgld_primitives::stake::{determine_tx_type, is_coinbase_tx, TxType};
use vgld_primitives::transaction::Transaction;
use vgld_storage::{update, KeyValueStore, StoreError, WriteBatch};

use crate::cache::{UtxoCache, UtxoCacheStats};
use crate::config::ChainConfig;
use crate::index::{ChainIndex, ChainTip};
use crate::spend_journal::{SpendJournal, SpendJournalReader};
use crate::utxo::UtxoEntry;
use crate::view::{UtxoViewpoint, ViewError, ViewFilteredSet};

#[derive(Debug)]
pub enum ChainStateError {
    View(ViewError),
    Store(StoreError),
    Decode(DecodeError),
    MissingBlock,
    MissingParent,
    InvalidBlock(&'static str),
    CorruptIndex(&'static str),
    LockPoisoned,
}

impl std::fmt::Display for ChainStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainStateError::View(err) => write!(f, "{err}"),
            ChainStateError::Store(err) => write!(f, "{err}"),
            ChainStateError::Decode(err) => write!(f, "{err}"),
            ChainStateError::MissingBlock => write!(f, "missing block"),
            ChainStateError::MissingParent => write!(f, "missing parent block"),
            ChainStateError::InvalidBlock(message) => write!(f, "{message}"),
            ChainStateError::CorruptIndex(message) => write!(f, "{message}"),
            ChainStateError::LockPoisoned => write!(f, "chain lock poisoned"),
        }
    }
}

impl std::error::Error for ChainStateError {}

impl From<ViewError> for ChainStateError {
    fn from(err: ViewError) -> Self {
        match err {
            ViewError::Store(err) => ChainStateError::Store(err),
            other => ChainStateError::View(other),
        }
    }
}

impl From<StoreError> for ChainStateError {
    fn from(err: StoreError) -> Self {
        ChainStateError::Store(err)
    }
}

impl From<DecodeError> for ChainStateError {
    fn from(err: DecodeError) -> Self {
        ChainStateError::Decode(err)
    }
}

struct ChainInner {
    tip: Option<ChainTip>,
}

pub struct ChainState<S> {
    store: Arc<S>,
    index: ChainIndex<S>,
    utxo_cache: Arc<UtxoCache<Arc<S>>>,
    journal: SpendJournal<Arc<S>>,
    inner: RwLock<ChainInner>,
    /// Tip with its regular tree reverted, keyed by the tip hash it was built
    /// from.
    disapproved_view: Mutex<Option<UtxoViewpoint>>,
}

impl<S: KeyValueStore + 'static> ChainState<S> {
    pub fn open(store: Arc<S>, config: &ChainConfig) -> Result<Self, ChainStateError> {
        let index = ChainIndex::new(Arc::clone(&store));
        let tip = index.best_block()?;
        match &tip {
            Some(tip) => vgld_log::log_info!(
                "loaded chain tip {} at height {}",
                hash_to_hex(&tip.hash),
                tip.height
            ),
            None => vgld_log::log_info!("opened empty chain state"),
        }
        Ok(Self {
            utxo_cache: Arc::new(UtxoCache::new(
                Arc::clone(&store),
                config.utxo_cache_entries,
            )),
            journal: SpendJournal::new(Arc::clone(&store)),
            index,
            store,
            inner: RwLock::new(ChainInner { tip }),
            disapproved_view: Mutex::new(None),
        })
    }

    /// Takes the writer side of the chain lock. Only the returned guard can
    /// connect or disconnect blocks.
    pub fn write(&self) -> Result<ChainWriteGuard<'_, S>, ChainStateError> {
        let inner = self
            .inner
            .write()
            .map_err(|_| ChainStateError::LockPoisoned)?;
        Ok(ChainWriteGuard { chain: self, inner })
    }

    pub fn read(&self) -> Result<ChainReadGuard<'_, S>, ChainStateError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| ChainStateError::LockPoisoned)?;
        Ok(ChainReadGuard { chain: self, inner })
    }

    pub fn utxo_cache_stats(&self) -> UtxoCacheStats {
        self.utxo_cache.stats()
    }

    pub fn block(&self, hash: &Hash256) -> Result<Option<Block>, ChainStateError> {
        self.index.block(hash)
    }

    pub fn hash_at_height(&self, height: u32) -> Result<Option<Hash256>, ChainStateError> {
        self.index.hash_at_height(height)
    }

    fn new_view(&self) -> UtxoViewpoint {
        UtxoViewpoint::new(self.utxo_cache.clone())
    }

    fn clear_disapproved_view(&self) {
        if let Ok(mut slot) = self.disapproved_view.lock() {
            *slot = None;
        }
    }

    /// Persists `view` together with the block bookkeeping staged by
    /// `stage`, then mirrors the result into the entry cache.
    fn commit<F>(&self, view: &mut UtxoViewpoint, stage: F) -> Result<(), ChainStateError>
    where
        F: FnOnce(&mut WriteBatch),
    {
        update(self.store.as_ref(), |batch| {
            self.utxo_cache.write_view(view, batch);
            stage(batch);
            Ok::<_, ChainStateError>(())
        })?;
        self.utxo_cache.finish_commit(view);
        Ok(())
    }
}

/// Proof that the chain lock is held for writing.
pub struct ChainWriteGuard<'a, S> {
    chain: &'a ChainState<S>,
    inner: RwLockWriteGuard<'a, ChainInner>,
}

impl<S: KeyValueStore + 'static> ChainWriteGuard<'_, S> {
    pub fn tip(&self) -> Option<ChainTip> {
        self.inner.tip
    }

    /// Records the first block. Its outputs are not spendable and are not
    /// added to the unspent set.
    pub fn init_genesis(&mut self, block: &Block) -> Result<ChainTip, ChainStateError> {
        if self.inner.tip.is_some() {
            return Err(ChainStateError::InvalidBlock("chain already initialised"));
        }
        if block.height() != 0 {
            return Err(ChainStateError::InvalidBlock("genesis block must have height 0"));
        }
        let chain = self.chain;
        let tip = ChainTip {
            hash: block.hash(),
            height: 0,
        };
        update(chain.store.as_ref(), |batch| {
            chain.index.put_block(batch, &tip.hash, block);
            chain.index.set_height(batch, 0, &tip.hash);
            chain.index.set_best_block(batch, &tip);
            Ok::<_, ChainStateError>(())
        })?;
        self.inner.tip = Some(tip);
        vgld_log::log_info!("initialised chain with genesis {}", hash_to_hex(&tip.hash));
        Ok(tip)
    }

    /// Extends the tip by `block`.
    pub fn connect_block(
        &mut self,
        block: &Block,
        agenda: AgendaFlags,
    ) -> Result<ChainTip, ChainStateError> {
        let chain = self.chain;
        let tip = self
            .inner
            .tip
            .ok_or(ChainStateError::InvalidBlock("chain has no genesis"))?;
        if block.header.prev_block != tip.hash || block.height() != tip.height + 1 {
            return Err(ChainStateError::InvalidBlock("block does not extend the tip"));
        }
        let parent = if block.header.approves_parent() {
            None
        } else {
            Some(
                chain
                    .index
                    .block(&tip.hash)?
                    .ok_or(ChainStateError::MissingParent)?,
            )
        };

        let mut view = chain.new_view();
        view.set_best_hash(tip.hash);
        let mut stxos = Vec::new();
        view.connect_block(
            &chain.journal,
            block,
            parent.as_ref(),
            Some(&mut stxos),
            agenda,
        )?;

        let new_tip = ChainTip {
            hash: block.hash(),
            height: block.height(),
        };
        chain.commit(&mut view, |batch| {
            chain.journal.put(batch, &new_tip.hash, &stxos);
            chain.index.put_block(batch, &new_tip.hash, block);
            chain.index.set_height(batch, new_tip.height, &new_tip.hash);
            chain.index.set_best_block(batch, &new_tip);
        })?;
        self.inner.tip = Some(new_tip);
        chain.clear_disapproved_view();

        vgld_log::log_info!(
            "connected block {} at height {} ({} spent outputs{})",
            hash_to_hex(&new_tip.hash),
            new_tip.height,
            stxos.len(),
            if parent.is_some() { ", parent regular tree disapproved" } else { "" }
        );
        Ok(new_tip)
    }

    /// Removes the tip block and returns it.
    pub fn disconnect_block(&mut self, agenda: AgendaFlags) -> Result<Block, ChainStateError> {
        let chain = self.chain;
        let tip = self
            .inner
            .tip
            .ok_or(ChainStateError::InvalidBlock("chain has no genesis"))?;
        if tip.height == 0 {
            return Err(ChainStateError::InvalidBlock("cannot disconnect genesis"));
        }
        let block = chain
            .index
            .block(&tip.hash)?
            .ok_or(ChainStateError::MissingBlock)?;
        let parent = chain
            .index
            .block(&block.header.prev_block)?
            .ok_or(ChainStateError::MissingParent)?;
        let stxos = chain.journal.fetch_spend_journal(&block, agenda)?;

        let mut view = chain.new_view();
        view.set_best_hash(tip.hash);
        view.disconnect_block(&block, Some(&parent), &stxos, agenda)?;

        let new_tip = ChainTip {
            hash: block.header.prev_block,
            height: tip.height - 1,
        };
        chain.commit(&mut view, |batch| {
            chain.journal.delete(batch, &tip.hash);
            chain.index.clear_height(batch, tip.height);
            chain.index.set_best_block(batch, &new_tip);
        })?;
        self.inner.tip = Some(new_tip);
        chain.clear_disapproved_view();

        vgld_log::log_info!(
            "disconnected block {} at height {}",
            hash_to_hex(&tip.hash),
            tip.height
        );
        Ok(block)
    }
}

/// Proof that the chain lock is held for reading.
pub struct ChainReadGuard<'a, S> {
    chain: &'a ChainState<S>,
    inner: RwLockReadGuard<'a, ChainInner>,
}

impl<S: KeyValueStore + 'static> ChainReadGuard<'_, S> {
    pub fn tip(&self) -> Option<ChainTip> {
        self.inner.tip
    }

    pub fn fetch_utxo_entry(
        &self,
        outpoint: &OutPoint,
    ) -> Result<Option<UtxoEntry>, ChainStateError> {
        Ok(self.chain.utxo_cache.fetch_entry(outpoint)?)
    }

    /// View holding the outputs `tx` spends plus its own outputs, as of the
    /// tip. Without `include_regular` the tip's regular tree is treated as
    /// disapproved, which is the state a transaction entering the next block
    /// must be valid against when the next block may vote the tip down.
    pub fn fetch_utxo_view(
        &self,
        tx: &Transaction,
        include_regular: bool,
        agenda: AgendaFlags,
    ) -> Result<UtxoViewpoint, ChainStateError> {
        let chain = self.chain;
        let mut view = chain.new_view();
        let Some(tip) = self.inner.tip else {
            return Ok(view);
        };
        view.set_best_hash(tip.hash);
        if tip.height == 0 {
            return Ok(view);
        }

        if !include_regular {
            let mut slot = chain
                .disapproved_view
                .lock()
                .map_err(|_| ChainStateError::LockPoisoned)?;
            let cached = slot
                .as_ref()
                .filter(|cached| cached.best_hash() == tip.hash)
                .cloned();
            match cached {
                Some(cached) => view = cached,
                None => {
                    let tip_block = chain
                        .index
                        .block(&tip.hash)?
                        .ok_or(ChainStateError::MissingBlock)?;
                    view.disconnect_disapproved_block(&chain.journal, &tip_block, agenda)?;
                    vgld_log::log_debug!(
                        "rebuilt disapproved view for tip {} ({} entries)",
                        hash_to_hex(&tip.hash),
                        view.len()
                    );
                    *slot = Some(view.clone());
                }
            }
        }

        let tx_type = determine_tx_type(tx);
        let tree = if tx_type.is_stake() {
            TxTree::Stake
        } else {
            TxTree::Regular
        };
        let hash = tx.txid();
        let mut set = ViewFilteredSet::new();
        for index in 0..tx.vout.len() {
            set.add(&view, &OutPoint::new(hash, index as u32, tree));
        }
        let skip_inputs = is_coinbase_tx(tx, agenda)
            || tx_type == TxType::TreasuryBase
            || tx_type == TxType::TreasurySpend;
        if !skip_inputs {
            let is_vote = tx_type == TxType::Vote;
            for (index, input) in tx.vin.iter().enumerate() {
                if is_vote && index == 0 {
                    continue;
                }
                set.add(&view, &input.prevout);
            }
        }
        view.fetch_utxos(set)?;
        Ok(view)
    }
}
