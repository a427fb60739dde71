//! In-memory overlay of the unspent output set.
//!
//! A [`UtxoViewpoint`] holds the entries a block (or a single transaction)
//! touches, as of `best_hash`. Connect and disconnect mutate only the
//! overlay; the chain state persists the modified entries afterwards in one
//! store batch. Anything not yet resident is pulled through the bound
//! [`UtxoCacher`] in a single filtered fetch.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use vgld_consensus::{AgendaFlags, Hash256, ZERO_HASH};
use vgld_primitives::block::Block;
use vgld_primitives::outpoint::{OutPoint, TxTree};
use vgld_primitives::stake::{determine_tx_type, is_coinbase_tx, TxType};
use vgld_primitives::transaction::{Transaction, TxOut};
use vgld_script::standard::is_unspendable;
use vgld_storage::StoreError;

use crate::compress::CompressError;
use crate::spend_journal::{
    count_spent_outputs, count_spent_regular_outputs, SpendJournalReader, SpentTxOut,
};
use crate::ticket::TicketMinOuts;
use crate::utxo::{TxFlags, UtxoEntry, UtxoState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    Store(StoreError),
    Decode(CompressError),
    /// An internal invariant does not hold; the operation cannot continue.
    Assert(String),
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewError::Store(err) => write!(f, "{err}"),
            ViewError::Decode(err) => write!(f, "{err}"),
            ViewError::Assert(message) => write!(f, "assertion failed: {message}"),
        }
    }
}

impl std::error::Error for ViewError {}

impl From<StoreError> for ViewError {
    fn from(err: StoreError) -> Self {
        ViewError::Store(err)
    }
}

impl From<CompressError> for ViewError {
    fn from(err: CompressError) -> Self {
        ViewError::Decode(err)
    }
}

/// Backing source of entries for a view.
pub trait UtxoCacher: Send + Sync {
    /// Loads every outpoint of `set` into `view`. Outpoints that do not exist
    /// are inserted as absent markers.
    fn fetch_entries(
        &self,
        set: &ViewFilteredSet,
        view: &mut UtxoViewpoint,
    ) -> Result<(), ViewError>;
}

/// Outpoints a view still needs that are not resident in it.
#[derive(Clone, Debug, Default)]
pub struct ViewFilteredSet {
    outpoints: HashSet<OutPoint>,
}

impl ViewFilteredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `outpoint` unless the view already has a slot for it, even an
    /// absent one.
    pub fn add(&mut self, view: &UtxoViewpoint, outpoint: &OutPoint) {
        if !view.contains(outpoint) {
            self.outpoints.insert(*outpoint);
        }
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.outpoints.contains(outpoint)
    }

    pub fn len(&self) -> usize {
        self.outpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutPoint> {
        self.outpoints.iter()
    }
}

#[derive(Clone)]
pub struct UtxoViewpoint {
    cache: Arc<dyn UtxoCacher>,
    /// `None` marks an outpoint known not to exist in the backing store.
    entries: HashMap<OutPoint, Option<UtxoEntry>>,
    best_hash: Hash256,
}

impl fmt::Debug for UtxoViewpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtxoViewpoint")
            .field("entries", &self.entries.len())
            .field("best_hash", &self.best_hash)
            .finish()
    }
}

fn output_tree(tx_type: TxType) -> TxTree {
    if tx_type.is_stake() {
        TxTree::Stake
    } else {
        TxTree::Regular
    }
}

fn ticket_min_outs_for(
    tx: &Transaction,
    tx_type: TxType,
    output_index: usize,
) -> Option<TicketMinOuts> {
    (tx_type == TxType::Ticket && output_index == 0).then(|| TicketMinOuts::from_tx(tx))
}

impl UtxoViewpoint {
    pub fn new(cache: Arc<dyn UtxoCacher>) -> Self {
        Self {
            cache,
            entries: HashMap::new(),
            best_hash: ZERO_HASH,
        }
    }

    pub fn best_hash(&self) -> Hash256 {
        self.best_hash
    }

    pub fn set_best_hash(&mut self, hash: Hash256) {
        self.best_hash = hash;
    }

    /// Entry for `outpoint`, spent or not. Absent markers and outpoints that
    /// were never loaded both yield `None`.
    pub fn lookup_entry(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.entries.get(outpoint).and_then(Option::as_ref)
    }

    pub fn lookup_entry_mut(&mut self, outpoint: &OutPoint) -> Option<&mut UtxoEntry> {
        self.entries.get_mut(outpoint).and_then(Option::as_mut)
    }

    /// Whether the view has a slot for `outpoint`, including absent markers.
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn remove_entry(&mut self, outpoint: &OutPoint) {
        self.entries.remove(outpoint);
    }

    /// Stores the result of a backing fetch.
    pub fn insert_fetched(&mut self, outpoint: OutPoint, entry: Option<UtxoEntry>) {
        self.entries.insert(outpoint, entry);
    }

    pub fn entries(&self) -> &HashMap<OutPoint, Option<UtxoEntry>> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Script version and script of the referenced output, if resident.
    pub fn prev_script(&self, outpoint: &OutPoint) -> Option<(u16, &[u8])> {
        self.lookup_entry(outpoint)
            .map(|entry| (entry.script_version(), entry.pk_script()))
    }

    /// Creation height and amount of an unspent referenced output.
    pub fn priority_input(&self, outpoint: &OutPoint) -> Option<(u32, i64)> {
        self.lookup_entry(outpoint)
            .filter(|entry| !entry.is_spent())
            .map(|entry| (entry.block_height(), entry.amount()))
    }

    /// Adds one output unless it is provably unspendable. An existing slot is
    /// overwritten in full and marked unspent.
    pub fn add_tx_out(
        &mut self,
        outpoint: OutPoint,
        output: &TxOut,
        flags: TxFlags,
        block_height: u32,
        block_index: u32,
        ticket_min_outs: Option<TicketMinOuts>,
    ) {
        if is_unspendable(output.value, &output.pk_script) {
            return;
        }
        let slot = self.entries.entry(outpoint).or_insert(None);
        match slot {
            Some(entry) => {
                entry.replace_output(
                    output.value,
                    &output.pk_script,
                    output.version,
                    block_height,
                    block_index,
                    flags,
                    ticket_min_outs,
                );
                let state = entry.state_mut();
                state.remove(UtxoState::SPENT | UtxoState::SPENT_BY_ZERO_CONF);
                state.insert(UtxoState::MODIFIED);
            }
            None => {
                *slot = Some(UtxoEntry::new(
                    output.value,
                    output.pk_script.clone(),
                    output.version,
                    block_height,
                    block_index,
                    flags,
                    ticket_min_outs,
                    UtxoState::MODIFIED | UtxoState::FRESH,
                ));
            }
        }
    }

    /// Adds every spendable output of `tx`.
    pub fn add_tx_outs(
        &mut self,
        tx: &Transaction,
        block_height: u32,
        block_index: u32,
        agenda: AgendaFlags,
    ) {
        let tx_type = determine_tx_type(tx);
        let flags = TxFlags::new(is_coinbase_tx(tx, agenda), tx.has_expiry(), tx_type);
        let hash = tx.txid();
        let tree = output_tree(tx_type);
        for (index, output) in tx.vout.iter().enumerate() {
            self.add_tx_out(
                OutPoint::new(hash, index as u32, tree),
                output,
                flags,
                block_height,
                block_index,
                ticket_min_outs_for(tx, tx_type, index),
            );
        }
    }

    fn spend_input(
        &mut self,
        outpoint: &OutPoint,
        stxos: &mut Option<&mut Vec<SpentTxOut>>,
    ) -> Result<&mut UtxoEntry, ViewError> {
        let entry = self
            .lookup_entry_mut(outpoint)
            .ok_or_else(|| ViewError::Assert(format!("view missing input {outpoint}")))?;
        if let Some(stxos) = stxos.as_deref_mut() {
            stxos.push(SpentTxOut::from_entry(entry));
        }
        entry.spend();
        Ok(entry)
    }

    fn connect_stake_transaction(
        &mut self,
        tx: &Transaction,
        block_height: u32,
        block_index: u32,
        stxos: &mut Option<&mut Vec<SpentTxOut>>,
        agenda: AgendaFlags,
    ) -> Result<(), ViewError> {
        let tx_type = determine_tx_type(tx);
        let no_inputs = agenda.treasury_enabled
            && ((block_index == 0 && tx_type == TxType::TreasuryBase)
                || tx_type == TxType::TreasurySpend);
        if !no_inputs {
            let is_vote = tx_type == TxType::Vote;
            for (input_index, input) in tx.vin.iter().enumerate() {
                if is_vote && input_index == 0 {
                    continue;
                }
                self.spend_input(&input.prevout, stxos)?;
            }
        }
        self.add_tx_outs(tx, block_height, block_index, agenda);
        Ok(())
    }

    fn connect_stake_transactions(
        &mut self,
        block: &Block,
        mut stxos: Option<&mut Vec<SpentTxOut>>,
        agenda: AgendaFlags,
    ) -> Result<(), ViewError> {
        for (index, tx) in block.stake_transactions.iter().enumerate() {
            self.connect_stake_transaction(
                tx,
                block.height(),
                index as u32,
                &mut stxos,
                agenda,
            )?;
        }
        Ok(())
    }

    fn connect_regular_transactions(
        &mut self,
        block: &Block,
        mut stxos: Option<&mut Vec<SpentTxOut>>,
        agenda: AgendaFlags,
    ) -> Result<(), ViewError> {
        let mut in_flight: HashMap<Hash256, u32> =
            HashMap::with_capacity(block.transactions.len());
        for (index, tx) in block.transactions.iter().enumerate() {
            let block_index = index as u32;
            if !is_coinbase_tx(tx, agenda) {
                for input in &tx.vin {
                    let entry = self.spend_input(&input.prevout, &mut stxos)?;
                    if in_flight
                        .get(&input.prevout.hash)
                        .is_some_and(|&origin| block_index > origin)
                    {
                        entry.state_mut().insert(UtxoState::SPENT_BY_ZERO_CONF);
                    }
                }
            }
            self.add_tx_outs(tx, block.height(), block_index, agenda);
            in_flight.insert(tx.txid(), block_index);
        }
        Ok(())
    }

    /// Reverses one tree of `block`. `stxos` is the block's full journal:
    /// stake tree records first, regular tree records last.
    fn disconnect_transactions(
        &mut self,
        block: &Block,
        stxos: &[SpentTxOut],
        stake_tree: bool,
        agenda: AgendaFlags,
    ) -> Result<(), ViewError> {
        let num_spent_regular = count_spent_regular_outputs(block);
        let (transactions, mut cursor) = if stake_tree {
            let end = stxos.len().checked_sub(num_spent_regular).ok_or_else(|| {
                ViewError::Assert(format!(
                    "journal of {} records is shorter than the {} regular spends",
                    stxos.len(),
                    num_spent_regular
                ))
            })?;
            (&block.stake_transactions, end)
        } else {
            (&block.transactions, stxos.len())
        };
        let mut spends_in_flight: HashMap<OutPoint, usize> = HashMap::new();

        for (tx_index, tx) in transactions.iter().enumerate().rev() {
            let tx_type = if stake_tree {
                determine_tx_type(tx)
            } else {
                TxType::Regular
            };
            let is_vote = tx_type == TxType::Vote;
            let is_treasury_spend =
                agenda.treasury_enabled && stake_tree && tx_type == TxType::TreasurySpend;
            let is_treasury_base = agenda.treasury_enabled
                && stake_tree
                && tx_type == TxType::TreasuryBase
                && tx_index == 0;
            let is_coinbase = !stake_tree && tx_index == 0;
            let flags = TxFlags::new(is_coinbase, tx.has_expiry(), tx_type);
            let hash = tx.txid();
            let tree = output_tree(tx_type);

            for (output_index, output) in tx.vout.iter().enumerate() {
                if is_unspendable(output.value, &output.pk_script) {
                    continue;
                }
                let outpoint = OutPoint::new(hash, output_index as u32, tree);
                let slot = self.entries.entry(outpoint).or_insert(None);
                let entry = slot.get_or_insert_with(|| {
                    UtxoEntry::new(
                        output.value,
                        output.pk_script.clone(),
                        output.version,
                        block.height(),
                        tx_index as u32,
                        flags,
                        ticket_min_outs_for(tx, tx_type, output_index),
                        UtxoState::MODIFIED,
                    )
                });
                // Outputs of a committed block may be stored; spent ones must
                // be written back as deletes.
                entry.spend();
                entry.state_mut().remove(UtxoState::FRESH);
                if spends_in_flight
                    .get(&outpoint)
                    .is_some_and(|&spender| tx_index < spender)
                {
                    entry.state_mut().insert(UtxoState::SPENT_BY_ZERO_CONF);
                }
            }

            if is_coinbase || is_treasury_base || is_treasury_spend {
                continue;
            }
            for (input_index, input) in tx.vin.iter().enumerate().rev() {
                if is_vote && input_index == 0 {
                    continue;
                }
                cursor = cursor.checked_sub(1).ok_or_else(|| {
                    ViewError::Assert(format!(
                        "spend journal exhausted while disconnecting block at height {}",
                        block.height()
                    ))
                })?;
                let stxo = &stxos[cursor];
                let slot = self.entries.entry(input.prevout).or_insert(None);
                let entry = slot.get_or_insert_with(|| stxo.to_entry());
                let state = entry.state_mut();
                state.remove(UtxoState::SPENT | UtxoState::SPENT_BY_ZERO_CONF);
                state.insert(UtxoState::MODIFIED);
                if !stake_tree {
                    spends_in_flight.insert(input.prevout, tx_index);
                }
            }
        }
        Ok(())
    }

    /// Pulls every outpoint of `set` through the bound cacher in one call.
    pub fn fetch_utxos(&mut self, set: ViewFilteredSet) -> Result<(), ViewError> {
        if set.is_empty() {
            return Ok(());
        }
        let cache = Arc::clone(&self.cache);
        cache.fetch_entries(&set, self)
    }

    /// Collects the regular tree's inputs. Inputs that spend an earlier
    /// transaction of the same tree are satisfied by adding that
    /// transaction's outputs directly instead of fetching them.
    fn add_regular_input_utxos(
        &mut self,
        block: &Block,
        agenda: AgendaFlags,
    ) -> ViewFilteredSet {
        let in_flight: HashMap<Hash256, usize> = block
            .transactions
            .iter()
            .enumerate()
            .map(|(index, tx)| (tx.txid(), index))
            .collect();

        let mut set = ViewFilteredSet::new();
        for (index, tx) in block.transactions.iter().enumerate().skip(1) {
            for input in &tx.vin {
                match in_flight.get(&input.prevout.hash) {
                    Some(&origin) if origin < index => {
                        self.add_tx_outs(
                            &block.transactions[origin],
                            block.height(),
                            origin as u32,
                            agenda,
                        );
                    }
                    _ => set.add(self, &input.prevout),
                }
            }
        }
        set
    }

    pub fn fetch_regular_input_utxos(
        &mut self,
        block: &Block,
        agenda: AgendaFlags,
    ) -> Result<(), ViewError> {
        let set = self.add_regular_input_utxos(block, agenda);
        self.fetch_utxos(set)
    }

    /// Loads every output either tree of `block` spends.
    pub fn fetch_input_utxos(
        &mut self,
        block: &Block,
        agenda: AgendaFlags,
    ) -> Result<(), ViewError> {
        let mut set = self.add_regular_input_utxos(block, agenda);
        for (index, tx) in block.stake_transactions.iter().enumerate() {
            let tx_type = determine_tx_type(tx);
            if agenda.treasury_enabled
                && ((index == 0 && tx_type == TxType::TreasuryBase)
                    || tx_type == TxType::TreasurySpend)
            {
                continue;
            }
            let is_vote = tx_type == TxType::Vote;
            for (input_index, input) in tx.vin.iter().enumerate() {
                if is_vote && input_index == 0 {
                    continue;
                }
                set.add(self, &input.prevout);
            }
        }
        self.fetch_utxos(set)
    }

    /// Reverts the regular tree of `block` on this view, as a child block
    /// that votes against it would.
    pub fn disconnect_disapproved_block<J: SpendJournalReader + ?Sized>(
        &mut self,
        journal: &J,
        block: &Block,
        agenda: AgendaFlags,
    ) -> Result<(), ViewError> {
        let stxos = journal.fetch_spend_journal(block, agenda)?;
        self.fetch_regular_input_utxos(block, agenda)?;
        check_journal_len(block, &stxos, agenda);
        self.disconnect_transactions(block, &stxos, false, agenda)
    }

    /// Applies `block` to the view, appending one record per spent output to
    /// `stxos` when given. `parent` is required when the block disapproves
    /// it.
    pub fn connect_block<J: SpendJournalReader + ?Sized>(
        &mut self,
        journal: &J,
        block: &Block,
        parent: Option<&Block>,
        mut stxos: Option<&mut Vec<SpentTxOut>>,
        agenda: AgendaFlags,
    ) -> Result<(), ViewError> {
        if !block.header.approves_parent() {
            let parent = parent.ok_or_else(|| {
                ViewError::Assert("parent block required to revert its regular tree".to_string())
            })?;
            self.disconnect_disapproved_block(journal, parent, agenda)?;
        }

        self.fetch_input_utxos(block, agenda)?;
        self.connect_stake_transactions(block, stxos.as_deref_mut(), agenda)?;
        self.connect_regular_transactions(block, stxos, agenda)?;

        self.best_hash = block.hash();
        Ok(())
    }

    /// Reverses `block` using its spend journal. When the block disapproved
    /// its parent, the parent's regular tree is applied again.
    pub fn disconnect_block(
        &mut self,
        block: &Block,
        parent: Option<&Block>,
        stxos: &[SpentTxOut],
        agenda: AgendaFlags,
    ) -> Result<(), ViewError> {
        check_journal_len(block, stxos, agenda);

        self.fetch_input_utxos(block, agenda)?;
        self.disconnect_transactions(block, stxos, false, agenda)?;
        self.disconnect_transactions(block, stxos, true, agenda)?;

        if !block.header.approves_parent() {
            let parent = parent.ok_or_else(|| {
                ViewError::Assert("parent block required to restore its regular tree".to_string())
            })?;
            self.fetch_regular_input_utxos(parent, agenda)?;
            self.connect_regular_transactions(parent, None, agenda)?;
        }

        self.best_hash = block.header.prev_block;
        Ok(())
    }

    /// Drops spent entries and absent markers and clears the dirty bits. Runs
    /// once the modified entries are durable.
    pub fn prune(&mut self) {
        self.entries.retain(|_, slot| match slot {
            Some(entry) => !(entry.is_modified() && entry.is_spent()),
            None => false,
        });
        for entry in self.entries.values_mut().flatten() {
            let state = entry.state_mut();
            state.remove(UtxoState::MODIFIED | UtxoState::FRESH);
        }
    }
}

/// A journal whose length disagrees with the block means the stored state is
/// corrupt. Nothing sensible can continue from there.
fn check_journal_len(block: &Block, stxos: &[SpentTxOut], agenda: AgendaFlags) {
    let expected = count_spent_outputs(block, agenda);
    if stxos.len() != expected {
        vgld_log::log_error!(
            "spend journal for block at height {} has {} records, block spends {}",
            block.height(),
            stxos.len(),
            expected
        );
        panic!(
            "provided {} stxos for block at height {} which spends {} outputs",
            stxos.len(),
            block.height(),
            expected
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use vgld_primitives::transaction::TxIn;

    /// Serves entries from a fixed map and records what was asked for.
    #[derive(Default)]
    struct FixedCacher {
        entries: HashMap<OutPoint, UtxoEntry>,
        requests: Mutex<Vec<usize>>,
    }

    impl UtxoCacher for FixedCacher {
        fn fetch_entries(
            &self,
            set: &ViewFilteredSet,
            view: &mut UtxoViewpoint,
        ) -> Result<(), ViewError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(set.len());
            }
            for outpoint in set.iter() {
                view.insert_fetched(*outpoint, self.entries.get(outpoint).cloned());
            }
            Ok(())
        }
    }

    fn p2pkh(tag: u8) -> Vec<u8> {
        let mut script = vec![0x76, 0xa9, 0x14];
        script.extend_from_slice(&[tag; 20]);
        script.extend_from_slice(&[0x88, 0xac]);
        script
    }

    fn stored_entry(amount: i64) -> UtxoEntry {
        UtxoEntry::new(
            amount,
            p2pkh(1),
            0,
            1,
            0,
            TxFlags::default(),
            None,
            UtxoState::empty(),
        )
    }

    fn spend_tx(prevout: OutPoint, amount: i64, tag: u8) -> Transaction {
        Transaction {
            version: 1,
            vin: vec![TxIn::new(prevout, amount)],
            vout: vec![TxOut::new(amount, p2pkh(tag))],
            lock_time: 0,
            expiry: 0,
        }
    }

    #[test]
    fn add_tx_out_skips_unspendable_outputs() {
        let mut view = UtxoViewpoint::new(Arc::new(FixedCacher::default()));
        let outpoint = OutPoint::new([1u8; 32], 0, TxTree::Regular);
        view.add_tx_out(
            outpoint,
            &TxOut::new(0, p2pkh(1)),
            TxFlags::default(),
            1,
            0,
            None,
        );
        view.add_tx_out(
            outpoint,
            &TxOut::new(5, vec![0x6a, 0x01, 0x00]),
            TxFlags::default(),
            1,
            0,
            None,
        );
        assert!(!view.contains(&outpoint));
    }

    #[test]
    fn add_tx_out_revives_spent_slot() {
        let mut view = UtxoViewpoint::new(Arc::new(FixedCacher::default()));
        let outpoint = OutPoint::new([1u8; 32], 0, TxTree::Regular);
        view.insert_fetched(outpoint, Some(stored_entry(3)));
        if let Some(entry) = view.lookup_entry_mut(&outpoint) {
            entry.spend();
            entry.state_mut().insert(UtxoState::SPENT_BY_ZERO_CONF);
        }
        view.add_tx_out(
            outpoint,
            &TxOut::new(9, p2pkh(2)),
            TxFlags::new(false, true, TxType::Regular),
            4,
            1,
            None,
        );
        let entry = view.lookup_entry(&outpoint).expect("entry");
        assert!(!entry.is_spent() && !entry.is_spent_by_zero_conf());
        assert!(entry.is_modified() && !entry.is_fresh());
        assert_eq!(entry.amount(), 9);
        assert_eq!(entry.pk_script(), p2pkh(2).as_slice());
        assert_eq!(entry.block_height(), 4);
        assert!(entry.has_expiry());
    }

    #[test]
    fn filtered_set_skips_resident_and_absent_slots() {
        let mut view = UtxoViewpoint::new(Arc::new(FixedCacher::default()));
        let resident = OutPoint::new([1u8; 32], 0, TxTree::Regular);
        let absent = OutPoint::new([2u8; 32], 0, TxTree::Regular);
        let needed = OutPoint::new([3u8; 32], 0, TxTree::Regular);
        view.insert_fetched(resident, Some(stored_entry(1)));
        view.insert_fetched(absent, None);

        let mut set = ViewFilteredSet::new();
        for outpoint in [resident, absent, needed, needed] {
            set.add(&view, &outpoint);
        }
        assert_eq!(set.len(), 1);
        assert!(set.contains(&needed));
    }

    #[test]
    fn in_flight_inputs_are_not_fetched() {
        let funding = OutPoint::new([7u8; 32], 0, TxTree::Regular);
        let cacher = Arc::new(FixedCacher {
            entries: HashMap::from([(funding, stored_entry(10))]),
            ..FixedCacher::default()
        });
        let coinbase = Transaction {
            version: 1,
            vin: vec![TxIn::new(OutPoint::null(), 0)],
            vout: vec![TxOut::new(50, p2pkh(9))],
            lock_time: 0,
            expiry: 0,
        };
        let first = spend_tx(funding, 10, 2);
        let second = spend_tx(OutPoint::new(first.txid(), 0, TxTree::Regular), 10, 3);
        let block = Block {
            header: vgld_primitives::block::BlockHeader {
                version: 9,
                prev_block: [0u8; 32],
                merkle_root: [0u8; 32],
                stake_root: [0u8; 32],
                vote_bits: 1,
                voters: 0,
                fresh_stake: 0,
                revocations: 0,
                height: 2,
                time: 0,
                bits: 0,
                nonce: 0,
            },
            transactions: vec![coinbase, first.clone(), second],
            stake_transactions: Vec::new(),
        };

        let mut view = UtxoViewpoint::new(cacher.clone());
        view.fetch_input_utxos(&block, AgendaFlags::none())
            .expect("fetch");
        assert_eq!(*cacher.requests.lock().expect("lock"), vec![1]);
        let created = view
            .lookup_entry(&OutPoint::new(first.txid(), 0, TxTree::Regular))
            .expect("in-flight output");
        assert_eq!(created.block_index(), 1);
        assert!(created.is_fresh());
    }

    #[test]
    fn prune_keeps_only_live_entries() {
        let mut view = UtxoViewpoint::new(Arc::new(FixedCacher::default()));
        let live = OutPoint::new([1u8; 32], 0, TxTree::Regular);
        let spent = OutPoint::new([2u8; 32], 0, TxTree::Regular);
        let absent = OutPoint::new([3u8; 32], 0, TxTree::Regular);
        view.add_tx_out(live, &TxOut::new(4, p2pkh(1)), TxFlags::default(), 1, 0, None);
        view.insert_fetched(spent, Some(stored_entry(2)));
        if let Some(entry) = view.lookup_entry_mut(&spent) {
            entry.spend();
        }
        view.insert_fetched(absent, None);

        view.prune();
        assert_eq!(view.len(), 1);
        let entry = view.lookup_entry(&live).expect("live");
        assert!(!entry.is_modified() && !entry.is_fresh());
    }

    #[test]
    fn priority_input_ignores_spent_entries() {
        let mut view = UtxoViewpoint::new(Arc::new(FixedCacher::default()));
        let outpoint = OutPoint::new([1u8; 32], 0, TxTree::Regular);
        view.insert_fetched(outpoint, Some(stored_entry(8)));
        assert_eq!(view.priority_input(&outpoint), Some((1, 8)));
        assert_eq!(view.prev_script(&outpoint), Some((0, p2pkh(1).as_slice())));
        if let Some(entry) = view.lookup_entry_mut(&outpoint) {
            entry.spend();
        }
        assert_eq!(view.priority_input(&outpoint), None);
        assert!(view.prev_script(&outpoint).is_some());
    }
}
