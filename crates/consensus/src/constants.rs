//! Consensus-wide constants shared across the ledger.

/// Maximum script size (consensus). Larger scripts can never execute.
pub const MAX_SCRIPT_SIZE: usize = 16_384;

/// Expiry value meaning "this transaction never expires".
pub const NO_EXPIRY_VALUE: u32 = 0;

/// Output index used by null outpoints (coinbase, stakebase, treasury inputs).
pub const NULL_OUTPOINT_INDEX: u32 = u32::MAX;

/// Transaction version a coinbase must carry once the treasury agenda is active.
pub const COINBASE_TX_VERSION_TREASURY: u16 = 3;

/// Header vote bit signalling that the regular tree of the parent is valid.
pub const VOTE_BIT_APPROVE_PARENT: u16 = 0x0001;
