//! Unspent output set, spend journals and block connect/disconnect.

pub mod cache;
pub mod compress;
pub mod config;
pub mod index;
pub mod spend_journal;
pub mod state;
pub mod ticket;
pub mod utxo;
pub mod view;

pub use cache::UtxoCache;
pub use config::ChainConfig;
pub use index::ChainTip;
pub use spend_journal::SpentTxOut;
pub use state::{ChainReadGuard, ChainState, ChainStateError, ChainWriteGuard};
pub use utxo::{TxFlags, UtxoEntry, UtxoState};
pub use view::{UtxoCacher, UtxoViewpoint, ViewError, ViewFilteredSet};
