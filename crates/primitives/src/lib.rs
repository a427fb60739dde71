//! Core block/transaction types and consensus serialization.

pub mod block;
pub mod encoding;
pub mod hash;
pub mod outpoint;
pub mod stake;
pub mod transaction;

pub use block::{Block, BlockHeader};
pub use hash::{sha256, sha256d};
pub use outpoint::{OutPoint, TxTree};
pub use stake::TxType;
pub use transaction::{Transaction, TxIn, TxOut};
