//! Consensus constants and agenda flags shared by the ledger crates.

pub mod agendas;
pub mod constants;

pub use agendas::AgendaFlags;

pub type Hash256 = [u8; 32];

pub const ZERO_HASH: Hash256 = [0u8; 32];
