//! Precomputed agenda results consumed by block connection.
//!
//! The threshold-state machinery that decides whether an agenda is active
//! lives elsewhere; the ledger only ever sees its boolean results.

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AgendaFlags {
    /// Treasury rules: stake tree may start with a treasury base and carry
    /// treasury spends, and coinbases must use the treasury tx version.
    pub treasury_enabled: bool,
}

impl AgendaFlags {
    pub const fn none() -> Self {
        Self {
            treasury_enabled: false,
        }
    }

    pub const fn with_treasury() -> Self {
        Self {
            treasury_enabled: true,
        }
    }
}
