//! Ledger entities, their invariants, and the ports backends plug into.

pub mod account;
pub mod lock;
pub mod operation;
pub mod ports;
