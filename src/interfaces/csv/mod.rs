//! Batch mode: ledger commands in, account state out, both as CSV.

pub mod account_writer;
pub mod command_reader;
