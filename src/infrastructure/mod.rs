//! Adapters implementing the domain ports.

pub mod in_memory;
#[cfg(feature = "lock-redis")]
pub mod redis;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod staged;
