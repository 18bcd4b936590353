//! Adapters for the domain ports: entity stores, the reference transfer
//! ledger and clocks.

pub mod clock;
pub mod in_memory;
pub mod ledger;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
