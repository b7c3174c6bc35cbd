//! L3 Event Ledger (`spec.md` §4.C): durable storage for facts,
//! transactions, checkpoints, agents, votes, and privacy events, with
//! one column family per table and tenant-scoped advisory locking for
//! operations (like checkpointing) that span a range of transactions.

pub mod chain_lock;
pub mod facade;
pub mod mem;
pub mod rocksdb;
pub mod store;

pub use chain_lock::ChainLocks;
pub use facade::{ChainVerification, ChainViolation, FactPage, LedgerFacade, ListFilters};
pub use mem::InMemoryLedger;
pub use rocksdb::RocksDbLedger;
pub use store::LedgerStore;
