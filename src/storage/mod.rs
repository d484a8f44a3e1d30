//! Persistence
//!
//! The store is the source of truth for dedupe and creator throttling.
//! Addresses are always written in checksum form so equality in SQL matches
//! equality of [`Address`].

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::address::Address;
use crate::coin::{Coin, SecurityCheck, TransactionAggregate, TransactionRecord};
use crate::error::Result;

/// Outcome of a coin upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Row counts for status output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub coins: u64,
    pub security_checks: u64,
    pub transactions: u64,
}

/// Storage collaborator used by the pipeline
pub trait Store: Send + Sync {
    /// Whether a coin with this contract address is already stored
    fn coin_exists(&self, contract: &Address) -> Result<bool>;

    /// Insert a coin, or update the mutable attributes of an existing row.
    /// Never creates a second row for the same contract address.
    fn upsert_coin(&self, coin: &Coin) -> Result<UpsertOutcome>;

    fn get_coin(&self, contract: &Address) -> Result<Option<Coin>>;

    /// Number of stored coins created by this exact creator
    fn count_coins_by_creator(&self, creator: &Address) -> Result<u64>;

    /// Write the latest verdict for a contract, replacing any previous one
    fn upsert_security_check(&self, check: &SecurityCheck) -> Result<()>;

    fn get_security_check(&self, contract: &Address) -> Result<Option<SecurityCheck>>;

    /// Insert raw trades, ignoring hashes already stored. Returns rows added.
    fn insert_transactions(&self, records: &[TransactionRecord]) -> Result<usize>;

    /// Per-contract count, volume and average gas over all stored trades
    fn aggregate_transactions(&self) -> Result<Vec<TransactionAggregate>>;

    fn stats(&self) -> Result<StoreStats>;
}
