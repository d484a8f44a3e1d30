//! Blacklist & creator throttle guard
//!
//! Blacklist membership is checked first; the per-creator count is read from
//! the store only when both addresses are clean. Counting against the store
//! keeps the quota intact across restarts.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::address::Address;
use crate::coin::Coin;
use crate::error::Result;
use crate::filter::blacklist::Blacklist;
use crate::storage::Store;

/// Why the guard rejected a coin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Contract address is blacklisted
    BlacklistedCoin,
    /// Creator wallet is blacklisted
    BlacklistedCreator,
    /// Creator already has `stored` coins, at or above the cap
    CreatorThrottled { stored: u64, max: u64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::BlacklistedCoin => write!(f, "coin address is blacklisted"),
            RejectReason::BlacklistedCreator => write!(f, "creator address is blacklisted"),
            RejectReason::CreatorThrottled { stored, max } => {
                write!(f, "creator has {} stored coins (max {})", stored, max)
            }
        }
    }
}

/// Guard verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Allowed,
    Rejected(RejectReason),
}

impl GuardVerdict {
    pub fn is_rejected(&self) -> bool {
        matches!(self, GuardVerdict::Rejected(_))
    }
}

/// Per-creator async locks.
///
/// Held from the throttle check until the coin is persisted so two coins from
/// the same creator in one batch cannot both pass on a stale count.
#[derive(Default)]
pub struct CreatorLocks {
    locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl CreatorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a creator, waiting if another record holds it
    pub async fn acquire(&self, creator: &Address) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(*creator)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Drop locks nobody is holding or waiting on
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Blacklist & throttle guard
pub struct Guard {
    blacklist: Arc<Blacklist>,
    store: Arc<dyn Store>,
    max_coins_per_creator: u64,
}

impl Guard {
    pub fn new(blacklist: Arc<Blacklist>, store: Arc<dyn Store>, max_coins_per_creator: u64) -> Self {
        Self {
            blacklist,
            store,
            max_coins_per_creator,
        }
    }

    /// Full verdict with reason. Only a storage failure on the throttle count
    /// yields an error.
    pub async fn check(&self, coin: &Coin) -> Result<GuardVerdict> {
        let blacklist = self.blacklist.snapshot().await;

        if blacklist.is_coin_blacklisted(&coin.contract_address) {
            info!(contract = %coin.contract_address, "[SECURITY] Coin is blacklisted");
            return Ok(GuardVerdict::Rejected(RejectReason::BlacklistedCoin));
        }

        if blacklist.is_creator_blacklisted(&coin.creator) {
            info!(
                contract = %coin.contract_address,
                creator = %coin.creator,
                "[SECURITY] Creator is blacklisted"
            );
            return Ok(GuardVerdict::Rejected(RejectReason::BlacklistedCreator));
        }

        let stored = self.store.count_coins_by_creator(&coin.creator)?;
        if stored >= self.max_coins_per_creator {
            info!(
                contract = %coin.contract_address,
                creator = %coin.creator,
                stored,
                max = self.max_coins_per_creator,
                "[SECURITY] Creator made too many coins"
            );
            return Ok(GuardVerdict::Rejected(RejectReason::CreatorThrottled {
                stored,
                max: self.max_coins_per_creator,
            }));
        }

        debug!(contract = %coin.contract_address, stored, "Guard passed");
        Ok(GuardVerdict::Allowed)
    }

    /// True when the coin must be dropped
    pub async fn is_rejected(&self, coin: &Coin) -> Result<bool> {
        Ok(self.check(coin).await?.is_rejected())
    }
}
