//! Heuristic filter engine
//!
//! Pure threshold checks over a parsed coin. Conditions short-circuit in a
//! fixed order: liquidity, fee, holders, age.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coin::Coin;

/// Upper bound for `block_new_coins_minutes` (ten years)
pub const MAX_BLOCK_NEW_COINS_MINUTES: u64 = 60 * 24 * 365 * 10;

/// Immutable filter thresholds for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPolicy {
    pub min_liquidity: f64,
    /// Percent
    pub max_creator_fee: f64,
    pub min_holders: u64,
    /// Coins younger than this are held back
    pub block_new_coins_minutes: u64,
    /// Creator throttle, enforced by the guard
    pub max_coins_per_creator: u64,
}

/// Reason why a coin was filtered
#[derive(Debug, Clone, PartialEq)]
pub enum FilterReason {
    /// Liquidity below minimum
    LiquidityBelowMinimum(f64),
    /// Creator fee above maximum
    FeeAboveMaximum(f64),
    /// Not enough holders
    HoldersBelowMinimum(u64),
    /// Migrated too recently (or in the future)
    TooNew { age_minutes: i64 },
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterReason::LiquidityBelowMinimum(liq) => {
                write!(f, "liquidity {} below minimum", liq)
            }
            FilterReason::FeeAboveMaximum(fee) => write!(f, "creator fee {}% above maximum", fee),
            FilterReason::HoldersBelowMinimum(holders) => {
                write!(f, "{} holders below minimum", holders)
            }
            FilterReason::TooNew { age_minutes } => {
                write!(f, "migrated {} minutes ago, too new", age_minutes)
            }
        }
    }
}

/// Filter result
#[derive(Debug, Clone, PartialEq)]
pub enum FilterResult {
    /// Coin passed all filters
    Pass,
    /// Coin was filtered
    Filtered(FilterReason),
}

impl FilterResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, FilterResult::Pass)
    }

    pub fn is_filtered(&self) -> bool {
        matches!(self, FilterResult::Filtered(_))
    }
}

impl FilterPolicy {
    /// Evaluate every threshold, stopping at the first violation
    pub fn evaluate(&self, coin: &Coin, now: DateTime<Utc>) -> FilterResult {
        if coin.initial_liquidity < self.min_liquidity {
            return FilterResult::Filtered(FilterReason::LiquidityBelowMinimum(
                coin.initial_liquidity,
            ));
        }

        if coin.creator_fee > self.max_creator_fee {
            return FilterResult::Filtered(FilterReason::FeeAboveMaximum(coin.creator_fee));
        }

        if coin.holders < self.min_holders {
            return FilterResult::Filtered(FilterReason::HoldersBelowMinimum(coin.holders));
        }

        // A migration time ahead of `now` yields a negative age and lands here.
        // A window too large to represent holds every coin back.
        let age = now - coin.migration_time;
        let window = i64::try_from(self.block_new_coins_minutes)
            .ok()
            .and_then(Duration::try_minutes);
        let old_enough = match window {
            Some(window) => age >= window && age >= Duration::zero(),
            None => false,
        };
        if !old_enough {
            return FilterResult::Filtered(FilterReason::TooNew {
                age_minutes: age.num_minutes(),
            });
        }

        debug!(contract = %coin.contract_address, "Coin passed filters");
        FilterResult::Pass
    }

    /// True when every threshold holds
    pub fn passes(&self, coin: &Coin, now: DateTime<Utc>) -> bool {
        self.evaluate(coin, now).is_pass()
    }
}
