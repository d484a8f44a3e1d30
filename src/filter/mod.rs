//! Coin gating
//!
//! The guard rejects blacklisted coins and throttled creators; the policy
//! applies the numeric thresholds.

pub mod blacklist;
pub mod guard;
pub mod policy;

pub use blacklist::{Blacklist, BlacklistSet, BlacklistSource, HttpBlacklistSource};
pub use guard::{CreatorLocks, Guard, GuardVerdict, RejectReason};
pub use policy::{FilterPolicy, FilterReason, FilterResult};
