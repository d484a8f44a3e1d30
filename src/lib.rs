//! Migration Scout Library
//!
//! Discovers tokens that migrated off the pump.fun bonding curve, screens them
//! (blacklists, creator throttle, risk verdict, numeric filters), stores the
//! survivors in SQLite and raises alerts.

pub mod address;
pub mod alert;
pub mod analysis;
pub mod cli;
pub mod coin;
pub mod config;
pub mod error;
pub mod feed;
pub mod filter;
pub mod pipeline;
pub mod security;
pub mod storage;

// Re-export commonly used types
pub use address::Address;
pub use coin::{Coin, SecurityCheck};
pub use config::Config;
pub use error::{Error, Result};
