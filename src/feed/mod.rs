//! Migration feed ingestion

pub mod client;
pub mod parser;

pub use client::{CoinFeed, PumpFunClient};
pub use parser::{parse_coin, parse_transaction};
