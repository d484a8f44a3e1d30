//! Domain types shared by the pipeline stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::Address;

/// A token that migrated off the bonding curve, as normalized by the parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    /// Contract address (identity)
    pub contract_address: Address,
    pub name: String,
    pub symbol: String,
    /// Wallet that created the token
    pub creator: Address,
    pub migration_time: DateTime<Utc>,
    pub initial_liquidity: f64,
    /// Creator fee in percent
    pub creator_fee: f64,
    pub holders: u64,
    /// Source code verified on the block explorer
    pub is_verified: bool,
}

impl Coin {
    /// Minutes elapsed since migration. Negative when the feed clock is ahead.
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.migration_time).num_minutes()
    }
}

/// Verdict attached to every security check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskVerdict {
    Good,
    Warning,
    Danger,
    /// No real verdict was obtained (service disabled or down)
    Unknown,
    /// Label we don't recognize, kept verbatim for auditing
    Other(String),
}

impl RiskVerdict {
    /// Map a free-form service label onto a verdict
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "good" | "safe" | "low" => RiskVerdict::Good,
            "warn" | "warning" | "medium" => RiskVerdict::Warning,
            "danger" | "bad" | "high" | "critical" => RiskVerdict::Danger,
            "" | "unknown" => RiskVerdict::Unknown,
            other => RiskVerdict::Other(other.to_string()),
        }
    }

    pub fn as_label(&self) -> &str {
        match self {
            RiskVerdict::Good => "good",
            RiskVerdict::Warning => "warning",
            RiskVerdict::Danger => "danger",
            RiskVerdict::Unknown => "unknown",
            RiskVerdict::Other(label) => label,
        }
    }
}

impl fmt::Display for RiskVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Latest risk verdict for a contract. One row per contract, overwritten on re-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityCheck {
    pub contract_address: Address,
    /// None when the risk service produced no score
    pub risk_score: Option<f64>,
    pub verdict: RiskVerdict,
    pub top_holder_pct: f64,
    pub is_bundled: bool,
    pub checked_at: DateTime<Utc>,
}

impl SecurityCheck {
    /// Conservative record used whenever no real verdict is available
    pub fn unknown(contract_address: Address, checked_at: DateTime<Utc>) -> Self {
        Self {
            contract_address,
            risk_score: None,
            verdict: RiskVerdict::Unknown,
            top_holder_pct: 0.0,
            is_bundled: false,
            checked_at,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.verdict == RiskVerdict::Unknown && self.risk_score.is_none()
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxDirection {
    Buy,
    Sell,
}

impl TxDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxDirection::Buy => "buy",
            TxDirection::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(TxDirection::Buy),
            "sell" => Some(TxDirection::Sell),
            _ => None,
        }
    }
}

/// Raw trade row on a coin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub contract_address: Address,
    /// Unique per transaction
    pub tx_hash: String,
    pub direction: TxDirection,
    pub amount_eth: f64,
    pub gas_price: f64,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
}

/// Per-coin transaction statistics, recomputed on every analysis pass
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionAggregate {
    pub contract_address: Address,
    pub tx_count: u64,
    pub total_volume: f64,
    pub avg_gas: f64,
}

impl TransactionAggregate {
    /// Feature vector used by the anomaly detector
    pub fn features(&self) -> [f64; 3] {
        [self.tx_count as f64, self.total_volume, self.avg_gas]
    }
}
