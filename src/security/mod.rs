//! Security evaluation
//!
//! Attaches a risk verdict to every coin that clears the guard. The risk
//! service is optional: when it is disabled or failing the evaluator records a
//! conservative `unknown` verdict instead of blocking the coin, so the gap
//! stays visible in the stored row.

pub mod etherscan;
pub mod rugcheck;

pub use etherscan::EtherscanVerifier;
pub use rugcheck::RugCheckClient;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::coin::{Coin, RiskVerdict, SecurityCheck};
use crate::error::Result;
use crate::storage::Store;

/// Raw answer of a risk-scoring service
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    pub score: f64,
    #[serde(alias = "riskLevel", default)]
    pub verdict: String,
    /// Share held by the largest holder, 0..1 (percent values are rescaled)
    #[serde(alias = "topHolderPercent", default)]
    pub top_holder_pct: f64,
    #[serde(default)]
    pub is_bundled: bool,
}

/// Risk-scoring collaborator
#[async_trait]
pub trait RiskScorer: Send + Sync {
    async fn score_contract(&self, address: &Address) -> Result<RiskReport>;
}

/// Contract source verification collaborator
#[async_trait]
pub trait ContractVerifier: Send + Sync {
    async fn is_contract_verified(&self, address: &Address) -> Result<bool>;
}

/// Produces and stores the latest security check per contract
pub struct SecurityEvaluator {
    scorer: Option<Arc<dyn RiskScorer>>,
    store: Arc<dyn Store>,
    bundled_threshold: f64,
}

impl SecurityEvaluator {
    pub fn new(scorer: Option<Arc<dyn RiskScorer>>, store: Arc<dyn Store>, bundled_threshold: f64) -> Self {
        if scorer.is_none() {
            info!("Risk scoring disabled - security checks will be recorded as unknown");
        }

        Self {
            scorer,
            store,
            bundled_threshold,
        }
    }

    /// Evaluate a coin. Never fails: collaborator and storage problems are
    /// logged and the check is still returned.
    pub async fn evaluate(&self, coin: &Coin) -> SecurityCheck {
        let contract = coin.contract_address;

        let check = match &self.scorer {
            None => SecurityCheck::unknown(contract, Utc::now()),
            Some(scorer) => match scorer.score_contract(&contract).await {
                Ok(report) => self.check_from_report(contract, report),
                Err(e) => {
                    warn!(
                        contract = %contract,
                        error = %e,
                        "Risk service unavailable, recording unknown verdict"
                    );
                    SecurityCheck::unknown(contract, Utc::now())
                }
            },
        };

        if let Err(e) = self.store.upsert_security_check(&check) {
            warn!(contract = %contract, error = %e, "Failed to store security check");
        }

        debug!(
            contract = %contract,
            verdict = %check.verdict,
            score = ?check.risk_score,
            bundled = check.is_bundled,
            "Security check complete"
        );
        check
    }

    fn check_from_report(&self, contract: Address, report: RiskReport) -> SecurityCheck {
        let top_holder_pct = normalize_share(report.top_holder_pct);
        let is_bundled = report.is_bundled || top_holder_pct >= self.bundled_threshold;

        SecurityCheck {
            contract_address: contract,
            risk_score: report.score.is_finite().then_some(report.score),
            verdict: RiskVerdict::from_label(&report.verdict),
            top_holder_pct,
            is_bundled,
            checked_at: Utc::now(),
        }
    }
}

/// Services disagree on 0..1 vs 0..100; anything above 1 is a percent
fn normalize_share(value: f64) -> f64 {
    if !value.is_finite() || value < 0.0 {
        0.0
    } else if value > 1.0 {
        (value / 100.0).min(1.0)
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::SqliteStore;
    use chrono::Duration;

    const CONTRACT: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    struct FixedScorer(RiskReport);

    #[async_trait]
    impl RiskScorer for FixedScorer {
        async fn score_contract(&self, _: &Address) -> Result<RiskReport> {
            Ok(self.0.clone())
        }
    }

    struct DownScorer;

    #[async_trait]
    impl RiskScorer for DownScorer {
        async fn score_contract(&self, _: &Address) -> Result<RiskReport> {
            Err(Error::unavailable("risk", "503 Service Unavailable"))
        }
    }

    fn coin() -> Coin {
        Coin {
            contract_address: Address::parse(CONTRACT).unwrap(),
            name: "Test".into(),
            symbol: "TST".into(),
            creator: Address::zero(),
            migration_time: Utc::now() - Duration::hours(1),
            initial_liquidity: 10.0,
            creator_fee: 1.0,
            holders: 30,
            is_verified: false,
        }
    }

    #[tokio::test]
    async fn test_service_down_yields_unknown_record() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let evaluator = SecurityEvaluator::new(Some(Arc::new(DownScorer)), store.clone(), 0.65);

        let check = evaluator.evaluate(&coin()).await;
        assert!(check.is_unknown());
        assert!(!check.is_bundled);

        let stored = store.get_security_check(&coin().contract_address).unwrap().unwrap();
        assert!(stored.is_unknown());
    }

    #[tokio::test]
    async fn test_disabled_scorer_yields_unknown() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let evaluator = SecurityEvaluator::new(None, store, 0.65);
        assert!(evaluator.evaluate(&coin()).await.is_unknown());
    }

    #[tokio::test]
    async fn test_report_mapped_and_overwritten() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let first = SecurityEvaluator::new(Some(Arc::new(DownScorer)), store.clone(), 0.65);
        first.evaluate(&coin()).await;

        let report = RiskReport {
            score: 92.0,
            verdict: "Good".into(),
            top_holder_pct: 12.0,
            is_bundled: false,
        };
        let second = SecurityEvaluator::new(Some(Arc::new(FixedScorer(report))), store.clone(), 0.65);
        let check = second.evaluate(&coin()).await;

        assert_eq!(check.verdict, RiskVerdict::Good);
        assert_eq!(check.risk_score, Some(92.0));
        assert!((check.top_holder_pct - 0.12).abs() < 1e-9);

        let stored = store.get_security_check(&coin().contract_address).unwrap().unwrap();
        assert_eq!(stored.verdict, RiskVerdict::Good);
        assert_eq!(store.stats().unwrap().security_checks, 1);
    }

    #[tokio::test]
    async fn test_bundled_threshold() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let report = RiskReport {
            score: 40.0,
            verdict: "warning".into(),
            top_holder_pct: 0.7,
            is_bundled: false,
        };
        let evaluator = SecurityEvaluator::new(Some(Arc::new(FixedScorer(report))), store, 0.65);
        assert!(evaluator.evaluate(&coin()).await.is_bundled);
    }

    #[test]
    fn test_report_deserialize_aliases() {
        let report: RiskReport = serde_json::from_str(
            r#"{"score": 55.5, "riskLevel": "danger", "topHolderPercent": 80, "isBundled": true}"#,
        )
        .unwrap();
        assert_eq!(report.verdict, "danger");
        assert_eq!(report.top_holder_pct, 80.0);
        assert!(report.is_bundled);
    }

    #[test]
    fn test_normalize_share() {
        assert_eq!(normalize_share(0.3), 0.3);
        assert_eq!(normalize_share(30.0), 0.3);
        assert_eq!(normalize_share(-1.0), 0.0);
        assert_eq!(normalize_share(f64::NAN), 0.0);
    }
}
