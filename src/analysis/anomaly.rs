//! Transaction anomaly detection
//!
//! Clusters per-coin trade aggregates (count, volume, average gas) with
//! DBSCAN after z-score normalization. Points left without a cluster are
//! outliers. The result is advisory: it only decorates alerts and analysis
//! output, it never gates a coin.

use smartcore::algorithm::neighbour::KNNAlgorithmName;
use smartcore::cluster::dbscan::{DBSCANParameters, DBSCAN};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::coin::TransactionAggregate;
use crate::storage::Store;

pub const DEFAULT_EPS: f64 = 0.5;
pub const DEFAULT_MIN_SAMPLES: usize = 3;

pub struct AnomalyDetector {
    store: Arc<dyn Store>,
    eps: f64,
    min_samples: usize,
}

impl AnomalyDetector {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_params(store, DEFAULT_EPS, DEFAULT_MIN_SAMPLES)
    }

    pub fn with_params(store: Arc<dyn Store>, eps: f64, min_samples: usize) -> Self {
        Self {
            store,
            eps,
            min_samples: min_samples.max(1),
        }
    }

    /// Contract addresses whose trading pattern falls outside every dense
    /// cluster. Empty when storage fails or there are too few samples.
    pub fn find_outliers(&self) -> HashSet<Address> {
        let aggregates = match self.store.aggregate_transactions() {
            Ok(aggregates) => aggregates,
            Err(e) => {
                warn!(error = %e, "Could not aggregate transactions, skipping anomaly pass");
                return HashSet::new();
            }
        };

        let outliers = self.detect(&aggregates);
        if !outliers.is_empty() {
            info!(
                outliers = outliers.len(),
                population = aggregates.len(),
                "Anomalous trading patterns detected"
            );
        }
        outliers
    }

    /// Run the clustering over an explicit population
    pub fn detect(&self, aggregates: &[TransactionAggregate]) -> HashSet<Address> {
        if aggregates.len() < self.min_samples {
            debug!(
                samples = aggregates.len(),
                min_samples = self.min_samples,
                "Not enough samples for anomaly detection"
            );
            return HashSet::new();
        }

        let rows = normalize(aggregates);
        let labels = match self.cluster(&rows) {
            Ok(labels) => labels,
            Err(e) => {
                warn!(error = %e, "Clustering failed, reporting no outliers");
                return HashSet::new();
            }
        };

        aggregates
            .iter()
            .zip(labels)
            .filter(|(_, label)| *label <= 0)
            .map(|(aggregate, _)| aggregate.contract_address)
            .collect()
    }

    /// Cluster labels per row; `0` (or negative) marks noise
    fn cluster(&self, rows: &[Vec<f64>]) -> Result<Vec<i32>, String> {
        let matrix = DenseMatrix::from_2d_vec(&rows.to_vec())
            .map_err(|e| format!("failed to build feature matrix: {}", e))?;

        let parameters = DBSCANParameters::default()
            .with_eps(self.eps)
            .with_min_samples(self.min_samples)
            .with_algorithm(KNNAlgorithmName::LinearSearch);

        let model = DBSCAN::fit(&matrix, parameters).map_err(|e| format!("fit failed: {}", e))?;
        let labels: Vec<i32> = model
            .predict(&matrix)
            .map_err(|e| format!("predict failed: {}", e))?;
        Ok(labels)
    }
}

/// Z-score each feature column. Constant columns collapse to zero.
fn normalize(aggregates: &[TransactionAggregate]) -> Vec<Vec<f64>> {
    let features: Vec<[f64; 3]> = aggregates.iter().map(TransactionAggregate::features).collect();
    let n = features.len() as f64;

    let mut means = [0.0; 3];
    let mut stds = [0.0; 3];
    for col in 0..3 {
        let mean = features.iter().map(|row| row[col]).sum::<f64>() / n;
        let variance = features
            .iter()
            .map(|row| (row[col] - mean).powi(2))
            .sum::<f64>()
            / n;
        means[col] = mean;
        stds[col] = variance.sqrt();
    }

    features
        .iter()
        .map(|row| {
            (0..3)
                .map(|col| {
                    if stds[col] > f64::EPSILON {
                        (row[col] - means[col]) / stds[col]
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::{TransactionRecord, TxDirection};
    use crate::storage::SqliteStore;
    use chrono::Utc;

    fn address(n: u64) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    fn aggregate(n: u64, tx_count: u64, total_volume: f64, avg_gas: f64) -> TransactionAggregate {
        TransactionAggregate {
            contract_address: address(n),
            tx_count,
            total_volume,
            avg_gas,
        }
    }

    fn detector() -> AnomalyDetector {
        AnomalyDetector::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    #[test]
    fn test_empty_population() {
        assert!(detector().detect(&[]).is_empty());
        assert!(detector().find_outliers().is_empty());
    }

    #[test]
    fn test_too_few_samples() {
        let population = vec![aggregate(1, 10, 1.0, 20.0), aggregate(2, 900, 500.0, 300.0)];
        assert!(detector().detect(&population).is_empty());
    }

    #[test]
    fn test_isolated_point_is_outlier() {
        let mut population: Vec<_> = (1..=6)
            .map(|n| aggregate(n, 10 + n % 2, 1.0 + n as f64 * 0.01, 20.0 + (n % 3) as f64 * 0.1))
            .collect();
        population.push(aggregate(99, 5_000, 800.0, 350.0));

        let outliers = detector().detect(&population);
        assert_eq!(outliers.len(), 1);
        assert!(outliers.contains(&address(99)));
    }

    #[test]
    fn test_normalize_constant_column() {
        let rows = normalize(&[aggregate(1, 5, 1.0, 20.0), aggregate(2, 5, 3.0, 20.0)]);
        assert_eq!(rows[0][0], 0.0);
        assert_eq!(rows[0][2], 0.0);
        assert!((rows[0][1] + 1.0).abs() < 1e-9);
        assert!((rows[1][1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_find_outliers_reads_store() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let trade = |contract: Address, hash: &str| TransactionRecord {
            contract_address: contract,
            tx_hash: hash.to_string(),
            direction: TxDirection::Buy,
            amount_eth: 0.1,
            gas_price: 20.0,
            block_number: 1,
            timestamp: Utc::now(),
        };
        store
            .insert_transactions(&[trade(address(1), "0x01"), trade(address(2), "0x02")])
            .unwrap();

        // two coins is below the sample floor
        let detector = AnomalyDetector::new(store);
        assert!(detector.find_outliers().is_empty());
    }
}
