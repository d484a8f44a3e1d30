//! Population-level trading analysis

pub mod anomaly;

pub use anomaly::AnomalyDetector;
