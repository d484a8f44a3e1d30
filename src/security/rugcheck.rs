//! HTTP risk-scoring client
//!
//! Queries `{api_url}/tokens/{address}/report`. Any transport failure, non-2xx
//! status or undecodable body is reported as the risk service being
//! unavailable.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::address::Address;
use crate::config::RiskConfig;
use crate::error::{Error, Result};
use crate::security::{RiskReport, RiskScorer};

const SERVICE: &str = "risk";

pub struct RugCheckClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl RugCheckClient {
    pub fn new(config: &RiskConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn report_url(&self, address: &Address) -> String {
        format!("{}/tokens/{}/report", self.api_url, address)
    }
}

#[async_trait]
impl RiskScorer for RugCheckClient {
    async fn score_contract(&self, address: &Address) -> Result<RiskReport> {
        let url = self.report_url(address);
        let mut request = self.client.get(&url);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::unavailable(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::unavailable(SERVICE, format!("HTTP {}", status)));
        }

        let report = response
            .json::<RiskReport>()
            .await
            .map_err(|e| Error::unavailable(SERVICE, format!("bad report: {}", e)))?;

        debug!(contract = %address, score = report.score, verdict = %report.verdict, "Risk report received");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_url() {
        let config = RiskConfig {
            api_url: "https://risk.example.com/v1/".to_string(),
            ..RiskConfig::default()
        };
        let client = RugCheckClient::new(&config, Duration::from_secs(5)).unwrap();
        let address = Address::parse("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(
            client.report_url(&address),
            "https://risk.example.com/v1/tokens/0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed/report"
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let config = RiskConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            ..RiskConfig::default()
        };
        let client = RugCheckClient::new(&config, Duration::from_millis(500)).unwrap();
        let err = client.score_contract(&Address::zero()).await.unwrap_err();
        assert!(matches!(err, Error::CollaboratorUnavailable { .. }));
    }
}
