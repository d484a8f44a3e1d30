//! Etherscan contract verification
//!
//! A contract counts as verified when `getabi` answers with status `"1"`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::address::Address;
use crate::config::VerificationConfig;
use crate::error::{Error, Result};
use crate::security::ContractVerifier;

const SERVICE: &str = "verification";

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
}

impl EtherscanResponse {
    fn is_verified(&self) -> bool {
        self.status == "1"
    }
}

pub struct EtherscanVerifier {
    client: Client,
    api_url: String,
    api_key: String,
}

impl EtherscanVerifier {
    pub fn new(config: &VerificationConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ContractVerifier for EtherscanVerifier {
    async fn is_contract_verified(&self, address: &Address) -> Result<bool> {
        let address_str = address.to_string();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("module", "contract"),
                ("action", "getabi"),
                ("address", address_str.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::unavailable(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(Error::unavailable(SERVICE, format!("HTTP {}", response.status())));
        }

        let body = response
            .json::<EtherscanResponse>()
            .await
            .map_err(|e| Error::unavailable(SERVICE, format!("bad response: {}", e)))?;

        debug!(contract = %address, status = %body.status, message = %body.message, "getabi answered");
        Ok(body.is_verified())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let ok: EtherscanResponse =
            serde_json::from_str(r#"{"status":"1","message":"OK","result":"[]"}"#).unwrap();
        assert!(ok.is_verified());

        let not: EtherscanResponse = serde_json::from_str(
            r#"{"status":"0","message":"NOTOK","result":"Contract source code not verified"}"#,
        )
        .unwrap();
        assert!(!not.is_verified());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let config = VerificationConfig {
            enabled: true,
            api_url: "http://127.0.0.1:9/api".to_string(),
            api_key: String::new(),
        };
        let verifier = EtherscanVerifier::new(&config, Duration::from_millis(500)).unwrap();
        let err = verifier.is_contract_verified(&Address::zero()).await.unwrap_err();
        assert!(matches!(err, Error::CollaboratorUnavailable { .. }));
    }
}
