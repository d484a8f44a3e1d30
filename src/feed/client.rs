//! Pump.fun migrations API client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::address::Address;
use crate::coin::TransactionRecord;
use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::feed::parser::parse_transaction;

/// Upstream market-data feed
#[async_trait]
pub trait CoinFeed: Send + Sync {
    /// Most recent migrations, newest first, as raw records
    async fn fetch_migrated_coins(&self, limit: u32) -> Result<Vec<Value>>;

    /// Recent trades on one coin. Feeds without trade data return nothing.
    async fn fetch_transactions(&self, _contract: &Address, _limit: u32) -> Result<Vec<TransactionRecord>> {
        Ok(Vec::new())
    }
}

/// HTTP client for the migrations endpoint
pub struct PumpFunClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl PumpFunClient {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let mut request = self.client.get(url).query(query);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::FeedPayload(format!("invalid JSON from {}: {}", url, e)))
    }
}

/// Server-side and throttling failures are transient; other statuses mean
/// the request itself is wrong (bad key, removed endpoint)
fn classify_status(status: StatusCode, body: &str) -> Error {
    let snippet: String = body.chars().take(200).collect();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Error::FeedTransport(format!("HTTP {}: {}", status, snippet))
    } else {
        Error::FeedPayload(format!("HTTP {}: {}", status, snippet))
    }
}

/// Pull the `data` array out of an envelope. A missing array means no records.
pub fn extract_records(payload: Value) -> Result<Vec<Value>> {
    match payload {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(records)) => Ok(records),
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(other) => Err(Error::FeedPayload(format!(
                "'data' is not an array: {}",
                other
            ))),
        },
        Value::Array(records) => Ok(records),
        other => Err(Error::FeedPayload(format!(
            "unexpected payload type: {}",
            other
        ))),
    }
}

#[async_trait]
impl CoinFeed for PumpFunClient {
    async fn fetch_migrated_coins(&self, limit: u32) -> Result<Vec<Value>> {
        let url = format!("{}/migrations", self.api_base);
        let payload = self
            .get_json(&url, &[("limit", limit.to_string()), ("sort", "desc".to_string())])
            .await?;

        let records = extract_records(payload)?;
        debug!(count = records.len(), "Fetched migrated coins");
        Ok(records)
    }

    async fn fetch_transactions(&self, contract: &Address, limit: u32) -> Result<Vec<TransactionRecord>> {
        let url = format!("{}/coins/{}/trades", self.api_base, contract);
        let payload = self.get_json(&url, &[("limit", limit.to_string())]).await?;

        let mut trades = Vec::new();
        for raw in extract_records(payload)? {
            match parse_transaction(&raw, contract) {
                Ok(trade) => trades.push(trade),
                Err(e) => warn!(contract = %contract, error = %e, "Skipping malformed trade"),
            }
        }
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_records() {
        assert_eq!(extract_records(json!({ "data": [1, 2] })).unwrap().len(), 2);
        assert!(extract_records(json!({ "status": "ok" })).unwrap().is_empty());
        assert_eq!(extract_records(json!([{}])).unwrap().len(), 1);
        assert!(matches!(
            extract_records(json!({ "data": "nope" })),
            Err(Error::FeedPayload(_))
        ));
        assert!(matches!(extract_records(json!(42)), Err(Error::FeedPayload(_))));
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "bad key"),
            Error::FeedPayload(_)
        ));
    }

    #[test]
    fn test_api_base_trailing_slash() {
        let config = FeedConfig {
            api_base: "https://api.example.com/".to_string(),
            ..FeedConfig::default()
        };
        let client = PumpFunClient::new(&config).unwrap();
        assert_eq!(client.api_base, "https://api.example.com");
    }
}
