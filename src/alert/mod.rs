//! Alert dispatch
//!
//! Accepted coins are announced after they are persisted. Dispatch runs with
//! bounded concurrency; each message is retried with exponential backoff for
//! at most the configured window, then dropped with a log line.

pub mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::coin::{Coin, SecurityCheck};
use crate::error::Result;

/// Notification collaborator
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, message: &str) -> Result<()>;
}

/// Writes alerts to the log when no channel is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, message: &str) -> Result<()> {
        info!(target: "migration_scout::alert", "{}", message.replace('\n', " | "));
        Ok(())
    }
}

/// Human-readable alert for an accepted coin
pub fn format_alert(coin: &Coin, check: &SecurityCheck, is_outlier: bool) -> String {
    let mut message = format!(
        "New coin found:\nSymbol: {}\nName: {}\nContract: {}\nCreator: {}\nLiquidity: {:.4} ETH\nCreator fee: {:.2}%\nHolders: {}\nVerified: {}",
        coin.symbol,
        coin.name,
        coin.contract_address,
        coin.creator,
        coin.initial_liquidity,
        coin.creator_fee,
        coin.holders,
        if coin.is_verified { "yes" } else { "no" },
    );

    match check.risk_score {
        Some(score) => message.push_str(&format!("\nRisk: {} (score {:.1})", check.verdict, score)),
        None => message.push_str(&format!("\nRisk: {}", check.verdict)),
    }
    if check.is_bundled {
        message.push_str(&format!(
            "\nWARNING: bundled supply (top holder {:.1}%)",
            check.top_holder_pct * 100.0
        ));
    }
    if is_outlier {
        message.push_str("\nWARNING: anomalous trading pattern");
    }
    message
}

/// Counts for one dispatch round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    concurrency: usize,
    max_retry: Duration,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, concurrency: usize, max_retry: Duration) -> Self {
        Self {
            notifier,
            concurrency: concurrency.max(1),
            max_retry,
        }
    }

    /// Send every message, at most `concurrency` at a time. Never fails.
    pub async fn dispatch(&self, messages: Vec<String>) -> DispatchReport {
        if messages.is_empty() {
            return DispatchReport::default();
        }

        let outcomes: Vec<bool> = stream::iter(messages)
            .map(|message| async move { self.send(&message).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let sent = outcomes.iter().filter(|ok| **ok).count();
        let report = DispatchReport {
            sent,
            failed: outcomes.len() - sent,
        };
        debug!(sent = report.sent, failed = report.failed, notifier = self.notifier.name(), "Alerts dispatched");
        report
    }

    async fn send(&self, message: &str) -> bool {
        let backoff = ExponentialBackoff {
            initial_interval: (self.max_retry / 8).clamp(Duration::from_millis(10), Duration::from_millis(500)),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(self.max_retry),
            ..Default::default()
        };

        let result = retry(backoff, || async {
            match self.notifier.notify(message).await {
                Ok(()) => Ok(()),
                Err(e) if e.is_retryable() => {
                    debug!(notifier = self.notifier.name(), error = %e, "Retrying alert");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(notifier = self.notifier.name(), error = %e, "Alert dropped");
                false
            }
        }
    }
}
