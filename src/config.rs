//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

use crate::filter::policy::{FilterPolicy, MAX_BLOCK_NEW_COINS_MINUTES};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub blacklists: BlacklistConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    /// Records requested per poll
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Pull the trades of accepted coins into the transactions table
    #[serde(default)]
    pub fetch_transactions: bool,
    #[serde(default = "default_transactions_limit")]
    pub transactions_limit: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: String::new(),
            fetch_limit: default_fetch_limit(),
            request_timeout_secs: default_request_timeout_secs(),
            fetch_transactions: false,
            transactions_limit: default_transactions_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Wait after a failed cycle; must exceed the poll interval
    #[serde(default = "default_error_cooldown_secs")]
    pub error_cooldown_secs: u64,
    /// Records processed concurrently within a cycle
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Alerts delivered concurrently within a cycle
    #[serde(default = "default_alert_concurrency")]
    pub alert_concurrency: usize,
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            error_cooldown_secs: default_error_cooldown_secs(),
            worker_count: default_worker_count(),
            alert_concurrency: default_alert_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: f64,
    #[serde(default = "default_max_creator_fee")]
    pub max_creator_fee: f64,
    #[serde(default = "default_min_holders")]
    pub min_holders: u64,
    #[serde(default = "default_block_new_coins_minutes")]
    pub block_new_coins_minutes: u64,
    #[serde(default = "default_max_coins_per_creator")]
    pub max_coins_per_creator: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_liquidity: default_min_liquidity(),
            max_creator_fee: default_max_creator_fee(),
            min_holders: default_min_holders(),
            block_new_coins_minutes: default_block_new_coins_minutes(),
            max_coins_per_creator: default_max_coins_per_creator(),
        }
    }
}

impl FilterConfig {
    /// Freeze into the policy snapshot used for a run
    pub fn policy(&self) -> FilterPolicy {
        FilterPolicy {
            min_liquidity: self.min_liquidity,
            max_creator_fee: self.max_creator_fee,
            min_holders: self.min_holders,
            block_new_coins_minutes: self.block_new_coins_minutes,
            max_coins_per_creator: self.max_coins_per_creator,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlacklistConfig {
    #[serde(default, deserialize_with = "string_list")]
    pub coin_addresses: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub creator_addresses: Vec<String>,
    #[serde(default)]
    pub coin_blacklist_url: Option<String>,
    #[serde(default)]
    pub creator_blacklist_url: Option<String>,
    #[serde(default = "default_blacklist_refresh_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            coin_addresses: vec![],
            creator_addresses: vec![],
            coin_blacklist_url: None,
            creator_blacklist_url: None,
            refresh_interval_secs: default_blacklist_refresh_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_etherscan_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_etherscan_url(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rugcheck_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Top-holder share (0..1) at which a coin counts as bundled
    #[serde(default = "default_bundled_threshold")]
    pub bundled_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_rugcheck_url(),
            api_key: String::new(),
            bundled_threshold: default_bundled_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub channel_id: String,
    /// Upper bound on time spent retrying a single alert
    #[serde(default = "default_max_retry_secs")]
    pub max_retry_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            channel_id: String::new(),
            max_retry_secs: default_max_retry_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Accept either a TOML list or a comma-separated string
fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        String(String),
    }

    let items = match ListOrString::deserialize(deserializer)? {
        ListOrString::List(items) => items,
        ListOrString::String(s) => s.split(',').map(str::to_string).collect(),
    };

    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

// Default value functions
fn default_api_base() -> String {
    std::env::var("PUMPFUN_API_BASE").unwrap_or_else(|_| "https://api.pump.fun".into())
}

fn default_fetch_limit() -> u32 {
    10
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_transactions_limit() -> u32 {
    100
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_error_cooldown_secs() -> u64 {
    120
}

fn default_worker_count() -> usize {
    4
}

fn default_alert_concurrency() -> usize {
    4
}

fn default_min_liquidity() -> f64 {
    5.0
}

fn default_max_creator_fee() -> f64 {
    10.0
}

fn default_min_holders() -> u64 {
    25
}

fn default_block_new_coins_minutes() -> u64 {
    10
}

fn default_max_coins_per_creator() -> u64 {
    3
}

fn default_blacklist_refresh_secs() -> u64 {
    600
}

fn default_etherscan_url() -> String {
    "https://api.etherscan.io/api".into()
}

fn default_rugcheck_url() -> String {
    "https://api.rugcheck.xyz/v1".into()
}

fn default_bundled_threshold() -> f64 {
    0.65
}

fn default_max_retry_secs() -> u64 {
    30
}

fn default_db_path() -> String {
    "pumpfun.db".into()
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("scheduler.poll_interval_secs", default_poll_interval_secs() as i64)?
            .set_default("scheduler.error_cooldown_secs", default_error_cooldown_secs() as i64)?
            .set_default("database.path", default_db_path())?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SCOUT_)
            .add_source(
                config::Environment::with_prefix("SCOUT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be positive");
        }

        if self.scheduler.error_cooldown_secs <= self.scheduler.poll_interval_secs {
            anyhow::bail!(
                "error_cooldown_secs ({}) must be greater than poll_interval_secs ({})",
                self.scheduler.error_cooldown_secs,
                self.scheduler.poll_interval_secs
            );
        }

        if self.scheduler.worker_count == 0 || self.scheduler.alert_concurrency == 0 {
            anyhow::bail!("worker_count and alert_concurrency must be at least 1");
        }

        if self.feed.fetch_limit == 0 {
            anyhow::bail!("fetch_limit must be at least 1");
        }

        // Validate filter thresholds
        if self.filters.min_liquidity < 0.0 || !self.filters.min_liquidity.is_finite() {
            anyhow::bail!("min_liquidity must be a non-negative number");
        }

        if self.filters.max_creator_fee < 0.0 || !self.filters.max_creator_fee.is_finite() {
            anyhow::bail!("max_creator_fee must be a non-negative number");
        }

        if self.filters.block_new_coins_minutes > MAX_BLOCK_NEW_COINS_MINUTES {
            anyhow::bail!(
                "block_new_coins_minutes ({}) exceeds the maximum of {}",
                self.filters.block_new_coins_minutes,
                MAX_BLOCK_NEW_COINS_MINUTES
            );
        }

        if !(0.0..=1.0).contains(&self.risk.bundled_threshold) {
            anyhow::bail!("bundled_threshold must be between 0 and 1");
        }

        // Validate collaborator endpoints
        url::Url::parse(&self.feed.api_base)
            .with_context(|| format!("Invalid feed api_base: {}", self.feed.api_base))?;

        for blacklist_url in [
            &self.blacklists.coin_blacklist_url,
            &self.blacklists.creator_blacklist_url,
        ]
        .into_iter()
        .flatten()
        {
            url::Url::parse(blacklist_url)
                .with_context(|| format!("Invalid blacklist url: {}", blacklist_url))?;
        }

        if self.verification.enabled {
            url::Url::parse(&self.verification.api_url)
                .with_context(|| format!("Invalid verification api_url: {}", self.verification.api_url))?;
        }

        if self.risk.enabled {
            url::Url::parse(&self.risk.api_url)
                .with_context(|| format!("Invalid risk api_url: {}", self.risk.api_url))?;
        }

        if self.notification.enabled
            && (self.notification.bot_token.is_empty() || self.notification.channel_id.is_empty())
        {
            anyhow::bail!("notification enabled but bot_token or channel_id is missing");
        }

        if self.verification.enabled && self.verification.api_key.is_empty() {
            tracing::warn!("Verification enabled without api_key - every lookup will report unverified");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Feed:
    api_base: {}
    api_key: {}
    fetch_limit: {}
    fetch_transactions: {}
  Scheduler:
    poll_interval: {}s
    error_cooldown: {}s
    workers: {}
    alert_concurrency: {}
  Filters:
    min_liquidity: {}
    max_creator_fee: {}%
    min_holders: {}
    block_new_coins: {}min
    max_coins_per_creator: {}
  Blacklists:
    coins: {} (url: {})
    creators: {} (url: {})
  Verification:
    enabled: {}
    api_key: {}
  Risk:
    enabled: {}
    api_url: {}
    bundled_threshold: {}
  Notification:
    enabled: {}
    bot_token: {}
    channel_id: {}
  Database:
    path: {}
"#,
            mask_url(&self.feed.api_base),
            mask_secret(&self.feed.api_key),
            self.feed.fetch_limit,
            self.feed.fetch_transactions,
            self.scheduler.poll_interval_secs,
            self.scheduler.error_cooldown_secs,
            self.scheduler.worker_count,
            self.scheduler.alert_concurrency,
            self.filters.min_liquidity,
            self.filters.max_creator_fee,
            self.filters.min_holders,
            self.filters.block_new_coins_minutes,
            self.filters.max_coins_per_creator,
            self.blacklists.coin_addresses.len(),
            self.blacklists
                .coin_blacklist_url
                .as_deref()
                .map(mask_url)
                .unwrap_or_else(|| "(not set)".to_string()),
            self.blacklists.creator_addresses.len(),
            self.blacklists
                .creator_blacklist_url
                .as_deref()
                .map(mask_url)
                .unwrap_or_else(|| "(not set)".to_string()),
            self.verification.enabled,
            mask_secret(&self.verification.api_key),
            self.risk.enabled,
            mask_url(&self.risk.api_url),
            self.risk.bundled_threshold,
            self.notification.enabled,
            mask_secret(&self.notification.bot_token),
            self.notification.channel_id,
            self.database.path,
        )
    }
}

fn mask_secret(secret: &str) -> &'static str {
    if secret.is_empty() {
        "(not set)"
    } else {
        "***"
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            scheduler: SchedulerConfig::default(),
            filters: FilterConfig::default(),
            blacklists: BlacklistConfig::default(),
            verification: VerificationConfig::default(),
            risk: RiskConfig::default(),
            notification: NotificationConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}
