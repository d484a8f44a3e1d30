//! Coin and creator blacklists
//!
//! Static entries come from configuration. Optional remote lists are pulled
//! through a [`BlacklistSource`] on a refresh cadence; a failed refresh keeps
//! the last-known remote entries for that list.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::config::BlacklistConfig;
use crate::error::{Error, Result};

/// Snapshot of both blacklists. Lookups are O(1) on normalized addresses.
#[derive(Debug, Clone, Default)]
pub struct BlacklistSet {
    coins: HashSet<Address>,
    creators: HashSet<Address>,
}

impl BlacklistSet {
    pub fn new(coins: HashSet<Address>, creators: HashSet<Address>) -> Self {
        Self { coins, creators }
    }

    /// Build from raw strings, skipping entries that are not addresses
    pub fn from_strings(coins: &[String], creators: &[String]) -> Self {
        Self {
            coins: parse_addresses(coins, "coin"),
            creators: parse_addresses(creators, "creator"),
        }
    }

    pub fn is_coin_blacklisted(&self, address: &Address) -> bool {
        self.coins.contains(address)
    }

    pub fn is_creator_blacklisted(&self, address: &Address) -> bool {
        self.creators.contains(address)
    }

    pub fn coin_count(&self) -> usize {
        self.coins.len()
    }

    pub fn creator_count(&self) -> usize {
        self.creators.len()
    }
}

fn parse_addresses(raw: &[String], kind: &str) -> HashSet<Address> {
    raw.iter()
        .filter_map(|entry| match Address::parse(entry) {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!(kind = %kind, entry = %entry, error = %e, "Skipping invalid blacklist entry");
                None
            }
        })
        .collect()
}

/// Remote provider of blacklisted addresses
#[async_trait]
pub trait BlacklistSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &str;

    /// Fetch the full current list
    async fn fetch(&self) -> Result<Vec<String>>;
}

/// Blacklist served over HTTP, either as a JSON array of strings or as plain
/// text with one address per line (commas also accepted)
pub struct HttpBlacklistSource {
    client: Client,
    url: String,
}

impl HttpBlacklistSource {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }
}

/// Split a blacklist body into address candidates
pub fn parse_blacklist_body(body: &str) -> Vec<String> {
    if let Ok(list) = serde_json::from_str::<Vec<String>>(body) {
        return list;
    }

    body.lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .flat_map(|line| line.split(','))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[async_trait]
impl BlacklistSource for HttpBlacklistSource {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::unavailable("blacklist", e))?;

        if !response.status().is_success() {
            return Err(Error::unavailable(
                "blacklist",
                format!("HTTP {}", response.status()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::unavailable("blacklist", e))?;

        Ok(parse_blacklist_body(&body))
    }
}

/// Remote list plus its last successful result
struct RemoteList {
    source: Arc<dyn BlacklistSource>,
    last_known: RwLock<HashSet<Address>>,
}

/// Refreshing blacklist holder shared by the guard
pub struct Blacklist {
    static_set: BlacklistSet,
    coin_remote: Option<RemoteList>,
    creator_remote: Option<RemoteList>,
    current: RwLock<Arc<BlacklistSet>>,
    refresh_interval: Duration,
    last_refresh: RwLock<Option<Instant>>,
}

impl Blacklist {
    /// Blacklist with only static entries
    pub fn fixed(set: BlacklistSet) -> Self {
        Self {
            static_set: set.clone(),
            coin_remote: None,
            creator_remote: None,
            current: RwLock::new(Arc::new(set)),
            refresh_interval: Duration::MAX,
            last_refresh: RwLock::new(None),
        }
    }

    /// Blacklist with static entries and optional remote sources
    pub fn with_sources(
        static_set: BlacklistSet,
        coin_source: Option<Arc<dyn BlacklistSource>>,
        creator_source: Option<Arc<dyn BlacklistSource>>,
        refresh_interval: Duration,
    ) -> Self {
        let remote = |source: Arc<dyn BlacklistSource>| RemoteList {
            source,
            last_known: RwLock::new(HashSet::new()),
        };

        Self {
            current: RwLock::new(Arc::new(static_set.clone())),
            static_set,
            coin_remote: coin_source.map(remote),
            creator_remote: creator_source.map(remote),
            refresh_interval,
            last_refresh: RwLock::new(None),
        }
    }

    /// Build from configuration, wiring HTTP sources for configured URLs
    pub fn from_config(config: &BlacklistConfig, timeout: Duration) -> Result<Self> {
        let static_set = BlacklistSet::from_strings(&config.coin_addresses, &config.creator_addresses);

        let coin_source = match &config.coin_blacklist_url {
            Some(url) => Some(Arc::new(HttpBlacklistSource::new(url.clone(), timeout)?)
                as Arc<dyn BlacklistSource>),
            None => None,
        };
        let creator_source = match &config.creator_blacklist_url {
            Some(url) => Some(Arc::new(HttpBlacklistSource::new(url.clone(), timeout)?)
                as Arc<dyn BlacklistSource>),
            None => None,
        };

        info!(
            coins = static_set.coin_count(),
            creators = static_set.creator_count(),
            remote_coins = coin_source.is_some(),
            remote_creators = creator_source.is_some(),
            "Blacklists loaded"
        );

        Ok(Self::with_sources(
            static_set,
            coin_source,
            creator_source,
            Duration::from_secs(config.refresh_interval_secs),
        ))
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> Arc<BlacklistSet> {
        self.current.read().await.clone()
    }

    fn has_remote(&self) -> bool {
        self.coin_remote.is_some() || self.creator_remote.is_some()
    }

    /// Refresh remote lists when the interval has elapsed
    pub async fn refresh_if_due(&self) {
        if !self.has_remote() {
            return;
        }

        let due = match *self.last_refresh.read().await {
            Some(at) => at.elapsed() >= self.refresh_interval,
            None => true,
        };

        if due {
            self.refresh().await;
        }
    }

    /// Refresh remote lists now. Never fails: a source error keeps its
    /// last-known entries.
    pub async fn refresh(&self) {
        if let Some(remote) = &self.coin_remote {
            refresh_remote(remote, "coin").await;
        }
        if let Some(remote) = &self.creator_remote {
            refresh_remote(remote, "creator").await;
        }

        let mut coins = self.static_set.coins.clone();
        let mut creators = self.static_set.creators.clone();
        if let Some(remote) = &self.coin_remote {
            coins.extend(remote.last_known.read().await.iter().copied());
        }
        if let Some(remote) = &self.creator_remote {
            creators.extend(remote.last_known.read().await.iter().copied());
        }

        let merged = BlacklistSet::new(coins, creators);
        debug!(
            coins = merged.coin_count(),
            creators = merged.creator_count(),
            "Blacklist snapshot updated"
        );

        *self.current.write().await = Arc::new(merged);
        *self.last_refresh.write().await = Some(Instant::now());
    }
}

async fn refresh_remote(remote: &RemoteList, kind: &str) {
    match remote.source.fetch().await {
        Ok(entries) => {
            let parsed = parse_addresses(&entries, kind);
            let count = parsed.len();
            *remote.last_known.write().await = parsed;
            info!(
                kind = %kind,
                source = %remote.source.name(),
                entries = count,
                "Remote blacklist refreshed"
            );
        }
        Err(e) => {
            let kept = remote.last_known.read().await.len();
            warn!(
                kind = %kind,
                source = %remote.source.name(),
                error = %e,
                kept,
                "Blacklist refresh failed, keeping last-known list"
            );
        }
    }
}
