//! Discovery pipeline
//!
//! One poll cycle: fetch migrations, then per record
//! parse → dedupe → guard → verify → security → filter → persist,
//! records running concurrently on a bounded pool. After the batch the
//! anomaly pass runs once and alerts go out for the accepted coins.
//!
//! A record holds its creator's lock from the guard until its row is
//! written, so coins from one creator in the same batch see each other's
//! writes when the throttle is counted.

pub mod scheduler;

pub use scheduler::{PollCycle, Scheduler, SchedulerState, SchedulerSummary, StateHandle};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::address::Address;
use crate::alert::{format_alert, AlertDispatcher, LogNotifier, Notifier, TelegramNotifier};
use crate::analysis::AnomalyDetector;
use crate::coin::{Coin, SecurityCheck};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::feed::{parse_coin, CoinFeed, PumpFunClient};
use crate::filter::{Blacklist, CreatorLocks, FilterPolicy, FilterReason, FilterResult, Guard, GuardVerdict, RejectReason};
use crate::security::{ContractVerifier, EtherscanVerifier, RiskScorer, RugCheckClient, SecurityEvaluator};
use crate::storage::{SqliteStore, Store, UpsertOutcome};

/// A coin that cleared every gate and was persisted
#[derive(Debug, Clone)]
pub struct AcceptedCoin {
    pub coin: Coin,
    pub check: SecurityCheck,
}

/// What happened to one feed record
#[derive(Debug)]
pub enum RecordOutcome {
    Accepted(Box<AcceptedCoin>),
    /// Already stored; nothing written, no alert
    Duplicate(Address),
    Rejected(Address, RejectReason),
    Filtered(Address, FilterReason),
    Failed(Error),
}

/// Tally of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub filtered: usize,
    pub failed: usize,
    pub outliers: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
}

/// Side-effect free evaluation of one record
#[derive(Debug)]
pub struct DryRun {
    pub coin: Coin,
    pub already_stored: bool,
    pub guard: GuardVerdict,
    pub filter: FilterResult,
}

impl DryRun {
    pub fn would_accept(&self) -> bool {
        !self.already_stored && !self.guard.is_rejected() && self.filter.is_pass()
    }
}

/// External collaborators the pipeline is wired with
pub struct Collaborators {
    pub feed: Arc<dyn CoinFeed>,
    pub store: Arc<dyn Store>,
    pub blacklist: Arc<Blacklist>,
    pub risk: Option<Arc<dyn RiskScorer>>,
    pub verifier: Option<Arc<dyn ContractVerifier>>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Build the production collaborators described by the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.feed.request_timeout_secs);

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.database.path)?);
        let feed: Arc<dyn CoinFeed> = Arc::new(PumpFunClient::new(&config.feed)?);
        let blacklist = Arc::new(Blacklist::from_config(&config.blacklists, timeout)?);

        let risk = if config.risk.enabled {
            Some(Arc::new(RugCheckClient::new(&config.risk, timeout)?) as Arc<dyn RiskScorer>)
        } else {
            None
        };

        let verifier = if config.verification.enabled {
            Some(Arc::new(EtherscanVerifier::new(&config.verification, timeout)?) as Arc<dyn ContractVerifier>)
        } else {
            None
        };

        let notifier: Arc<dyn Notifier> = if config.notification.enabled {
            Arc::new(TelegramNotifier::new(&config.notification, timeout)?)
        } else {
            info!("Notifications disabled - alerts will be logged only");
            Arc::new(LogNotifier)
        };

        Ok(Self {
            feed,
            store,
            blacklist,
            risk,
            verifier,
            notifier,
        })
    }
}

pub struct Pipeline {
    feed: Arc<dyn CoinFeed>,
    store: Arc<dyn Store>,
    blacklist: Arc<Blacklist>,
    guard: Guard,
    creator_locks: CreatorLocks,
    verifier: Option<Arc<dyn ContractVerifier>>,
    evaluator: SecurityEvaluator,
    policy: FilterPolicy,
    detector: AnomalyDetector,
    dispatcher: AlertDispatcher,
    fetch_limit: u32,
    worker_count: usize,
    fetch_transactions: bool,
    transactions_limit: u32,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, config: &Config) -> Self {
        let Collaborators {
            feed,
            store,
            blacklist,
            risk,
            verifier,
            notifier,
        } = collaborators;

        let policy = config.filters.policy();

        Self {
            guard: Guard::new(blacklist.clone(), store.clone(), policy.max_coins_per_creator),
            creator_locks: CreatorLocks::new(),
            evaluator: SecurityEvaluator::new(risk, store.clone(), config.risk.bundled_threshold),
            detector: AnomalyDetector::new(store.clone()),
            dispatcher: AlertDispatcher::new(
                notifier,
                config.scheduler.alert_concurrency,
                Duration::from_secs(config.notification.max_retry_secs),
            ),
            policy,
            feed,
            store,
            blacklist,
            verifier,
            fetch_limit: config.feed.fetch_limit,
            worker_count: config.scheduler.worker_count.max(1),
            fetch_transactions: config.feed.fetch_transactions,
            transactions_limit: config.feed.transactions_limit,
        }
    }

    /// Production pipeline from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(Collaborators::from_config(config)?, config))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    /// Run one full cycle
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_observed(None).await
    }

    async fn run_cycle_observed(&self, state: Option<&StateHandle>) -> Result<CycleReport> {
        self.blacklist.refresh_if_due().await;

        let records = match self.feed.fetch_migrated_coins(self.fetch_limit).await {
            Ok(records) => records,
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Feed unavailable, treating cycle as empty");
                Vec::new()
            }
            Err(e) => return Err(Error::CycleFailure(format!("feed: {}", e))),
        };

        if let Some(state) = state {
            state.set(SchedulerState::Processing);
        }

        let now = Utc::now();
        let mut report = CycleReport {
            fetched: records.len(),
            ..CycleReport::default()
        };

        let outcomes: Vec<RecordOutcome> = stream::iter(records)
            .map(|raw| self.process_record(raw, now))
            .buffer_unordered(self.worker_count)
            .collect()
            .await;

        let mut accepted = Vec::new();
        for outcome in outcomes {
            match outcome {
                RecordOutcome::Accepted(coin) => accepted.push(*coin),
                RecordOutcome::Duplicate(_) => report.duplicates += 1,
                RecordOutcome::Rejected(..) => report.rejected += 1,
                RecordOutcome::Filtered(..) => report.filtered += 1,
                RecordOutcome::Failed(_) => report.failed += 1,
            }
        }
        report.accepted = accepted.len();
        self.creator_locks.prune();

        let outliers = self.detector.find_outliers();
        report.outliers = outliers.len();

        let messages = accepted
            .iter()
            .map(|a| {
                format_alert(
                    &a.coin,
                    &a.check,
                    outliers.contains(&a.coin.contract_address),
                )
            })
            .collect();
        let dispatch = self.dispatcher.dispatch(messages).await;
        report.alerts_sent = dispatch.sent;
        report.alerts_failed = dispatch.failed;

        info!(
            fetched = report.fetched,
            accepted = report.accepted,
            duplicates = report.duplicates,
            rejected = report.rejected,
            filtered = report.filtered,
            failed = report.failed,
            outliers = report.outliers,
            alerts = report.alerts_sent,
            "Cycle complete"
        );
        Ok(report)
    }

    /// Take one raw record through every gate. Failures stay inside the
    /// returned outcome.
    pub async fn process_record(&self, raw: Value, now: DateTime<Utc>) -> RecordOutcome {
        match self.try_process_record(&raw, now).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_record_scoped() => {
                warn!(error = %e, "Record skipped");
                RecordOutcome::Failed(e)
            }
            Err(e) => {
                error!(error = %e, "Record failed unexpectedly");
                RecordOutcome::Failed(e)
            }
        }
    }

    async fn try_process_record(&self, raw: &Value, now: DateTime<Utc>) -> Result<RecordOutcome> {
        let mut coin = parse_coin(raw, now)?;
        let contract = coin.contract_address;

        if self.store.coin_exists(&contract)? {
            debug!(contract = %contract, "Already stored, skipping");
            return Ok(RecordOutcome::Duplicate(contract));
        }

        let _creator_lock = self.creator_locks.acquire(&coin.creator).await;

        if let GuardVerdict::Rejected(reason) = self.guard.check(&coin).await? {
            return Ok(RecordOutcome::Rejected(contract, reason));
        }

        if let Some(verifier) = &self.verifier {
            coin.is_verified = match verifier.is_contract_verified(&contract).await {
                Ok(verified) => verified,
                Err(e) => {
                    warn!(contract = %contract, error = %e, "Verification lookup failed, assuming unverified");
                    false
                }
            };
        }

        let check = self.evaluator.evaluate(&coin).await;

        if let FilterResult::Filtered(reason) = self.policy.evaluate(&coin, now) {
            info!(contract = %contract, symbol = %coin.symbol, reason = %reason, "[FILTER] Coin filtered");
            return Ok(RecordOutcome::Filtered(contract, reason));
        }

        match self.store.upsert_coin(&coin)? {
            UpsertOutcome::Inserted => {}
            UpsertOutcome::Updated => {
                debug!(contract = %contract, "Stored concurrently by another record");
                return Ok(RecordOutcome::Duplicate(contract));
            }
        }

        if self.fetch_transactions {
            self.ingest_transactions(&contract).await;
        }

        info!(
            contract = %contract,
            symbol = %coin.symbol,
            creator = %coin.creator,
            liquidity = coin.initial_liquidity,
            verdict = %check.verdict,
            "[ACCEPT] New coin stored"
        );
        Ok(RecordOutcome::Accepted(Box::new(AcceptedCoin { coin, check })))
    }

    /// Parse, guard and filter a record without writing anything or
    /// calling the security collaborators
    pub async fn dry_run(&self, raw: &Value, now: DateTime<Utc>) -> Result<DryRun> {
        let coin = parse_coin(raw, now)?;
        let already_stored = self.store.coin_exists(&coin.contract_address)?;
        let guard = self.guard.check(&coin).await?;
        let filter = self.policy.evaluate(&coin, now);

        Ok(DryRun {
            coin,
            already_stored,
            guard,
            filter,
        })
    }

    async fn ingest_transactions(&self, contract: &Address) {
        let trades = match self.feed.fetch_transactions(contract, self.transactions_limit).await {
            Ok(trades) => trades,
            Err(e) => {
                warn!(contract = %contract, error = %e, "Could not fetch trades");
                return;
            }
        };

        match self.store.insert_transactions(&trades) {
            Ok(added) => debug!(contract = %contract, added, "Trades stored"),
            Err(e) => warn!(contract = %contract, error = %e, "Failed to store trades"),
        }
    }
}

#[async_trait]
impl PollCycle for Pipeline {
    async fn poll(&self, state: &StateHandle) -> Result<CycleReport> {
        self.run_cycle_observed(Some(state)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::TransactionRecord;
    use crate::filter::BlacklistSet;
    use crate::security::RiskReport;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const CREATOR: &str = "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB";

    enum FeedMode {
        Records,
        Transport,
        Payload,
    }

    struct MockFeed {
        records: Mutex<Vec<Value>>,
        mode: FeedMode,
    }

    impl MockFeed {
        fn with(records: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                records: Mutex::new(records),
                mode: FeedMode::Records,
            })
        }

        fn failing(mode: FeedMode) -> Arc<Self> {
            Arc::new(Self {
                records: Mutex::new(Vec::new()),
                mode,
            })
        }

        fn set(&self, records: Vec<Value>) {
            *self.records.lock().unwrap() = records;
        }
    }

    #[async_trait]
    impl CoinFeed for MockFeed {
        async fn fetch_migrated_coins(&self, _limit: u32) -> Result<Vec<Value>> {
            match self.mode {
                FeedMode::Records => Ok(self.records.lock().unwrap().clone()),
                FeedMode::Transport => Err(Error::FeedTransport("connection reset".into())),
                FeedMode::Payload => Err(Error::FeedPayload("HTTP 401".into())),
            }
        }

        async fn fetch_transactions(&self, contract: &Address, _limit: u32) -> Result<Vec<TransactionRecord>> {
            Ok(vec![TransactionRecord {
                contract_address: *contract,
                tx_hash: format!("0xhash{}", contract),
                direction: crate::coin::TxDirection::Buy,
                amount_eth: 0.5,
                gas_price: 25.0,
                block_number: 1,
                timestamp: Utc::now(),
            }])
        }
    }

    struct CountingRisk {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl RiskScorer for CountingRisk {
        async fn score_contract(&self, _: &Address) -> Result<RiskReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::unavailable("risk", "503"));
            }
            Ok(RiskReport {
                score: 80.0,
                verdict: "good".into(),
                top_holder_pct: 0.1,
                is_bundled: false,
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn notify(&self, message: &str) -> Result<()> {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    impl RecordingNotifier {
        fn count(&self) -> usize {
            self.messages.lock().unwrap().len()
        }
    }

    struct Harness {
        pipeline: Pipeline,
        store: Arc<SqliteStore>,
        risk: Arc<CountingRisk>,
        notifier: Arc<RecordingNotifier>,
    }

    /// Answers every lookup with `verified`, or fails when it is `None`
    struct StubVerifier {
        calls: AtomicUsize,
        verified: Option<bool>,
    }

    impl StubVerifier {
        fn new(verified: Option<bool>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                verified,
            })
        }
    }

    #[async_trait]
    impl ContractVerifier for StubVerifier {
        async fn is_contract_verified(&self, _: &Address) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verified
                .ok_or_else(|| Error::unavailable("verification", "HTTP 502"))
        }
    }

    fn harness(feed: Arc<dyn CoinFeed>, blacklist: BlacklistSet, risk_fails: bool) -> Harness {
        harness_with_verifier(feed, blacklist, risk_fails, None)
    }

    fn harness_with_verifier(
        feed: Arc<dyn CoinFeed>,
        blacklist: BlacklistSet,
        risk_fails: bool,
        verifier: Option<Arc<dyn ContractVerifier>>,
    ) -> Harness {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let risk = Arc::new(CountingRisk {
            calls: AtomicUsize::new(0),
            fail: risk_fails,
        });
        let notifier = Arc::new(RecordingNotifier::default());

        let mut config = Config::default();
        config.feed.fetch_transactions = true;

        let pipeline = Pipeline::new(
            Collaborators {
                feed,
                store: store.clone(),
                blacklist: Arc::new(Blacklist::fixed(blacklist)),
                risk: Some(risk.clone()),
                verifier,
                notifier: notifier.clone(),
            },
            &config,
        );

        Harness {
            pipeline,
            store,
            risk,
            notifier,
        }
    }

    fn contract(n: u64) -> String {
        format!("0x{:040x}", n)
    }

    fn record(n: u64, holders: u64) -> Value {
        json!({
            "contractAddress": contract(n),
            "token": { "name": format!("Coin {}", n), "symbol": format!("C{}", n) },
            "creator": CREATOR,
            "migrationTime": (Utc::now() - ChronoDuration::hours(2)).to_rfc3339(),
            "initialLiquidity": 10.0,
            "feePercentage": 2.0,
            "holderCount": holders
        })
    }

    fn stored_coin(n: u64) -> Coin {
        parse_coin(&record(n, 50), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_scenario_accepts_good_coin() {
        let h = harness(MockFeed::with(vec![record(1, 50)]), BlacklistSet::default(), false);

        let report = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.alerts_sent, 1);

        let address = Address::parse(&contract(1)).unwrap();
        assert!(h.store.get_coin(&address).unwrap().is_some());
        assert_eq!(h.notifier.count(), 1);
        assert!(h.notifier.messages.lock().unwrap()[0].contains("Symbol: C1"));
        assert_eq!(h.store.stats().unwrap().transactions, 1);
    }

    #[tokio::test]
    async fn test_scenario_low_holders_filtered() {
        let h = harness(MockFeed::with(vec![record(1, 5)]), BlacklistSet::default(), false);

        let report = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.filtered, 1);
        assert_eq!(report.accepted, 0);
        assert_eq!(h.store.stats().unwrap().coins, 0);
        assert_eq!(h.notifier.count(), 0);
    }

    #[tokio::test]
    async fn test_scenario_blacklisted_coin_skips_security() {
        let blacklist = BlacklistSet::from_strings(&[contract(1)], &[]);
        let h = harness(MockFeed::with(vec![record(1, 50)]), blacklist, false);

        let report = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.rejected, 1);
        assert_eq!(h.risk.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.stats().unwrap().coins, 0);
        assert_eq!(h.notifier.count(), 0);
    }

    #[tokio::test]
    async fn test_verified_contract_is_stored_verified() {
        let verifier = StubVerifier::new(Some(true));
        let h = harness_with_verifier(
            MockFeed::with(vec![record(1, 50)]),
            BlacklistSet::default(),
            false,
            Some(verifier.clone()),
        );

        let report = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);

        let address = Address::parse(&contract(1)).unwrap();
        assert!(h.store.get_coin(&address).unwrap().unwrap().is_verified);
    }

    #[tokio::test]
    async fn test_verification_outage_stores_unverified() {
        let verifier = StubVerifier::new(None);
        let h = harness_with_verifier(
            MockFeed::with(vec![record(1, 50)]),
            BlacklistSet::default(),
            false,
            Some(verifier.clone()),
        );

        let report = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);

        let address = Address::parse(&contract(1)).unwrap();
        assert!(!h.store.get_coin(&address).unwrap().unwrap().is_verified);
        assert_eq!(h.notifier.count(), 1);
    }

    #[tokio::test]
    async fn test_blacklisted_coin_skips_verification() {
        let verifier = StubVerifier::new(Some(true));
        let blacklist = BlacklistSet::from_strings(&[contract(1)], &[]);
        let h = harness_with_verifier(
            MockFeed::with(vec![record(1, 50)]),
            blacklist,
            false,
            Some(verifier.clone()),
        );

        let report = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.rejected, 1);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scenario_creator_throttled_after_cap() {
        let feed = MockFeed::with(Vec::new());
        let h = harness(feed.clone(), BlacklistSet::default(), false);
        h.store.upsert_coin(&stored_coin(100)).unwrap();
        h.store.upsert_coin(&stored_coin(101)).unwrap();

        // third coin from the creator still fits under the default cap of 3
        feed.set(vec![record(1, 50)]);
        let report = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.accepted, 1);

        feed.set(vec![record(2, 50)]);
        let report = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.rejected, 1);
        assert_eq!(h.store.count_coins_by_creator(&Address::parse(CREATOR).unwrap()).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_same_creator_in_one_batch_respects_cap() {
        let records = (1..=5).map(|n| record(n, 50)).collect();
        let h = harness(MockFeed::with(records), BlacklistSet::default(), false);

        let report = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.accepted, 3);
        assert_eq!(report.rejected, 2);
        assert_eq!(h.store.stats().unwrap().coins, 3);
    }

    #[tokio::test]
    async fn test_same_record_twice_stored_once() {
        let h = harness(MockFeed::with(vec![record(1, 50), record(1, 50)]), BlacklistSet::default(), false);

        let first = h.pipeline.run_cycle().await.unwrap();
        let second = h.pipeline.run_cycle().await.unwrap();

        assert_eq!(first.accepted, 1);
        assert_eq!(first.duplicates, 1);
        assert_eq!(second.accepted, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(h.store.stats().unwrap().coins, 1);
        assert_eq!(h.notifier.count(), 1);
    }

    #[tokio::test]
    async fn test_risk_outage_still_filters_and_records_unknown() {
        let h = harness(MockFeed::with(vec![record(1, 50), record(2, 5)]), BlacklistSet::default(), true);

        let report = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.filtered, 1);
        assert_eq!(h.risk.calls.load(Ordering::SeqCst), 2);

        let check = h
            .store
            .get_security_check(&Address::parse(&contract(1)).unwrap())
            .unwrap()
            .unwrap();
        assert!(check.is_unknown());
        assert!(h.notifier.messages.lock().unwrap()[0].contains("Risk: unknown"));
    }

    #[tokio::test]
    async fn test_bad_record_does_not_abort_batch() {
        let records = vec![json!({ "contractAddress": "0xnope" }), json!("garbage"), record(1, 50)];
        let h = harness(MockFeed::with(records), BlacklistSet::default(), false);

        let report = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(report.accepted, 1);
    }

    #[tokio::test]
    async fn test_malformed_record_fails_record_scoped() {
        let h = harness(MockFeed::with(Vec::new()), BlacklistSet::default(), false);

        for raw in [json!({ "contractAddress": "0xnope" }), json!("garbage")] {
            match h.pipeline.process_record(raw, Utc::now()).await {
                RecordOutcome::Failed(e) => assert!(e.is_record_scoped(), "{}", e),
                other => panic!("expected failure, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let h = harness(MockFeed::with(Vec::new()), BlacklistSet::default(), false);

        let verdict = h.pipeline.dry_run(&record(1, 50), Utc::now()).await.unwrap();
        assert!(verdict.would_accept());

        let verdict = h.pipeline.dry_run(&record(2, 5), Utc::now()).await.unwrap();
        assert!(!verdict.would_accept());
        assert!(verdict.filter.is_filtered());

        assert_eq!(h.store.stats().unwrap(), Default::default());
        assert_eq!(h.risk.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_feed_transport_error_is_empty_cycle() {
        let h = harness(MockFeed::failing(FeedMode::Transport), BlacklistSet::default(), false);
        assert_eq!(h.pipeline.run_cycle().await.unwrap(), CycleReport::default());
    }

    #[tokio::test]
    async fn test_feed_payload_error_fails_cycle() {
        let h = harness(MockFeed::failing(FeedMode::Payload), BlacklistSet::default(), false);
        assert!(matches!(
            h.pipeline.run_cycle().await,
            Err(Error::CycleFailure(_))
        ));
    }
}
