//! Ingestion orchestration: fetch every source concurrently, then gate,
//! deduplicate, normalize, reconcile and review the whole batch as one unit.

pub mod audit;
pub mod dedup;
pub mod gate;
pub mod reconcile;
pub mod review;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rja_adapters::{adapter_for_source, AdapterContext, SourceRegistry};
use rja_core::{Candidate, CanonicalJob, RunReport, SalaryCoverage};
use rja_storage::{HttpClientConfig, HttpFetcher, JobStore};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub use audit::{run_audit, Anomaly, AnomalyKind, AuditReport, Severity};
pub use dedup::{DedupConfig, DedupEngine, DedupOutcome};
pub use gate::{screen, Rejection};
pub use reconcile::{ReconcileError, ReconcileOutcome, ReconcilePolicy, Reconciler};
pub use review::{review_jobs, unquarantine, AdvisoryOracle, ApproveAll, HttpVerdictOracle, OracleError};

pub const CRATE_NAME: &str = "rja-sync";

/// Employers below this salary-text coverage are written to the salary issue log.
pub const SALARY_COVERAGE_THRESHOLD: u32 = 50;

/// Adapter error messages are cut to this many characters in the run report.
pub const SOURCE_ERROR_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub workspace_root: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub adapter_concurrency: usize,
    pub request_delay_ms: u64,
    pub stale_grace_days: i64,
    pub scheduler_enabled: bool,
    pub sync_cron_1: String,
    pub sync_cron_2: String,
    pub oracle_url: Option<String>,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://rja.db?mode=rwc".to_string()),
            workspace_root: std::env::var("RJA_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            user_agent: std::env::var("RJA_USER_AGENT")
                .unwrap_or_else(|_| "rja-bot/0.1".to_string()),
            http_timeout_secs: env_parse("RJA_HTTP_TIMEOUT_SECS", 20),
            adapter_concurrency: env_parse("RJA_ADAPTER_CONCURRENCY", 8),
            request_delay_ms: env_parse("RJA_REQUEST_DELAY_MS", 1000),
            stale_grace_days: env_parse("RJA_STALE_GRACE_DAYS", 7),
            scheduler_enabled: std::env::var("RJA_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            sync_cron_1: std::env::var("SYNC_CRON_1").unwrap_or_else(|_| "0 0 6 * * *".to_string()),
            sync_cron_2: std::env::var("SYNC_CRON_2").unwrap_or_else(|_| "0 0 18 * * *".to_string()),
            oracle_url: std::env::var("RJA_ORACLE_URL").ok().filter(|v| !v.trim().is_empty()),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            request_delay: Duration::from_millis(self.request_delay_ms),
            ..HttpClientConfig::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub async fn open_store(config: &SyncConfig) -> Result<JobStore> {
    let store = JobStore::connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    store.migrate().await.context("running migrations")?;
    Ok(store)
}

/// `HttpVerdictOracle` when `RJA_ORACLE_URL` is set, otherwise approve-all.
pub fn oracle_from_config(config: &SyncConfig) -> Result<Box<dyn AdvisoryOracle>> {
    let oracle: Box<dyn AdvisoryOracle> = match &config.oracle_url {
        Some(url) => Box::new(
            HttpVerdictOracle::new(url, Duration::from_secs(config.http_timeout_secs))
                .context("creating review oracle")?,
        ),
        None => Box::new(ApproveAll),
    };
    Ok(oracle)
}

pub struct SyncPipeline {
    config: SyncConfig,
    store: JobStore,
    http: Arc<HttpFetcher>,
    dedup: DedupEngine,
    oracle: Box<dyn AdvisoryOracle>,
    run_lock: Mutex<()>,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig, store: JobStore) -> Result<Self> {
        let http = HttpFetcher::new(config.http_client_config())?;
        let oracle = oracle_from_config(&config)?;
        Ok(Self {
            config,
            store,
            http: Arc::new(http),
            dedup: DedupEngine::default(),
            oracle,
            run_lock: Mutex::new(()),
        })
    }

    pub fn with_oracle(mut self, oracle: Box<dyn AdvisoryOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// One ingestion pass over the enabled sources, or just `only` when non-empty.
    ///
    /// Source failures land in the report. Only registry problems and a failed
    /// reconciliation make this return an error. Runs are serialized per pipeline.
    pub async fn run_once(&self, only: &[String]) -> Result<RunReport> {
        let _guard = self.run_lock.lock().await;
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id);
        self.run_locked(only, run_id, started_at).instrument(span).await
    }

    async fn run_locked(
        &self,
        only: &[String],
        run_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<RunReport> {
        let registry_path = self.config.workspace_root.join("sources.yaml");
        let registry = SourceRegistry::load(&registry_path)?;
        let selected = registry.select(only)?;
        info!(sources = selected.len(), "starting sync run");

        let mut report = RunReport::new(run_id, started_at);
        let ctx = AdapterContext::new(run_id, started_at);

        let mut batch = Vec::new();
        for (source_id, result) in self.fetch_all(&selected, &ctx).await {
            match result {
                Ok(candidates) => {
                    report.source_counts.insert(source_id, candidates.len());
                    batch.extend(candidates);
                }
                Err(message) => {
                    report.source_counts.insert(source_id.clone(), 0);
                    report.source_errors.insert(source_id, message);
                }
            }
        }
        report.scraped = batch.len();

        let mut screened = Vec::with_capacity(batch.len());
        for candidate in batch {
            match gate::screen(&candidate) {
                Ok(()) => screened.push(candidate),
                Err(rejection) => {
                    report.gate_rejected += 1;
                    debug!(
                        source = %candidate.source_name,
                        title = %candidate.title,
                        url = %candidate.url,
                        %rejection,
                        "gate rejected candidate"
                    );
                }
            }
        }

        let keys: Vec<String> = screened.iter().map(Candidate::url_key).collect();
        let persisted = self
            .store
            .existing_url_keys(&keys)
            .await
            .context("loading persisted url keys")?;
        let deduped = self.dedup.apply(screened, &persisted);
        report.deduplicated = deduped.survivors.len();
        report.duplicates_dropped = deduped.dropped();

        let accepted: Vec<_> = deduped
            .survivors
            .into_iter()
            .map(rja_normalize::normalize)
            .collect();

        let reconciler = Reconciler::new(
            self.store.clone(),
            ReconcilePolicy::with_grace_days(self.config.stale_grace_days),
        );
        let outcome = reconciler.apply(&accepted, Utc::now()).await?;
        report.inserted = outcome.inserted;
        report.updated = outcome.updated;
        report.deactivated = outcome.deactivated;
        report.active_total = outcome.active_total;
        report.new_job_urls = outcome.new_job_urls.clone();

        report.review = match self.review_touched(&outcome.touched).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(error = %err, "review step failed; jobs stay approved");
                Default::default()
            }
        };

        if let Err(err) = self.record_salary_coverage(&mut report).await {
            warn!(error = %err, "salary coverage bookkeeping failed");
        }

        report.finished_at = Utc::now();
        if let Err(err) = self.store.append_run_report(&report).await {
            error!(error = %err, "could not append run report");
        }

        info!(
            scraped = report.scraped,
            deduplicated = report.deduplicated,
            gate_rejected = report.gate_rejected,
            inserted = report.inserted,
            updated = report.updated,
            deactivated = report.deactivated,
            active_total = report.active_total,
            failed_sources = report.source_errors.len(),
            "sync run finished"
        );
        Ok(report)
    }

    /// Results come back in registry order so first-wins dedup is deterministic.
    async fn fetch_all(
        &self,
        sources: &[&rja_adapters::SourceConfig],
        ctx: &AdapterContext,
    ) -> Vec<(String, Result<Vec<Candidate>, String>)> {
        let permits = Arc::new(Semaphore::new(self.config.adapter_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, source) in sources.iter().enumerate() {
            let adapter = adapter_for_source(source, &self.config.workspace_root);
            let http = Arc::clone(&self.http);
            let permits = Arc::clone(&permits);
            let ctx = ctx.clone();
            let span = info_span!("adapter", source_id = %source.source_id);
            tasks.spawn(
                async move {
                    let _permit = permits.acquire_owned().await;
                    let result = adapter.fetch(&http, &ctx).await;
                    match &result {
                        Ok(found) => info!(candidates = found.len(), "adapter finished"),
                        Err(err) => warn!(error = %err, "adapter failed"),
                    }
                    (index, result.map_err(|e| truncate_chars(&e.to_string(), SOURCE_ERROR_CHARS)))
                }
                .instrument(span),
            );
        }

        let mut slots: Vec<Option<Result<Vec<Candidate>, String>>> = vec![None; sources.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(err) => error!(error = %err, "adapter task did not complete"),
            }
        }

        sources
            .iter()
            .zip(slots)
            .map(|(source, slot)| {
                let result = slot.unwrap_or_else(|| Err("adapter task did not complete".to_string()));
                (source.source_id.clone(), result)
            })
            .collect()
    }

    async fn review_touched(&self, touched: &[i64]) -> Result<rja_core::ReviewSummary> {
        let jobs: Vec<CanonicalJob> = self
            .store
            .get_jobs(touched)
            .await?
            .into_iter()
            .filter(CanonicalJob::is_publicly_visible)
            .collect();
        Ok(review_jobs(&self.store, self.oracle.as_ref(), &jobs, Utc::now()).await?)
    }

    async fn record_salary_coverage(&self, report: &mut RunReport) -> Result<()> {
        let coverage = self.store.salary_coverage_by_employer().await?;
        let issues = salary_issues(&coverage);
        if !issues.is_empty() {
            let logged = self
                .store
                .log_salary_issues(&report.run_id.to_string(), &issues, Utc::now())
                .await?;
            info!(employers = logged, "logged low salary coverage");
        }
        report.salary_coverage = coverage;
        Ok(())
    }

    /// Scheduler firing a full run on both cron expressions. Start it with `start()`.
    pub async fn build_scheduler(self: &Arc<Self>) -> Result<JobScheduler> {
        let sched = JobScheduler::new().await.context("creating scheduler")?;
        for cron in [&self.config.sync_cron_1, &self.config.sync_cron_2] {
            let pipeline = Arc::clone(self);
            let job = Job::new_async(cron, move |_uuid, _l| {
                let pipeline = Arc::clone(&pipeline);
                Box::pin(async move {
                    match pipeline.run_once(&[]).await {
                        Ok(report) => info!(run_id = %report.run_id, inserted = report.inserted, "scheduled sync finished"),
                        Err(err) => error!(error = %format!("{err:#}"), "scheduled sync failed"),
                    }
                })
            })
            .with_context(|| format!("creating scheduler job for cron {cron}"))?;
            sched.add(job).await.context("adding scheduler job")?;
        }
        Ok(sched)
    }

    pub async fn maybe_build_scheduler(self: &Arc<Self>) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }
        self.build_scheduler().await.map(Some)
    }
}

/// Employers with at least one visible job and coverage under the threshold.
pub fn salary_issues(coverage: &BTreeMap<String, SalaryCoverage>) -> BTreeMap<String, SalaryCoverage> {
    coverage
        .iter()
        .filter(|(_, c)| c.total > 0 && c.rate_percent < SALARY_COVERAGE_THRESHOLD)
        .map(|(name, c)| (name.clone(), *c))
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub async fn run_sync_once_from_env(only: &[String]) -> Result<RunReport> {
    let config = SyncConfig::from_env();
    let store = open_store(&config).await?;
    let pipeline = SyncPipeline::new(config, store)?;
    pipeline.run_once(only).await
}
