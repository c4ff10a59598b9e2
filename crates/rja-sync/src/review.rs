//! Advisory review: an optional oracle proposes verdicts, the queue applies them.
//! The oracle is never trusted to block a run; any failure approves the batch.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rja_core::{CanonicalJob, JobSummary, ReviewSummary, Verdict, VerdictKind};
use rja_storage::{FetchError, HttpClientConfig, HttpFetcher, JobStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Summaries handed to the oracle per call.
pub const REVIEW_BATCH: usize = 50;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("oracle client setup failed: {0}")]
    Setup(#[from] anyhow::Error),
}

#[async_trait]
pub trait AdvisoryOracle: Send + Sync {
    fn name(&self) -> &str;

    /// Verdicts for some or all of `jobs`. Jobs without a verdict count as approved.
    async fn review(&self, jobs: &[JobSummary]) -> Result<Vec<Verdict>, OracleError>;
}

/// Default when no oracle is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproveAll;

#[async_trait]
impl AdvisoryOracle for ApproveAll {
    fn name(&self) -> &str {
        "approve-all"
    }

    async fn review(&self, jobs: &[JobSummary]) -> Result<Vec<Verdict>, OracleError> {
        Ok(jobs
            .iter()
            .map(|j| Verdict {
                job_id: j.id,
                verdict: VerdictKind::Approve,
                reason: String::new(),
            })
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct ReviewRequest<'a> {
    jobs: &'a [JobSummary],
}

#[derive(Debug, Deserialize)]
struct WireVerdict {
    #[serde(alias = "job_id")]
    id: i64,
    verdict: VerdictKind,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReviewResponse {
    Bare(Vec<WireVerdict>),
    Wrapped { verdicts: Vec<WireVerdict> },
}

impl ReviewResponse {
    fn into_verdicts(self) -> Vec<Verdict> {
        let items = match self {
            Self::Bare(items) | Self::Wrapped { verdicts: items } => items,
        };
        items
            .into_iter()
            .map(|w| Verdict {
                job_id: w.id,
                verdict: w.verdict,
                reason: w.reason,
            })
            .collect()
    }
}

/// Posts `{"jobs": [...]}` to an external reviewer and reads back `{id, verdict, reason}`
/// items, either as a bare array or under `verdicts`.
pub struct HttpVerdictOracle {
    endpoint: String,
    http: HttpFetcher,
}

impl HttpVerdictOracle {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, OracleError> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout,
            user_agent: Some("rja-review/0.1".to_string()),
            request_delay: Duration::ZERO,
            ..HttpClientConfig::default()
        })?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            http,
        })
    }
}

#[async_trait]
impl AdvisoryOracle for HttpVerdictOracle {
    fn name(&self) -> &str {
        &self.endpoint
    }

    async fn review(&self, jobs: &[JobSummary]) -> Result<Vec<Verdict>, OracleError> {
        let response: ReviewResponse = self
            .http
            .post_json("review-oracle", &self.endpoint, &ReviewRequest { jobs })
            .await?;
        Ok(response.into_verdicts())
    }
}

/// Run `jobs` past the oracle and apply whatever it proposes. Only store errors
/// propagate; an oracle failure approves that batch and sets `failed_open`.
pub async fn review_jobs(
    store: &JobStore,
    oracle: &dyn AdvisoryOracle,
    jobs: &[CanonicalJob],
    now: DateTime<Utc>,
) -> Result<ReviewSummary, StoreError> {
    let mut summary = ReviewSummary::default();

    for batch in jobs.chunks(REVIEW_BATCH) {
        let summaries: Vec<JobSummary> = batch.iter().map(CanonicalJob::summary).collect();
        summary.reviewed += summaries.len();

        let verdicts = match oracle.review(&summaries).await {
            Ok(v) => v,
            Err(err) => {
                warn!(oracle = oracle.name(), error = %err, jobs = summaries.len(), "oracle unavailable, approving batch");
                summary.failed_open = true;
                summary.approved += summaries.len();
                continue;
            }
        };

        let mut by_id: HashMap<i64, Verdict> = HashMap::new();
        for verdict in verdicts {
            if batch.iter().any(|j| j.id == verdict.job_id) {
                by_id.insert(verdict.job_id, verdict);
            } else {
                debug!(job_id = verdict.job_id, "ignoring verdict for job outside the batch");
            }
        }

        for job in batch {
            match by_id.remove(&job.id) {
                Some(v) => apply_verdict(store, &v, now, &mut summary).await?,
                None => summary.approved += 1,
            }
        }
    }

    info!(
        reviewed = summary.reviewed,
        approved = summary.approved,
        quarantined = summary.quarantined,
        flagged = summary.flagged,
        failed_open = summary.failed_open,
        "review complete"
    );
    Ok(summary)
}

async fn apply_verdict(
    store: &JobStore,
    verdict: &Verdict,
    now: DateTime<Utc>,
    summary: &mut ReviewSummary,
) -> Result<(), StoreError> {
    match verdict.verdict {
        VerdictKind::Approve => summary.approved += 1,
        VerdictKind::Quarantine => {
            let reason = non_empty_reason(&verdict.reason, "quarantined by reviewer");
            if store.set_quarantine(verdict.job_id, reason, now).await? {
                info!(job_id = verdict.job_id, reason, "job quarantined");
                summary.quarantined += 1;
            }
        }
        VerdictKind::Flag => {
            let reason = non_empty_reason(&verdict.reason, "flagged by reviewer");
            store.add_review_flag(verdict.job_id, reason, now).await?;
            summary.flagged += 1;
        }
    }
    Ok(())
}

fn non_empty_reason<'a>(reason: &'a str, fallback: &'a str) -> &'a str {
    if reason.trim().is_empty() {
        fallback
    } else {
        reason
    }
}

/// Operator action; returns false when the job was not quarantined.
pub async fn unquarantine(store: &JobStore, id: i64) -> Result<bool, StoreError> {
    let cleared = store.clear_quarantine(id).await?;
    if cleared {
        info!(job_id = id, "quarantine cleared");
    }
    Ok(cleared)
}
