//! Applies one run's validated batch to the store: create or refresh by URL identity,
//! then age out jobs nobody resubmitted. Everything happens in one transaction.

use chrono::{DateTime, Duration, Utc};
use rja_core::NormalizedJob;
use rja_storage::{JobStore, StoreError};
use thiserror::Error;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("reconciliation aborted, store left at its pre-run state: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcilePolicy {
    /// Active jobs not seen for longer than this become stale-inactive.
    pub stale_after: Duration,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::days(7),
        }
    }
}

impl ReconcilePolicy {
    pub fn with_grace_days(days: i64) -> Self {
        Self {
            stale_after: Duration::days(days),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub deactivated: usize,
    pub active_total: usize,
    /// Ids created or refreshed by this pass, in batch order.
    pub touched: Vec<i64>,
    pub new_job_urls: Vec<String>,
}

pub struct Reconciler {
    store: JobStore,
    policy: ReconcilePolicy,
}

impl Reconciler {
    pub fn new(store: JobStore, policy: ReconcilePolicy) -> Self {
        Self { store, policy }
    }

    pub async fn apply(
        &self,
        batch: &[NormalizedJob],
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let span = info_span!("reconcile", batch = batch.len());
        self.apply_inner(batch, now).instrument(span).await
    }

    async fn apply_inner(
        &self,
        batch: &[NormalizedJob],
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let mut outcome = ReconcileOutcome::default();
        let mut tx = self.store.begin().await?;

        for job in batch {
            match tx.job_id_for_url_key(&job.url_key).await? {
                Some(id) => {
                    tx.refresh_job(id, job, now).await?;
                    outcome.updated += 1;
                    outcome.touched.push(id);
                }
                None => {
                    let id = tx.insert_job(job, now).await?;
                    outcome.inserted += 1;
                    outcome.touched.push(id);
                    outcome.new_job_urls.push(job.candidate.url.clone());
                }
            }
        }

        outcome.deactivated = tx.mark_stale(now - self.policy.stale_after).await? as usize;
        tx.rebuild_employers().await?;
        outcome.active_total = tx.count_visible().await?.max(0) as usize;
        tx.commit().await?;

        info!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            deactivated = outcome.deactivated,
            active_total = outcome.active_total,
            "reconciled batch"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rja_core::{Activity, Candidate, JobState};
    use rja_storage::JobFilter;

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).single().unwrap()
    }

    fn job(url: &str, title: &str) -> NormalizedJob {
        let mut c = Candidate::new("fixture", title, "Cafe Nooner", url);
        c.salary_text = Some("$18 an hour".into());
        rja_normalize::normalize(c)
    }

    async fn reconciler() -> (JobStore, Reconciler) {
        let store = JobStore::in_memory().await.unwrap();
        let rec = Reconciler::new(store.clone(), ReconcilePolicy::default());
        (store, rec)
    }

    #[tokio::test]
    async fn identical_batches_are_idempotent() {
        let (store, rec) = reconciler().await;
        let batch = vec![job("https://x/job/1", "Line Cook"), job("https://x/job/2", "Server")];

        let first = rec.apply(&batch, at(1)).await.unwrap();
        assert_eq!((first.inserted, first.updated), (2, 0));
        assert_eq!(first.new_job_urls.len(), 2);
        let before = store.active_jobs().await.unwrap();

        let second = rec.apply(&batch, at(2)).await.unwrap();
        assert_eq!((second.inserted, second.updated), (0, 2));
        assert!(second.new_job_urls.is_empty());
        assert_eq!(second.touched, first.touched);

        let after = store.active_jobs().await.unwrap();
        assert_eq!(after.len(), 2);
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.job, b.job);
            assert_eq!(a.first_seen_at, at(1));
            assert_eq!(a.last_seen_at, at(2));
        }
    }

    #[tokio::test]
    async fn trailing_slash_resolves_to_the_same_job() {
        let (store, rec) = reconciler().await;
        rec.apply(&[job("https://x/job/1", "Line Cook")], at(1)).await.unwrap();
        let out = rec
            .apply(&[job("https://x/job/1/", "Line Cook II")], at(2))
            .await
            .unwrap();
        assert_eq!((out.inserted, out.updated), (0, 1));

        let jobs = store.active_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job.candidate.title, "Line Cook II");
    }

    #[tokio::test]
    async fn unseen_jobs_go_stale_after_the_grace_window() {
        let (store, rec) = reconciler().await;
        let first = rec.apply(&[job("https://x/job/1", "Line Cook")], at(1)).await.unwrap();
        let id = first.touched[0];

        let day8 = rec.apply(&[], at(8)).await.unwrap();
        assert_eq!(day8.deactivated, 0);
        assert_eq!(day8.active_total, 1);

        let day9 = rec.apply(&[], at(9)).await.unwrap();
        assert_eq!(day9.deactivated, 1);
        assert_eq!(day9.active_total, 0);

        let stored = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(stored.activity, Activity::StaleInactive);
        assert!(store.employers().await.unwrap().is_empty());

        let back = rec.apply(&[job("https://x/job/1", "Line Cook")], at(10)).await.unwrap();
        assert_eq!(back.updated, 1);
        assert_eq!(store.get_job(id).await.unwrap().unwrap().state(), JobState::Active);
    }

    #[tokio::test]
    async fn quarantine_survives_refresh_and_keeps_bookkeeping() {
        let (store, rec) = reconciler().await;
        let first = rec.apply(&[job("https://x/job/1", "Line Cook")], at(1)).await.unwrap();
        let id = first.touched[0];

        assert!(store.set_quarantine(id, "suspicious", at(2)).await.unwrap());
        let held = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(held.last_seen_at, at(1));
        assert_eq!(held.activity, Activity::Active);

        let again = rec.apply(&[job("https://x/job/1", "Line Cook")], at(3)).await.unwrap();
        assert_eq!(again.updated, 1);
        assert_eq!(again.active_total, 0);

        let refreshed = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(refreshed.last_seen_at, at(3));
        assert_eq!(refreshed.state(), JobState::Quarantined);
        assert_eq!(store.list_jobs(&JobFilter::default()).await.unwrap().total, 0);

        assert!(store.clear_quarantine(id).await.unwrap());
        assert_eq!(store.list_jobs(&JobFilter::default()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn mid_run_failure_leaves_prior_state_intact() {
        let (store, rec) = reconciler().await;
        rec.apply(&[job("https://x/job/1", "Line Cook")], at(1)).await.unwrap();
        sqlx::query(
            "CREATE TRIGGER poison BEFORE INSERT ON jobs WHEN NEW.title = 'Poison Pill' \
             BEGIN SELECT RAISE(ABORT, 'poisoned'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let batch = vec![
            job("https://x/job/1", "Line Cook Updated"),
            job("https://x/job/2", "Server"),
            job("https://x/job/3", "Poison Pill"),
        ];
        let err = rec.apply(&batch, at(20)).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Store(_)));

        let jobs = store.active_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job.candidate.title, "Line Cook");
        assert_eq!(jobs[0].last_seen_at, at(1));
        assert_eq!(store.employers().await.unwrap().len(), 1);
    }
}
