//! SQLite-backed store for canonical jobs, employer rollups and the run log.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rja_core::{
    Activity, Candidate, CanonicalJob, EducationTier, Employer, ExperienceAssessment,
    ExperienceLevel, NormalizedJob, NormalizedSalary, PayPeriod, Quarantine, RunReport,
    SalaryCoverage,
};
use serde::Serialize;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use thiserror::Error;
use tracing::info;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// SQLite's bound-parameter limit is far above this; it keeps statements short.
const IN_CHUNK: usize = 500;

const VISIBLE: &str = "activity = 'active' AND quarantined_at IS NULL";

const JOB_COLUMNS: &str = "id, url_key, url, source_id, source_name, title, employer, \
     raw_category, raw_location, description, salary_text, job_type, posted_at, closing_at, \
     category, classification, location, salary_min, salary_max, pay_period, \
     experience_level, experience_confidence, years_min, years_max, education, activity, \
     quarantine_reason, quarantined_at, first_seen_at, last_seen_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("corrupt {column} value {value:?} in jobs row {id}")]
    Corrupt {
        id: i64,
        column: &'static str,
        value: String,
    },
    #[error("run report json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Filters for public listings. Only active, non-quarantined jobs are ever returned.
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub category: Option<String>,
    /// Case-insensitive partial match.
    pub employer: Option<String>,
    /// Case-insensitive partial match on the title.
    pub search: Option<String>,
    pub source: Option<String>,
    pub page: usize,
    pub per_page: usize,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            category: None,
            employer: None,
            search: None,
            source: None,
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl JobFilter {
    fn clamped(&self) -> (usize, usize) {
        (self.page.max(1), self.per_page.clamp(1, MAX_PAGE_SIZE))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<CanonicalJob>,
    pub total: i64,
    pub page: usize,
    pub per_page: usize,
    pub pages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub job_count: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_jobs: i64,
    pub total_employers: i64,
    pub jobs_by_category: BTreeMap<String, i64>,
    pub jobs_by_source: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewFlag {
    pub id: i64,
    pub job_id: i64,
    pub title: String,
    pub employer: String,
    pub url: String,
    pub reason: String,
    pub flagged_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Private in-memory database, already migrated. One connection, never recycled,
    /// so the data lives as long as the store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<StoreTx, StoreError> {
        Ok(StoreTx {
            tx: self.pool.begin().await?,
        })
    }

    /// Any state, including hidden ones.
    pub async fn get_job(&self, id: i64) -> Result<Option<CanonicalJob>, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(job_from_row).transpose()
    }

    pub async fn get_visible_job(&self, id: i64) -> Result<Option<CanonicalJob>, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ? AND {VISIBLE}");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(job_from_row).transpose()
    }

    pub async fn get_jobs(&self, ids: &[i64]) -> Result<Vec<CanonicalJob>, StoreError> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id IN ("));
            let mut sep = qb.separated(", ");
            for id in chunk {
                sep.push_bind(*id);
            }
            qb.push(") ORDER BY id");
            for row in qb.build().fetch_all(&self.pool).await? {
                out.push(job_from_row(&row)?);
            }
        }
        Ok(out)
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<JobPage, StoreError> {
        let (page, per_page) = filter.clamped();

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM jobs WHERE ");
        count.push(VISIBLE);
        push_filters(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get(0)?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE "));
        select.push(VISIBLE);
        push_filters(&mut select, filter);
        select.push(" ORDER BY COALESCE(posted_at, first_seen_at) DESC, id DESC LIMIT ");
        select.push_bind(per_page as i64);
        select.push(" OFFSET ");
        select.push_bind(((page - 1) * per_page) as i64);

        let rows = select.build().fetch_all(&self.pool).await?;
        let jobs = rows.iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?;
        let pages = (total.max(0) as usize).div_ceil(per_page);

        Ok(JobPage {
            jobs,
            total,
            page,
            per_page,
            pages,
        })
    }

    /// Jobs with an active activity flag, quarantined or not. Input for the anomaly audit.
    pub async fn active_jobs(&self) -> Result<Vec<CanonicalJob>, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE activity = 'active' ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Which of `keys` already identify a persisted job.
    pub async fn existing_url_keys(&self, keys: &[String]) -> Result<HashSet<String>, StoreError> {
        let mut out = HashSet::new();
        for chunk in keys.chunks(IN_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT url_key FROM jobs WHERE url_key IN (");
            let mut sep = qb.separated(", ");
            for key in chunk {
                sep.push_bind(key.clone());
            }
            qb.push(")");
            for row in qb.build().fetch_all(&self.pool).await? {
                out.insert(row.try_get("url_key")?);
            }
        }
        Ok(out)
    }

    pub async fn category_counts(&self) -> Result<Vec<CategoryCount>, StoreError> {
        let sql = format!(
            "SELECT category, COUNT(*) AS job_count FROM jobs WHERE {VISIBLE} \
             GROUP BY category ORDER BY job_count DESC, category"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<CategoryCount, StoreError> {
                Ok(CategoryCount {
                    name: row.try_get("category")?,
                    job_count: row.try_get("job_count")?,
                })
            })
            .collect()
    }

    pub async fn employers(&self) -> Result<Vec<Employer>, StoreError> {
        let rows = sqlx::query(
            "SELECT name, primary_category, job_count FROM employers ORDER BY job_count DESC, name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<Employer, StoreError> {
                Ok(Employer {
                    name: row.try_get("name")?,
                    primary_category: row.try_get("primary_category")?,
                    job_count: row.try_get("job_count")?,
                })
            })
            .collect()
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let total_jobs: i64 = sqlx::query(&format!("SELECT COUNT(*) FROM jobs WHERE {VISIBLE}"))
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        let total_employers: i64 = sqlx::query("SELECT COUNT(*) FROM employers")
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        let mut jobs_by_category = BTreeMap::new();
        for c in self.category_counts().await? {
            jobs_by_category.insert(c.name, c.job_count);
        }

        let mut jobs_by_source = BTreeMap::new();
        let sql = format!(
            "SELECT source_name, COUNT(*) AS job_count FROM jobs WHERE {VISIBLE} GROUP BY source_name"
        );
        for row in sqlx::query(&sql).fetch_all(&self.pool).await? {
            jobs_by_source.insert(row.try_get("source_name")?, row.try_get("job_count")?);
        }

        Ok(StoreStats {
            total_jobs,
            total_employers,
            jobs_by_category,
            jobs_by_source,
        })
    }

    /// Per-employer share of visible jobs that carry any salary text.
    pub async fn salary_coverage_by_employer(
        &self,
    ) -> Result<BTreeMap<String, SalaryCoverage>, StoreError> {
        let sql = format!(
            "SELECT employer, COUNT(*) AS total, \
                    SUM(CASE WHEN salary_text IS NOT NULL AND TRIM(salary_text) <> '' THEN 1 ELSE 0 END) AS with_salary \
               FROM jobs WHERE {VISIBLE} GROUP BY employer"
        );
        let mut out = BTreeMap::new();
        for row in sqlx::query(&sql).fetch_all(&self.pool).await? {
            let total: i64 = row.try_get("total")?;
            let with_salary: i64 = row.try_get("with_salary")?;
            out.insert(
                row.try_get("employer")?,
                SalaryCoverage::from_counts(total as usize, with_salary as usize),
            );
        }
        Ok(out)
    }

    pub async fn log_salary_issues(
        &self,
        run_id: &str,
        issues: &BTreeMap<String, SalaryCoverage>,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for (employer, coverage) in issues {
            sqlx::query(
                "INSERT INTO salary_issue_log (run_id, employer, total, with_salary, rate_percent, logged_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(run_id)
            .bind(employer)
            .bind(coverage.total as i64)
            .bind(coverage.with_salary as i64)
            .bind(i64::from(coverage.rate_percent))
            .bind(at)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }
        tx.commit().await?;
        Ok(written)
    }

    pub async fn salary_issues_for_run(
        &self,
        run_id: &str,
    ) -> Result<BTreeMap<String, SalaryCoverage>, StoreError> {
        let rows = sqlx::query(
            "SELECT employer, total, with_salary FROM salary_issue_log WHERE run_id = ? ORDER BY employer",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        let mut out = BTreeMap::new();
        for row in rows {
            let total: i64 = row.try_get("total")?;
            let with_salary: i64 = row.try_get("with_salary")?;
            out.insert(
                row.try_get("employer")?,
                SalaryCoverage::from_counts(total as usize, with_salary as usize),
            );
        }
        Ok(out)
    }

    pub async fn append_run_report(&self, report: &RunReport) -> Result<(), StoreError> {
        let report_json = serde_json::to_string(report)?;
        sqlx::query(
            "INSERT INTO run_log (run_id, started_at, finished_at, scraped, inserted, updated, \
                                  deactivated, active_total, report_json) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(report.run_id.to_string())
        .bind(report.started_at)
        .bind(report.finished_at)
        .bind(report.scraped as i64)
        .bind(report.inserted as i64)
        .bind(report.updated as i64)
        .bind(report.deactivated as i64)
        .bind(report.active_total as i64)
        .bind(report_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Newest first.
    pub async fn recent_run_reports(&self, limit: usize) -> Result<Vec<RunReport>, StoreError> {
        let rows = sqlx::query("SELECT report_json FROM run_log ORDER BY started_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<RunReport, StoreError> {
                let text: String = row.try_get("report_json")?;
                Ok(serde_json::from_str(&text)?)
            })
            .collect()
    }

    /// Returns false when no such job exists.
    pub async fn set_quarantine(
        &self,
        id: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let done = sqlx::query("UPDATE jobs SET quarantine_reason = ?, quarantined_at = ? WHERE id = ?")
            .bind(reason)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() == 1)
    }

    /// Returns false when the job does not exist or was not quarantined.
    pub async fn clear_quarantine(&self, id: i64) -> Result<bool, StoreError> {
        let done = sqlx::query(
            "UPDATE jobs SET quarantine_reason = NULL, quarantined_at = NULL \
             WHERE id = ? AND quarantined_at IS NOT NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    pub async fn add_review_flag(
        &self,
        job_id: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let done = sqlx::query("INSERT INTO review_flags (job_id, reason, flagged_at) VALUES (?, ?, ?)")
            .bind(job_id)
            .bind(reason)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(done.last_insert_rowid())
    }

    pub async fn review_flags(&self) -> Result<Vec<ReviewFlag>, StoreError> {
        let rows = sqlx::query(
            "SELECT f.id, f.job_id, j.title, j.employer, j.url, f.reason, f.flagged_at \
               FROM review_flags f JOIN jobs j ON j.id = f.job_id \
              ORDER BY f.flagged_at DESC, f.id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<ReviewFlag, StoreError> {
                Ok(ReviewFlag {
                    id: row.try_get("id")?,
                    job_id: row.try_get("job_id")?,
                    title: row.try_get("title")?,
                    employer: row.try_get("employer")?,
                    url: row.try_get("url")?,
                    reason: row.try_get("reason")?,
                    flagged_at: row.try_get("flagged_at")?,
                })
            })
            .collect()
    }

    /// Hard delete. Review flags go with their job.
    pub async fn delete_jobs(&self, ids: &[i64]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for chunk in ids.chunks(IN_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM jobs WHERE id IN (");
            let mut sep = qb.separated(", ");
            for id in chunk {
                sep.push_bind(*id);
            }
            qb.push(")");
            deleted += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        info!(deleted, "deleted jobs");
        Ok(deleted)
    }
}

/// One reconciliation pass. Dropping it without [`StoreTx::commit`] rolls everything back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    pub async fn job_id_for_url_key(&mut self, url_key: &str) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT id FROM jobs WHERE url_key = ?")
            .bind(url_key)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(|r| r.try_get("id")).transpose()?)
    }

    pub async fn insert_job(
        &mut self,
        job: &NormalizedJob,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let query = sqlx::query(
            "INSERT INTO jobs (url_key, url, source_id, source_name, title, employer, raw_category, \
                               raw_location, description, salary_text, job_type, posted_at, closing_at, \
                               category, classification, location, salary_min, salary_max, pay_period, \
                               experience_level, experience_confidence, years_min, years_max, education, \
                               activity, first_seen_at, last_seen_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.url_key.as_str());
        let done = bind_job_fields(query, job)
            .bind(Activity::Active.as_str())
            .bind(now)
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(done.last_insert_rowid())
    }

    /// Overwrite every mutable field, mark active and advance `last_seen_at`.
    /// First-seen and quarantine are left alone.
    pub async fn refresh_job(
        &mut self,
        id: i64,
        job: &NormalizedJob,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = sqlx::query(
            "UPDATE jobs SET url = ?, source_id = ?, source_name = ?, title = ?, employer = ?, \
                             raw_category = ?, raw_location = ?, description = ?, salary_text = ?, \
                             job_type = ?, posted_at = ?, closing_at = ?, category = ?, \
                             classification = ?, location = ?, salary_min = ?, salary_max = ?, \
                             pay_period = ?, experience_level = ?, experience_confidence = ?, \
                             years_min = ?, years_max = ?, education = ?, \
                             activity = ?, last_seen_at = ? \
             WHERE id = ?",
        );
        bind_job_fields(query, job)
            .bind(Activity::Active.as_str())
            .bind(now)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Active jobs last seen before `cutoff` become stale-inactive.
    pub async fn mark_stale(&mut self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let done = sqlx::query(
            "UPDATE jobs SET activity = ? WHERE activity = ? AND last_seen_at < ?",
        )
        .bind(Activity::StaleInactive.as_str())
        .bind(Activity::Active.as_str())
        .bind(cutoff)
        .execute(&mut *self.tx)
        .await?;
        Ok(done.rows_affected())
    }

    /// Rebuild the employer rollup from visible jobs.
    pub async fn rebuild_employers(&mut self) -> Result<u64, StoreError> {
        sqlx::query("DELETE FROM employers")
            .execute(&mut *self.tx)
            .await?;
        let sql = "INSERT INTO employers (name, primary_category, job_count) \
             SELECT j.employer, \
                    (SELECT c.category FROM jobs c \
                      WHERE c.employer = j.employer AND c.activity = 'active' AND c.quarantined_at IS NULL \
                      GROUP BY c.category ORDER BY COUNT(*) DESC, c.category LIMIT 1), \
                    COUNT(*) \
               FROM jobs j WHERE j.activity = 'active' AND j.quarantined_at IS NULL \
              GROUP BY j.employer";
        let done = sqlx::query(sql).execute(&mut *self.tx).await?;
        Ok(done.rows_affected())
    }

    pub async fn count_visible(&mut self) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM jobs WHERE {VISIBLE}");
        Ok(sqlx::query(&sql).fetch_one(&mut *self.tx).await?.try_get(0)?)
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &JobFilter) {
    if let Some(category) = non_blank(&filter.category) {
        qb.push(" AND category = ").push_bind(category.to_string());
    }
    if let Some(employer) = non_blank(&filter.employer) {
        qb.push(" AND employer LIKE ")
            .push_bind(format!("%{employer}%"));
    }
    if let Some(search) = non_blank(&filter.search) {
        qb.push(" AND title LIKE ").push_bind(format!("%{search}%"));
    }
    if let Some(source) = non_blank(&filter.source) {
        qb.push(" AND source_name = ").push_bind(source.to_string());
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Binds url through education, in the column order shared by insert and refresh.
fn bind_job_fields<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    job: &'q NormalizedJob,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let c = &job.candidate;
    query
        .bind(c.url.as_str())
        .bind(c.source_id.as_str())
        .bind(c.source_name.as_str())
        .bind(c.title.as_str())
        .bind(c.employer.as_str())
        .bind(c.raw_category.as_deref())
        .bind(c.raw_location.as_deref())
        .bind(c.description.as_deref())
        .bind(c.salary_text.as_deref())
        .bind(c.job_type.as_deref())
        .bind(c.posted_at)
        .bind(c.closing_at)
        .bind(job.category.as_str())
        .bind(job.classification.as_deref())
        .bind(job.location.as_str())
        .bind(job.salary.min_annual)
        .bind(job.salary.max_annual)
        .bind(job.salary.pay_period.as_str())
        .bind(job.experience.level.as_str())
        .bind(job.experience.confidence)
        .bind(job.experience.years_min.map(i64::from))
        .bind(job.experience.years_max.map(i64::from))
        .bind(job.education.map(|e| e.as_str()))
}

fn parse_column<T: FromStr>(id: i64, column: &'static str, value: String) -> Result<T, StoreError> {
    value.parse().map_err(|_| StoreError::Corrupt { id, column, value })
}

fn job_from_row(row: &SqliteRow) -> Result<CanonicalJob, StoreError> {
    let id: i64 = row.try_get("id")?;

    let candidate = Candidate {
        source_id: row.try_get("source_id")?,
        source_name: row.try_get("source_name")?,
        title: row.try_get("title")?,
        employer: row.try_get("employer")?,
        url: row.try_get("url")?,
        raw_category: row.try_get("raw_category")?,
        raw_location: row.try_get("raw_location")?,
        description: row.try_get("description")?,
        salary_text: row.try_get("salary_text")?,
        job_type: row.try_get("job_type")?,
        posted_at: row.try_get("posted_at")?,
        closing_at: row.try_get("closing_at")?,
    };

    let pay_period: PayPeriod = parse_column(id, "pay_period", row.try_get("pay_period")?)?;
    let level: ExperienceLevel =
        parse_column(id, "experience_level", row.try_get("experience_level")?)?;
    let education = row
        .try_get::<Option<String>, _>("education")?
        .map(|e| parse_column::<EducationTier>(id, "education", e))
        .transpose()?;
    let activity: Activity = parse_column(id, "activity", row.try_get("activity")?)?;

    let years = |column: &'static str| -> Result<Option<u32>, StoreError> {
        Ok(row
            .try_get::<Option<i64>, _>(column)?
            .and_then(|v| u32::try_from(v).ok()))
    };

    let quarantine = match (
        row.try_get::<Option<String>, _>("quarantine_reason")?,
        row.try_get::<Option<DateTime<Utc>>, _>("quarantined_at")?,
    ) {
        (reason, Some(quarantined_at)) => Some(Quarantine {
            reason: reason.unwrap_or_default(),
            quarantined_at,
        }),
        (_, None) => None,
    };

    Ok(CanonicalJob {
        id,
        job: NormalizedJob {
            url_key: row.try_get("url_key")?,
            category: row.try_get("category")?,
            classification: row.try_get("classification")?,
            location: row.try_get("location")?,
            salary: NormalizedSalary {
                min_annual: row.try_get("salary_min")?,
                max_annual: row.try_get("salary_max")?,
                pay_period,
            },
            experience: ExperienceAssessment {
                level,
                confidence: row.try_get("experience_confidence")?,
                years_min: years("years_min")?,
                years_max: years("years_max")?,
            },
            education,
            candidate,
        },
        activity,
        quarantine,
        first_seen_at: row.try_get("first_seen_at")?,
        last_seen_at: row.try_get("last_seen_at")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).single().unwrap()
    }

    fn job(url: &str, title: &str, employer: &str, category: &str) -> NormalizedJob {
        let candidate = Candidate::new("fixture", title, employer, url);
        NormalizedJob {
            url_key: candidate.url_key(),
            candidate,
            category: category.to_string(),
            classification: None,
            location: "Eureka, CA".to_string(),
            salary: NormalizedSalary::none(),
            experience: ExperienceAssessment::default(),
            education: None,
        }
    }

    async fn seeded() -> (JobStore, Vec<i64>) {
        let store = JobStore::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        let mut ids = Vec::new();
        for (i, (title, employer, category)) in [
            ("Math Teacher", "Eureka City Schools", "Education"),
            ("Registered Nurse", "Mad River Community Hospital", "Healthcare"),
            ("Night Nurse", "Mad River Community Hospital", "Healthcare"),
        ]
        .into_iter()
        .enumerate()
        {
            let j = job(&format!("https://x/job/{i}"), title, employer, category);
            ids.push(tx.insert_job(&j, at(1)).await.unwrap());
        }
        tx.rebuild_employers().await.unwrap();
        tx.commit().await.unwrap();
        (store, ids)
    }

    #[tokio::test]
    async fn insert_then_read_back_round_trips_fields() {
        let store = JobStore::in_memory().await.unwrap();
        let mut j = job("https://x/job/1", "Senior Analyst", "County of Humboldt", "Government");
        j.salary = NormalizedSalary {
            min_annual: Some(41_600),
            max_annual: Some(52_000),
            pay_period: PayPeriod::Hourly,
        };
        j.experience = ExperienceAssessment {
            level: ExperienceLevel::Senior,
            confidence: 1.0,
            years_min: Some(5),
            years_max: None,
        };
        j.education = Some(EducationTier::Bachelor);

        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_job(&j, at(1)).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(stored.job, j);
        assert_eq!(stored.activity, Activity::Active);
        assert_eq!(stored.first_seen_at, at(1));
        assert_eq!(stored.last_seen_at, at(1));
        assert!(stored.quarantine.is_none());
    }

    #[tokio::test]
    async fn url_key_is_unique() {
        let store = JobStore::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_job(&job("https://x/job/1", "Cook", "Cafe", "Other"), at(1))
            .await
            .unwrap();
        let dup = tx
            .insert_job(&job("https://X/job/1/", "Cook", "Cafe", "Other"), at(1))
            .await;
        assert!(matches!(dup, Err(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = JobStore::in_memory().await.unwrap();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_job(&job("https://x/job/1", "Cook", "Cafe", "Other"), at(1))
                .await
                .unwrap();
        }
        assert_eq!(store.stats().await.unwrap().total_jobs, 0);
    }

    #[tokio::test]
    async fn listing_filters_paginate_and_hide_quarantined() {
        let (store, ids) = seeded().await;

        let all = store.list_jobs(&JobFilter::default()).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.pages, 1);

        let nurses = store
            .list_jobs(&JobFilter {
                search: Some("nurse".into()),
                per_page: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(nurses.total, 2);
        assert_eq!(nurses.pages, 2);
        assert_eq!(nurses.jobs.len(), 1);

        let by_employer = store
            .list_jobs(&JobFilter {
                employer: Some("mad river".into()),
                category: Some("Healthcare".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_employer.total, 2);

        assert!(store.set_quarantine(ids[1], "spam", at(2)).await.unwrap());
        let visible = store.list_jobs(&JobFilter::default()).await.unwrap();
        assert_eq!(visible.total, 2);
        assert!(store.get_visible_job(ids[1]).await.unwrap().is_none());
        assert!(store.get_job(ids[1]).await.unwrap().is_some());

        assert!(store.clear_quarantine(ids[1]).await.unwrap());
        assert!(!store.clear_quarantine(ids[1]).await.unwrap());
        assert!(store.get_visible_job(ids[1]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn page_size_is_capped() {
        let (store, _) = seeded().await;
        let page = store
            .list_jobs(&JobFilter {
                per_page: 10_000,
                page: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.per_page, MAX_PAGE_SIZE);
        assert_eq!(page.page, 1);
    }

    #[tokio::test]
    async fn stale_marking_respects_cutoff() {
        let (store, ids) = seeded().await;
        let mut tx = store.begin().await.unwrap();
        tx.refresh_job(ids[0], &job("https://x/job/0", "Math Teacher", "Eureka City Schools", "Education"), at(9))
            .await
            .unwrap();
        let stale = tx.mark_stale(at(9) - Duration::days(7)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(stale, 2);
        assert_eq!(store.get_job(ids[0]).await.unwrap().unwrap().activity, Activity::Active);
        assert_eq!(
            store.get_job(ids[1]).await.unwrap().unwrap().activity,
            Activity::StaleInactive
        );
    }

    #[tokio::test]
    async fn employer_rollup_and_stats_count_visible_jobs() {
        let (store, _) = seeded().await;
        let employers = store.employers().await.unwrap();
        assert_eq!(employers[0].name, "Mad River Community Hospital");
        assert_eq!(employers[0].job_count, 2);
        assert_eq!(employers[0].primary_category, "Healthcare");

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_jobs, 3);
        assert_eq!(stats.total_employers, 2);
        assert_eq!(stats.jobs_by_category.get("Healthcare"), Some(&2));
        assert_eq!(stats.jobs_by_source.get("fixture"), Some(&3));
    }

    #[tokio::test]
    async fn review_flags_join_job_details_and_cascade_on_delete() {
        let (store, ids) = seeded().await;
        store.add_review_flag(ids[2], "duplicate?", at(3)).await.unwrap();

        let flags = store.review_flags().await.unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].title, "Night Nurse");

        assert_eq!(store.delete_jobs(&[ids[2]]).await.unwrap(), 1);
        assert!(store.review_flags().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_log_is_append_only_and_newest_first() {
        let store = JobStore::in_memory().await.unwrap();
        let mut first = RunReport::new(Uuid::new_v4(), at(1));
        first.inserted = 3;
        let mut second = RunReport::new(Uuid::new_v4(), at(2));
        second.updated = 3;
        store.append_run_report(&first).await.unwrap();
        store.append_run_report(&second).await.unwrap();

        let reports = store.recent_run_reports(5).await.unwrap();
        assert_eq!(reports, vec![second, first]);
    }

    #[tokio::test]
    async fn salary_coverage_and_issue_log() {
        let (store, _) = seeded().await;
        let coverage = store.salary_coverage_by_employer().await.unwrap();
        assert_eq!(coverage["Mad River Community Hospital"].total, 2);
        assert_eq!(coverage["Mad River Community Hospital"].rate_percent, 0);

        let written = store.log_salary_issues("run-1", &coverage, at(4)).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.salary_issues_for_run("run-1").await.unwrap(), coverage);
    }

    #[tokio::test]
    async fn existing_url_keys_reports_only_persisted() {
        let (store, _) = seeded().await;
        let found = store
            .existing_url_keys(&["https://x/job/0".into(), "https://x/job/99".into()])
            .await
            .unwrap();
        assert_eq!(found, HashSet::from(["https://x/job/0".to_string()]));
    }
}
