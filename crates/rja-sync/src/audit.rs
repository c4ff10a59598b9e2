//! Offline sweep over persisted active jobs for scraper artifacts that got past the
//! quality gate. Reports by default; deletes high-severity hits only when asked.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use rja_core::CanonicalJob;
use rja_storage::{JobStore, StoreError};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    FileReference,
    MalformedEmployer,
    MalformedUrl,
    MissingFields,
    NavigationElement,
    ShortTitle,
    SocialMedia,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileReference => "file_reference",
            Self::MalformedEmployer => "malformed_employer",
            Self::MalformedUrl => "malformed_url",
            Self::MissingFields => "missing_fields",
            Self::NavigationElement => "navigation_element",
            Self::ShortTitle => "short_title",
            Self::SocialMedia => "social_media",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub job_id: i64,
    pub title: String,
    pub source_name: String,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub detail: String,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title: String = self.title.chars().take(50).collect();
        write!(
            f,
            "[{}] {}: {} - {}",
            self.severity.to_string().to_uppercase(),
            self.kind,
            title,
            self.detail
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    /// Sorted by severity, then kind.
    pub anomalies: Vec<Anomaly>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_kind: BTreeMap<AnomalyKind, usize>,
    pub by_source: BTreeMap<String, usize>,
    /// Distinct jobs with at least one high-severity anomaly.
    pub high_severity_jobs: Vec<i64>,
    pub dry_run: bool,
    pub deleted: u64,
}

const SHORT_TITLE_CHARS: usize = 5;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("anomaly pattern"))
        .collect()
}

static NAVIGATION: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"^live\s*edit$",
        r"^site\s*(links|tools|map)$",
        r"^connect\s*with\s*us$",
        r"^quick\s*links$",
        r"^steps$",
        r"^share$",
        r"^tools$",
        r"^categories$",
        r"^menu$",
        r"^footer$",
        r"^header$",
        r"^navigation$",
        r"^contact(\s*us)?$",
        r"^about(\s*us)?$",
        r"^home$",
        r"^search$",
        r"^accessibility$",
        r"^privacy\s*policy$",
        r"^terms",
        r"^copyright",
        r"^powered\s*by",
        r"^saved\s*jobs",
        r"^your\s*job\s*cart",
        r"^job\s*alerts?",
        r"^my\s*applications?",
        r"^my\s*profile",
        r"^sign\s*in",
        r"^create\s*account",
        r"^register$",
        r"^login$",
        r"^follow\s*us",
        r"^see\s*all\s*jobs",
    ])
});

static FILE_REFERENCE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\.pdf\s*\d+[,.]?\d*\s*(kb|mb|bytes?)$",
        r"\.docx?\s*\d+[,.]?\d*\s*(kb|mb|bytes?)$",
        r"\.xlsx?\s*\d+[,.]?\d*\s*(kb|mb|bytes?)$",
        r"^download\s",
        r"^attachment",
    ])
});

static SOCIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)facebook|twitter|instagram|linkedin|youtube|tiktok").expect("social pattern"));

static BAD_EMPLOYER: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"^\d+\s*hours?\s*(day|per|/)",
        r"^including\s",
        r"^\d+\s*days?\s*(per|/)",
        r"^unknown",
        r"^\s*$",
    ])
});

static NON_JOB_URL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"/facebook$",
        r"/twitter$",
        r"/instagram$",
        r"QuickLinks\.aspx",
        r"/contact",
        r"/about",
    ])
});

/// Every anomaly one job exhibits, at most one per kind.
pub fn check_job(job: &CanonicalJob) -> Vec<Anomaly> {
    let c = &job.job.candidate;
    let title = c.title.trim();
    let url = c.url.trim();
    let mut found = Vec::new();
    let mut push = |kind: AnomalyKind, severity: Severity, detail: String| {
        found.push(Anomaly {
            job_id: job.id,
            title: c.title.clone(),
            source_name: c.source_name.clone(),
            kind,
            severity,
            detail,
        });
    };

    let title_chars = title.chars().count();
    if title_chars < SHORT_TITLE_CHARS {
        push(
            AnomalyKind::ShortTitle,
            Severity::High,
            format!("title too short ({title_chars} chars)"),
        );
    }
    if NAVIGATION.iter().any(|r| r.is_match(title)) {
        push(
            AnomalyKind::NavigationElement,
            Severity::High,
            "title matches a navigation element".into(),
        );
    }
    if FILE_REFERENCE.iter().any(|r| r.is_match(title)) {
        push(
            AnomalyKind::FileReference,
            Severity::High,
            "title looks like a file reference".into(),
        );
    }
    if SOCIAL.is_match(title) || SOCIAL.is_match(url) {
        push(
            AnomalyKind::SocialMedia,
            Severity::Medium,
            "social media reference".into(),
        );
    }
    if BAD_EMPLOYER.iter().any(|r| r.is_match(&c.employer)) {
        let employer: String = c.employer.chars().take(30).collect();
        push(
            AnomalyKind::MalformedEmployer,
            Severity::Medium,
            format!("suspicious employer name {employer:?}"),
        );
    }
    if url.is_empty() || url == title {
        push(
            AnomalyKind::MalformedUrl,
            Severity::Medium,
            "missing or invalid url".into(),
        );
    } else if NON_JOB_URL.iter().any(|r| r.is_match(url)) {
        push(
            AnomalyKind::MalformedUrl,
            Severity::Medium,
            "url does not look like a job posting".into(),
        );
    }
    let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
    if blank(&c.description) && blank(&c.salary_text) {
        push(
            AnomalyKind::MissingFields,
            Severity::Low,
            "no description and no salary".into(),
        );
    }

    found
}

/// Classify `jobs` and aggregate. Pure; see [`run_audit`] for the store-backed sweep.
pub fn analyze(jobs: &[CanonicalJob]) -> AuditReport {
    let mut anomalies: Vec<Anomaly> = jobs.iter().flat_map(check_job).collect();
    anomalies.sort_by(|a, b| (a.severity, a.kind).cmp(&(b.severity, b.kind)));

    let mut report = AuditReport {
        dry_run: true,
        ..AuditReport::default()
    };
    let mut high = BTreeSet::new();
    for a in &anomalies {
        *report.by_severity.entry(a.severity).or_default() += 1;
        *report.by_kind.entry(a.kind).or_default() += 1;
        *report.by_source.entry(a.source_name.clone()).or_default() += 1;
        if a.severity == Severity::High {
            high.insert(a.job_id);
        }
    }
    report.high_severity_jobs = high.into_iter().collect();
    report.anomalies = anomalies;
    report
}

/// Sweep every active job. With `delete` the high-severity jobs are removed; otherwise
/// the report only lists what would go.
pub async fn run_audit(store: &JobStore, delete: bool) -> Result<AuditReport, StoreError> {
    let jobs = store.active_jobs().await?;
    let mut report = analyze(&jobs);
    info!(
        jobs = jobs.len(),
        anomalies = report.anomalies.len(),
        high_severity_jobs = report.high_severity_jobs.len(),
        "anomaly audit complete"
    );

    if delete && !report.high_severity_jobs.is_empty() {
        for a in report.anomalies.iter().filter(|a| a.severity == Severity::High) {
            warn!(job_id = a.job_id, kind = %a.kind, title = %a.title, "deleting anomalous job");
        }
        report.deleted = store.delete_jobs(&report.high_severity_jobs).await?;
    }
    report.dry_run = !delete;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rja_core::Candidate;

    use super::*;
    use crate::reconcile::{ReconcilePolicy, Reconciler};

    fn candidate(title: &str, employer: &str, url: &str) -> Candidate {
        let mut c = Candidate::new("county", title, employer, url);
        c.description = Some("Full time position.".into());
        c
    }

    fn kinds(c: Candidate) -> Vec<AnomalyKind> {
        let job = CanonicalJob {
            id: 1,
            job: rja_normalize::normalize(c),
            activity: rja_core::Activity::Active,
            quarantine: None,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
        };
        check_job(&job).into_iter().map(|a| a.kind).collect()
    }

    #[test]
    fn clean_posting_has_no_anomalies() {
        assert!(kinds(candidate("Eligibility Worker I", "County of Humboldt", "https://x/jobs/1042")).is_empty());
    }

    #[test]
    fn navigation_and_file_titles_are_high_severity() {
        assert_eq!(
            kinds(candidate("Quick Links", "County of Humboldt", "https://x/jobs/1")),
            vec![AnomalyKind::NavigationElement]
        );
        assert_eq!(
            kinds(candidate("Salary Schedule.pdf 245 KB", "County of Humboldt", "https://x/files/9")),
            vec![AnomalyKind::FileReference]
        );
        assert_eq!(
            kinds(candidate("Aide", "County of Humboldt", "https://x/jobs/2")),
            vec![AnomalyKind::ShortTitle]
        );
        assert!(kinds(candidate("Home Health Aide", "Hospice", "https://x/jobs/3")).is_empty());
    }

    #[test]
    fn medium_and_low_checks() {
        assert_eq!(
            kinds(candidate("Follow our Facebook page", "County of Humboldt", "https://x/jobs/4")),
            vec![AnomalyKind::SocialMedia]
        );
        assert_eq!(
            kinds(candidate("Bus Driver", "8 hours per day", "https://x/jobs/5")),
            vec![AnomalyKind::MalformedEmployer]
        );
        assert_eq!(
            kinds(candidate("Bus Driver", "Eureka City Schools", "https://x/Pages/QuickLinks.aspx")),
            vec![AnomalyKind::MalformedUrl]
        );

        let mut bare = candidate("Bus Driver", "Eureka City Schools", "https://x/jobs/6");
        bare.description = None;
        assert_eq!(kinds(bare), vec![AnomalyKind::MissingFields]);
    }

    #[test]
    fn report_sorts_by_severity_and_counts() {
        let jobs: Vec<CanonicalJob> = [
            candidate("Bus Driver", "unknown employer", "https://x/jobs/1"),
            candidate("Menu", "County of Humboldt", "https://x/jobs/2"),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, c)| CanonicalJob {
            id: i as i64 + 1,
            job: rja_normalize::normalize(c),
            activity: rja_core::Activity::Active,
            quarantine: None,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
        })
        .collect();

        let report = analyze(&jobs);
        assert_eq!(report.anomalies[0].severity, Severity::High);
        assert_eq!(report.anomalies.last().map(|a| a.severity), Some(Severity::Medium));
        assert_eq!(report.by_severity[&Severity::High], 2);
        assert_eq!(report.by_severity[&Severity::Medium], 1);
        assert_eq!(report.by_source["county"], 3);
        assert_eq!(report.high_severity_jobs, vec![2]);
    }

    #[tokio::test]
    async fn dry_run_keeps_rows_and_delete_removes_high_only() {
        let store = JobStore::in_memory().await.unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().unwrap();
        let batch: Vec<_> = [
            candidate("Site Map", "County of Humboldt", "https://x/jobs/1"),
            candidate("Bus Driver", "including benefits", "https://x/jobs/2"),
            candidate("Planner II", "County of Humboldt", "https://x/jobs/3"),
        ]
        .into_iter()
        .map(rja_normalize::normalize)
        .collect();
        Reconciler::new(store.clone(), ReconcilePolicy::default())
            .apply(&batch, now)
            .await
            .unwrap();

        let dry = run_audit(&store, false).await.unwrap();
        assert!(dry.dry_run);
        assert_eq!(dry.deleted, 0);
        assert_eq!(dry.high_severity_jobs.len(), 1);
        assert_eq!(store.active_jobs().await.unwrap().len(), 3);

        let wet = run_audit(&store, true).await.unwrap();
        assert!(!wet.dry_run);
        assert_eq!(wet.deleted, 1);
        let left: Vec<String> = store
            .active_jobs()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.job.candidate.title)
            .collect();
        assert_eq!(left, vec!["Bus Driver", "Planner II"]);
    }
}
