//! Core domain model for RJA: adapter candidates, canonical jobs, and run reports.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "rja-core";

/// Fixed category taxonomy. Every canonical job carries exactly one of these.
pub const STANDARD_CATEGORIES: [&str; 17] = [
    "Government",
    "Education",
    "Healthcare",
    "Tribal Organizations",
    "Nonprofit & Social Services",
    "Local Retail",
    "National Retail",
    "Food & Agriculture",
    "Food & Beverage",
    "Timber & Forestry",
    "Manufacturing",
    "Construction & Engineering",
    "Energy & Utilities",
    "Transportation & Logistics",
    "Financial Services",
    "Hospitality & Entertainment",
    OTHER_CATEGORY,
];

pub const OTHER_CATEGORY: &str = "Other";

/// Identity key for a listing URL: case-insensitive, trailing-slash-insensitive.
pub fn url_key(url: &str) -> String {
    url.trim().to_lowercase().trim_end_matches('/').to_string()
}

/// Untrusted record emitted by one adapter in one run. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Identifier the source uses for the posting (requisition id, slug, ...).
    pub source_id: String,
    /// Adapter that produced the record.
    pub source_name: String,
    pub title: String,
    pub employer: String,
    pub url: String,
    pub raw_category: Option<String>,
    pub raw_location: Option<String>,
    pub description: Option<String>,
    pub salary_text: Option<String>,
    pub job_type: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub closing_at: Option<DateTime<Utc>>,
}

impl Candidate {
    pub fn new(
        source_name: impl Into<String>,
        title: impl Into<String>,
        employer: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            source_id: url.clone(),
            source_name: source_name.into(),
            title: title.into(),
            employer: employer.into(),
            url,
            raw_category: None,
            raw_location: None,
            description: None,
            salary_text: None,
            job_type: None,
            posted_at: None,
            closing_at: None,
        }
    }

    pub fn url_key(&self) -> String {
        url_key(&self.url)
    }
}

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} value {:?}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Unit a salary figure was expressed in before annualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PayPeriod {
    Hourly,
    Daily,
    Monthly,
    Annual,
    #[default]
    Unknown,
}

text_enum!(PayPeriod {
    Hourly => "hourly",
    Daily => "daily",
    Monthly => "monthly",
    Annual => "annual",
    Unknown => "unknown",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NormalizedSalary {
    pub min_annual: Option<i64>,
    pub max_annual: Option<i64>,
    pub pay_period: PayPeriod,
}

impl NormalizedSalary {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_known(&self) -> bool {
        self.min_annual.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ExperienceLevel {
    Entry,
    Mid,
    Senior,
    #[default]
    Unknown,
}

text_enum!(ExperienceLevel {
    Entry => "Entry",
    Mid => "Mid",
    Senior => "Senior",
    Unknown => "unknown",
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ExperienceAssessment {
    pub level: ExperienceLevel,
    /// 0.0 when `level` is unknown, otherwise in (0.0, 1.0].
    pub confidence: f64,
    pub years_min: Option<u32>,
    pub years_max: Option<u32>,
}

/// Ordinal education tiers; the derived `Ord` is the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EducationTier {
    HighSchool,
    Associate,
    Bachelor,
    Master,
    Doctorate,
}

text_enum!(EducationTier {
    HighSchool => "High School",
    Associate => "Associate",
    Bachelor => "Bachelor",
    Master => "Master",
    Doctorate => "Doctorate",
});

/// Output of the normalization stage: the candidate plus every derived field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedJob {
    pub candidate: Candidate,
    pub url_key: String,
    pub category: String,
    pub classification: Option<String>,
    pub location: String,
    pub salary: NormalizedSalary,
    pub experience: ExperienceAssessment,
    pub education: Option<EducationTier>,
}

/// Freshness axis. Independent from quarantine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Active,
    StaleInactive,
}

text_enum!(Activity {
    Active => "active",
    StaleInactive => "stale_inactive",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quarantine {
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
}

/// Effective lifecycle state as seen by read paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Active,
    StaleInactive,
    Quarantined,
}

/// Persisted, normalized listing. At most one per `url_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalJob {
    pub id: i64,
    pub job: NormalizedJob,
    pub activity: Activity,
    pub quarantine: Option<Quarantine>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl CanonicalJob {
    pub fn state(&self) -> JobState {
        match (&self.quarantine, self.activity) {
            (Some(_), _) => JobState::Quarantined,
            (None, Activity::Active) => JobState::Active,
            (None, Activity::StaleInactive) => JobState::StaleInactive,
        }
    }

    pub fn is_publicly_visible(&self) -> bool {
        self.state() == JobState::Active
    }

    pub fn summary(&self) -> JobSummary {
        let c = &self.job.candidate;
        JobSummary {
            id: self.id,
            title: c.title.clone(),
            employer: c.employer.clone(),
            location: self.job.location.clone(),
            url: c.url.clone(),
            salary_text: c.salary_text.clone(),
            description: c
                .description
                .as_deref()
                .map(|d| d.chars().take(SUMMARY_DESCRIPTION_CHARS).collect()),
            source_name: c.source_name.clone(),
        }
    }
}

const SUMMARY_DESCRIPTION_CHARS: usize = 200;

/// Regenerable per-employer rollup; never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employer {
    pub name: String,
    pub primary_category: String,
    pub job_count: i64,
}

/// Compact view handed to advisory reviewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: i64,
    pub title: String,
    pub employer: String,
    pub location: String,
    pub url: String,
    pub salary_text: Option<String>,
    pub description: Option<String>,
    pub source_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Approve,
    Quarantine,
    Flag,
}

text_enum!(VerdictKind {
    Approve => "approve",
    Quarantine => "quarantine",
    Flag => "flag",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub job_id: i64,
    pub verdict: VerdictKind,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SalaryCoverage {
    pub total: usize,
    pub with_salary: usize,
    pub missing: usize,
    pub rate_percent: u32,
}

impl SalaryCoverage {
    pub fn from_counts(total: usize, with_salary: usize) -> Self {
        let rate_percent = if total == 0 {
            0
        } else {
            (100 * with_salary / total) as u32
        };
        Self {
            total,
            with_salary,
            missing: total.saturating_sub(with_salary),
            rate_percent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReviewSummary {
    pub reviewed: usize,
    pub approved: usize,
    pub quarantined: usize,
    pub flagged: usize,
    /// True when the oracle was unavailable and everything defaulted to approve.
    pub failed_open: bool,
}

/// One per ingestion pass. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scraped: usize,
    /// Candidates surviving URL and fuzzy deduplication.
    pub deduplicated: usize,
    pub duplicates_dropped: usize,
    pub gate_rejected: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deactivated: usize,
    pub active_total: usize,
    pub source_counts: BTreeMap<String, usize>,
    pub source_errors: BTreeMap<String, String>,
    pub salary_coverage: BTreeMap<String, SalaryCoverage>,
    pub new_job_urls: Vec<String>,
    pub review: ReviewSummary,
}

impl RunReport {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            scraped: 0,
            deduplicated: 0,
            duplicates_dropped: 0,
            gate_rejected: 0,
            inserted: 0,
            updated: 0,
            deactivated: 0,
            active_total: 0,
            source_counts: BTreeMap::new(),
            source_errors: BTreeMap::new(),
            salary_coverage: BTreeMap::new(),
            new_job_urls: Vec::new(),
            review: ReviewSummary::default(),
        }
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}
