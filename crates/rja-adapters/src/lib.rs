//! Source adapter contract, shared extraction helpers and the source registry.
//!
//! An adapter only turns one external site into [`Candidate`]s. It never persists,
//! and it makes no assumptions about the order other adapters run in.

pub mod fixture;
pub mod listing;
pub mod workday;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Url;
use rja_core::Candidate;
use rja_storage::{FetchError, HttpFetcher};
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

pub use fixture::FixtureAdapter;
pub use listing::{HtmlListingAdapter, ListingConfig};
pub use workday::{WorkdayAdapter, WorkdayConfig};

pub const CRATE_NAME: &str = "rja-adapters";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
}

impl AdapterContext {
    pub fn new(run_id: Uuid, fetched_at: DateTime<Utc>) -> Self {
        Self { run_id, fetched_at }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid css selector {selector:?}: {message}")]
    Selector { selector: String, message: String },
    #[error("unexpected payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// One external site. Returning an error means the whole source failed for this run.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &str;

    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<Vec<Candidate>, AdapterError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Employer recorded on every candidate the source yields, unless the record names one.
    pub employer: String,
    #[serde(flatten)]
    pub kind: SourceKind,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Offline JSON file of candidate records, relative to the workspace root.
    Fixture { path: PathBuf },
    HtmlListing(ListingConfig),
    Workday(WorkdayConfig),
}

impl SourceRegistry {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let registry: Self = serde_yaml::from_str(text).context("parsing source registry")?;
        let mut seen = std::collections::HashSet::new();
        for source in &registry.sources {
            if !seen.insert(source.source_id.as_str()) {
                anyhow::bail!("duplicate source_id {} in registry", source.source_id);
            }
        }
        Ok(registry)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    /// Enabled sources, optionally restricted to `only`. Naming a source explicitly
    /// runs it even when disabled; unknown names are an error.
    pub fn select(&self, only: &[String]) -> Result<Vec<&SourceConfig>> {
        if only.is_empty() {
            return Ok(self.sources.iter().filter(|s| s.enabled).collect());
        }
        only.iter()
            .map(|id| {
                self.sources
                    .iter()
                    .find(|s| &s.source_id == id)
                    .with_context(|| format!("no source named {id} in registry"))
            })
            .collect()
    }
}

pub fn adapter_for_source(config: &SourceConfig, workspace_root: &Path) -> Box<dyn SourceAdapter> {
    match &config.kind {
        SourceKind::Fixture { path } => Box::new(FixtureAdapter::new(
            &config.source_id,
            &config.employer,
            workspace_root.join(path),
        )),
        SourceKind::HtmlListing(listing) => Box::new(HtmlListingAdapter::new(
            &config.source_id,
            &config.employer,
            listing.clone(),
        )),
        SourceKind::Workday(site) => Box::new(WorkdayAdapter::new(
            &config.source_id,
            &config.employer,
            site.clone(),
        )),
    }
}

pub(crate) fn text_or_none(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Keeps interior newlines so the quality gate can see malformed titles.
pub(crate) fn raw_text_or_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

pub(crate) fn select_first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .next()
        .and_then(|n| text_or_none(&n.text().collect::<String>()))
}

pub(crate) fn select_first_attr(scope: ElementRef<'_>, sel: &Selector, attr: &str) -> Option<String> {
    scope
        .select(sel)
        .next()
        .and_then(|n| n.value().attr(attr))
        .and_then(text_or_none)
}

pub(crate) fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_str()
}

/// Resolve `href` against the page it was found on.
pub(crate) fn absolute_url(base: &str, href: &str) -> Option<String> {
    if href.starts_with("javascript:") || href.starts_with('#') {
        return None;
    }
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

/// Dates as listing pages print them. Times are taken as midnight UTC.
pub(crate) fn parse_listing_date(text: &str) -> Option<DateTime<Utc>> {
    const FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%m-%d-%Y"];
    let text = text.trim().trim_start_matches("Posted").trim_start_matches(':').trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// "Posted Today", "Posted Yesterday", "Posted 3 Days Ago", "Posted 30+ Days Ago".
pub(crate) fn parse_relative_posted(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = text.to_ascii_lowercase();
    if lower.contains("today") {
        return Some(now);
    }
    if lower.contains("yesterday") {
        return Some(now - Duration::days(1));
    }
    let days: i64 = lower
        .split_whitespace()
        .find_map(|w| w.trim_end_matches('+').parse().ok())?;
    lower.contains("day").then(|| now - Duration::days(days))
}
