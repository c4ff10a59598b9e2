//! Offline adapter: candidate records captured to a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rja_core::Candidate;
use rja_storage::HttpFetcher;
use serde::{Deserialize, Serialize};

use crate::{AdapterContext, AdapterError, SourceAdapter};

/// One captured posting. Only title and url are required; employer falls back to the
/// registry entry's employer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureRecord {
    pub source_id: Option<String>,
    pub title: String,
    pub employer: Option<String>,
    pub url: String,
    pub category: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub salary_text: Option<String>,
    pub job_type: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub closing_at: Option<DateTime<Utc>>,
}

pub fn load_fixture_records(path: impl AsRef<Path>) -> anyhow::Result<Vec<FixtureRecord>> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Clone)]
pub struct FixtureAdapter {
    source_id: String,
    employer: String,
    path: PathBuf,
}

impl FixtureAdapter {
    pub fn new(source_id: &str, employer: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.to_string(),
            employer: employer.to_string(),
            path: path.into(),
        }
    }

    pub fn to_candidate(&self, record: FixtureRecord) -> Candidate {
        let employer = record
            .employer
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| self.employer.clone());
        let mut candidate = Candidate::new(&self.source_id, record.title, employer, record.url);
        if let Some(id) = record.source_id {
            candidate.source_id = id;
        }
        candidate.raw_category = record.category;
        candidate.raw_location = record.location;
        candidate.description = record.description;
        candidate.salary_text = record.salary_text;
        candidate.job_type = record.job_type;
        candidate.posted_at = record.posted_at;
        candidate.closing_at = record.closing_at;
        candidate
    }
}

#[async_trait]
impl SourceAdapter for FixtureAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch(
        &self,
        _http: &HttpFetcher,
        _ctx: &AdapterContext,
    ) -> Result<Vec<Candidate>, AdapterError> {
        let records = load_fixture_records(&self.path)?;
        Ok(records.into_iter().map(|r| self.to_candidate(r)).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::Utc;
    use rja_storage::HttpClientConfig;
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn reads_records_and_fills_employer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
              {{"title": "Line Cook", "url": "https://example.org/jobs/1", "salary_text": "$18 an hour"}},
              {{"title": "Barista", "url": "https://example.org/jobs/2", "employer": "Cafe Brio", "source_id": "B-2"}}
            ]"#
        )
        .unwrap();

        let adapter = FixtureAdapter::new("offline", "Sample Employer", file.path());
        let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
        let ctx = AdapterContext::new(Uuid::new_v4(), Utc::now());
        let found = adapter.fetch(&http, &ctx).await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].employer, "Sample Employer");
        assert_eq!(found[0].source_id, "https://example.org/jobs/1");
        assert_eq!(found[0].salary_text.as_deref(), Some("$18 an hour"));
        assert_eq!(found[1].employer, "Cafe Brio");
        assert_eq!(found[1].source_id, "B-2");
        assert!(found.iter().all(|c| c.source_name == "offline"));
    }

    #[tokio::test]
    async fn missing_file_fails_the_source() {
        let adapter = FixtureAdapter::new("offline", "Sample Employer", "/definitely/not/here.json");
        let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
        let ctx = AdapterContext::new(Uuid::new_v4(), Utc::now());
        assert!(matches!(
            adapter.fetch(&http, &ctx).await,
            Err(AdapterError::Anyhow(_))
        ));
    }
}
