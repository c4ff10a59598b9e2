//! Workday CXS job-search API. Shared by every employer hosted on Workday; each
//! registry entry only supplies tenant, data center and site code.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use rja_core::Candidate;
use rja_storage::HttpFetcher;
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::{json_str, parse_relative_posted, AdapterContext, AdapterError, SourceAdapter};

/// Workday's own page size.
pub const PAGE_LIMIT: usize = 20;
/// Upper bound on pages per source, in case `total` is missing or wrong.
const MAX_PAGES: usize = 100;
const DESCRIPTION_CHARS: usize = 500;
/// Below this a figure is read as an hourly wage.
const HOURLY_CEILING: f64 = 500.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkdayConfig {
    pub tenant: String,
    pub dc: u32,
    pub site: String,
    /// Keep only postings whose location text contains one of these (case-insensitive).
    #[serde(default)]
    pub location_filter: Vec<String>,
    /// Fetch each posting's detail record for description and pay.
    #[serde(default)]
    pub fetch_details: bool,
}

impl WorkdayConfig {
    pub fn base_url(&self) -> String {
        format!("https://{}.wd{}.myworkdayjobs.com", self.tenant, self.dc)
    }

    fn api_root(&self) -> String {
        format!("{}/wday/cxs/{}/{}", self.base_url(), self.tenant, self.site)
    }

    pub fn jobs_endpoint(&self) -> String {
        format!("{}/jobs", self.api_root())
    }

    pub fn public_url(&self, external_path: &str) -> String {
        format!("{}/en-US/{}{}", self.base_url(), self.site, external_path)
    }

    fn matches_location(&self, posting: &WorkdayPosting) -> bool {
        if self.location_filter.is_empty() {
            return true;
        }
        let text = posting.locations_text.as_deref().unwrap_or_default().to_lowercase();
        self.location_filter
            .iter()
            .any(|needle| text.contains(&needle.to_lowercase()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkdayPage {
    #[serde(default)]
    pub total: Option<usize>,
    #[serde(default, rename = "jobPostings")]
    pub job_postings: Vec<WorkdayPosting>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkdayPosting {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub external_path: String,
    #[serde(default)]
    pub locations_text: Option<String>,
    #[serde(default)]
    pub posted_on: Option<String>,
    #[serde(default)]
    pub time_type: Option<String>,
    #[serde(default)]
    pub bullet_fields: Vec<String>,
}

/// Page through the CXS search endpoint. `total` is only trusted from the first page;
/// a failure after the first page keeps what was already fetched.
pub async fn fetch_all_postings(
    http: &HttpFetcher,
    source_id: &str,
    site: &WorkdayConfig,
) -> Result<Vec<WorkdayPosting>, AdapterError> {
    let endpoint = site.jobs_endpoint();
    let mut postings = Vec::new();
    let mut total = None;
    let mut offset = 0;

    for page_no in 0..MAX_PAGES {
        let body = json!({
            "appliedFacets": {},
            "limit": PAGE_LIMIT,
            "offset": offset,
            "searchText": "",
        });
        let page: WorkdayPage = match http.post_json(source_id, &endpoint, &body).await {
            Ok(page) => page,
            Err(err) if page_no > 0 => {
                warn!(source_id, offset, error = %err, "workday paging stopped early");
                break;
            }
            Err(err) => return Err(err.into()),
        };

        if total.is_none() {
            total = page.total;
        }
        if page.job_postings.is_empty() {
            break;
        }
        postings.extend(page.job_postings);
        offset += PAGE_LIMIT;
        if offset >= total.unwrap_or(0) {
            break;
        }
    }

    info!(source_id, fetched = postings.len(), total = total.unwrap_or(0), "workday postings");
    Ok(postings)
}

#[derive(Debug, Clone)]
pub struct WorkdayAdapter {
    source_id: String,
    employer: String,
    site: WorkdayConfig,
}

impl WorkdayAdapter {
    pub fn new(source_id: &str, employer: &str, site: WorkdayConfig) -> Self {
        Self {
            source_id: source_id.to_string(),
            employer: employer.to_string(),
            site,
        }
    }

    pub fn to_candidate(&self, posting: &WorkdayPosting, now: DateTime<Utc>) -> Option<Candidate> {
        let title = posting.title.trim();
        if title.is_empty() || posting.external_path.is_empty() {
            return None;
        }

        let mut candidate = Candidate::new(
            &self.source_id,
            title,
            &self.employer,
            self.site.public_url(&posting.external_path),
        );
        candidate.source_id = requisition_id(posting);
        candidate.raw_location = posting.locations_text.clone();
        candidate.posted_at = posting
            .posted_on
            .as_deref()
            .and_then(|p| parse_relative_posted(p, now));
        candidate.job_type = posting
            .time_type
            .clone()
            .or_else(|| job_type_from_bullets(&posting.bullet_fields));
        Some(candidate)
    }

    /// Fill description, pay and job type from the posting's detail record.
    async fn enrich(&self, http: &HttpFetcher, posting: &WorkdayPosting, candidate: &mut Candidate) {
        let url = format!("{}{}", self.site.api_root(), posting.external_path);
        let detail: JsonValue = match http.get_text(&self.source_id, &url).await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(err) => {
                    warn!(source_id = %self.source_id, %url, error = %err, "workday detail is not json");
                    return;
                }
            },
            Err(err) => {
                warn!(source_id = %self.source_id, %url, error = %err, "workday detail fetch failed");
                return;
            }
        };

        if let Some(html) = json_str(&detail, &["jobPostingInfo", "jobDescription"]) {
            let text = html_to_text(html);
            candidate.salary_text = compensation_from_text(&text);
            let description: String = text.chars().take(DESCRIPTION_CHARS).collect();
            candidate.description = Some(description.trim().to_string()).filter(|d| !d.is_empty());
        }
        if candidate.job_type.is_none() {
            candidate.job_type =
                json_str(&detail, &["jobPostingInfo", "timeType"]).map(str::to_string);
        }
    }
}

#[async_trait]
impl SourceAdapter for WorkdayAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<Vec<Candidate>, AdapterError> {
        let postings = fetch_all_postings(http, &self.source_id, &self.site).await?;
        let mut out = Vec::new();
        for posting in postings.iter().filter(|p| self.site.matches_location(p)) {
            let Some(mut candidate) = self.to_candidate(posting, ctx.fetched_at) else {
                continue;
            };
            if self.site.fetch_details {
                self.enrich(http, posting, &mut candidate).await;
            }
            out.push(candidate);
        }
        Ok(out)
    }
}

/// First bullet field (Workday puts the requisition id there), else the last path segment.
fn requisition_id(posting: &WorkdayPosting) -> String {
    if let Some(first) = posting.bullet_fields.first().filter(|b| !b.trim().is_empty()) {
        return first.trim().to_string();
    }
    posting
        .external_path
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn job_type_from_bullets(bullets: &[String]) -> Option<String> {
    bullets.iter().find_map(|field| {
        let lower = field.to_lowercase();
        if lower.contains("full") && lower.contains("time") {
            Some("Full-time".to_string())
        } else if lower.contains("part") && lower.contains("time") {
            Some("Part-time".to_string())
        } else if lower.contains("temporary") {
            Some("Temporary".to_string())
        } else {
            None
        }
    })
}

fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

static LABELLED_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:compensation|salary|pay)\s+range\s*:\s*\$?([\d,]+(?:\.\d{2})?)\s*[-–]\s*\$?([\d,]+(?:\.\d{2})?)",
    )
    .expect("labelled range pattern is valid")
});

static RESIDENCY_YEARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:1st|first)\s+year\s+\$?([\d,]+(?:\.\d{2})?)\s*;?\s*(?:2nd|second)\s+year\s+\$?([\d,]+(?:\.\d{2})?)",
    )
    .expect("residency pattern is valid")
});

static LOOSE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:compensation|salary)[:\s]*\$?([\d,]+(?:\.\d{2})?)\s*(?:to|-)\s*\$?([\d,]+(?:\.\d{2})?)",
    )
    .expect("loose range pattern is valid")
});

/// Pull a pay line out of a posting description, phrased so the salary normalizer
/// can read its unit.
pub fn compensation_from_text(text: &str) -> Option<String> {
    for pattern in [&*LABELLED_RANGE, &*LOOSE_RANGE] {
        if let Some(caps) = pattern.captures(text) {
            if let Some(line) = range_line(&caps[1], &caps[2]) {
                return Some(line);
            }
        }
    }
    RESIDENCY_YEARS
        .captures(text)
        .map(|caps| format!("Year 1: ${} | Year 2: ${}", &caps[1], &caps[2]))
}

fn range_line(low: &str, high: &str) -> Option<String> {
    let value = |s: &str| s.replace(',', "").parse::<f64>().ok();
    let (lo, hi) = (value(low)?, value(high)?);
    if lo == 0.0 && hi == 0.0 {
        return None;
    }
    let unit = if lo < HOURLY_CEILING { "/hr" } else { "/yr" };
    Some(format!("${low} - ${high}{unit}"))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn site() -> WorkdayConfig {
        WorkdayConfig {
            tenant: "opendoorhealth".into(),
            dc: 503,
            site: "ODCHC".into(),
            location_filter: vec![],
            fetch_details: false,
        }
    }

    #[test]
    fn urls_follow_the_cxs_layout() {
        let s = site();
        assert_eq!(
            s.jobs_endpoint(),
            "https://opendoorhealth.wd503.myworkdayjobs.com/wday/cxs/opendoorhealth/ODCHC/jobs"
        );
        assert_eq!(
            s.public_url("/job/Eureka/Medical-Assistant_R123"),
            "https://opendoorhealth.wd503.myworkdayjobs.com/en-US/ODCHC/job/Eureka/Medical-Assistant_R123"
        );
    }

    #[test]
    fn page_payload_decodes_and_converts() {
        let page: WorkdayPage = serde_json::from_str(
            r#"{
              "total": 2,
              "jobPostings": [
                {"title": "Medical Assistant I", "externalPath": "/job/Eureka/Medical-Assistant-I_R1042",
                 "locationsText": "Eureka, CA", "postedOn": "Posted 3 Days Ago",
                 "bulletFields": ["R1042"]},
                {"title": "  ", "externalPath": "/job/Arcata/Blank_R1"}
              ]
            }"#,
        )
        .unwrap();
        assert_eq!(page.total, Some(2));

        let now = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).single().unwrap();
        let adapter = WorkdayAdapter::new("open-door", "Open Door Community Health", site());
        let c = adapter.to_candidate(&page.job_postings[0], now).unwrap();
        assert_eq!(c.source_id, "R1042");
        assert_eq!(c.source_name, "open-door");
        assert_eq!(c.employer, "Open Door Community Health");
        assert_eq!(c.raw_location.as_deref(), Some("Eureka, CA"));
        assert_eq!(c.posted_at, Some(now - Duration::days(3)));
        assert!(adapter.to_candidate(&page.job_postings[1], now).is_none());
    }

    #[test]
    fn requisition_id_falls_back_to_path_slug() {
        let posting = WorkdayPosting {
            external_path: "/job/Fortuna/Cashier_R77".into(),
            ..Default::default()
        };
        assert_eq!(requisition_id(&posting), "Cashier_R77");
    }

    #[test]
    fn location_filter_is_case_insensitive() {
        let mut s = site();
        s.location_filter = vec!["eureka".into(), "95521".into()];
        let at = |loc: &str| WorkdayPosting {
            locations_text: Some(loc.into()),
            ..Default::default()
        };
        assert!(s.matches_location(&at("EUREKA, CA")));
        assert!(s.matches_location(&at("Arcata, CA 95521")));
        assert!(!s.matches_location(&at("Portland, OR")));
    }

    #[test]
    fn job_type_comes_from_bullets() {
        let bullets = vec!["R1".to_string(), "Part Time".to_string()];
        assert_eq!(job_type_from_bullets(&bullets).as_deref(), Some("Part-time"));
        assert_eq!(job_type_from_bullets(&["R1".to_string()]), None);
    }

    #[test]
    fn compensation_lines_are_extracted() {
        assert_eq!(
            compensation_from_text("About us\nCompensation Range: $27.00-$31.35\nDuties").as_deref(),
            Some("$27.00 - $31.35/hr")
        );
        assert_eq!(
            compensation_from_text("Salary range: $98,420 - $113,823").as_deref(),
            Some("$98,420 - $113,823/yr")
        );
        assert_eq!(
            compensation_from_text("1st year $98,420.40; 2nd year $113,823.84").as_deref(),
            Some("Year 1: $98,420.40 | Year 2: $113,823.84")
        );
        assert_eq!(compensation_from_text("Pay range: $0.00 - $0.00"), None);
        assert_eq!(compensation_from_text("Great benefits"), None);
    }

    #[test]
    fn description_html_becomes_plain_text() {
        assert_eq!(
            html_to_text("<p>Join our <b>team</b></p><ul><li>Dental</li></ul>"),
            "Join our\nteam\nDental"
        );
    }
}
