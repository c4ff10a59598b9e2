//! Generic CSS-selector adapter for career pages that render one element per posting.

use async_trait::async_trait;
use rja_core::Candidate;
use rja_storage::HttpFetcher;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    absolute_url, parse_listing_date, raw_text_or_none, select_first_attr, select_first_text,
    selector, AdapterContext, AdapterError, SourceAdapter,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingConfig {
    pub url: String,
    /// One match per posting; every other selector is evaluated inside it.
    pub item_selector: String,
    pub title_selector: String,
    /// Defaults to the title element itself when it is a link, else the first `a[href]`.
    #[serde(default)]
    pub link_selector: Option<String>,
    #[serde(default)]
    pub location_selector: Option<String>,
    #[serde(default)]
    pub salary_selector: Option<String>,
    #[serde(default)]
    pub category_selector: Option<String>,
    #[serde(default)]
    pub job_type_selector: Option<String>,
    #[serde(default)]
    pub posted_selector: Option<String>,
    #[serde(default)]
    pub closing_selector: Option<String>,
    #[serde(default)]
    pub description_selector: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HtmlListingAdapter {
    source_id: String,
    employer: String,
    config: ListingConfig,
}

impl HtmlListingAdapter {
    pub fn new(source_id: &str, employer: &str, config: ListingConfig) -> Self {
        Self {
            source_id: source_id.to_string(),
            employer: employer.to_string(),
            config,
        }
    }

    /// Extract candidates from one rendered listing page. Items without a title or a
    /// resolvable link are skipped.
    pub fn parse_page(&self, html: &str, page_url: &str) -> Result<Vec<Candidate>, AdapterError> {
        let cfg = &self.config;
        let item = selector(&cfg.item_selector)?;
        let title = selector(&cfg.title_selector)?;
        let link = selector(cfg.link_selector.as_deref().unwrap_or("a[href]"))?;
        let optional = |css: &Option<String>| css.as_deref().map(selector).transpose();
        let location = optional(&cfg.location_selector)?;
        let salary = optional(&cfg.salary_selector)?;
        let category = optional(&cfg.category_selector)?;
        let job_type = optional(&cfg.job_type_selector)?;
        let posted = optional(&cfg.posted_selector)?;
        let closing = optional(&cfg.closing_selector)?;
        let description = optional(&cfg.description_selector)?;

        let document = Html::parse_document(html);
        let mut out = Vec::new();

        for node in document.select(&item) {
            let Some(title_el) = node.select(&title).next() else {
                continue;
            };
            let Some(title_text) = raw_text_or_none(&title_el.text().collect::<String>()) else {
                continue;
            };
            let href = title_el
                .value()
                .attr("href")
                .map(str::to_string)
                .or_else(|| select_first_attr(node, &link, "href"));
            let Some(url) = href.and_then(|h| absolute_url(page_url, &h)) else {
                debug!(source_id = %self.source_id, title = %title_text, "listing item without link");
                continue;
            };

            let field = |sel: &Option<Selector>| -> Option<String> {
                sel.as_ref().and_then(|s| select_first_text(node, s))
            };

            let mut candidate = Candidate::new(&self.source_id, title_text, &self.employer, url);
            candidate.raw_location = field(&location);
            candidate.salary_text = field(&salary);
            candidate.raw_category = field(&category);
            candidate.job_type = field(&job_type);
            candidate.description = field(&description);
            candidate.posted_at = field(&posted).as_deref().and_then(parse_listing_date);
            candidate.closing_at = field(&closing).as_deref().and_then(parse_listing_date);
            out.push(candidate);
        }

        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for HtmlListingAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        _ctx: &AdapterContext,
    ) -> Result<Vec<Candidate>, AdapterError> {
        let page = http.fetch_bytes(&self.source_id, &self.config.url).await?;
        self.parse_page(&page.text(), &page.final_url)
    }
}
