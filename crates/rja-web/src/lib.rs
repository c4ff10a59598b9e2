//! Read-only JSON API over the job store. Every listing shows active, non-quarantined
//! jobs only.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rja_core::CanonicalJob;
use rja_storage::{JobFilter, JobStore, DEFAULT_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CRATE_NAME: &str = "rja-web";

#[derive(Clone)]
pub struct AppState {
    pub store: JobStore,
}

impl AppState {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }
}

/// Flat public view of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: i64,
    pub title: String,
    pub employer: String,
    pub url: String,
    pub source_name: String,
    pub category: String,
    pub classification: Option<String>,
    pub location: String,
    pub description: Option<String>,
    pub job_type: Option<String>,
    pub salary_text: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub pay_period: String,
    pub experience_level: String,
    pub years_min: Option<u32>,
    pub years_max: Option<u32>,
    pub education: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub closing_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl From<CanonicalJob> for JobView {
    fn from(job: CanonicalJob) -> Self {
        let n = job.job;
        let c = n.candidate;
        Self {
            id: job.id,
            title: c.title,
            employer: c.employer,
            url: c.url,
            source_name: c.source_name,
            category: n.category,
            classification: n.classification,
            location: n.location,
            description: c.description,
            job_type: c.job_type,
            salary_text: c.salary_text,
            salary_min: n.salary.min_annual,
            salary_max: n.salary.max_annual,
            pay_period: n.salary.pay_period.to_string(),
            experience_level: n.experience.level.to_string(),
            years_min: n.experience.years_min,
            years_max: n.experience.years_max,
            education: n.education.map(|e| e.to_string()),
            posted_at: c.posted_at,
            closing_at: c.closing_at,
            first_seen_at: job.first_seen_at,
            last_seen_at: job.last_seen_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct JobsResponse {
    jobs: Vec<JobView>,
    total: i64,
    page: usize,
    per_page: usize,
    pages: usize,
}

#[derive(Debug, Serialize)]
struct EmployerView {
    name: String,
    category: String,
    job_count: i64,
}

#[derive(Debug, Deserialize, Default)]
struct JobsQuery {
    page: Option<usize>,
    per_page: Option<usize>,
    category: Option<String>,
    employer: Option<String>,
    search: Option<String>,
    source: Option<String>,
}

impl JobsQuery {
    fn into_filter(self) -> JobFilter {
        JobFilter {
            category: self.category,
            employer: self.employer,
            search: self.search,
            source: self.source,
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(DEFAULT_PAGE_SIZE),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/jobs", get(jobs_handler))
        .route("/jobs/{id}", get(job_detail_handler))
        .route("/categories", get(categories_handler))
        .route("/employers", get(employers_handler))
        .route("/stats", get(stats_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(store: JobStore, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving job api");
    axum::serve(listener, app(AppState::new(store))).await?;
    Ok(())
}

async fn jobs_handler(State(state): State<Arc<AppState>>, Query(query): Query<JobsQuery>) -> Response {
    match state.store.list_jobs(&query.into_filter()).await {
        Ok(page) => Json(JobsResponse {
            jobs: page.jobs.into_iter().map(JobView::from).collect(),
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            pages: page.pages,
        })
        .into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn job_detail_handler(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    match state.store.get_visible_job(id).await {
        Ok(Some(job)) => Json(JobView::from(job)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "error": "job not found" }))).into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn categories_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.category_counts().await {
        Ok(counts) => Json(counts).into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn employers_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.employers().await {
        Ok(employers) => Json(
            employers
                .into_iter()
                .map(|e| EmployerView {
                    name: e.name,
                    category: e.primary_category,
                    job_count: e.job_count,
                })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => server_error(err.into()),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("server error: {err}") })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use chrono::TimeZone;
    use http_body_util::BodyExt;
    use rja_core::Candidate;
    use rja_sync::{ReconcilePolicy, Reconciler};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    async fn seeded() -> (JobStore, Vec<i64>) {
        let store = JobStore::in_memory().await.unwrap();
        let rows = [
            ("Math Teacher", "Eureka City Schools", "https://edjoin.example/1", "schools", Some("$55,000")),
            ("School Nurse", "Blue Lake Union School District", "https://edjoin.example/2", "schools", None),
            ("RN - Night Shift", "Mad River Community Hospital", "https://mrch.example/req/7", "hospital", Some("$60/hr")),
            ("Line Cook", "Cafe Nooner", "https://cafe.example/3", "cafe", None),
        ];
        let batch: Vec<_> = rows
            .iter()
            .map(|(title, employer, url, source, salary)| {
                let mut c = Candidate::new(*source, *title, *employer, *url);
                c.salary_text = salary.map(str::to_string);
                rja_normalize::normalize(c)
            })
            .collect();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).single().unwrap();
        let out = Reconciler::new(store.clone(), ReconcilePolicy::default())
            .apply(&batch, now)
            .await
            .unwrap();
        (store, out.touched)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn jobs_listing_paginates_and_filters() {
        let (store, _) = seeded().await;
        let app = app(AppState::new(store));

        let (status, body) = get_json(app.clone(), "/jobs?per_page=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 4);
        assert_eq!(body["pages"], 2);
        assert_eq!(body["per_page"], 3);
        assert_eq!(body["jobs"].as_array().unwrap().len(), 3);

        let (_, body) = get_json(app.clone(), "/jobs?per_page=500").await;
        assert_eq!(body["per_page"], 100);

        let (_, body) = get_json(app.clone(), "/jobs?category=Education").await;
        assert_eq!(body["total"], 2);

        let (_, body) = get_json(app.clone(), "/jobs?employer=mad%20river&search=night").await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["jobs"][0]["title"], "RN - Night Shift");
        assert_eq!(body["jobs"][0]["pay_period"], "hourly");

        let (_, body) = get_json(app, "/jobs?source=cafe").await;
        assert_eq!(body["jobs"][0]["employer"], "Cafe Nooner");
    }

    #[tokio::test]
    async fn job_detail_hides_quarantined() {
        let (store, ids) = seeded().await;
        let app = app(AppState::new(store.clone()));

        let (status, body) = get_json(app.clone(), &format!("/jobs/{}", ids[0])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Math Teacher");
        assert_eq!(body["salary_min"], 55000);

        store.set_quarantine(ids[0], "spam", Utc::now()).await.unwrap();
        let (status, _) = get_json(app.clone(), &format!("/jobs/{}", ids[0])).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_json(app, "/jobs/99999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rollups_and_stats() {
        let (store, _) = seeded().await;
        let app = app(AppState::new(store));

        let (_, categories) = get_json(app.clone(), "/categories").await;
        assert_eq!(categories[0]["name"], "Education");
        assert_eq!(categories[0]["job_count"], 2);

        let (_, employers) = get_json(app.clone(), "/employers").await;
        let names: Vec<&str> = employers
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 4);
        assert!(employers[0]["category"].is_string());

        let (status, stats) = get_json(app, "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total_jobs"], 4);
        assert_eq!(stats["total_employers"], 4);
        assert_eq!(stats["jobs_by_source"]["schools"], 2);
        assert_eq!(stats["jobs_by_category"]["Education"], 2);
    }
}
