//! Search-analytics API client.
//!
//! Thin wrapper over the search-analytics query endpoint: one POST per
//! dimension, rows formatted into `PerformanceRecord`s. HTTP failures are
//! classified into the remediation categories the operator sees.

use chrono::{Duration, NaiveDate, Utc};
use reqwest::{Client, StatusCode, Url};
use serde_json::json;
use std::fmt;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::model::PerformanceRecord;
use model::{ApiRow, QueryResponse};

pub mod model;

const ANALYTICS_API_BASE: &str = "https://searchconsole.googleapis.com/";
const ROW_LIMIT: u32 = 25_000;
const PULL_WINDOW_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Query,
    Page,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Query => "query",
            Dimension::Page => "page",
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(
        "No usable analytics credentials. Set analytics.token in the config \
         or export ANALYTICS_BEARER_TOKEN before pulling data."
    )]
    MissingCredentials,
    #[error(
        "Permission denied (403). The identity '{identity}' needs to be added \
         as a user in the search-analytics property: {site}\n\nFull error: {detail}"
    )]
    PermissionDenied {
        site: String,
        identity: String,
        detail: String,
    },
    #[error(
        "Property not found (404): {site}\n\nThis property doesn't exist or the \
         format is incorrect. Try:\n- 'sc-domain:example.com' (for domain properties)\n\
         - 'https://example.com/' (for URL prefix properties)\n\nFull error: {detail}"
    )]
    NotFound { site: String, detail: String },
    #[error(
        "Bad request (400): Invalid parameters for {site}\n\nPossible issues:\n\
         - Date range is invalid\n- Property format is incorrect\n\
         - API request malformed\n\nFull error: {detail}"
    )]
    BadRequest { site: String, detail: String },
    #[error(
        "Error fetching data ({status}): {detail}\n\nTroubleshooting:\n\
         1. Verify the property format matches the console exactly\n\
         2. Check the identity has access to this property\n\
         3. Ensure the date range is valid (last 90 days)\n\
         4. Try pulling the data again"
    )]
    Other {
        status: StatusCode,
        detail: String,
    },
    #[error("failed to reach analytics API: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid analytics request: {0}")]
    InvalidRequest(String),
}

#[derive(Clone)]
pub struct AnalyticsClient {
    http: Client,
    base_url: Url,
    token: String,
    identity: String,
}

impl fmt::Debug for AnalyticsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsClient")
            .field("base_url", &self.base_url)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl AnalyticsClient {
    pub fn new(token: String, identity: String) -> Self {
        let base_url = Url::parse(ANALYTICS_API_BASE).expect("valid default analytics URL");
        Self::with_base_url(token, identity, base_url)
    }

    pub fn with_base_url(token: String, identity: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("content-engine/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
            identity,
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.token.trim().is_empty()
    }

    pub fn build_query_request(
        &self,
        site: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        dimension: Dimension,
    ) -> Result<reqwest::Request, FetchError> {
        let path = format!(
            "webmasters/v3/sites/{}/searchAnalytics/query",
            urlencode(site)
        );
        let endpoint = self
            .base_url
            .join(&path)
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        let body = json!({
            "startDate": start_date.format("%Y-%m-%d").to_string(),
            "endDate": end_date.format("%Y-%m-%d").to_string(),
            "dimensions": [dimension.as_str()],
            "rowLimit": ROW_LIMIT,
        });
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(&body)
            .build()
            .map_err(FetchError::Http)
    }

    /// Fetch performance rows for one dimension over a date range.
    #[instrument(skip(self))]
    pub async fn search_query(
        &self,
        site: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        dimension: Dimension,
    ) -> Result<Vec<PerformanceRecord>, FetchError> {
        if !self.has_credentials() {
            return Err(FetchError::MissingCredentials);
        }

        let request = self.build_query_request(site, start_date, end_date, dimension)?;
        info!(url = %request.url(), dimension = dimension.as_str(), "analytics request");

        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            warn!(%status, site, "analytics API error: {}", detail);
            return Err(classify_error(status, site, &self.identity, detail));
        }

        let payload: QueryResponse = res.json().await?;
        Ok(format_rows(payload.rows))
    }
}

fn classify_error(status: StatusCode, site: &str, identity: &str, detail: String) -> FetchError {
    match status {
        StatusCode::FORBIDDEN => FetchError::PermissionDenied {
            site: site.to_string(),
            identity: identity.to_string(),
            detail,
        },
        StatusCode::NOT_FOUND => FetchError::NotFound {
            site: site.to_string(),
            detail,
        },
        StatusCode::BAD_REQUEST => FetchError::BadRequest {
            site: site.to_string(),
            detail,
        },
        status => FetchError::Other { status, detail },
    }
}

/// Minimal percent-encoding for a site identifier used as a path segment.
fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Format API rows into performance records: first key wins (empty when the
/// row has none), CTR to 4 decimal places, position to 2.
pub fn format_rows(rows: Vec<ApiRow>) -> Vec<PerformanceRecord> {
    rows.into_iter()
        .map(|row| PerformanceRecord {
            key: row.keys.into_iter().next().unwrap_or_default(),
            clicks: row.clicks.max(0.0) as u64,
            impressions: row.impressions.max(0.0) as u64,
            ctr: round_to(row.ctr, 4),
            position: round_to(row.position, 2),
        })
        .collect()
}

/// Result of one full pull: both dimensions plus the window actually used.
#[derive(Debug, Clone)]
pub struct PullResult {
    pub queries: Vec<PerformanceRecord>,
    pub pages: Vec<PerformanceRecord>,
    pub date_range: String,
}

impl PullResult {
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.pages.is_empty()
    }
}

/// Pull query and page rows for the trailing 90-day window ending today.
/// Either fetch failing aborts the pull with its remediation error.
#[instrument(skip(client))]
pub async fn pull_search_data(
    client: &AnalyticsClient,
    site: &str,
) -> Result<PullResult, FetchError> {
    let end_date = Utc::now().date_naive();
    let start_date = end_date - Duration::days(PULL_WINDOW_DAYS);

    let queries = client
        .search_query(site, start_date, end_date, Dimension::Query)
        .await?;
    let pages = client
        .search_query(site, start_date, end_date, Dimension::Page)
        .await?;

    info!(
        site,
        queries = queries.len(),
        pages = pages.len(),
        "pulled search data"
    );

    Ok(PullResult {
        queries,
        pages,
        date_range: format!("{} to {}", start_date, end_date),
    })
}
