use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of search-performance data for a single dimension key
/// (a query string or a page URL). Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceRecord {
    pub key: String,
    pub clicks: u64,
    pub impressions: u64,
    /// Click-through rate in [0, 1], rounded to 4 decimal places on ingest.
    pub ctr: f64,
    /// Average search position, rounded to 2 decimal places on ingest.
    pub position: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OpportunityKind {
    New,
    Refresh,
}

impl OpportunityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityKind::New => "NEW",
            OpportunityKind::Refresh => "REFRESH",
        }
    }
}

/// A scored candidate for new or refreshed content, derived from a
/// `PerformanceRecord`. Recomputed each session; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub kind: OpportunityKind,
    pub keyword: String,
    /// Target URL for `Refresh` opportunities; `None` for `New`.
    pub page: Option<String>,
    pub position: f64,
    pub impressions: u64,
    pub ctr: f64,
    pub clicks: u64,
    /// Always in [1, 100].
    pub score: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArticleStatus {
    Draft,
    Sent,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Draft => "Draft",
            ArticleStatus::Sent => "Sent",
        }
    }
}

/// Output of one successful generation. The `content` field stores the HTML
/// body exactly as produced; it is never transformed after the fact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedArticle {
    pub id: Uuid,
    pub title: String,
    pub kind: OpportunityKind,
    pub created_at: DateTime<Utc>,
    pub status: ArticleStatus,
    pub title_tag: String,
    pub meta_description: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Heading {
    pub level: String,
    pub text: String,
}

/// On-page content extracted from a fetched URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageContent {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub og_title: Option<String>,
    pub og_image: Option<String>,
    pub canonical_url: Option<String>,
    pub h1: Option<String>,
    pub headings: Vec<Heading>,
    /// Main-content text, truncated to 5000 characters.
    pub body_text: Option<String>,
    /// Parsed JSON-LD blocks; invalid blocks are dropped during extraction.
    pub schema_data: Vec<serde_json::Value>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ScrapeOutcome {
    Success(PageContent),
    Failed { reason: String },
}

/// A scrape attempt for one page, merged with its performance metrics.
/// Failures are recorded alongside successes and never abort a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapedPage {
    pub url: String,
    pub outcome: ScrapeOutcome,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: f64,
    pub position: f64,
}

impl ScrapedPage {
    pub fn content(&self) -> Option<&PageContent> {
        match &self.outcome {
            ScrapeOutcome::Success(content) => Some(content),
            ScrapeOutcome::Failed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ScrapeOutcome::Success(_))
    }
}
