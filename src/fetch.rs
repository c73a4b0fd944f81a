//! Page-content fetcher.
//!
//! Fetches a URL and extracts the on-page SEO surface (title, metas, OG
//! tags, canonical, headings, main-content text, JSON-LD). Per-URL failures
//! become `ScrapeOutcome::Failed` records; a batch never aborts because one
//! page was unreachable.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::model::{Heading, PageContent, PerformanceRecord, ScrapeOutcome, ScrapedPage};

const BODY_TEXT_LIMIT: usize = 5000;
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Tags whose subtrees never contribute to main-content text.
const EXCLUDED_TAGS: &[&str] = &["script", "style", "nav", "header", "footer", "aside"];

static SEL_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));
static SEL_META_DESC: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).expect("valid selector"));
static SEL_OG_DESC: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:description"]"#).expect("valid selector"));
static SEL_META_KEYWORDS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="keywords"]"#).expect("valid selector"));
static SEL_OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector"));
static SEL_OG_IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).expect("valid selector"));
static SEL_CANONICAL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"link[rel="canonical"]"#).expect("valid selector"));
static SEL_H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("valid selector"));
static SEL_SUBHEADINGS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2, h3, h4, h5, h6").expect("valid selector"));
static SEL_JSON_LD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector"));
static SEL_MAIN: Lazy<Selector> = Lazy::new(|| Selector::parse("main").expect("valid selector"));
static SEL_ARTICLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article").expect("valid selector"));
static SEL_DIV: Lazy<Selector> = Lazy::new(|| Selector::parse("div").expect("valid selector"));
static SEL_BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("valid selector"));

#[derive(Debug, Clone, Copy)]
pub struct ScrapeConfig {
    pub max_pages: usize,
    pub delay: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_pages: 20,
            delay: Duration::from_millis(500),
        }
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PageContent>;
}

pub struct HttpPageFetcher {
    http: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { http }
    }
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<PageContent> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("request error for {url}"))?
            .error_for_status()
            .with_context(|| format!("bad status for {url}"))?;
        let html = res
            .text()
            .await
            .with_context(|| format!("failed to read body of {url}"))?;
        Ok(parse_page(&html))
    }
}

fn meta_content(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

fn element_text(el: ElementRef<'_>) -> Option<String> {
    let text = el.text().collect::<String>().trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Collect visible text under `el`, skipping excluded subtrees.
fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(trimmed);
                }
            }
            Node::Element(element) => {
                if EXCLUDED_TAGS.contains(&element.name()) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn truncate_chars(text: String, limit: usize) -> String {
    if text.chars().count() > limit {
        let mut out: String = text.chars().take(limit).collect();
        out.push_str("...");
        out
    } else {
        text
    }
}

/// Pick the main-content container: `main`, then `article`, then a `div`
/// whose class mentions content/main/post, then `body`.
fn main_content<'a>(doc: &'a Html) -> Option<ElementRef<'a>> {
    if let Some(el) = doc.select(&SEL_MAIN).next() {
        return Some(el);
    }
    if let Some(el) = doc.select(&SEL_ARTICLE).next() {
        return Some(el);
    }
    for el in doc.select(&SEL_DIV) {
        if let Some(class) = el.value().attr("class") {
            let class = class.to_lowercase();
            if class.contains("content") || class.contains("main") || class.contains("post") {
                return Some(el);
            }
        }
    }
    doc.select(&SEL_BODY).next()
}

/// Extract page content from raw HTML. Pure; network-free.
pub fn parse_page(html: &str) -> PageContent {
    let doc = Html::parse_document(html);

    let title = doc.select(&SEL_TITLE).next().and_then(element_text);
    let meta_description =
        meta_content(&doc, &SEL_META_DESC).or_else(|| meta_content(&doc, &SEL_OG_DESC));
    let meta_keywords = meta_content(&doc, &SEL_META_KEYWORDS);
    let og_title = meta_content(&doc, &SEL_OG_TITLE);
    let og_image = meta_content(&doc, &SEL_OG_IMAGE);
    let canonical_url = doc
        .select(&SEL_CANONICAL)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(str::to_string);
    let h1 = doc.select(&SEL_H1).next().and_then(element_text);

    let headings = doc
        .select(&SEL_SUBHEADINGS)
        .filter_map(|el| {
            element_text(el).map(|text| Heading {
                level: el.value().name().to_string(),
                text,
            })
        })
        .collect();

    let schema_data = doc
        .select(&SEL_JSON_LD)
        .filter_map(|el| {
            let raw = el.text().collect::<String>();
            serde_json::from_str(&raw).ok()
        })
        .collect();

    let body_text = main_content(&doc).map(|el| {
        let mut text = String::new();
        collect_text(el, &mut text);
        truncate_chars(text, BODY_TEXT_LIMIT)
    });
    let body_text = body_text.filter(|text| !text.is_empty());

    PageContent {
        title,
        meta_description,
        meta_keywords,
        og_title,
        og_image,
        canonical_url,
        h1,
        headings,
        body_text,
        schema_data,
        scraped_at: Utc::now(),
    }
}

/// Scrape the top pages by clicks, merging each outcome with the page's
/// performance metrics. Relative URLs (no resolvable domain) are skipped
/// outright; fetch failures are recorded per page and the batch continues.
#[instrument(skip_all)]
pub async fn scrape_top_pages(
    fetcher: &dyn PageFetcher,
    pages: &[PerformanceRecord],
    config: &ScrapeConfig,
) -> Vec<ScrapedPage> {
    let mut sorted: Vec<&PerformanceRecord> = pages.iter().collect();
    sorted.sort_by(|a, b| b.clicks.cmp(&a.clicks));

    let mut scraped = Vec::new();
    for record in sorted.into_iter().take(config.max_pages) {
        let url = record.key.as_str();
        if url.is_empty() || url.starts_with('/') {
            continue;
        }

        let outcome = match fetcher.fetch(url).await {
            Ok(content) => {
                info!(url, "scraped page");
                ScrapeOutcome::Success(content)
            }
            Err(err) => {
                warn!(url, %err, "scrape failed");
                ScrapeOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };
        scraped.push(ScrapedPage {
            url: url.to_string(),
            outcome,
            clicks: record.clicks,
            impressions: record.impressions,
            ctr: record.ctr,
            position: record.position,
        });

        if !config.delay.is_zero() {
            tokio::time::sleep(config.delay).await;
        }
    }
    scraped
}
