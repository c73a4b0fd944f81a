//! Chat context assembly and "current article" resolution.
//!
//! The resolver is a heuristic, not an exact lookup: a URL pasted into the
//! message always wins; otherwise messages that look like rewrite requests
//! are keyword-overlap scored against the scraped pages; otherwise the
//! previously remembered article carries over. Ambiguous matches silently
//! take the best-scoring candidate.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::llm::ChatMessage;
use crate::model::{GeneratedArticle, ScrapedPage};
use crate::session::SearchData;

/// Messages that look like edit/rewrite requests.
static REWRITE_INTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(rewrite|edit|update|improve|guide|post)\b|article about")
        .expect("valid intent regex")
});

/// Keywords whose trailing phrase names the article ("...about X", "the X").
const EXTRACT_KEYWORDS: &[&str] = &["about", "guide", "article", "the"];

const BODY_PREVIEW_CHARS: usize = 300;

/// Tunables for resolution and context assembly.
#[derive(Debug, Clone, Copy)]
pub struct ChatTuning {
    /// Minimum keyword-overlap score to accept a semantic match.
    pub min_match_score: u32,
    /// Prior exchanges replayed into each turn.
    pub history_window: usize,
    /// Top-queries cap inside the context blob.
    pub context_queries: usize,
    /// Recently generated articles listed in the context blob.
    pub context_articles: usize,
}

impl Default for ChatTuning {
    fn default() -> Self {
        Self {
            min_match_score: 1,
            history_window: 10,
            context_queries: 20,
            context_articles: 5,
        }
    }
}

/// Keyword-overlap score of a candidate phrase against one scraped page:
/// +3 per word found in the title, +2 in the h1, +1 in the URL, +10 when
/// the whole phrase appears in the title or h1.
pub fn match_score(phrase: &str, page: &ScrapedPage) -> u32 {
    let content = match page.content() {
        Some(content) => content,
        None => return 0,
    };
    let phrase = phrase.to_lowercase();
    let title = content.title.as_deref().unwrap_or("").to_lowercase();
    let h1 = content.h1.as_deref().unwrap_or("").to_lowercase();
    let url = page.url.to_lowercase();

    let mut score = 0;
    for word in phrase.split_whitespace() {
        if title.contains(word) {
            score += 3;
        }
        if h1.contains(word) {
            score += 2;
        }
        if url.contains(word) {
            score += 1;
        }
    }
    if !phrase.is_empty() && (title.contains(&phrase) || h1.contains(&phrase)) {
        score += 10;
    }
    score
}

fn best_match(phrase: &str, scraped: &[ScrapedPage], min_score: u32) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, page) in scraped.iter().enumerate() {
        let score = match_score(phrase, page);
        if score >= min_score && best.map_or(true, |(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    best.map(|(index, _)| index)
}

/// Extract the phrase naming an article from a rewrite-style message, e.g.
/// "rewrite the article about running shoes" → "running shoes". Phrases of
/// three characters or fewer are discarded as noise.
fn candidate_phrases(message_lower: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    for keyword in EXTRACT_KEYWORDS {
        if let Some(idx) = message_lower.find(keyword) {
            let after = &message_lower[idx + keyword.len()..];
            let phrase = after
                .trim()
                .split('.')
                .next()
                .unwrap_or("")
                .split('?')
                .next()
                .unwrap_or("")
                .trim();
            if phrase.chars().count() > 3 {
                phrases.push(phrase.to_string());
            }
        }
    }
    phrases
}

/// Resolve which scraped page a chat message refers to. Returns an index
/// into `scraped`, or `None` when nothing matches and no article is
/// remembered.
pub fn resolve_article(
    message: &str,
    scraped: &[ScrapedPage],
    current_url: Option<&str>,
    tuning: &ChatTuning,
) -> Option<usize> {
    // Pasted URL wins outright.
    if let Some(index) = scraped
        .iter()
        .position(|page| !page.url.is_empty() && message.contains(&page.url))
    {
        return Some(index);
    }

    let message_lower = message.to_lowercase();
    if REWRITE_INTENT.is_match(&message_lower) {
        for phrase in candidate_phrases(&message_lower) {
            if let Some(index) = best_match(&phrase, scraped, tuning.min_match_score) {
                return Some(index);
            }
        }
    }

    current_url.and_then(|url| scraped.iter().position(|page| page.url == url))
}

fn body_preview(text: &str) -> String {
    text.chars().take(BODY_PREVIEW_CHARS).collect()
}

fn page_context_entry(page: &ScrapedPage, is_current: bool) -> serde_json::Value {
    match page.content() {
        Some(content) if is_current => json!({
            "url": page.url,
            "title": content.title,
            "meta_description": content.meta_description,
            "meta_keywords": content.meta_keywords,
            "og_title": content.og_title,
            "canonical_url": content.canonical_url,
            "h1": content.h1,
            "headings": content.headings,
            "body_text": content.body_text,
            "schema_data": content.schema_data,
            "clicks": page.clicks,
            "impressions": page.impressions,
            "ctr": page.ctr,
            "position": page.position,
            "is_current_article": true,
        }),
        Some(content) => json!({
            "url": page.url,
            "title": content.title,
            "meta_description": content.meta_description,
            "h1": content.h1,
            "headings_count": content.headings.len(),
            "body_preview": content.body_text.as_deref().map(body_preview),
            "clicks": page.clicks,
            "impressions": page.impressions,
            "ctr": page.ctr,
            "position": page.position,
        }),
        None => {
            let reason = match &page.outcome {
                crate::model::ScrapeOutcome::Failed { reason } => reason.clone(),
                crate::model::ScrapeOutcome::Success(_) => unreachable!(),
            };
            json!({
                "url": page.url,
                "clicks": page.clicks,
                "impressions": page.impressions,
                "ctr": page.ctr,
                "position": page.position,
                "scrape_status": "failed",
                "error": reason,
            })
        }
    }
}

/// Build the bounded context blob for one chat turn.
pub fn build_context(
    data: &SearchData,
    articles: &[GeneratedArticle],
    current: Option<&ScrapedPage>,
    tuning: &ChatTuning,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(current) = current {
        let title = current
            .content()
            .and_then(|content| content.title.as_deref())
            .unwrap_or("Unknown");
        parts.push(format!(
            "**CURRENT ARTICLE BEING WORKED ON:**\n\
             - URL: {}\n\
             - Title: {}\n\
             - This is the article you should focus on for rewrites and edits \
             unless the user explicitly mentions a different article.\n",
            current.url, title
        ));
    }

    let mut top_queries: Vec<_> = data.queries.iter().collect();
    top_queries.sort_by(|a, b| b.clicks.cmp(&a.clicks));
    let top_queries: Vec<serde_json::Value> = top_queries
        .into_iter()
        .take(tuning.context_queries)
        .map(|record| {
            json!({
                "query": record.key,
                "clicks": record.clicks,
                "impressions": record.impressions,
                "ctr": record.ctr,
                "position": record.position,
            })
        })
        .collect();

    let current_url = current.map(|page| page.url.as_str());
    let pages_context: Vec<serde_json::Value> = if !data.scraped.is_empty() {
        data.scraped
            .iter()
            .take(tuning.context_queries)
            .map(|page| page_context_entry(page, Some(page.url.as_str()) == current_url))
            .collect()
    } else {
        let mut top_pages: Vec<_> = data.pages.iter().collect();
        top_pages.sort_by(|a, b| b.clicks.cmp(&a.clicks));
        top_pages
            .into_iter()
            .take(tuning.context_queries)
            .map(|record| {
                json!({
                    "page": record.key,
                    "clicks": record.clicks,
                    "impressions": record.impressions,
                    "ctr": record.ctr,
                    "position": record.position,
                })
            })
            .collect()
    };

    let scraped_count = data.scraped.iter().filter(|page| page.is_success()).count();
    parts.push(format!(
        "**Search Performance Data Context:**\n\
         - Domain: {}\n\
         - Date Range: {}\n\
         - Total Queries: {}\n\
         - Total Pages: {}\n\
         - Pages Scraped: {}\n\n\
         **Top Performing Queries (by clicks):**\n{}\n\n\
         **Top Performing Pages with Content Analysis:**\n{}\n\n\
         **Note:** Pages include scraped content (title, meta description, \
         headings, body text) when available, allowing for content quality \
         analysis alongside traffic metrics.\n",
        data.domain,
        data.date_range,
        data.queries.len(),
        data.pages.len(),
        scraped_count,
        if top_queries.is_empty() {
            "No query data".to_string()
        } else {
            serde_json::to_string_pretty(&top_queries).unwrap_or_default()
        },
        if pages_context.is_empty() {
            "No page data".to_string()
        } else {
            serde_json::to_string_pretty(&pages_context).unwrap_or_default()
        },
    ));

    if !articles.is_empty() {
        let mut listing = String::from("\n**Generated Content:**\n");
        let start = articles.len().saturating_sub(tuning.context_articles);
        for article in &articles[start..] {
            listing.push_str(&format!(
                "- {} ({}) - {}\n",
                article.title,
                article.kind.as_str(),
                article.created_at.format("%b %d, %Y")
            ));
        }
        parts.push(listing);
    }

    parts.join("\n")
}

/// Combine context and user text into the message actually sent.
pub fn compose_user_message(context: &str, user_message: &str) -> String {
    if context.is_empty() {
        user_message.to_string()
    } else {
        format!("{context}\n\n**User Question:** {user_message}")
    }
}

/// Replay the last `history_window` exchanges (the current user message
/// occupies one slot) and append the context-laden current message.
pub fn chat_messages(
    prior: &[ChatMessage],
    full_message: String,
    tuning: &ChatTuning,
) -> Vec<ChatMessage> {
    let keep = tuning.history_window.saturating_sub(1);
    let start = prior.len().saturating_sub(keep);
    let mut messages: Vec<ChatMessage> = prior[start..].to_vec();
    messages.push(ChatMessage::user(full_message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Heading, PageContent, PerformanceRecord, ScrapeOutcome};
    use chrono::Utc;

    fn content(title: &str, h1: &str, body: &str) -> PageContent {
        PageContent {
            title: Some(title.to_string()),
            meta_description: Some("desc".into()),
            meta_keywords: None,
            og_title: None,
            og_image: None,
            canonical_url: None,
            h1: Some(h1.to_string()),
            headings: vec![Heading {
                level: "h2".into(),
                text: "Section".into(),
            }],
            body_text: Some(body.to_string()),
            schema_data: vec![],
            scraped_at: Utc::now(),
        }
    }

    fn page(url: &str, title: &str, h1: &str) -> ScrapedPage {
        ScrapedPage {
            url: url.into(),
            outcome: ScrapeOutcome::Success(content(title, h1, "body text")),
            clicks: 10,
            impressions: 1000,
            ctr: 0.01,
            position: 4.0,
        }
    }

    fn failed_page(url: &str) -> ScrapedPage {
        ScrapedPage {
            url: url.into(),
            outcome: ScrapeOutcome::Failed {
                reason: "timeout".into(),
            },
            clicks: 3,
            impressions: 200,
            ctr: 0.015,
            position: 9.0,
        }
    }

    fn sample_pages() -> Vec<ScrapedPage> {
        vec![
            page(
                "https://example.com/best-running-shoes",
                "Best Running Shoes Guide",
                "Best Running Shoes",
            ),
            page(
                "https://example.com/yoga-mats",
                "Top Yoga Mats",
                "Yoga Mats",
            ),
        ]
    }

    #[test]
    fn url_substring_match_wins() {
        let scraped = sample_pages();
        let resolved = resolve_article(
            "what do you think of https://example.com/yoga-mats today?",
            &scraped,
            None,
            &ChatTuning::default(),
        );
        assert_eq!(resolved, Some(1));
    }

    #[test]
    fn rewrite_intent_matches_by_keyword_overlap() {
        let scraped = sample_pages();
        let resolved = resolve_article(
            "rewrite the article about running shoes",
            &scraped,
            None,
            &ChatTuning::default(),
        );
        assert_eq!(resolved, Some(0));
    }

    #[test]
    fn no_intent_falls_back_to_current_article() {
        let scraped = sample_pages();
        let resolved = resolve_article(
            "how is my traffic trending?",
            &scraped,
            Some("https://example.com/yoga-mats"),
            &ChatTuning::default(),
        );
        assert_eq!(resolved, Some(1));
    }

    #[test]
    fn no_match_and_no_current_yields_none() {
        let scraped = sample_pages();
        let resolved = resolve_article(
            "how is my traffic trending?",
            &scraped,
            None,
            &ChatTuning::default(),
        );
        assert_eq!(resolved, None);
    }

    #[test]
    fn short_phrases_are_discarded() {
        let scraped = sample_pages();
        // "the" is followed by a phrase of <= 3 chars, so nothing matches.
        let resolved = resolve_article("update the mat", &scraped, None, &ChatTuning::default());
        assert_eq!(resolved, None);
    }

    #[test]
    fn failed_pages_never_match_semantically() {
        let scraped = vec![failed_page("https://example.com/best-running-shoes")];
        let resolved = resolve_article(
            "rewrite the article about running shoes",
            &scraped,
            None,
            &ChatTuning::default(),
        );
        assert_eq!(resolved, None);
    }

    #[test]
    fn match_score_weights() {
        let shoes = page(
            "https://example.com/best-running-shoes",
            "Best Running Shoes Guide",
            "Best Running Shoes",
        );
        // "running shoes": both words hit title (+3 each), h1 (+2 each),
        // url (+1 each), plus the full-phrase bonus in title and h1.
        assert_eq!(match_score("running shoes", &shoes), 3 * 2 + 2 * 2 + 2 + 10);
        assert_eq!(match_score("quantum physics", &shoes), 0);
    }

    fn sample_data() -> SearchData {
        SearchData {
            domain: "sc-domain:example.com".into(),
            date_range: "2026-05-09 to 2026-08-07".into(),
            queries: vec![
                PerformanceRecord {
                    key: "running shoes".into(),
                    clicks: 120,
                    impressions: 5000,
                    ctr: 0.024,
                    position: 4.1,
                },
                PerformanceRecord {
                    key: "yoga mats".into(),
                    clicks: 300,
                    impressions: 9000,
                    ctr: 0.033,
                    position: 3.2,
                },
            ],
            pages: vec![],
            scraped: sample_pages(),
        }
    }

    #[test]
    fn context_marks_current_article_with_full_detail() {
        let data = sample_data();
        let tuning = ChatTuning::default();
        let context = build_context(&data, &[], Some(&data.scraped[0]), &tuning);

        assert!(context.contains("CURRENT ARTICLE BEING WORKED ON"));
        assert!(context.contains("https://example.com/best-running-shoes"));
        assert!(context.contains("is_current_article"));
        assert!(context.contains("body_text"));
        // The other page only gets the abbreviated entry.
        assert!(context.contains("body_preview"));
    }

    #[test]
    fn context_orders_queries_by_clicks() {
        let data = sample_data();
        let context = build_context(&data, &[], None, &ChatTuning::default());
        let yoga = context.find("yoga mats").unwrap();
        let shoes = context.find("running shoes").unwrap();
        assert!(yoga < shoes, "higher-click query should come first");
    }

    #[test]
    fn context_includes_failed_scrapes() {
        let mut data = sample_data();
        data.scraped.push(failed_page("https://example.com/broken"));
        let context = build_context(&data, &[], None, &ChatTuning::default());
        assert!(context.contains("scrape_status"));
        assert!(context.contains("timeout"));
    }

    #[test]
    fn context_lists_recent_articles() {
        use crate::model::{ArticleStatus, GeneratedArticle, OpportunityKind};
        use uuid::Uuid;

        let data = sample_data();
        let articles: Vec<GeneratedArticle> = (0..7)
            .map(|i| GeneratedArticle {
                id: Uuid::new_v4(),
                title: format!("Article {i}"),
                kind: OpportunityKind::New,
                created_at: Utc::now(),
                status: ArticleStatus::Draft,
                title_tag: format!("Article {i}"),
                meta_description: "m".into(),
                content: "<p>x</p>".into(),
            })
            .collect();
        let context = build_context(&data, &articles, None, &ChatTuning::default());
        // Only the last five appear.
        assert!(!context.contains("Article 1 ("));
        assert!(context.contains("Article 6 ("));
        assert!(context.contains("Generated Content"));
    }

    #[test]
    fn chat_messages_bounded_by_window() {
        let prior: Vec<ChatMessage> = (0..30)
            .map(|i| ChatMessage::user(format!("msg {i}")))
            .collect();
        let tuning = ChatTuning::default();
        let messages = chat_messages(&prior, "current".into(), &tuning);
        assert_eq!(messages.len(), tuning.history_window);
        assert_eq!(messages.first().unwrap().content, "msg 21");
        assert_eq!(messages.last().unwrap().content, "current");
    }

    #[test]
    fn compose_prefixes_context() {
        assert_eq!(compose_user_message("", "hi"), "hi");
        let composed = compose_user_message("CTX", "hi");
        assert!(composed.starts_with("CTX"));
        assert!(composed.ends_with("**User Question:** hi"));
    }
}
