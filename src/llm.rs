//! Text-generation API client (messages endpoint).

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::Opportunity;

const LLM_API_BASE: &str = "https://api.anthropic.com/";

const ARTICLE_MAX_TOKENS: u32 = 8000;
const CHAT_MAX_TOKENS: u32 = 4000;
const ANALYSIS_MAX_TOKENS: u32 = 2000;

/// System prompt for article generation. The model is asked for a JSON
/// object; `parse_article_content` copes when it answers in prose anyway.
const ARTICLE_SYSTEM_PROMPT: &str = r#"You are an expert SEO content writer for a health and wellness brand. Generate high-quality, publication-ready content.

CONTENT REQUIREMENTS
Structure:
- Open with a compelling hook that addresses the reader's core problem or desire
- First paragraph must contain a standalone, quotable definition or key insight (citation hook for AI systems)
- Use clear H2 subheadings that match search intent (not clever, but clear)
- Include an FAQ section with 3-5 questions based on "People Also Ask"
- End with a clear next step or CTA

Formatting:
- Output valid HTML with proper tags: <h1>, <h2>, <p>, <ul>, <li>, <a>
- Include 3-5 internal links using <a href="/page-slug">anchor text</a> format
- Include 1-2 external links to authoritative sources
- Target 1,500-2,000 words for comprehensive guides
- Target 800-1,200 words for focused articles

Tone:
- Expert but accessible
- Confident, not hedging
- Use "you" to address the reader directly
- Avoid fluff and filler phrases

SEO Elements:
- Title tag: Under 60 characters, includes primary keyword naturally
- Meta description: 150-160 characters, compelling and includes keyword
- H1: Can differ slightly from title tag, but aligned

Output format:
Provide your response as JSON with these keys:
{
  "title_tag": "...",
  "meta_description": "...",
  "content": "<h1>...</h1><p>...</p>..."
}"#;

/// System prompt for the conversational assistant.
const CHAT_SYSTEM_PROMPT: &str = r#"You are an SEO content writer and analyst assistant helping with search-performance data analysis and article rewrites.

**IMPORTANT RULES:**
1. **ONLY rewrite articles that are EXPLICITLY mentioned or requested** - Never rewrite random articles
2. **Remember the current article** - If user asks follow-up questions about "this article" or "the article", continue working on the last article you were discussing
3. **Include technical SEO improvements** - When rewriting, explicitly state improvements to meta description, H tags, schema, page title, etc. and include them in the output
4. **Use full scraped content** - Reference the actual title, meta description, headings, and body text from the scraped page

**For Article Rewrites:**
- Provide the rewritten content in HTML format
- Include improved title tag, meta description, H1, and H2-H6 headings
- Suggest schema markup improvements if applicable
- Explicitly call out what SEO elements were improved
- Maintain the core topic and URL target
- Improve structure and readability

**Available Data:**
- Traffic metrics (clicks, impressions, CTR, position)
- Full scraped page content (title, meta, headings, body text)
- Technical SEO elements (schema, canonical, OG tags)

Be specific and reference actual data from the context when available."#;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("API key not configured; set llm.api_key or LLM_API_KEY")]
    MissingApiKey,
    #[error("failed to reach text-generation API: {0}")]
    Http(#[from] reqwest::Error),
    #[error("text-generation API error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("text-generation API returned no content")]
    EmptyResponse,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Structured article payload extracted from a generation response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ArticleContent {
    pub title_tag: String,
    pub meta_description: String,
    pub content: String,
}

/// Two-part opportunity analysis ("why" and "recommended approach").
#[derive(Debug, Clone, PartialEq)]
pub struct OpportunityAnalysis {
    pub why: String,
    pub approach: String,
}

/// Seam for the generation queue; the production impl is `LlmClient`, tests
/// use scripted fakes.
#[async_trait]
pub trait ArticleGenerator: Send + Sync {
    async fn generate(&self, brief: &str) -> Result<ArticleContent, GenerationError>;
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    base_url: Url,
    api_key: String,
    version: String,
    model: String,
}

impl fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    pub fn new(api_key: String, version: String, model: String) -> Self {
        let base_url = Url::parse(LLM_API_BASE).expect("valid default API URL");
        Self::with_base_url(api_key, version, model, base_url)
    }

    pub fn with_base_url(api_key: String, version: String, model: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("content-engine/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            api_key,
            version,
            model,
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn build_messages_request(
        &self,
        system: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<reqwest::Request, GenerationError> {
        let endpoint = self
            .base_url
            .join("v1/messages")
            .map_err(|e| GenerationError::InvalidRequest(e.to_string()))?;
        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = Value::String(system.to_string());
        }
        self.http
            .post(endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.version)
            .header("Content-Type", "application/json")
            .json(&body)
            .build()
            .map_err(GenerationError::Http)
    }

    /// Send one messages-API call and return the text of the first content
    /// block.
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        if !self.has_api_key() {
            return Err(GenerationError::MissingApiKey);
        }

        let request = self.build_messages_request(system, messages, max_tokens)?;
        info!(url = %request.url(), model = %self.model, "text-generation request");

        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "text-generation API error: {}", body);
            return Err(GenerationError::Api { status, body });
        }

        let payload: Value = res.json().await?;
        let text = payload
            .get("content")
            .and_then(|blocks| blocks.as_array())
            .and_then(|blocks| blocks.first())
            .and_then(|block| block.get("text"))
            .and_then(|text| text.as_str())
            .map(str::to_owned)
            .ok_or(GenerationError::EmptyResponse)?;
        Ok(text)
    }

    /// Free-form chat turn: replayed history plus the context-prefixed user
    /// message.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        self.complete(CHAT_SYSTEM_PROMPT, messages, CHAT_MAX_TOKENS)
            .await
    }

    /// "Why this opportunity / recommended approach" analysis.
    pub async fn analyze_opportunity(
        &self,
        opportunity: &Opportunity,
    ) -> Result<OpportunityAnalysis, GenerationError> {
        let prompt = build_analysis_prompt(opportunity);
        let text = self
            .complete("", &[ChatMessage::user(prompt)], ANALYSIS_MAX_TOKENS)
            .await?;
        Ok(split_analysis(&text))
    }
}

#[async_trait]
impl ArticleGenerator for LlmClient {
    async fn generate(&self, brief: &str) -> Result<ArticleContent, GenerationError> {
        let text = self
            .complete(
                ARTICLE_SYSTEM_PROMPT,
                &[ChatMessage::user(brief)],
                ARTICLE_MAX_TOKENS,
            )
            .await?;
        Ok(parse_article_content(brief, &text))
    }
}

pub fn build_analysis_prompt(opportunity: &Opportunity) -> String {
    format!(
        "Analyze this SEO opportunity and provide:\n\
         1. Why this is a good opportunity (2-3 bullet points)\n\
         2. Recommended approach (3-4 actionable steps)\n\n\
         Opportunity:\n\
         - Keyword: {keyword}\n\
         - Type: {kind}\n\
         - Position: {position}\n\
         - Impressions: {impressions}\n\
         - CTR: {ctr:.2}%\n\
         - Score: {score}/100\n\n\
         Be specific and actionable. Reference the actual numbers.",
        keyword = opportunity.keyword,
        kind = opportunity.kind.as_str(),
        position = opportunity.position,
        impressions = crate::brief::group_thousands(opportunity.impressions),
        ctr = opportunity.ctr * 100.0,
        score = opportunity.score,
    )
}

/// Split an analysis response into "why" and "approach" on the
/// "Recommended" marker when present.
pub fn split_analysis(text: &str) -> OpportunityAnalysis {
    match text.find("Recommended") {
        Some(idx) => OpportunityAnalysis {
            why: text[..idx].trim().to_string(),
            approach: text[idx..].trim().to_string(),
        },
        None => OpportunityAnalysis {
            why: text.trim().to_string(),
            approach: "See recommendations above.".to_string(),
        },
    }
}

/// Strip a leading code fence (```json or bare ```) and return the inner
/// text, or the input unchanged when no fence is found.
fn strip_code_fence(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        match rest.find("```") {
            Some(end) => rest[..end].trim(),
            None => rest.trim(),
        }
    } else if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        match rest.find("```") {
            Some(end) => rest[..end].trim(),
            None => rest.trim(),
        }
    } else {
        text
    }
}

/// Parse a generation response into structured article content.
///
/// The response is expected to be JSON, possibly wrapped in code-fence
/// markers. On parse failure the whole response becomes the raw body, with
/// the title synthesized from the brief's first line and the meta
/// description truncated to 160 characters. Never fails.
pub fn parse_article_content(brief: &str, response_text: &str) -> ArticleContent {
    let candidate = strip_code_fence(response_text);
    match serde_json::from_str::<ArticleContent>(candidate) {
        Ok(content) => content,
        Err(err) => {
            warn!(?err, "generation response was not structured; using raw text");
            let title_tag = brief
                .lines()
                .find(|line| line.starts_with("Keyword: "))
                .map(|line| line.trim_start_matches("Keyword: ").to_string())
                .unwrap_or_else(|| {
                    brief.lines().next().unwrap_or_default().to_string()
                });
            ArticleContent {
                title_tag,
                meta_description: response_text.chars().take(160).collect(),
                content: response_text.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_messages_request_sets_headers_and_body() {
        let client = LlmClient::new("secret".into(), "2023-06-01".into(), "test-model".into());
        let request = client
            .build_messages_request("sys", &[ChatMessage::user("hello")], 100)
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/v1/messages");
        let headers = request.headers();
        assert_eq!(
            headers.get("x-api-key").and_then(|h| h.to_str().ok()).unwrap(),
            "secret"
        );
        assert_eq!(
            headers
                .get("anthropic-version")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "2023-06-01"
        );

        let body: Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn parse_structured_response() {
        let response = r#"{"title_tag":"T","meta_description":"M","content":"<h1>X</h1>"}"#;
        let parsed = parse_article_content("Keyword: x", response);
        assert_eq!(parsed.title_tag, "T");
        assert_eq!(parsed.content, "<h1>X</h1>");
    }

    #[test]
    fn parse_response_in_json_fence() {
        let response = "Here you go:\n```json\n{\"title_tag\":\"T\",\"meta_description\":\"M\",\"content\":\"<p>ok</p>\"}\n```\nDone.";
        let parsed = parse_article_content("Keyword: x", response);
        assert_eq!(parsed.title_tag, "T");
        assert_eq!(parsed.content, "<p>ok</p>");
    }

    #[test]
    fn parse_response_in_bare_fence() {
        let response = "```\n{\"title_tag\":\"T\",\"meta_description\":\"M\",\"content\":\"<p>ok</p>\"}\n```";
        let parsed = parse_article_content("Keyword: x", response);
        assert_eq!(parsed.meta_description, "M");
    }

    #[test]
    fn unparseable_response_falls_back_to_raw_text() {
        let brief = "Generate SEO-optimized content for this opportunity:\n\nKeyword: best socks\nType: NEW";
        let response = "Sorry, here is an outline instead. ".repeat(10);
        let parsed = parse_article_content(brief, &response);
        assert_eq!(parsed.title_tag, "best socks");
        assert_eq!(parsed.meta_description.chars().count(), 160);
        assert_eq!(parsed.content, response);
    }

    #[test]
    fn fallback_meta_truncation_is_char_safe() {
        let response = "é".repeat(200);
        let parsed = parse_article_content("Keyword: x", &response);
        assert_eq!(parsed.meta_description.chars().count(), 160);
    }

    #[test]
    fn split_analysis_on_marker() {
        let analysis = split_analysis("Good numbers.\n\nRecommended Approach:\n1. Do it.");
        assert_eq!(analysis.why, "Good numbers.");
        assert!(analysis.approach.starts_with("Recommended"));
    }

    #[test]
    fn split_analysis_without_marker() {
        let analysis = split_analysis("All one blob.");
        assert_eq!(analysis.why, "All one blob.");
        assert_eq!(analysis.approach, "See recommendations above.");
    }

    #[test]
    fn missing_api_key_detected() {
        let client = LlmClient::new("  ".into(), "2023-06-01".into(), "m".into());
        assert!(!client.has_api_key());
    }
}
