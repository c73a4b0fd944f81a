//! Operator session: every piece of in-memory state for one run, passed by
//! reference to the components that need it. Nothing here survives the
//! process.

use std::collections::BTreeSet;

use crate::llm::ChatMessage;
use crate::model::{GeneratedArticle, Opportunity, PerformanceRecord, ScrapedPage};
use crate::queue::GenerationQueue;

/// One pulled dataset: both record sets plus scraped page content.
#[derive(Debug, Clone, Default)]
pub struct SearchData {
    pub domain: String,
    pub date_range: String,
    pub queries: Vec<PerformanceRecord>,
    pub pages: Vec<PerformanceRecord>,
    pub scraped: Vec<ScrapedPage>,
}

#[derive(Debug, Default)]
pub struct Session {
    pub data: Option<SearchData>,
    /// Ranked list for the current dataset, capped at the configured max.
    pub opportunities: Vec<Opportunity>,
    /// Ids of opportunities picked for the next batch.
    pub selected: BTreeSet<String>,
    pub queue: GenerationQueue,
    /// Operator instructions attached to the running batch, reused on retry.
    pub extra_brief: Option<String>,
    pub articles: Vec<GeneratedArticle>,
    pub chat_history: Vec<ChatMessage>,
    /// URL of the article the chat is currently working on, if any.
    pub current_article_url: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selected opportunities in ranked order (the batch submission order).
    pub fn selected_opportunities(&self) -> Vec<Opportunity> {
        self.opportunities
            .iter()
            .filter(|opp| self.selected.contains(&opp.id))
            .cloned()
            .collect()
    }

    /// Drop the dataset and everything derived from it. Generated articles
    /// and chat history are kept.
    pub fn clear_data(&mut self) {
        self.data = None;
        self.opportunities.clear();
        self.selected.clear();
        self.current_article_url = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OpportunityKind;

    fn opportunity(id: &str, score: u8) -> Opportunity {
        Opportunity {
            id: id.into(),
            kind: OpportunityKind::New,
            keyword: id.into(),
            page: None,
            position: 5.0,
            impressions: 500,
            ctr: 0.01,
            clicks: 5,
            score,
        }
    }

    #[test]
    fn selected_opportunities_keep_ranked_order() {
        let mut session = Session::new();
        session.opportunities = vec![
            opportunity("a", 90),
            opportunity("b", 80),
            opportunity("c", 70),
        ];
        session.selected.insert("c".into());
        session.selected.insert("a".into());

        let selected = session.selected_opportunities();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].id, "a");
        assert_eq!(selected[1].id, "c");
    }

    #[test]
    fn clear_data_keeps_articles_and_history() {
        let mut session = Session::new();
        session.data = Some(SearchData::default());
        session.opportunities = vec![opportunity("a", 90)];
        session.selected.insert("a".into());
        session.current_article_url = Some("https://example.com/x".into());
        session.chat_history.push(crate::llm::ChatMessage::user("hi"));

        session.clear_data();
        assert!(session.data.is_none());
        assert!(session.opportunities.is_empty());
        assert!(session.selected.is_empty());
        assert!(session.current_article_url.is_none());
        assert_eq!(session.chat_history.len(), 1);
    }
}
