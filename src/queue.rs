//! Sequential generation queue.
//!
//! Items move `pending → generating → (completed | error)`; an errored item
//! goes back to `pending` on operator retry or to `skipped` (terminal). The
//! driver never advances past a non-terminal item, so at most one item is
//! ever `generating`. There is no automatic retry and no backoff: recovery
//! is an explicit operator action.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::brief::build_brief;
use crate::llm::ArticleGenerator;
use crate::model::{ArticleStatus, GeneratedArticle, Opportunity};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Generating,
    Completed,
    Error,
    Skipped,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Pending => "pending",
            ItemState::Generating => "generating",
            ItemState::Completed => "completed",
            ItemState::Error => "error",
            ItemState::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Completed | ItemState::Skipped)
    }
}

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub opportunity: Opportunity,
    pub state: ItemState,
    pub status_message: String,
    pub error: Option<String>,
}

impl QueueItem {
    fn new(opportunity: Opportunity) -> Self {
        Self {
            opportunity,
            state: ItemState::Pending,
            status_message: "Queued".to_string(),
            error: None,
        }
    }
}

/// What `run` stopped on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every item reached a terminal state; the queue has been cleared.
    Completed { generated: usize },
    /// The item at `index` is in `error` state and awaits retry or skip.
    Blocked { index: usize },
}

#[derive(Debug, Default)]
pub struct GenerationQueue {
    items: Vec<QueueItem>,
}

impl GenerationQueue {
    pub fn new(selected: Vec<Opportunity>) -> Self {
        Self {
            items: selected.into_iter().map(QueueItem::new).collect(),
        }
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// (terminal items, total items).
    pub fn progress(&self) -> (usize, usize) {
        let done = self.items.iter().filter(|i| i.state.is_terminal()).count();
        (done, self.items.len())
    }

    pub fn is_finished(&self) -> bool {
        self.items.iter().all(|i| i.state.is_terminal())
    }

    fn first_error(&mut self) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|i| i.state == ItemState::Error)
    }

    /// `error → pending`; the item re-enters the pipeline on the next run.
    pub fn retry_errored(&mut self) -> bool {
        match self.first_error() {
            Some(item) => {
                item.state = ItemState::Pending;
                item.status_message = "Queued for retry".to_string();
                item.error = None;
                true
            }
            None => false,
        }
    }

    /// `error → skipped` (terminal).
    pub fn skip_errored(&mut self) -> bool {
        match self.first_error() {
            Some(item) => {
                item.state = ItemState::Skipped;
                item.status_message = "Skipped".to_string();
                true
            }
            None => false,
        }
    }

    /// Drive the queue in submission order until it either finishes or hits
    /// an item that needs the operator. Successful items append a Draft
    /// article to `articles`. On completion the queue is cleared; only the
    /// article list outlives the batch.
    #[instrument(skip_all)]
    pub async fn run(
        &mut self,
        generator: &dyn ArticleGenerator,
        extra_brief: Option<&str>,
        articles: &mut Vec<GeneratedArticle>,
    ) -> RunOutcome {
        let total = self.items.len();
        for index in 0..total {
            match self.items[index].state {
                ItemState::Completed | ItemState::Skipped => continue,
                ItemState::Error => return RunOutcome::Blocked { index },
                ItemState::Pending | ItemState::Generating => {}
            }

            {
                let item = &mut self.items[index];
                item.state = ItemState::Generating;
                item.status_message = "Crafting content...".to_string();
            }
            let brief = build_brief(&self.items[index].opportunity, extra_brief);
            info!(
                keyword = %self.items[index].opportunity.keyword,
                index,
                total,
                "generating article"
            );

            match generator.generate(&brief).await {
                Ok(content) => {
                    let item = &mut self.items[index];
                    articles.push(GeneratedArticle {
                        id: Uuid::new_v4(),
                        title: item.opportunity.keyword.clone(),
                        kind: item.opportunity.kind,
                        created_at: Utc::now(),
                        status: ArticleStatus::Draft,
                        title_tag: if content.title_tag.is_empty() {
                            item.opportunity.keyword.clone()
                        } else {
                            content.title_tag
                        },
                        meta_description: content.meta_description,
                        content: content.content,
                    });
                    item.state = ItemState::Completed;
                    item.status_message = "Done! Ready to review.".to_string();
                }
                Err(err) => {
                    let item = &mut self.items[index];
                    warn!(keyword = %item.opportunity.keyword, %err, "generation failed");
                    item.state = ItemState::Error;
                    item.status_message = "Generation failed".to_string();
                    item.error = Some(err.to_string());
                    return RunOutcome::Blocked { index };
                }
            }
        }

        let generated = self
            .items
            .iter()
            .filter(|i| i.state == ItemState::Completed)
            .count();
        info!(generated, total, "generation batch finished");
        self.items.clear();
        RunOutcome::Completed { generated }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OpportunityKind;

    fn opportunity(keyword: &str) -> Opportunity {
        Opportunity {
            id: format!("query_{keyword}"),
            kind: OpportunityKind::New,
            keyword: keyword.into(),
            page: None,
            position: 6.0,
            impressions: 1000,
            ctr: 0.01,
            clicks: 10,
            score: 70,
        }
    }

    #[test]
    fn new_items_start_pending() {
        let queue = GenerationQueue::new(vec![opportunity("a"), opportunity("b")]);
        assert_eq!(queue.items().len(), 2);
        assert!(queue.items().iter().all(|i| i.state == ItemState::Pending));
        assert_eq!(queue.progress(), (0, 2));
        assert!(!queue.is_finished());
    }

    #[test]
    fn terminal_states() {
        assert!(ItemState::Completed.is_terminal());
        assert!(ItemState::Skipped.is_terminal());
        assert!(!ItemState::Pending.is_terminal());
        assert!(!ItemState::Generating.is_terminal());
        assert!(!ItemState::Error.is_terminal());
    }

    #[test]
    fn retry_and_skip_need_an_errored_item() {
        let mut queue = GenerationQueue::new(vec![opportunity("a")]);
        assert!(!queue.retry_errored());
        assert!(!queue.skip_errored());
    }

    #[test]
    fn empty_queue_is_finished() {
        let queue = GenerationQueue::default();
        assert!(queue.is_finished());
        assert_eq!(queue.progress(), (0, 0));
    }
}
