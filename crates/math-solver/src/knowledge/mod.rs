//! Knowledge Sources
//!
//! Search backends for the Wikipedia tool.

mod fixed;
mod wikipedia;

pub use fixed::StaticKnowledgeSource;
pub use wikipedia::{WikipediaClient, WikipediaConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One article summary returned by a search
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub summary: String,
}

impl Article {
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
        }
    }
}

/// Knowledge source trait (Strategy pattern)
///
/// Implement this for each backend: the live MediaWiki API, a static corpus
/// for tests, and so on.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Up to `limit` articles relevant to `query`, best match first
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Article>>;

    /// Source name
    fn name(&self) -> &str;
}
