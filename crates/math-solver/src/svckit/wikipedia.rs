//! Wikipedia Tool
//!
//! Looks up background facts and renders the top articles as one bounded
//! observation. Search failures never fail the step.

use std::sync::Arc;

use agent_core::{Result as CoreResult, Tool, ToolSchema};
use async_trait::async_trait;

use crate::knowledge::{Article, KnowledgeSource};

pub const WIKIPEDIA_NAME: &str = "Wikipedia";

/// Observation when nothing usable came back
pub const NO_RESULT: &str = "No good Wikipedia Search Result was found";

const WIKIPEDIA_DESCRIPTION: &str = "A tool for searching the internet to find the various \
information on the topics mentioned in the text.";

const MAX_QUERY_CHARS: usize = 300;
const TOP_K_RESULTS: usize = 3;
const MAX_OUTPUT_CHARS: usize = 4000;

/// Tool for searching Wikipedia
pub struct WikipediaTool {
    source: Arc<dyn KnowledgeSource>,
}

impl WikipediaTool {
    pub fn new(source: Arc<dyn KnowledgeSource>) -> Self {
        Self { source }
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn render(articles: &[Article]) -> String {
    let pages: Vec<String> = articles
        .iter()
        .map(|a| format!("Page: {}\nSummary: {}", a.title, a.summary))
        .collect();
    truncate_chars(&pages.join("\n\n"), MAX_OUTPUT_CHARS).to_string()
}

#[async_trait]
impl Tool for WikipediaTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: WIKIPEDIA_NAME.into(),
            description: WIKIPEDIA_DESCRIPTION.into(),
            category: Some("knowledge".into()),
        }
    }

    async fn invoke(&self, input: &str) -> CoreResult<String> {
        let query = truncate_chars(input.trim(), MAX_QUERY_CHARS);
        if query.is_empty() {
            return Ok(NO_RESULT.into());
        }

        match self.source.search(query, TOP_K_RESULTS).await {
            Ok(articles) if !articles.is_empty() => Ok(render(&articles)),
            Ok(_) => Ok(NO_RESULT.into()),
            Err(e) => {
                tracing::warn!(source = self.source.name(), "Knowledge lookup failed: {}", e);
                Ok(NO_RESULT.into())
            }
        }
    }
}
