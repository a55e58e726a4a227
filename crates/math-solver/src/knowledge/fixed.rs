//! Static Knowledge Source
//!
//! For testing and offline demos. Matches queries against a fixed list of
//! articles.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{Article, KnowledgeSource};
use crate::error::{Result, SolverError};

/// Knowledge source backed by an in-memory article list
#[derive(Default)]
pub struct StaticKnowledgeSource {
    articles: Vec<Article>,
    failure: Option<String>,
    queries: Mutex<Vec<String>>,
}

impl StaticKnowledgeSource {
    pub fn new(articles: Vec<Article>) -> Self {
        Self {
            articles,
            ..Default::default()
        }
    }

    /// Source that fails every search
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Queries received so far
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn matches(article: &Article, terms: &[String]) -> bool {
        let haystack = format!("{} {}", article.title, article.summary).to_lowercase();
        terms.iter().any(|t| haystack.contains(t.as_str()))
    }
}

#[async_trait]
impl KnowledgeSource for StaticKnowledgeSource {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Article>> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.to_string());

        if let Some(reason) = &self.failure {
            return Err(SolverError::Knowledge(reason.clone()));
        }

        let terms: Vec<String> = query
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .map(str::to_lowercase)
            .collect();

        Ok(self
            .articles
            .iter()
            .filter(|a| Self::matches(a, &terms))
            .take(limit)
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> StaticKnowledgeSource {
        StaticKnowledgeSource::new(vec![
            Article::new("Pythagorean theorem", "a² + b² = c² for right triangles."),
            Article::new("Square root", "A number y such that y² = x."),
            Article::new("Euclid", "Greek mathematician, author of the Elements."),
        ])
    }

    #[tokio::test]
    async fn test_search_matches_title_and_summary() {
        let source = corpus();
        let hits = source.search("square root of 144", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Square root");

        let hits = source.search("greek mathematician", 3).await.unwrap();
        assert_eq!(hits[0].title, "Euclid");
        assert_eq!(source.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_limit_and_failure() {
        let source = corpus();
        let hits = source.search("theorem triangles root Elements", 2).await.unwrap();
        assert_eq!(hits.len(), 2);

        let failing = StaticKnowledgeSource::failing("offline");
        assert!(matches!(
            failing.search("anything", 3).await,
            Err(SolverError::Knowledge(_))
        ));
    }
}
