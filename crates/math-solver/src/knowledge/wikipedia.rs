//! Wikipedia Client
//!
//! Two-step lookup against the MediaWiki action API: `list=search` to find
//! titles, then `prop=extracts` for each title's plain-text intro.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Article, KnowledgeSource};
use crate::error::{Result, SolverError};

/// Wikipedia client configuration
#[derive(Clone, Debug)]
pub struct WikipediaConfig {
    /// Full `api.php` URL; derived from `lang` when unset
    pub base_url: Option<String>,

    pub lang: String,

    pub timeout_secs: u64,

    pub user_agent: String,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            lang: "en".into(),
            timeout_secs: 10,
            user_agent: concat!("math-solver/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl WikipediaConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("WIKIPEDIA_BASE_URL").ok(),
            lang: std::env::var("WIKIPEDIA_LANG").unwrap_or(defaults.lang),
            ..defaults
        }
    }

    pub fn api_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.wikipedia.org/w/api.php", self.lang))
    }
}

/// Live Wikipedia search
pub struct WikipediaClient {
    client: reqwest::Client,
    config: WikipediaConfig,
}

impl WikipediaClient {
    pub fn new(config: WikipediaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SolverError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(WikipediaConfig::from_env())
    }

    async fn search_titles(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let limit = limit.to_string();
        let response: SearchResponse = self
            .client
            .get(self.config.api_url())
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("srprop", ""),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.titles())
    }

    async fn fetch_extract(&self, title: &str) -> Result<Option<Article>> {
        let response: ExtractResponse = self
            .client
            .get(self.config.api_url())
            .query(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.into_article())
    }
}

#[async_trait]
impl KnowledgeSource for WikipediaClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Article>> {
        let titles = self.search_titles(query, limit).await?;
        tracing::debug!(query, hits = titles.len(), "Wikipedia search");

        let mut articles = Vec::with_capacity(titles.len());
        for title in titles {
            // A page that vanished between the two calls is skipped
            match self.fetch_extract(&title).await {
                Ok(Some(article)) => articles.push(article),
                Ok(None) => {}
                Err(e) => tracing::warn!(%title, "Wikipedia extract failed: {}", e),
            }
        }
        Ok(articles)
    }

    fn name(&self) -> &str {
        "wikipedia"
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

impl SearchResponse {
    fn titles(self) -> Vec<String> {
        self.query
            .map(|q| q.search.into_iter().map(|h| h.title).collect())
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    query: Option<ExtractQuery>,
}

#[derive(Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: Vec<ExtractPage>,
}

#[derive(Deserialize)]
struct ExtractPage {
    title: String,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    missing: bool,
}

impl ExtractResponse {
    fn into_article(self) -> Option<Article> {
        self.query?
            .pages
            .into_iter()
            .find(|p| !p.missing)
            .and_then(|p| {
                let summary = p.extract?.trim().to_string();
                (!summary.is_empty()).then(|| Article::new(p.title, summary))
            })
    }
}
