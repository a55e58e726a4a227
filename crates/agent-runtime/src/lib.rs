//! # agent-runtime
//!
//! Model providers for the math solver.
//!
//! ## Providers
//!
//! - **Groq** (default): hosted inference, needs an API key
//! - **Ollama** (`ollama` feature): local inference
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{ProviderSettings, ProviderSource};
//!
//! let settings = ProviderSettings::from_env()?;
//! let provider = settings.provider(Some("gsk_..."))?;
//! let agent = AgentBuilder::new().provider(provider).build()?;
//! ```

pub mod groq;

#[cfg(feature = "ollama")]
pub mod ollama;

use std::str::FromStr;
use std::sync::Arc;

pub use groq::{GroqConfig, GroqProvider};
#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};

// Re-export core types for convenience
pub use agent_core::{Agent, AgentError, LlmProvider, Message, Result, Role, Session};

/// Which backend answers model calls
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProviderKind {
    #[default]
    Groq,
    Ollama,
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "ollama" => Ok(Self::Ollama),
            other => Err(AgentError::Config(format!("Unknown model provider: {}", other))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Groq => write!(f, "groq"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

/// Hands out a provider for one request.
///
/// Hosts call this per question so a key supplied with the request replaces
/// the configured one without any global state.
pub trait ProviderSource: Send + Sync {
    fn provider(&self, api_key: Option<&str>) -> Result<Arc<dyn LlmProvider>>;

    /// Model name used when the request names none
    fn default_model(&self) -> String;
}

/// Provider selection and settings read from the environment
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub groq: GroqConfig,
    pub model: String,
    #[cfg(feature = "ollama")]
    pub ollama: OllamaConfig,
    client: reqwest::Client,
}

impl ProviderSettings {
    pub fn new(kind: ProviderKind, groq: GroqConfig) -> Result<Self> {
        let client = groq.http_client()?;
        Ok(Self {
            kind,
            groq,
            model: agent_core::provider::DEFAULT_MODEL.into(),
            #[cfg(feature = "ollama")]
            ollama: OllamaConfig::default(),
            client,
        })
    }

    pub fn from_env() -> Result<Self> {
        let kind = match std::env::var("MODEL_PROVIDER") {
            Ok(value) => value.parse()?,
            Err(_) => ProviderKind::default(),
        };
        let mut settings = Self::new(kind, GroqConfig::from_env())?;
        if let Ok(model) = std::env::var("GROQ_MODEL") {
            settings.model = model;
        }
        #[cfg(feature = "ollama")]
        {
            settings.ollama = OllamaConfig::from_env();
            if kind == ProviderKind::Ollama {
                settings.model = settings.ollama.model.clone();
            }
        }
        tracing::info!(provider = %kind, model = %settings.model, "Model provider configured");
        Ok(settings)
    }
}

impl ProviderSource for ProviderSettings {
    fn provider(&self, api_key: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        match self.kind {
            ProviderKind::Groq => {
                let mut config = self.groq.clone();
                if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
                    config.api_key = Some(key.to_string());
                }
                Ok(Arc::new(GroqProvider::with_client(self.client.clone(), config)))
            }
            #[cfg(feature = "ollama")]
            ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::from_config(self.ollama.clone()))),
            #[cfg(not(feature = "ollama"))]
            ProviderKind::Ollama => Err(AgentError::Config(
                "Ollama support is not compiled in (enable the `ollama` feature)".into(),
            )),
        }
    }

    fn default_model(&self) -> String {
        self.model.clone()
    }
}

/// Always hands out the same provider, whatever key is supplied
pub struct SharedProvider {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl SharedProvider {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: agent_core::provider::DEFAULT_MODEL.into(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl ProviderSource for SharedProvider {
    fn provider(&self, _api_key: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        Ok(Arc::clone(&self.provider))
    }

    fn default_model(&self) -> String {
        self.model.clone()
    }
}
