//! Groq LLM Provider
//!
//! Hosted inference through Groq's OpenAI-compatible chat completions API.
//! Failures are classified so the host can tell "re-enter your key" apart
//! from "try again later".

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, FinishReason, GenerationOptions, LlmProvider, TokenUsage},
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Groq provider configuration
#[derive(Clone)]
pub struct GroqConfig {
    pub base_url: String,

    /// Bearer credential; checked before every request
    pub api_key: Option<String>,

    pub timeout_secs: u64,
}

impl Default for GroqConfig {
    fn default() -> Self {
        Self {
            base_url: GROQ_BASE_URL.into(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for GroqConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl GroqConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("GROQ_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("GROQ_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            timeout_secs: std::env::var("GROQ_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Build the HTTP client this config asks for
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {}", e)))
    }
}

/// Groq LLM provider
pub struct GroqProvider {
    client: reqwest::Client,
    config: GroqConfig,
}

impl GroqProvider {
    pub fn from_config(config: GroqConfig) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    /// Reuse an existing HTTP client (one provider per session credential)
    pub fn with_client(client: reqwest::Client, config: GroqConfig) -> Self {
        Self { client, config }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_config(GroqConfig::from_env())
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AgentError::Auth("No Groq API key provided".into()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn build_request<'a>(
        messages: &'a [Message],
        options: &'a GenerationOptions,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &options.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: wire_role(m.role),
                    content: &m.content,
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            stop: (!options.stop_sequences.is_empty()).then_some(options.stop_sequences.as_slice()),
        }
    }

    fn convert_completion(response: ChatResponse, requested_model: &str) -> Result<Completion> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("Groq returned no choices".into()))?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            model: response.model.unwrap_or_else(|| requested_model.to_string()),
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_wire),
        })
    }
}

/// Tool observations go back to the model as user turns
fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
    }
}

/// Map a non-success HTTP status to the error taxonomy
pub(crate) fn classify_status(status: StatusCode, body: &str) -> AgentError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited(detail),
        StatusCode::REQUEST_TIMEOUT => AgentError::ProviderUnavailable(detail),
        s if s.is_server_error() => AgentError::ProviderUnavailable(format!("{}: {}", s, detail)),
        s => AgentError::Provider(format!("{}: {}", s, detail)),
    }
}

/// Map a transport failure to the error taxonomy
pub(crate) fn classify_transport(err: &reqwest::Error) -> AgentError {
    if err.is_decode() {
        AgentError::Provider(format!("Malformed Groq response: {}", err))
    } else {
        AgentError::ProviderUnavailable(err.to_string())
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    fn name(&self) -> &str {
        "Groq"
    }

    fn validate_credentials(&self) -> Result<()> {
        self.api_key().map(|_| ())
    }

    async fn health_check(&self) -> Result<bool> {
        let Ok(key) = self.api_key() else {
            return Ok(false);
        };
        match self
            .client
            .get(self.endpoint("models"))
            .bearer_auth(key)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("Groq health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let key = self.api_key()?;
        let request = Self::build_request(messages, options);

        tracing::debug!(model = %options.model, messages = messages.len(), "Groq chat completion");

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, &body);
            tracing::warn!(%status, error = %err, "Groq request rejected");
            return Err(err);
        }

        let body: ChatResponse = response.json().await.map_err(|e| classify_transport(&e))?;
        Self::convert_completion(body, &options.model)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_redaction() {
        let config = GroqConfig::default().with_api_key("gsk_secret");
        assert_eq!(config.base_url, GROQ_BASE_URL);
        let debug = format!("{:?}", config);
        assert!(!debug.contains("gsk_secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_missing_or_blank_key_is_auth_error() {
        let provider = GroqProvider::with_client(reqwest::Client::new(), GroqConfig::default());
        assert!(matches!(provider.validate_credentials(), Err(AgentError::Auth(_))));

        let blank = GroqProvider::with_client(
            reqwest::Client::new(),
            GroqConfig::default().with_api_key("   "),
        );
        assert!(matches!(blank.validate_credentials(), Err(AgentError::Auth(_))));

        let ok = GroqProvider::with_client(
            reqwest::Client::new(),
            GroqConfig::default().with_api_key("gsk_x"),
        );
        assert!(ok.validate_credentials().is_ok());
    }

    #[tokio::test]
    async fn test_complete_without_key_makes_no_request() {
        let provider = GroqProvider::with_client(
            reqwest::Client::new(),
            GroqConfig {
                base_url: "http://127.0.0.1:9".into(),
                ..GroqConfig::default()
            },
        );
        let err = provider
            .complete(&[Message::user("2+2")], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Auth(_)));
    }

    #[test]
    fn test_status_classification() {
        let body = r#"{"error":{"message":"Invalid API Key","type":"invalid_request_error"}}"#;
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, body),
            AgentError::Auth(ref m) if m == "Invalid API Key"
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            AgentError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            AgentError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad model"),
            AgentError::Provider(_)
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![
            Message::system("You solve math."),
            Message::user("Question: 2+2"),
            Message::tool("Observation: 4", None),
        ];
        let options = GenerationOptions::default().with_stop("\nObservation:");
        let body = serde_json::to_value(GroqProvider::build_request(&messages, &options)).unwrap();

        assert_eq!(body["model"], options.model.as_str());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["role"], "user");
        assert_eq!(body["stop"][0], "\nObservation:");

        let no_stop = serde_json::to_value(GroqProvider::build_request(
            &messages,
            &GenerationOptions::default(),
        ))
        .unwrap();
        assert!(no_stop.get("stop").is_none());
    }

    #[test]
    fn test_response_conversion() {
        let raw = r#"{
            "model": "llama-3.3-70b-versatile",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Final Answer: 12"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14}
        }"#;
        let response: ChatResponse = serde_json::from_str(raw).unwrap();
        let completion = GroqProvider::convert_completion(response, "fallback").unwrap();

        assert_eq!(completion.content, "Final Answer: 12");
        assert_eq!(completion.model, "llama-3.3-70b-versatile");
        assert_eq!(completion.usage.unwrap().total_tokens, 14);
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));

        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(GroqProvider::convert_completion(empty, "m").is_err());
    }
}
