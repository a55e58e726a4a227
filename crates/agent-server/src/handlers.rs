//! HTTP/WebSocket Handlers

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use agent_core::{
    reasoning::StepRecord, Agent, AgentError, AgentRun, EventSender, RunOptions, Session,
    SessionId,
};

use crate::state::{AppState, RunTicket};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub provider_reachable: bool,
    pub sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
    pub model: String,
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub title: String,
    #[serde(flatten)]
    pub session: Session,
    pub running: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

/// HTTP status for an agent failure
pub fn status_for(err: &AgentError) -> StatusCode {
    match err {
        AgentError::Auth(_) => StatusCode::UNAUTHORIZED,
        AgentError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        AgentError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AgentError::TimeLimit(_) => StatusCode::GATEWAY_TIMEOUT,
        AgentError::MaxIterations(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AgentError::Parse(_) => StatusCode::BAD_GATEWAY,
        AgentError::Cancelled => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn agent_error(err: &AgentError) -> ApiError {
    api_error(status_for(err), err.user_message(), err.code())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A validated request, ready to run
struct PreparedRun {
    agent: Agent,
    model: String,
    ticket: RunTicket,
}

async fn prepare_run(
    state: &AppState,
    request: &ChatRequest,
    header_key: Option<&str>,
) -> Result<PreparedRun, ApiError> {
    let question = request.message.trim();
    if question.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Please enter a question.",
            "EMPTY_QUESTION",
        ));
    }

    let api_key = request.api_key.as_deref().or(header_key);
    let provider = state.providers.provider(api_key).map_err(|e| agent_error(&e))?;
    // Missing keys are rejected before a session is touched; keys refused
    // upstream are rolled back in `execute`
    provider.validate_credentials().map_err(|e| agent_error(&e))?;

    let mut config = state.agent_config.clone();
    if let Some(model) = request.model.as_ref().filter(|m| !m.trim().is_empty()) {
        config.generation.model = model.trim().to_string();
    }
    if let Some(max) = request.max_iterations.filter(|&m| m > 0) {
        config.max_iterations = max;
    }
    let model = config.generation.model.clone();

    let agent = math_solver::solver_agent(provider, state.knowledge.clone(), config)
        .map_err(|e| agent_error(&e))?;

    let session_id = request.session_id.clone().map(SessionId::from_string);
    let ticket = state.sessions.begin(session_id, question).await;

    Ok(PreparedRun {
        agent,
        model,
        ticket,
    })
}

/// Run on its own task so a dropped connection does not tear the run down
/// mid-call; the transcript is updated from that task either way.
async fn execute(
    state: &AppState,
    prepared: PreparedRun,
    question: String,
    events: Option<EventSender>,
) -> Result<(AgentRun, String, RunTicket), (AgentError, RunTicket)> {
    let PreparedRun {
        agent,
        model,
        ticket,
    } = prepared;
    let sessions = state.sessions.clone();
    let task_ticket = ticket.clone();
    let task_model = model.clone();

    let handle = tokio::spawn(async move {
        let options = RunOptions {
            cancel: task_ticket.cancel.clone(),
            events,
        };
        let result = agent.run(&question, options).await;
        match &result {
            Ok(run) => {
                sessions
                    .finish(&task_ticket, Some((run.answer.as_str(), task_model.as_str())))
                    .await;
            }
            Err(AgentError::Auth(_)) => {
                sessions.abandon(&task_ticket).await;
            }
            Err(_) => {
                sessions.finish(&task_ticket, None).await;
            }
        }
        result
    });

    match handle.await {
        Ok(Ok(run)) => Ok((run, model, ticket)),
        Ok(Err(e)) => Err((e, ticket)),
        Err(e) => {
            state.sessions.finish(&ticket, None).await;
            Err((AgentError::Other(format!("Agent task failed: {}", e)), ticket))
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (provider, provider_reachable) = match state.providers.provider(None) {
        Ok(provider) => (
            provider.name().to_string(),
            provider.health_check().await.unwrap_or(false),
        ),
        Err(e) => (e.to_string(), false),
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider,
        provider_reachable,
        sessions: state.sessions.count().await,
    })
}

/// Main chat endpoint
pub async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let header_key = bearer_token(&headers);
    let prepared = prepare_run(&state, &payload, header_key.as_deref()).await?;
    let question = payload.message.trim().to_string();

    match execute(&state, prepared, question, None).await {
        Ok((run, model, ticket)) => Ok(Json(ChatResponse {
            message: run.answer,
            session_id: ticket.session_id.to_string(),
            model,
            steps: run.steps,
        })),
        Err((e, ticket)) => {
            tracing::error!(session = %ticket.session_id, error = %e, "Agent error");
            Err(agent_error(&e))
        }
    }
}

/// Session transcript
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    state
        .sessions
        .get(&SessionId::from_string(id))
        .await
        .map(|(session, running)| {
            Json(SessionResponse {
                title: session.title(),
                session,
                running,
            })
        })
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Session not found", "SESSION_NOT_FOUND"))
}

/// Cancel any in-flight run and drop the session
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&SessionId::from_string(id)).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(StatusCode::NOT_FOUND, "Session not found", "SESSION_NOT_FOUND"))
    }
}

/// WebSocket chat with progress events
pub async fn chat_stream_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let header_key = bearer_token(&headers);
    ws.on_upgrade(move |socket| handle_stream(socket, state, header_key))
}

fn frame(value: &impl Serialize) -> Message {
    Message::Text(serde_json::to_string(value).unwrap_or_default().into())
}

fn error_frame(error: &ApiError) -> Message {
    frame(&serde_json::json!({
        "type": "error",
        "status": error.0.as_u16(),
        "error": error.1.error,
        "code": error.1.code,
    }))
}

async fn handle_stream(socket: WebSocket, state: AppState, header_key: Option<String>) {
    let (sender, receiver) = socket.split();
    drive_stream(sender, receiver, state, header_key).await;
}

/// Answer questions from one socket in order.
///
/// A question that arrives while a run is in flight supersedes it: the old
/// run is cancelled and gets a `CANCELLED` error frame, then the new one
/// starts.
async fn drive_stream<S, R>(
    mut sender: S,
    mut receiver: R,
    state: AppState,
    header_key: Option<String>,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut pending = None;

    loop {
        let text = match pending.take() {
            Some(text) => text,
            None => match receiver.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::error!("WebSocket error: {}", e);
                    break;
                }
                Some(Ok(_)) => continue,
            },
        };

        let request: ChatRequest = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(e) => {
                let error = api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_REQUEST");
                let _ = sender.send(error_frame(&error)).await;
                continue;
            }
        };

        let prepared = match prepare_run(&state, &request, header_key.as_deref()).await {
            Ok(p) => p,
            Err(error) => {
                let _ = sender.send(error_frame(&error)).await;
                continue;
            }
        };

        let ticket = prepared.ticket.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let question = request.message.trim().to_string();
        let run = execute(&state, prepared, question, Some(tx));
        tokio::pin!(run);

        // None when a newer question took over
        let outcome = loop {
            tokio::select! {
                Some(event) = rx.recv() => {
                    if sender.send(frame(&event)).await.is_err() {
                        state.sessions.cancel(&ticket).await;
                        return;
                    }
                }
                result = &mut run => break Some(result),
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Text(next))) => {
                        tracing::info!(session = %ticket.session_id, "New question, cancelling run");
                        state.sessions.cancel(&ticket).await;
                        pending = Some(next);
                        break None;
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => {
                        tracing::info!(session = %ticket.session_id, "Client left, cancelling run");
                        state.sessions.cancel(&ticket).await;
                        return;
                    }
                    Some(Ok(_)) => {}
                }
            }
        };

        // Events emitted just before the run finished
        while let Ok(event) = rx.try_recv() {
            let _ = sender.send(frame(&event)).await;
        }

        let reply = match outcome {
            Some(Ok((run, model, ticket))) => frame(&serde_json::json!({
                "type": "answer",
                "message": run.answer,
                "session_id": ticket.session_id.to_string(),
                "model": model,
            })),
            Some(Err((e, _))) => error_frame(&agent_error(&e)),
            None => error_frame(&agent_error(&AgentError::Cancelled)),
        };
        if sender.send(reply).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use std::time::Duration;

    use agent_core::{
        mock::{ScriptedProvider, ScriptedReply},
        AgentConfig, LlmProvider, Result as CoreResult,
    };
    use agent_runtime::{ProviderSource, SharedProvider};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use math_solver::{Article, StaticKnowledgeSource, GREETING};
    use tower::ServiceExt;

    use crate::state::SessionRegistry;

    /// Accepts only the key "gsk_test"
    struct KeyedSource {
        provider: Arc<ScriptedProvider>,
    }

    impl ProviderSource for KeyedSource {
        fn provider(&self, api_key: Option<&str>) -> CoreResult<Arc<dyn LlmProvider>> {
            if api_key == Some("gsk_test") {
                Ok(self.provider.clone())
            } else {
                Ok(Arc::new(ScriptedProvider::default().rejecting_credentials("bad key")))
            }
        }

        fn default_model(&self) -> String {
            "test-model".into()
        }
    }

    fn state_with(providers: Arc<dyn ProviderSource>) -> AppState {
        let mut agent_config = AgentConfig::default();
        agent_config.generation.model = providers.default_model();
        AppState {
            providers,
            knowledge: Arc::new(StaticKnowledgeSource::new(vec![Article::new(
                "Square root",
                "y² = x.",
            )])),
            agent_config,
            sessions: SessionRegistry::default(),
        }
    }

    fn scripted(replies: Vec<&str>) -> AppState {
        let provider = Arc::new(ScriptedProvider::new(replies));
        state_with(Arc::new(SharedProvider::new(provider).with_model("test-model")))
    }

    fn post_chat(body: serde_json::Value) -> Request<Body> {
        Request::post("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = crate::build_router(scripted(vec![]));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["provider"], "Scripted");
        assert_eq!(body["provider_reachable"], true);
    }

    #[tokio::test]
    async fn test_chat_runs_agent_and_records_session() {
        let state = scripted(vec![
            "Thought: compute\nAction: Calculator\nAction Input: 144**0.5",
            "12",
            "Thought: I now know the final answer\nFinal Answer: 12",
        ]);
        let app = crate::build_router(state.clone());

        let response = app
            .clone()
            .oneshot(post_chat(serde_json::json!({
                "message": "What is the square root of 144?",
                "session_id": "abc"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "12");
        assert_eq!(body["session_id"], "abc");
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["steps"][0]["call"]["name"], "Calculator");

        let response = app
            .oneshot(Request::get("/api/sessions/abc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["title"], "What is the square root of 144?");
        let transcript = body["transcript"]["messages"].as_array().unwrap();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[0]["content"], GREETING);
        assert_eq!(transcript[2]["content"], "12");
        assert_eq!(body["running"], false);
    }

    #[tokio::test]
    async fn test_empty_question_is_bad_request() {
        let app = crate::build_router(scripted(vec![]));
        let response = app
            .oneshot(post_chat(serde_json::json!({"message": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "EMPTY_QUESTION");
    }

    #[tokio::test]
    async fn test_missing_key_is_unauthorized() {
        let provider = Arc::new(ScriptedProvider::new(["Final Answer: 4"]));
        let state = state_with(Arc::new(KeyedSource {
            provider: provider.clone(),
        }));
        let app = crate::build_router(state.clone());

        let response = app
            .clone()
            .oneshot(post_chat(serde_json::json!({"message": "2+2"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "AUTH_ERROR");
        assert_eq!(provider.call_count(), 0);
        assert_eq!(state.sessions.count().await, 0);

        let request = Request::post("/api/chat")
            .header("content-type", "application/json")
            .header("authorization", "Bearer gsk_test")
            .body(Body::from(r#"{"message": "2+2"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["message"], "4");
    }

    #[tokio::test]
    async fn test_key_refused_upstream_leaves_no_session() {
        let provider = Arc::new(ScriptedProvider::new([
            ScriptedReply::Auth("invalid api key".into()),
            ScriptedReply::Auth("invalid api key".into()),
            ScriptedReply::Auth("invalid api key".into()),
        ]));
        let state = state_with(Arc::new(SharedProvider::new(provider.clone())));
        let app = crate::build_router(state.clone());

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(post_chat(serde_json::json!({"message": "2+2", "api_key": "bogus"})))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(json_body(response).await["code"], "AUTH_ERROR");
        }
        assert_eq!(provider.call_count(), 3);
        assert_eq!(state.sessions.count().await, 0);
    }

    #[tokio::test]
    async fn test_key_refused_upstream_keeps_existing_transcript() {
        let provider = Arc::new(ScriptedProvider::new([
            ScriptedReply::from("Final Answer: 4"),
            ScriptedReply::Auth("invalid api key".into()),
        ]));
        let state = state_with(Arc::new(SharedProvider::new(provider)));
        let app = crate::build_router(state.clone());

        let ask = || post_chat(serde_json::json!({"message": "2+2", "session_id": "s1"}));
        let response = app.clone().oneshot(ask()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.oneshot(ask()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let (session, running) = state.sessions.get(&SessionId::from_string("s1")).await.unwrap();
        assert!(!running);
        assert_eq!(session.message_count(), 3);
    }

    fn text_of(message: Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_question_supersedes_running_one() {
        let provider = Arc::new(ScriptedProvider::new([
            ScriptedReply::Stall,
            ScriptedReply::from("Final Answer: 4"),
        ]));
        let state = state_with(Arc::new(SharedProvider::new(provider.clone()).with_model("test-model")));

        let (client_tx, socket_rx) = futures::channel::mpsc::unbounded::<Result<Message, axum::Error>>();
        let (socket_tx, mut client_rx) = futures::channel::mpsc::unbounded::<Message>();
        let ask = |question: &str| -> Result<Message, axum::Error> {
            let body = serde_json::json!({"message": question, "session_id": "ws"});
            Ok(Message::Text(body.to_string().into()))
        };
        let driver = tokio::spawn(drive_stream(socket_tx, socket_rx, state.clone(), None));

        client_tx.unbounded_send(ask("first")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while provider.call_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        client_tx.unbounded_send(ask("second")).unwrap();

        let mut codes = Vec::new();
        let answer = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let frame = text_of(client_rx.next().await.unwrap());
                match frame["type"].as_str() {
                    Some("answer") => break frame,
                    Some("error") => codes.push(frame["code"].as_str().unwrap_or_default().to_string()),
                    _ => {}
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(codes, vec!["CANCELLED"]);
        assert_eq!(answer["message"], "4");
        assert_eq!(answer["session_id"], "ws");

        drop(client_tx);
        driver.await.unwrap();

        let (session, running) = state.sessions.get(&SessionId::from_string("ws")).await.unwrap();
        assert!(!running);
        let contents: Vec<&str> = session
            .transcript
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec![GREETING, "first", "second", "4"]);
    }

    #[tokio::test]
    async fn test_step_limit_maps_to_422() {
        let state = scripted(vec!["no format", "still no format", "nope"]);
        let app = crate::build_router(state);

        let response = app
            .oneshot(post_chat(serde_json::json!({"message": "2+2", "max_iterations": 1})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["code"], "STEP_LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn test_unparseable_output_maps_to_502() {
        let app = crate::build_router(scripted(vec!["no format", "still no format"]));
        let response = app
            .oneshot(post_chat(serde_json::json!({"message": "2+2"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(json_body(response).await["code"], "PARSE_ERROR");
    }

    #[tokio::test]
    async fn test_delete_session() {
        let state = scripted(vec!["Final Answer: 4"]);
        let app = crate::build_router(state.clone());
        app.clone()
            .oneshot(post_chat(serde_json::json!({"message": "2+2", "session_id": "s1"})))
            .await
            .unwrap();

        let delete = || Request::delete("/api/sessions/s1").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = app.oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_status_mapping() {
        use std::time::Duration;
        assert_eq!(status_for(&AgentError::RateLimited("x".into())), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            status_for(&AgentError::ProviderUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&AgentError::TimeLimit(Duration::from_secs(60))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(status_for(&AgentError::Cancelled), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&AgentError::Provider("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, "Bearer  gsk_abc ".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("gsk_abc"));
        headers.insert(AUTHORIZATION, "Basic xyz".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
