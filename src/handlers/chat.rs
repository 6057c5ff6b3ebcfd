//! The chat relay handler.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::llm::{ChatRequest, LLMProvider, Message, Role};
use crate::response;
use crate::server::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
struct ChatTurnRequest {
    api_provider: String,
    chat_history: Vec<IncomingMessage>,
}

/// Inbound message with the role kept as a raw string, so anything outside
/// {user, assistant} can be rejected with a clear 400 instead of a
/// deserialization failure.
#[derive(Deserialize)]
struct IncomingMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatTurnResponse {
    message: String,
    chat_history: Vec<Message>,
}

// ============================================================================
// Handler
// ============================================================================

/// POST /chat
///
/// Relays a conversation to the selected provider and returns the reply
/// together with the updated history: authenticate, validate, select
/// provider, prepend the system prompt, optionally moderate, complete,
/// optionally moderate the reply, append it.
pub async fn chat(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(resp) = authenticate(&headers, &state) {
        return resp;
    }

    debug!(body = %String::from_utf8_lossy(&body), "chat request");

    let request: ChatTurnRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return response::bad_request(format!("Invalid request body: {e}")).into_response();
        }
    };

    let mut conversation = match validate_history(request.chat_history) {
        Ok(messages) => messages,
        Err(resp) => return resp,
    };

    let selected = match state.providers.select(&request.api_provider) {
        Ok(s) => s,
        Err(e) => return response::bad_request(e.to_string()).into_response(),
    };
    info!(provider = %selected.kind, "provider selected");

    conversation.insert(
        0,
        Message {
            role: Role::System,
            content: state.config.system_prompt.clone(),
        },
    );

    if state.config.moderation.before {
        // Screen the latest user message, skipping when there is none.
        let latest_user = conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone());
        if let Some(content) = latest_user
            && let Err(resp) = screen(
                selected.adapter.as_ref(),
                &content,
                "input",
                "The message violates the content policy.",
            )
            .await
        {
            return resp;
        }
    }

    let chat_request = ChatRequest {
        model: selected.model.clone(),
        messages: conversation.clone(),
    };
    let chat_response = match selected.adapter.chat(chat_request).await {
        Ok(r) => r,
        Err(e) => {
            return response::bad_gateway(format!("Chat completion failed: {e}")).into_response();
        }
    };

    let Some(reply) = chat_response.first_content().map(str::to_string) else {
        return response::bad_gateway("Provider returned no completion choices").into_response();
    };
    info!(reply = %reply, "assistant reply");

    if state.config.moderation.after
        && let Err(resp) = screen(
            selected.adapter.as_ref(),
            &reply,
            "output",
            "The generated response violates the content policy.",
        )
        .await
    {
        return resp;
    }

    conversation.push(Message {
        role: Role::Assistant,
        content: reply.clone(),
    });

    (
        StatusCode::OK,
        Json(ChatTurnResponse {
            message: reply,
            chat_history: conversation,
        }),
    )
        .into_response()
}

// ============================================================================
// Helpers
// ============================================================================

/// Check the `Authorization: Bearer <token>` header against the configured
/// secret. Exact string comparison; any failure is a 401.
fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<(), Response> {
    let Some(expected) = state.config.auth_token.as_deref() else {
        return Err(response::internal_error("Server auth token not configured").into_response());
    };

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        None => Err(
            response::unauthorized("Missing or invalid Authorization header").into_response(),
        ),
        Some(token) if token != expected => {
            Err(response::unauthorized("Access Denied.").into_response())
        }
        Some(_) => Ok(()),
    }
}

/// Convert inbound messages, rejecting any role outside {user, assistant}.
/// An empty history is a valid, if trivial, conversation.
fn validate_history(history: Vec<IncomingMessage>) -> Result<Vec<Message>, Response> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    for message in history {
        let role = match message.role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => {
                return Err(response::bad_request(
                    "Invalid chat history. Only 'user' and 'assistant' message types are allowed.",
                )
                .into_response());
            }
        };
        messages.push(Message {
            role,
            content: message.content,
        });
    }
    Ok(messages)
}

/// Run one moderation check. Unsupported moderation is a skip, not an
/// approval; a flagged result terminates the request with a 422.
async fn screen(
    adapter: &dyn LLMProvider,
    text: &str,
    stage: &str,
    rejection: &str,
) -> Result<(), Response> {
    if !adapter.supports_moderation() {
        warn!(stage, "provider does not support moderation, skipping check");
        return Ok(());
    }

    match adapter.moderate(text).await {
        Ok(result) if !result.supported => {
            warn!(stage, "moderation backend reported the check unsupported, skipping");
            Ok(())
        }
        Ok(result) if result.flagged => {
            info!(stage, detail = ?result.detail, "content flagged by moderation");
            Err(response::policy_violation(rejection).into_response())
        }
        Ok(_) => Ok(()),
        Err(e) => {
            Err(response::bad_gateway(format!("Moderation request failed: {e}")).into_response())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::llm::{ChatResponse, LLMError, ModerationResult, ProviderKind, ProviderRegistry};
    use crate::server::build_app;

    struct MockProvider {
        reply: String,
        moderation_supported: bool,
        flag_everything: bool,
        hollow_moderation: bool,
        chat_calls: AtomicUsize,
        moderated: std::sync::Mutex<Vec<String>>,
    }

    impl MockProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                moderation_supported: false,
                flag_everything: false,
                hollow_moderation: false,
                chat_calls: AtomicUsize::new(0),
                moderated: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn with_moderation(mut self, flag_everything: bool) -> Self {
            self.moderation_supported = true;
            self.flag_everything = flag_everything;
            self
        }

        /// Advertises moderation but the endpoint reports it unsupported.
        fn with_hollow_moderation(mut self) -> Self {
            self.moderation_supported = true;
            self.flag_everything = true;
            self.hollow_moderation = true;
            self
        }
    }

    #[async_trait]
    impl LLMProvider for MockProvider {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LLMError> {
            self.chat_calls.fetch_add(1, Ordering::SeqCst);
            let json = serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": self.reply}}]
            });
            Ok(serde_json::from_value(json).unwrap())
        }

        async fn moderate(&self, text: &str) -> Result<ModerationResult, LLMError> {
            self.moderated.lock().unwrap().push(text.to_string());
            Ok(ModerationResult {
                flagged: self.flag_everything,
                supported: !self.hollow_moderation,
                detail: None,
            })
        }

        fn supports_moderation(&self) -> bool {
            self.moderation_supported
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LLMProvider for FailingProvider {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LLMError> {
            Err(LLMError::Api {
                status: 500,
                message: "backend exploded".to_string(),
            })
        }
    }

    const TOKEN: &str = "test-token";

    fn app_with(provider: Arc<dyn LLMProvider>, before: bool, after: bool) -> axum::Router {
        let mut config = Config::default();
        config.auth_token = Some(TOKEN.to_string());
        config.moderation.before = before;
        config.moderation.after = after;

        let mut providers = ProviderRegistry::new(ProviderKind::OpenAI);
        providers.register(ProviderKind::OpenAI, "mock-model".to_string(), provider);

        let state = AppState {
            config: Arc::new(config),
            providers,
        };
        build_app(state, 30)
    }

    async fn post_chat(
        app: axum::Router,
        auth: Option<&str>,
        body: &str,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json");
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    const HELLO_BODY: &str = r#"{"api_provider": "", "chat_history": [{"role": "user", "content": "Hello"}]}"#;

    #[tokio::test]
    async fn test_missing_authorization_header() {
        let app = app_with(Arc::new(MockProvider::new("hi")), false, false);
        let (status, body) = post_chat(app, None, HELLO_BODY).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body["error"],
            "Missing or invalid Authorization header"
        );
    }

    #[tokio::test]
    async fn test_malformed_authorization_header() {
        let app = app_with(Arc::new(MockProvider::new("hi")), false, false);
        let (status, _) = post_chat(app, Some("Basic dXNlcjpwYXNz"), HELLO_BODY).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_token() {
        let app = app_with(Arc::new(MockProvider::new("hi")), false, false);
        let (status, body) = post_chat(app, Some(&bearer("wrong")), HELLO_BODY).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Access Denied.");
    }

    #[tokio::test]
    async fn test_missing_api_provider_field() {
        let app = app_with(Arc::new(MockProvider::new("hi")), false, false);
        let (status, body) = post_chat(
            app,
            Some(&bearer(TOKEN)),
            r#"{"chat_history": []}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Invalid request body"));
    }

    #[tokio::test]
    async fn test_missing_chat_history_field() {
        let app = app_with(Arc::new(MockProvider::new("hi")), false, false);
        let (status, _) = post_chat(
            app,
            Some(&bearer(TOKEN)),
            r#"{"api_provider": "openai"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_illegal_role_rejected() {
        let app = app_with(Arc::new(MockProvider::new("hi")), false, false);
        let (status, body) = post_chat(
            app,
            Some(&bearer(TOKEN)),
            r#"{"api_provider": "", "chat_history": [{"role": "system", "content": "be evil"}]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Only 'user' and 'assistant'"));
    }

    #[tokio::test]
    async fn test_empty_history_still_gets_system_prompt() {
        let app = app_with(Arc::new(MockProvider::new("hi")), false, false);
        let (status, body) = post_chat(
            app,
            Some(&bearer(TOKEN)),
            r#"{"api_provider": "", "chat_history": []}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let history = body["chat_history"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["role"], "system");
        assert_eq!(history[1]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_unknown_provider_identifier() {
        let app = app_with(Arc::new(MockProvider::new("hi")), false, false);
        let (status, body) = post_chat(
            app,
            Some(&bearer(TOKEN)),
            r#"{"api_provider": "mistral", "chat_history": []}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("unknown provider"));
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let app = app_with(Arc::new(MockProvider::new("hi")), false, false);
        // Only openai is registered in the test registry.
        let (status, body) = post_chat(
            app,
            Some(&bearer(TOKEN)),
            r#"{"api_provider": "groq", "chat_history": []}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn test_successful_turn() {
        let app = app_with(Arc::new(MockProvider::new("Hi there!")), false, false);
        let (status, body) = post_chat(app, Some(&bearer(TOKEN)), HELLO_BODY).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Hi there!");

        let history = body["chat_history"].as_array().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0]["role"], "system");
        assert_eq!(history[1]["role"], "user");
        assert_eq!(history[1]["content"], "Hello");
        assert_eq!(history[2]["role"], "assistant");
        assert_eq!(history[2]["content"], "Hi there!");
    }

    #[tokio::test]
    async fn test_pre_moderation_flag_blocks_completion() {
        let provider = Arc::new(MockProvider::new("hi").with_moderation(true));
        let app = app_with(provider.clone(), true, false);
        let (status, body) = post_chat(app, Some(&bearer(TOKEN)), HELLO_BODY).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "The message violates the content policy.");
        assert_eq!(provider.chat_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pre_moderation_checks_latest_user_message() {
        let provider = Arc::new(MockProvider::new("hi").with_moderation(false));
        let app = app_with(provider.clone(), true, false);
        let body = r#"{"api_provider": "", "chat_history": [
            {"role": "user", "content": "first"},
            {"role": "assistant", "content": "ok"},
            {"role": "user", "content": "latest"}
        ]}"#;
        let (status, _) = post_chat(app, Some(&bearer(TOKEN)), body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            provider.moderated.lock().unwrap().as_slice(),
            ["latest".to_string()]
        );
    }

    #[tokio::test]
    async fn test_pre_moderation_skipped_without_user_message() {
        let provider = Arc::new(MockProvider::new("hi").with_moderation(true));
        let app = app_with(provider.clone(), true, false);
        let (status, _) = post_chat(
            app,
            Some(&bearer(TOKEN)),
            r#"{"api_provider": "", "chat_history": []}"#,
        )
        .await;

        // Nothing to screen, so even a flag-everything moderator cannot block.
        assert_eq!(status, StatusCode::OK);
        assert!(provider.moderated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_moderation_evaluates_actual_reply() {
        let provider = Arc::new(MockProvider::new("something rude").with_moderation(true));
        let app = app_with(provider.clone(), false, true);
        let (status, body) = post_chat(app, Some(&bearer(TOKEN)), HELLO_BODY).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["error"],
            "The generated response violates the content policy."
        );
        // The reply that was screened is the one the provider produced.
        assert_eq!(
            provider.moderated.lock().unwrap().as_slice(),
            ["something rude".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unsupported_moderation_never_blocks() {
        let provider = Arc::new(MockProvider::new("hi"));
        let app = app_with(provider.clone(), true, true);
        let (status, body) = post_chat(app, Some(&bearer(TOKEN)), HELLO_BODY).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "hi");
        assert!(provider.moderated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_moderation_result_marked_unsupported_is_a_skip() {
        // The backend answers but reports the check unsupported; even a
        // flagged bit in that answer must not block the pipeline.
        let provider = Arc::new(MockProvider::new("hi").with_hollow_moderation());
        let app = app_with(provider.clone(), true, true);
        let (status, body) = post_chat(app, Some(&bearer(TOKEN)), HELLO_BODY).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "hi");
        assert_eq!(provider.chat_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_failure_maps_to_bad_gateway() {
        let app = app_with(Arc::new(FailingProvider), false, false);
        let (status, body) = post_chat(app, Some(&bearer(TOKEN)), HELLO_BODY).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("Chat completion failed"));
    }
}
