//! services/api/src/web/chat.rs
//!
//! The chat relay: receives one user message, ensures a chat session exists,
//! persists the message, assembles a bounded context window, forwards it to
//! the completion API and persists the reply.
//!
//! Each request is processed strictly in order with no internal parallelism.
//! Failures before the model call abort the request; failures after a
//! successful model call (saving the assistant message, refreshing the
//! session timestamp) are logged and swallowed so the caller still gets
//! their answer.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use edu_platform_core::{
    domain::{ChatMessage, MessageRole, PromptMessage, TokenUsage},
    ports::{ChatCompletionService, DatabaseService, PortError},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{middleware::AuthedUser, state::AppState};

/// At most this many persisted messages are sent to the model per request,
/// in addition to the synthesized system instruction.
pub const CONTEXT_WINDOW_MESSAGES: i64 = 10;

/// New sessions are titled with this many characters of the first message.
pub const TITLE_MAX_CHARS: usize = 50;

/// The tutoring persona prepended to every context window.
const TUTOR_SYSTEM_PROMPT: &str = "\
You are the dedicated tutor of an AI education platform. Answer learners' \
questions in a friendly, easy-to-understand way.
- Explain complex concepts step by step
- Illustrate explanations with real-world examples
- Match the depth of your explanation to the learner's level of understanding
- Encourage follow-up questions to keep the learner engaged";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    /// Informational only, and accepted as an opaque string. Persistence is
    /// attributed to the authenticated caller, never to this field.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Continue an existing session; a new one is created when omitted.
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub message: String,
    pub session_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsagePayload>,
}

#[derive(Serialize, ToSchema)]
pub struct UsagePayload {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl From<TokenUsage> for UsagePayload {
    fn from(usage: TokenUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// The relay's result, before serialization into a `ChatResponse`.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub message: String,
    pub session_id: Uuid,
    pub usage: Option<TokenUsage>,
}

//=========================================================================================
// Error Taxonomy
//=========================================================================================

/// Everything that can abort a relay request. The `Display` strings are the
/// user-facing `error` payloads; the wrapped `PortError`s are logged only.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Please enter a message.")]
    EmptyMessage,
    #[error("Chat session not found for this account.")]
    ForeignSession,
    #[error("The AI model API key is not configured.")]
    MissingCredential,
    #[error("Failed to create a chat session.")]
    SessionCreation(#[source] PortError),
    #[error("Failed to save the message.")]
    MessageSave(#[source] PortError),
    #[error("Failed to load the conversation history.")]
    ContextLoad(#[source] PortError),
    #[error("Failed to generate an AI response.")]
    Upstream(#[source] PortError),
    #[error("A server error occurred.")]
    Internal(#[source] PortError),
}

impl ChatError {
    fn status_code(&self) -> StatusCode {
        match self {
            ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
            ChatError::ForeignSession => StatusCode::FORBIDDEN,
            ChatError::MissingCredential
            | ChatError::SessionCreation(_)
            | ChatError::MessageSave(_)
            | ChatError::ContextLoad(_)
            | ChatError::Upstream(_)
            | ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        match &self {
            ChatError::EmptyMessage | ChatError::ForeignSession => {}
            other => error!("Chat relay error: {:?}", other),
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}

//=========================================================================================
// Pure Helpers
//=========================================================================================

/// Derives a session title from the first message: the first 50 characters
/// (characters, not bytes) plus an ellipsis marker.
pub fn derive_session_title(message: &str) -> String {
    let truncated: String = message.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}...", truncated)
}

/// Builds the context window for one request: the system tutor instruction
/// followed by the given history, oldest first.
pub fn build_context_window(history: &[ChatMessage]) -> Vec<PromptMessage> {
    let mut window = Vec::with_capacity(history.len() + 1);
    window.push(PromptMessage {
        role: MessageRole::System,
        content: TUTOR_SYSTEM_PROMPT.to_string(),
    });
    window.extend(history.iter().map(|m| PromptMessage {
        role: m.role,
        content: m.content.clone(),
    }));
    window
}

//=========================================================================================
// The Relay
//=========================================================================================

/// Processes one inbound chat message end to end.
///
/// The model credential is checked before any write, so a misconfigured
/// deployment leaves no orphan rows. When the caller supplies a session id,
/// the session must belong to them; this is verified before anything is
/// persisted.
pub async fn relay_chat_message(
    db: &Arc<dyn DatabaseService>,
    chat_llm: Option<&Arc<dyn ChatCompletionService>>,
    user_id: Uuid,
    message: &str,
    session_id: Option<Uuid>,
) -> Result<ChatReply, ChatError> {
    // 1. Validate the message before any side effect.
    let message = message.trim();
    if message.is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    // 2. A missing model credential is a configuration fault, not a call
    //    failure. Checked up front so nothing is persisted for a request
    //    that can never be answered.
    let chat_llm = chat_llm.ok_or(ChatError::MissingCredential)?;

    // 3. Resolve the session: verify ownership of an existing one, or create
    //    a new one titled after this first message.
    let session_id = match session_id {
        Some(id) => {
            let session = match db.get_chat_session(id).await {
                Ok(session) => session,
                Err(PortError::NotFound(_)) => return Err(ChatError::ForeignSession),
                Err(e) => return Err(ChatError::Internal(e)),
            };
            if session.user_id != user_id {
                return Err(ChatError::ForeignSession);
            }
            session.id
        }
        None => {
            let title = derive_session_title(message);
            let session = db
                .create_chat_session(user_id, &title)
                .await
                .map_err(ChatError::SessionCreation)?;
            session.id
        }
    };

    // 4. Persist the inbound message. From here on the session may hold this
    //    message even if the request fails later; there is no rollback.
    db.insert_chat_message(session_id, user_id, MessageRole::User, message)
        .await
        .map_err(ChatError::MessageSave)?;

    // 5. Assemble the context window from the recent history.
    let history = db
        .recent_chat_messages(session_id, CONTEXT_WINDOW_MESSAGES)
        .await
        .map_err(ChatError::ContextLoad)?;
    let context = build_context_window(&history);

    // 6. One non-streaming call to the completion API.
    let completion = chat_llm
        .complete(&context)
        .await
        .map_err(ChatError::Upstream)?;

    // 7. Persist the reply, best-effort: the caller still gets the generated
    //    answer if this write fails.
    if let Err(e) = db
        .insert_chat_message(
            session_id,
            user_id,
            MessageRole::Assistant,
            &completion.content,
        )
        .await
    {
        error!(
            "Failed to save assistant message for session {}: {:?}",
            session_id, e
        );
    }

    // 8. Refresh the session timestamp, also best-effort.
    if let Err(e) = db.touch_chat_session(session_id).await {
        error!("Failed to touch chat session {}: {:?}", session_id, e);
    }

    info!("Chat relay completed for session {}", session_id);

    Ok(ChatReply {
        message: completion.content,
        session_id,
        usage: completion.usage,
    })
}

//=========================================================================================
// Handler
//=========================================================================================

/// POST /chat - Relay one message to the AI tutor
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply generated", body = ChatResponse),
        (status = 400, description = "Empty message"),
        (status = 401, description = "Missing or invalid credential"),
        (status = 403, description = "Session belongs to another user"),
        (status = 500, description = "Persistence, configuration or upstream failure")
    )
)]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthedUser>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ChatError> {
    let reply = relay_chat_message(
        &state.db,
        state.chat_llm.as_ref(),
        user.user_id,
        &req.message,
        req.session_id,
    )
    .await?;

    Ok(Json(ChatResponse {
        message: reply.message,
        session_id: reply.session_id,
        usage: reply.usage.map(UsagePayload::from),
    }))
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use edu_platform_core::domain::{
        Activity, ActivityStats, ChatCompletion, ChatSession, ResponseType, SessionOverview,
        StudentOverview, StudentResponse, UserCredentials, UserProfile, UserRole,
    };
    use edu_platform_core::ports::PortResult;
    use std::sync::Mutex;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    /// In-memory stand-in for the database port. Only the chat methods are
    /// implemented; everything else is unreachable from the relay.
    #[derive(Default)]
    struct MockDb {
        sessions: Mutex<Vec<ChatSession>>,
        messages: Mutex<Vec<ChatMessage>>,
        events: Arc<Mutex<Vec<String>>>,
        fail_user_insert: bool,
        fail_assistant_insert: bool,
        fail_touch: bool,
    }

    impl MockDb {
        fn seed_session(&self, id: Uuid, user_id: Uuid, title: &str) {
            self.sessions.lock().unwrap().push(ChatSession {
                id,
                user_id,
                title: title.to_string(),
                created_at: base_time(),
                updated_at: base_time(),
            });
        }

        fn seed_message(&self, session_id: Uuid, user_id: Uuid, role: MessageRole, content: &str) {
            let mut messages = self.messages.lock().unwrap();
            let created_at = base_time() + Duration::seconds(messages.len() as i64);
            messages.push(ChatMessage {
                id: Uuid::new_v4(),
                session_id,
                user_id,
                role,
                content: content.to_string(),
                created_at,
            });
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn messages_with_role(&self, role: MessageRole) -> Vec<ChatMessage> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.role == role)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl DatabaseService for MockDb {
        async fn create_user(
            &self,
            _email: &str,
            _hashed_password: &str,
            _name: &str,
            _role: UserRole,
        ) -> PortResult<UserProfile> {
            unimplemented!("not used by the relay")
        }
        async fn get_user_by_email(&self, _email: &str) -> PortResult<UserCredentials> {
            unimplemented!("not used by the relay")
        }
        async fn get_user_profile(&self, _user_id: Uuid) -> PortResult<UserProfile> {
            unimplemented!("not used by the relay")
        }
        async fn create_auth_session(
            &self,
            _session_id: &str,
            _user_id: Uuid,
            _expires_at: DateTime<Utc>,
        ) -> PortResult<()> {
            unimplemented!("not used by the relay")
        }
        async fn validate_auth_session(&self, _session_id: &str) -> PortResult<(Uuid, UserRole)> {
            unimplemented!("not used by the relay")
        }
        async fn delete_auth_session(&self, _session_id: &str) -> PortResult<()> {
            unimplemented!("not used by the relay")
        }

        async fn create_chat_session(&self, user_id: Uuid, title: &str) -> PortResult<ChatSession> {
            let session = ChatSession {
                id: Uuid::new_v4(),
                user_id,
                title: title.to_string(),
                created_at: base_time(),
                updated_at: base_time(),
            };
            self.sessions.lock().unwrap().push(session.clone());
            self.events
                .lock()
                .unwrap()
                .push("create_session".to_string());
            Ok(session)
        }

        async fn get_chat_session(&self, session_id: Uuid) -> PortResult<ChatSession> {
            self.sessions
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.id == session_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(format!("Chat session {} not found", session_id)))
        }

        async fn list_chat_sessions(
            &self,
            _user_id: Uuid,
            _limit: i64,
        ) -> PortResult<Vec<ChatSession>> {
            unimplemented!("not used by the relay")
        }

        async fn touch_chat_session(&self, _session_id: Uuid) -> PortResult<()> {
            if self.fail_touch {
                return Err(PortError::Unexpected("touch failed".to_string()));
            }
            self.events.lock().unwrap().push("touch".to_string());
            Ok(())
        }

        async fn insert_chat_message(
            &self,
            session_id: Uuid,
            user_id: Uuid,
            role: MessageRole,
            content: &str,
        ) -> PortResult<ChatMessage> {
            if role == MessageRole::User && self.fail_user_insert {
                return Err(PortError::Unexpected("user insert failed".to_string()));
            }
            if role == MessageRole::Assistant && self.fail_assistant_insert {
                return Err(PortError::Unexpected("assistant insert failed".to_string()));
            }
            let mut messages = self.messages.lock().unwrap();
            let message = ChatMessage {
                id: Uuid::new_v4(),
                session_id,
                user_id,
                role,
                content: content.to_string(),
                created_at: base_time() + Duration::seconds(messages.len() as i64),
            };
            messages.push(message.clone());
            self.events
                .lock()
                .unwrap()
                .push(format!("insert:{}", role.as_str()));
            Ok(message)
        }

        async fn list_chat_messages(&self, _session_id: Uuid) -> PortResult<Vec<ChatMessage>> {
            unimplemented!("not used by the relay")
        }

        async fn recent_chat_messages(
            &self,
            session_id: Uuid,
            limit: i64,
        ) -> PortResult<Vec<ChatMessage>> {
            let mut in_session: Vec<ChatMessage> = self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.session_id == session_id)
                .cloned()
                .collect();
            in_session.sort_by_key(|m| m.created_at);
            let skip = in_session.len().saturating_sub(limit as usize);
            Ok(in_session.into_iter().skip(skip).collect())
        }

        async fn create_activity(
            &self,
            _title: &str,
            _description: Option<&str>,
            _content: Option<serde_json::Value>,
        ) -> PortResult<Activity> {
            unimplemented!("not used by the relay")
        }
        async fn list_activities(&self) -> PortResult<Vec<Activity>> {
            unimplemented!("not used by the relay")
        }
        async fn delete_activity(&self, _activity_id: Uuid) -> PortResult<()> {
            unimplemented!("not used by the relay")
        }
        async fn list_activity_stats(&self) -> PortResult<Vec<(Uuid, ActivityStats)>> {
            unimplemented!("not used by the relay")
        }
        async fn upsert_student_response(
            &self,
            _user_id: Uuid,
            _activity_id: Uuid,
            _response_type: ResponseType,
            _content: &str,
            _status: &str,
        ) -> PortResult<StudentResponse> {
            unimplemented!("not used by the relay")
        }
        async fn count_students(&self) -> PortResult<i64> {
            unimplemented!("not used by the relay")
        }
        async fn count_chat_sessions(&self) -> PortResult<i64> {
            unimplemented!("not used by the relay")
        }
        async fn count_chat_messages(&self) -> PortResult<i64> {
            unimplemented!("not used by the relay")
        }
        async fn count_sessions_updated_since(&self, _since: DateTime<Utc>) -> PortResult<i64> {
            unimplemented!("not used by the relay")
        }
        async fn recent_students(&self, _limit: i64) -> PortResult<Vec<UserProfile>> {
            unimplemented!("not used by the relay")
        }
        async fn recent_sessions_overview(&self, _limit: i64) -> PortResult<Vec<SessionOverview>> {
            unimplemented!("not used by the relay")
        }
        async fn list_students_overview(&self) -> PortResult<Vec<StudentOverview>> {
            unimplemented!("not used by the relay")
        }
        async fn delete_user(&self, _user_id: Uuid) -> PortResult<()> {
            unimplemented!("not used by the relay")
        }
    }

    /// Scripted completion port that records the context windows it receives.
    struct MockLlm {
        reply: String,
        usage: Option<TokenUsage>,
        fail: bool,
        seen: Mutex<Vec<Vec<PromptMessage>>>,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl MockLlm {
        fn new(events: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                reply: "4 is the answer.".to_string(),
                usage: Some(TokenUsage {
                    prompt_tokens: 42,
                    completion_tokens: 7,
                    total_tokens: 49,
                }),
                fail: false,
                seen: Mutex::new(Vec::new()),
                events,
            }
        }

        fn last_context(&self) -> Vec<PromptMessage> {
            self.seen.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl ChatCompletionService for MockLlm {
        async fn complete(&self, messages: &[PromptMessage]) -> PortResult<ChatCompletion> {
            self.events.lock().unwrap().push("llm_call".to_string());
            self.seen.lock().unwrap().push(messages.to_vec());
            if self.fail {
                return Err(PortError::Unexpected("upstream 500".to_string()));
            }
            Ok(ChatCompletion {
                content: self.reply.clone(),
                usage: self.usage,
            })
        }
    }

    fn harness(db: MockDb) -> (Arc<dyn DatabaseService>, Arc<MockLlm>) {
        let llm = Arc::new(MockLlm::new(db.events.clone()));
        (Arc::new(db), llm)
    }

    fn as_llm(llm: &Arc<MockLlm>) -> Arc<dyn ChatCompletionService> {
        llm.clone()
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_side_effects() {
        let db = MockDb::default();
        let events = db.events.clone();
        let (db, llm) = harness(db);
        let llm = as_llm(&llm);

        let result =
            relay_chat_message(&db, Some(&llm), Uuid::new_v4(), "   \n\t ", None).await;

        assert!(matches!(result, Err(ChatError::EmptyMessage)));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_credential_is_rejected_before_any_write() {
        let db = MockDb::default();
        let events = db.events.clone();
        let db: Arc<dyn DatabaseService> = Arc::new(db);

        let result = relay_chat_message(&db, None, Uuid::new_v4(), "2+2는?", None).await;

        assert!(matches!(result, Err(ChatError::MissingCredential)));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_message_creates_a_titled_session_and_reuses_its_id() {
        let user_id = Uuid::new_v4();
        let db = MockDb::default();
        let (db_arc, llm) = harness(db);
        let llm_dyn = as_llm(&llm);

        let reply = relay_chat_message(&db_arc, Some(&llm_dyn), user_id, "2+2는?", None)
            .await
            .expect("relay should succeed");

        assert_eq!(reply.message, "4 is the answer.");
        assert_eq!(reply.usage.map(|u| u.total_tokens), Some(49));

        let session = db_arc
            .get_chat_session(reply.session_id)
            .await
            .expect("session was created");
        assert_eq!(session.user_id, user_id);
        assert!(session.title.starts_with("2+2는?"));
        assert!(session.title.ends_with("..."));

        // Both persisted messages belong to the session returned to the caller.
        let history = db_arc
            .recent_chat_messages(reply.session_id, 100)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "2+2는?");
        assert_eq!(history[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn user_message_is_persisted_before_the_model_call() {
        let db = MockDb::default();
        let events = db.events.clone();
        let (db, llm) = harness(db);
        let llm_dyn = as_llm(&llm);

        relay_chat_message(&db, Some(&llm_dyn), Uuid::new_v4(), "hello", None)
            .await
            .expect("relay should succeed");

        let events = events.lock().unwrap();
        let insert_pos = events.iter().position(|e| e == "insert:user").unwrap();
        let llm_pos = events.iter().position(|e| e == "llm_call").unwrap();
        assert!(insert_pos < llm_pos);
    }

    #[tokio::test]
    async fn existing_session_is_reused_and_its_title_unchanged() {
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let db = MockDb::default();
        db.seed_session(session_id, user_id, "original title...");
        let events = db.events.clone();
        let (db, llm) = harness(db);
        let llm_dyn = as_llm(&llm);

        let reply = relay_chat_message(&db, Some(&llm_dyn), user_id, "follow-up", Some(session_id))
            .await
            .expect("relay should succeed");

        assert_eq!(reply.session_id, session_id);
        assert!(!events.lock().unwrap().iter().any(|e| e == "create_session"));
        let session = db.get_chat_session(session_id).await.unwrap();
        assert_eq!(session.title, "original title...");
    }

    #[tokio::test]
    async fn foreign_session_is_rejected_before_any_write() {
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let db = MockDb::default();
        db.seed_session(session_id, owner, "private...");
        let events = db.events.clone();
        let (db, llm) = harness(db);
        let llm_dyn = as_llm(&llm);

        let result =
            relay_chat_message(&db, Some(&llm_dyn), intruder, "let me in", Some(session_id)).await;

        assert!(matches!(result, Err(ChatError::ForeignSession)));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_session_id_is_rejected() {
        let db = MockDb::default();
        let (db, llm) = harness(db);
        let llm_dyn = as_llm(&llm);

        let result = relay_chat_message(
            &db,
            Some(&llm_dyn),
            Uuid::new_v4(),
            "hello",
            Some(Uuid::new_v4()),
        )
        .await;

        assert!(matches!(result, Err(ChatError::ForeignSession)));
    }

    #[tokio::test]
    async fn upstream_failure_keeps_user_message_but_no_assistant_message() {
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let db = MockDb::default();
        db.seed_session(session_id, user_id, "t...");
        let db = Arc::new(db);
        let mut llm = MockLlm::new(db.events.clone());
        llm.fail = true;
        let llm: Arc<dyn ChatCompletionService> = Arc::new(llm);
        let db_dyn: Arc<dyn DatabaseService> = db.clone();

        let result =
            relay_chat_message(&db_dyn, Some(&llm), user_id, "question", Some(session_id)).await;

        assert!(matches!(result, Err(ChatError::Upstream(_))));
        assert_eq!(db.messages_with_role(MessageRole::User).len(), 1);
        assert!(db.messages_with_role(MessageRole::Assistant).is_empty());
    }

    #[tokio::test]
    async fn assistant_save_failure_still_returns_the_reply() {
        let user_id = Uuid::new_v4();
        let db = MockDb {
            fail_assistant_insert: true,
            ..MockDb::default()
        };
        let (db, llm) = harness(db);
        let llm_dyn = as_llm(&llm);

        let reply = relay_chat_message(&db, Some(&llm_dyn), user_id, "hello", None)
            .await
            .expect("best-effort save must not abort the response");

        assert_eq!(reply.message, "4 is the answer.");
    }

    #[tokio::test]
    async fn touch_failure_still_returns_the_reply() {
        let db = MockDb {
            fail_touch: true,
            ..MockDb::default()
        };
        let (db, llm) = harness(db);
        let llm_dyn = as_llm(&llm);

        let reply = relay_chat_message(&db, Some(&llm_dyn), Uuid::new_v4(), "hello", None)
            .await
            .expect("best-effort touch must not abort the response");

        assert_eq!(reply.message, "4 is the answer.");
    }

    #[tokio::test]
    async fn context_window_is_capped_and_chronological() {
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let db = MockDb::default();
        db.seed_session(session_id, user_id, "t...");
        for i in 0..15 {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            db.seed_message(session_id, user_id, role, &format!("m{}", i));
        }
        let db = Arc::new(db);
        let llm = Arc::new(MockLlm::new(db.events.clone()));
        let llm_dyn: Arc<dyn ChatCompletionService> = llm.clone();
        let db_dyn: Arc<dyn DatabaseService> = db.clone();

        relay_chat_message(&db_dyn, Some(&llm_dyn), user_id, "newest", Some(session_id))
            .await
            .expect("relay should succeed");

        let context = llm.last_context();
        // 1 system instruction + at most 10 persisted messages.
        assert_eq!(context.len(), 1 + CONTEXT_WINDOW_MESSAGES as usize);
        assert_eq!(context[0].role, MessageRole::System);
        // The newest persisted message closes the window, and the rest keep
        // their chronological order.
        assert_eq!(context.last().unwrap().content, "newest");
        let contents: Vec<&str> = context[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["m6", "m7", "m8", "m9", "m10", "m11", "m12", "m13", "m14", "newest"]
        );
    }

    #[tokio::test]
    async fn concurrent_messages_to_one_session_both_persist() {
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let db = MockDb::default();
        db.seed_session(session_id, user_id, "shared...");
        let db = Arc::new(db);
        let llm = Arc::new(MockLlm::new(db.events.clone()));
        let llm_dyn: Arc<dyn ChatCompletionService> = llm.clone();
        let db_dyn: Arc<dyn DatabaseService> = db.clone();

        let (first, second) = tokio::join!(
            relay_chat_message(&db_dyn, Some(&llm_dyn), user_id, "first", Some(session_id)),
            relay_chat_message(&db_dyn, Some(&llm_dyn), user_id, "second", Some(session_id)),
        );

        let first = first.expect("first request should succeed");
        let second = second.expect("second request should succeed");
        assert_eq!(first.session_id, session_id);
        assert_eq!(second.session_id, session_id);

        // Both user messages land in the same session; neither request spawned
        // a new one.
        let user_messages = db.messages_with_role(MessageRole::User);
        assert_eq!(user_messages.len(), 2);
        assert!(user_messages.iter().all(|m| m.session_id == session_id));
        assert_eq!(db.sessions.lock().unwrap().len(), 1);
    }

    #[test]
    fn request_user_id_is_accepted_as_an_opaque_string() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"message":"2+2는?","userId":"student-7"}"#)
                .expect("a non-UUID userId must deserialize");
        assert_eq!(req.message, "2+2는?");
        assert_eq!(req.user_id.as_deref(), Some("student-7"));
        assert!(req.session_id.is_none());
    }

    #[test]
    fn session_title_truncates_by_characters_not_bytes() {
        let short = derive_session_title("2+2는?");
        assert_eq!(short, "2+2는?...");

        let long: String = "수".repeat(60);
        let title = derive_session_title(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn context_window_always_starts_with_the_system_instruction() {
        let window = build_context_window(&[]);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].role, MessageRole::System);
        assert!(window[0].content.contains("tutor"));
    }
}
