//! crates/edu_platform_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Activity, ActivityStats, ChatCompletion, ChatMessage, ChatSession, MessageRole,
    PromptMessage, ResponseType, SessionOverview, StudentOverview, StudentResponse,
    UserCredentials, UserProfile, UserRole,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User and Auth Management ---
    async fn create_user(
        &self,
        email: &str,
        hashed_password: &str,
        name: &str,
        role: UserRole,
    ) -> PortResult<UserProfile>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_profile(&self, user_id: Uuid) -> PortResult<UserProfile>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Validates a login token and returns the owning user's id and role.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<(Uuid, UserRole)>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Chat Session Management ---
    async fn create_chat_session(&self, user_id: Uuid, title: &str) -> PortResult<ChatSession>;

    async fn get_chat_session(&self, session_id: Uuid) -> PortResult<ChatSession>;

    async fn list_chat_sessions(&self, user_id: Uuid, limit: i64) -> PortResult<Vec<ChatSession>>;

    /// Refreshes the session's `updated_at` to the current time.
    async fn touch_chat_session(&self, session_id: Uuid) -> PortResult<()>;

    // --- Chat Message Management ---
    async fn insert_chat_message(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> PortResult<ChatMessage>;

    async fn list_chat_messages(&self, session_id: Uuid) -> PortResult<Vec<ChatMessage>>;

    /// Returns up to `limit` of the newest messages in the session, reordered
    /// oldest-first so they can be fed to the completion API directly.
    async fn recent_chat_messages(
        &self,
        session_id: Uuid,
        limit: i64,
    ) -> PortResult<Vec<ChatMessage>>;

    // --- Activity Management ---
    async fn create_activity(
        &self,
        title: &str,
        description: Option<&str>,
        content: Option<serde_json::Value>,
    ) -> PortResult<Activity>;

    async fn list_activities(&self) -> PortResult<Vec<Activity>>;

    async fn delete_activity(&self, activity_id: Uuid) -> PortResult<()>;

    /// Participation figures for every activity that has at least one
    /// response, in one aggregate pass. Activities without responses are
    /// absent from the result.
    async fn list_activity_stats(&self) -> PortResult<Vec<(Uuid, ActivityStats)>>;

    /// Inserts the student's response, or replaces the content and status of an
    /// existing response of the same type for the same activity.
    async fn upsert_student_response(
        &self,
        user_id: Uuid,
        activity_id: Uuid,
        response_type: ResponseType,
        content: &str,
        status: &str,
    ) -> PortResult<StudentResponse>;

    // --- Admin Statistics ---
    async fn count_students(&self) -> PortResult<i64>;

    async fn count_chat_sessions(&self) -> PortResult<i64>;

    async fn count_chat_messages(&self) -> PortResult<i64>;

    /// Counts chat sessions whose `updated_at` is at or after the given instant.
    async fn count_sessions_updated_since(&self, since: DateTime<Utc>) -> PortResult<i64>;

    async fn recent_students(&self, limit: i64) -> PortResult<Vec<UserProfile>>;

    async fn recent_sessions_overview(&self, limit: i64) -> PortResult<Vec<SessionOverview>>;

    async fn list_students_overview(&self) -> PortResult<Vec<StudentOverview>>;

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait ChatCompletionService: Send + Sync {
    /// Generates one assistant reply for the given context window.
    /// Non-streaming; the whole reply is returned at once.
    async fn complete(&self, messages: &[PromptMessage]) -> PortResult<ChatCompletion>;
}
