//! crates/edu_platform_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The role a platform account holds. Admins manage students and activities;
/// students chat with the tutor and work through activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Admin,
    Student,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(UserRole::Admin),
            "student" => Some(UserRole::Student),
            _ => None,
        }
    }
}

// Represents a user - used throughout the app
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub name: String,
    pub role: UserRole,
}

/// The author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(MessageRole::System),
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// A titled, timestamped container for one user's conversation with the tutor.
/// Created on the first message of a new conversation; `updated_at` is
/// refreshed on every subsequent message.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One message within a chat session. Immutable once written; ordered by
/// creation time within its session.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// An ephemeral role-tagged message sent to the completion API. Never
/// persisted; built per request from the system instruction and recent
/// session history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Token accounting reported by the completion API, passed through to the
/// caller when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The result of one completion call: the generated reply plus usage metadata.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// A learning activity authored by an admin.
#[derive(Debug, Clone)]
pub struct Activity {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Participation figures for one activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityStats {
    /// Distinct students that submitted at least one response.
    pub participant_count: i64,
    pub total_responses: i64,
    pub completed_responses: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Argumentation,
    Evaluation,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Argumentation => "argumentation",
            ResponseType::Evaluation => "evaluation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "argumentation" => Some(ResponseType::Argumentation),
            "evaluation" => Some(ResponseType::Evaluation),
            _ => None,
        }
    }
}

/// A student's submission against an activity.
#[derive(Debug, Clone)]
pub struct StudentResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub activity_id: Uuid,
    pub response_type: ResponseType,
    pub content: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A student row enriched with chat statistics, for the admin screens.
#[derive(Debug, Clone)]
pub struct StudentOverview {
    pub user_id: Uuid,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub session_count: i64,
    pub message_count: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// A chat session enriched with its owner's name and message count, for the
/// admin dashboard.
#[derive(Debug, Clone)]
pub struct SessionOverview {
    pub id: Uuid,
    pub title: String,
    pub user_name: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: i64,
}
