//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the student-facing REST endpoints and the
//! master definition for the OpenAPI specification.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use edu_platform_core::domain::{Activity, ChatMessage, ChatSession, ResponseType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::web::{
    admin::{
        ActivityOverviewResponse, AdminStatsResponse, CreateActivityRequest, RecentChatSession,
        RecentStudent, StudentOverviewResponse,
    },
    auth::{AuthResponse, LoginRequest, ProfileResponse, SignupRequest},
    chat::{ChatRequest, ChatResponse, UsagePayload},
    middleware::AuthedUser,
    state::AppState,
};

/// The chat UI shows the caller's most recent sessions only.
const SESSION_LIST_LIMIT: i64 = 10;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        crate::web::auth::me_handler,
        crate::web::chat::chat_handler,
        list_chat_sessions_handler,
        list_chat_messages_handler,
        list_activities_handler,
        submit_response_handler,
        crate::web::admin::admin_stats_handler,
        crate::web::admin::list_students_handler,
        crate::web::admin::delete_student_handler,
        crate::web::admin::list_activities_admin_handler,
        crate::web::admin::create_activity_handler,
        crate::web::admin::delete_activity_handler,
    ),
    components(
        schemas(
            SignupRequest,
            LoginRequest,
            AuthResponse,
            ProfileResponse,
            ChatRequest,
            ChatResponse,
            UsagePayload,
            ChatSessionResponse,
            ChatMessageResponse,
            ActivityResponse,
            SubmitResponseRequest,
            StudentResponseResponse,
            AdminStatsResponse,
            RecentStudent,
            RecentChatSession,
            StudentOverviewResponse,
            ActivityOverviewResponse,
            CreateActivityRequest,
        )
    ),
    tags(
        (name = "AI Education Platform API", description = "Tutoring chat, activities and admin endpoints.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ChatSessionResponse {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ChatSession> for ChatSessionResponse {
    fn from(session: ChatSession) -> Self {
        Self {
            id: session.id,
            title: session.title,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ChatMessageResponse {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for ChatMessageResponse {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.id,
            role: message.role.as_str().to_string(),
            content: message.content,
            created_at: message.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ActivityResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<Activity> for ActivityResponse {
    fn from(activity: Activity) -> Self {
        Self {
            id: activity.id,
            title: activity.title,
            description: activity.description,
            content: activity.content,
            created_at: activity.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitResponseRequest {
    /// "argumentation" or "evaluation".
    pub response_type: String,
    pub content: String,
    /// Defaults to "submitted". Use "completed" to mark the activity done.
    pub status: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct StudentResponseResponse {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub response_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the caller's most recent chat sessions, newest-updated first.
#[utoipa::path(
    get,
    path = "/chat/sessions",
    responses(
        (status = 200, description = "Sessions for the authenticated user", body = [ChatSessionResponse]),
        (status = 401, description = "Missing or invalid credential")
    )
)]
pub async fn list_chat_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthedUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let sessions = state
        .db
        .list_chat_sessions(user.user_id, SESSION_LIST_LIMIT)
        .await
        .map_err(|e| {
            error!("Failed to list chat sessions: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load chat sessions".to_string(),
            )
        })?;

    let payload: Vec<ChatSessionResponse> =
        sessions.into_iter().map(ChatSessionResponse::from).collect();
    Ok(Json(payload))
}

/// List every message of one of the caller's sessions, oldest first.
#[utoipa::path(
    get,
    path = "/chat/sessions/{id}/messages",
    params(("id" = Uuid, Path, description = "The chat session id")),
    responses(
        (status = 200, description = "Messages in chronological order", body = [ChatMessageResponse]),
        (status = 401, description = "Missing or invalid credential"),
        (status = 403, description = "Session belongs to another user")
    )
)]
pub async fn list_chat_messages_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthedUser>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // Sessions are private; reject reads of sessions the caller does not own.
    let session = state.db.get_chat_session(session_id).await.map_err(|e| {
        error!("Failed to load chat session {}: {:?}", session_id, e);
        (
            StatusCode::FORBIDDEN,
            "Chat session not found for this account".to_string(),
        )
    })?;
    if session.user_id != user.user_id {
        return Err((
            StatusCode::FORBIDDEN,
            "Chat session not found for this account".to_string(),
        ));
    }

    let messages = state.db.list_chat_messages(session_id).await.map_err(|e| {
        error!("Failed to list chat messages: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load messages".to_string(),
        )
    })?;

    let payload: Vec<ChatMessageResponse> =
        messages.into_iter().map(ChatMessageResponse::from).collect();
    Ok(Json(payload))
}

/// List all learning activities, newest first.
#[utoipa::path(
    get,
    path = "/activities",
    responses(
        (status = 200, description = "All activities", body = [ActivityResponse]),
        (status = 401, description = "Missing or invalid credential")
    )
)]
pub async fn list_activities_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let activities = state.db.list_activities().await.map_err(|e| {
        error!("Failed to list activities: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load activities".to_string(),
        )
    })?;

    let payload: Vec<ActivityResponse> =
        activities.into_iter().map(ActivityResponse::from).collect();
    Ok(Json(payload))
}

/// Submit (or replace) the caller's response to an activity.
#[utoipa::path(
    post,
    path = "/activities/{id}/responses",
    params(("id" = Uuid, Path, description = "The activity id")),
    request_body = SubmitResponseRequest,
    responses(
        (status = 201, description = "Response recorded", body = StudentResponseResponse),
        (status = 400, description = "Invalid response type"),
        (status = 401, description = "Missing or invalid credential")
    )
)]
pub async fn submit_response_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthedUser>,
    Path(activity_id): Path<Uuid>,
    Json(req): Json<SubmitResponseRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let response_type = ResponseType::parse(&req.response_type).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("'{}' is not a valid response type", req.response_type),
        )
    })?;
    let status = req.status.unwrap_or_else(|| "submitted".to_string());

    let response = state
        .db
        .upsert_student_response(user.user_id, activity_id, response_type, &req.content, &status)
        .await
        .map_err(|e| {
            error!("Failed to save student response: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to save response".to_string(),
            )
        })?;

    let payload = StudentResponseResponse {
        id: response.id,
        activity_id: response.activity_id,
        response_type: response.response_type.as_str().to_string(),
        status: response.status,
        created_at: response.created_at,
    };
    Ok((StatusCode::CREATED, Json(payload)))
}
