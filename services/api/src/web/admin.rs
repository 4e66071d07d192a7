//! services/api/src/web/admin.rs
//!
//! Admin-only endpoints: the dashboard statistics, student management and
//! activity management. All routes here sit behind the `require_admin`
//! middleware.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, NaiveTime, Utc};
use edu_platform_core::{
    domain::{Activity, ActivityStats, UserRole},
    ports::PortError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{rest::ActivityResponse, state::AppState};

/// The dashboard shows this many recent students and sessions.
const RECENT_LIST_LIMIT: i64 = 5;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct AdminStatsResponse {
    pub total_students: i64,
    pub total_chat_sessions: i64,
    pub total_messages: i64,
    pub active_sessions_today: i64,
    pub recent_students: Vec<RecentStudent>,
    pub recent_chat_sessions: Vec<RecentChatSession>,
}

#[derive(Serialize, ToSchema)]
pub struct RecentStudent {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct RecentChatSession {
    pub id: Uuid,
    pub title: String,
    pub user_name: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: i64,
}

#[derive(Serialize, ToSchema)]
pub struct StudentOverviewResponse {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub chat_count: i64,
    pub message_count: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Serialize, ToSchema)]
pub struct ActivityOverviewResponse {
    #[serde(flatten)]
    pub activity: ActivityResponse,
    pub participant_count: i64,
    pub completion_rate: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateActivityRequest {
    pub title: String,
    pub description: Option<String>,
    /// Free-form activity content (checklists, instructions, ...).
    pub content: Option<serde_json::Value>,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Share of completed responses, rounded to whole percent; 0 when there are
/// no responses at all.
pub fn completion_rate(total_responses: i64, completed_responses: i64) -> i64 {
    if total_responses <= 0 {
        return 0;
    }
    ((completed_responses as f64 / total_responses as f64) * 100.0).round() as i64
}

fn today_midnight_utc() -> DateTime<Utc> {
    Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Joins the activities with their aggregated participation figures.
/// Activities without any responses get zeroed stats.
fn activity_overviews(
    activities: Vec<Activity>,
    stats: HashMap<Uuid, ActivityStats>,
) -> Vec<ActivityOverviewResponse> {
    activities
        .into_iter()
        .map(|activity| {
            let s = stats.get(&activity.id).copied().unwrap_or_default();
            ActivityOverviewResponse {
                activity: ActivityResponse::from(activity),
                participant_count: s.participant_count,
                completion_rate: completion_rate(s.total_responses, s.completed_responses),
            }
        })
        .collect()
}

fn internal(message: &str) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
}

/// A missing user is a 404; anything else from the database is a 500.
fn profile_lookup_error(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(_) => (StatusCode::NOT_FOUND, "No such user".to_string()),
        other => {
            error!("Failed to load user profile: {:?}", other);
            internal("Failed to load user")
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /admin/stats - Dashboard totals and recent lists
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Platform statistics", body = AdminStatsResponse),
        (status = 401, description = "Missing or invalid credential"),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn admin_stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let db = &state.db;
    let result = async {
        let total_students = db.count_students().await?;
        let total_chat_sessions = db.count_chat_sessions().await?;
        let total_messages = db.count_chat_messages().await?;
        let active_sessions_today = db
            .count_sessions_updated_since(today_midnight_utc())
            .await?;
        let recent_students = db.recent_students(RECENT_LIST_LIMIT).await?;
        let recent_sessions = db.recent_sessions_overview(RECENT_LIST_LIMIT).await?;
        Ok::<_, edu_platform_core::ports::PortError>(AdminStatsResponse {
            total_students,
            total_chat_sessions,
            total_messages,
            active_sessions_today,
            recent_students: recent_students
                .into_iter()
                .map(|p| RecentStudent {
                    id: p.user_id,
                    name: p.name,
                    role: p.role.as_str().to_string(),
                    created_at: p.created_at,
                })
                .collect(),
            recent_chat_sessions: recent_sessions
                .into_iter()
                .map(|s| RecentChatSession {
                    id: s.id,
                    title: s.title,
                    user_name: s.user_name,
                    updated_at: s.updated_at,
                    message_count: s.message_count,
                })
                .collect(),
        })
    }
    .await;

    match result {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            error!("Failed to gather admin stats: {:?}", e);
            Err(internal("Failed to load statistics"))
        }
    }
}

/// GET /admin/students - All students with their chat statistics
#[utoipa::path(
    get,
    path = "/admin/students",
    responses(
        (status = 200, description = "Students with usage statistics", body = [StudentOverviewResponse]),
        (status = 401, description = "Missing or invalid credential"),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn list_students_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let students = state.db.list_students_overview().await.map_err(|e| {
        error!("Failed to list students: {:?}", e);
        internal("Failed to load students")
    })?;

    let payload: Vec<StudentOverviewResponse> = students
        .into_iter()
        .map(|s| StudentOverviewResponse {
            id: s.user_id,
            name: s.name,
            role: s.role.as_str().to_string(),
            created_at: s.created_at,
            chat_count: s.session_count,
            message_count: s.message_count,
            last_activity: s.last_activity,
        })
        .collect();
    Ok(Json(payload))
}

/// DELETE /admin/students/{id} - Remove a student and all their data
#[utoipa::path(
    delete,
    path = "/admin/students/{id}",
    params(("id" = Uuid, Path, description = "The student's user id")),
    responses(
        (status = 204, description = "Student deleted"),
        (status = 400, description = "Target is not a student account"),
        (status = 404, description = "No such user"),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn delete_student_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let profile = state
        .db
        .get_user_profile(user_id)
        .await
        .map_err(profile_lookup_error)?;

    // Admin accounts can only be removed out of band.
    if profile.role != UserRole::Student {
        return Err((
            StatusCode::BAD_REQUEST,
            "Only student accounts can be deleted here".to_string(),
        ));
    }

    state.db.delete_user(user_id).await.map_err(|e| {
        error!("Failed to delete student {}: {:?}", user_id, e);
        internal("Failed to delete student")
    })?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/activities - All activities with participation statistics
#[utoipa::path(
    get,
    path = "/admin/activities",
    responses(
        (status = 200, description = "Activities with participation figures", body = [ActivityOverviewResponse]),
        (status = 401, description = "Missing or invalid credential"),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn list_activities_admin_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let activities = state.db.list_activities().await.map_err(|e| {
        error!("Failed to list activities: {:?}", e);
        internal("Failed to load activities")
    })?;

    let stats: HashMap<Uuid, ActivityStats> = state
        .db
        .list_activity_stats()
        .await
        .map_err(|e| {
            error!("Failed to load activity statistics: {:?}", e);
            internal("Failed to load activity statistics")
        })?
        .into_iter()
        .collect();

    Ok(Json(activity_overviews(activities, stats)))
}

/// POST /admin/activities - Create a new activity
#[utoipa::path(
    post,
    path = "/admin/activities",
    request_body = CreateActivityRequest,
    responses(
        (status = 201, description = "Activity created", body = ActivityResponse),
        (status = 401, description = "Missing or invalid credential"),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn create_activity_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateActivityRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let activity = state
        .db
        .create_activity(&req.title, req.description.as_deref(), req.content)
        .await
        .map_err(|e| {
            error!("Failed to create activity: {:?}", e);
            internal("Failed to create activity")
        })?;

    Ok((StatusCode::CREATED, Json(ActivityResponse::from(activity))))
}

/// DELETE /admin/activities/{id} - Delete an activity
#[utoipa::path(
    delete,
    path = "/admin/activities/{id}",
    params(("id" = Uuid, Path, description = "The activity id")),
    responses(
        (status = 204, description = "Activity deleted"),
        (status = 404, description = "No such activity"),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn delete_activity_handler(
    State(state): State<Arc<AppState>>,
    Path(activity_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.db.delete_activity(activity_id).await.map_err(|e| {
        error!("Failed to delete activity {}: {:?}", activity_id, e);
        (StatusCode::NOT_FOUND, "No such activity".to_string())
    })?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_rate_matches_the_dashboard_rounding() {
        assert_eq!(completion_rate(0, 0), 0);
        assert_eq!(completion_rate(4, 4), 100);
        assert_eq!(completion_rate(3, 1), 33);
        assert_eq!(completion_rate(3, 2), 67);
        assert_eq!(completion_rate(8, 1), 13);
    }

    fn activity(id: Uuid, title: &str) -> Activity {
        Activity {
            id,
            title: title.to_string(),
            description: None,
            content: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn activities_without_responses_get_zeroed_stats() {
        let with_responses = Uuid::new_v4();
        let untouched = Uuid::new_v4();
        let mut stats = HashMap::new();
        stats.insert(
            with_responses,
            ActivityStats {
                participant_count: 3,
                total_responses: 4,
                completed_responses: 2,
            },
        );

        let payload = activity_overviews(
            vec![activity(with_responses, "debate"), activity(untouched, "essay")],
            stats,
        );

        assert_eq!(payload.len(), 2);
        assert_eq!(payload[0].participant_count, 3);
        assert_eq!(payload[0].completion_rate, 50);
        assert_eq!(payload[1].participant_count, 0);
        assert_eq!(payload[1].completion_rate, 0);
    }

    #[test]
    fn only_a_missing_user_maps_to_not_found() {
        let (status, _) = profile_lookup_error(PortError::NotFound("gone".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = profile_lookup_error(PortError::Unexpected("pool timed out".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
