//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edu_platform_core::domain::{
    Activity, ActivityStats, ChatMessage, ChatSession, MessageRole, ResponseType,
    SessionOverview, StudentOverview, StudentResponse, UserCredentials, UserProfile, UserRole,
};
use edu_platform_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn parse_role(role: &str) -> PortResult<UserRole> {
    UserRole::parse(role)
        .ok_or_else(|| PortError::Unexpected(format!("Unknown user role in database: {}", role)))
}

fn parse_message_role(role: &str) -> PortResult<MessageRole> {
    MessageRole::parse(role)
        .ok_or_else(|| PortError::Unexpected(format!("Unknown message role in database: {}", role)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProfileRecord {
    user_id: Uuid,
    email: String,
    name: String,
    role: String,
    created_at: DateTime<Utc>,
}
impl ProfileRecord {
    fn to_domain(self) -> PortResult<UserProfile> {
        Ok(UserProfile {
            user_id: self.user_id,
            email: self.email,
            name: self.name,
            role: parse_role(&self.role)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
    name: String,
    role: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> PortResult<UserCredentials> {
        Ok(UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
            name: self.name,
            role: parse_role(&self.role)?,
        })
    }
}

#[derive(FromRow)]
struct ChatSessionRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ChatSessionRecord {
    fn to_domain(self) -> ChatSession {
        ChatSession {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ChatMessageRecord {
    id: Uuid,
    session_id: Uuid,
    user_id: Uuid,
    role: String,
    content: String,
    created_at: DateTime<Utc>,
}
impl ChatMessageRecord {
    fn to_domain(self) -> PortResult<ChatMessage> {
        Ok(ChatMessage {
            id: self.id,
            session_id: self.session_id,
            user_id: self.user_id,
            role: parse_message_role(&self.role)?,
            content: self.content,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ActivityRecord {
    id: Uuid,
    title: String,
    description: Option<String>,
    content: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}
impl ActivityRecord {
    fn to_domain(self) -> Activity {
        Activity {
            id: self.id,
            title: self.title,
            description: self.description,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct StudentResponseRecord {
    id: Uuid,
    user_id: Uuid,
    activity_id: Uuid,
    response_type: String,
    content: String,
    status: String,
    created_at: DateTime<Utc>,
}
impl StudentResponseRecord {
    fn to_domain(self) -> PortResult<StudentResponse> {
        let response_type = ResponseType::parse(&self.response_type).ok_or_else(|| {
            PortError::Unexpected(format!(
                "Unknown response type in database: {}",
                self.response_type
            ))
        })?;
        Ok(StudentResponse {
            id: self.id,
            user_id: self.user_id,
            activity_id: self.activity_id,
            response_type,
            content: self.content,
            status: self.status,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ActivityStatsRecord {
    activity_id: Uuid,
    participant_count: i64,
    total_responses: i64,
    completed_responses: i64,
}

#[derive(FromRow)]
struct StudentOverviewRecord {
    user_id: Uuid,
    name: String,
    role: String,
    created_at: DateTime<Utc>,
    session_count: i64,
    message_count: i64,
    last_activity: Option<DateTime<Utc>>,
}
impl StudentOverviewRecord {
    fn to_domain(self) -> PortResult<StudentOverview> {
        Ok(StudentOverview {
            user_id: self.user_id,
            name: self.name,
            role: parse_role(&self.role)?,
            created_at: self.created_at,
            session_count: self.session_count,
            message_count: self.message_count,
            last_activity: self.last_activity,
        })
    }
}

#[derive(FromRow)]
struct SessionOverviewRecord {
    id: Uuid,
    title: String,
    user_name: String,
    updated_at: DateTime<Utc>,
    message_count: i64,
}
impl SessionOverviewRecord {
    fn to_domain(self) -> SessionOverview {
        SessionOverview {
            id: self.id,
            title: self.title,
            user_name: self.user_name,
            updated_at: self.updated_at,
            message_count: self.message_count,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(
        &self,
        email: &str,
        hashed_password: &str,
        name: &str,
        role: UserRole,
    ) -> PortResult<UserProfile> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "INSERT INTO user_profiles (user_id, email, hashed_password, name, role) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING user_id, email, name, role, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .bind(name)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password, name, role \
             FROM user_profiles WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn get_user_profile(&self, user_id: Uuid) -> PortResult<UserProfile> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT user_id, email, name, role, created_at \
             FROM user_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<(Uuid, UserRole)> {
        let record = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT s.user_id, p.role FROM auth_sessions s \
             JOIN user_profiles p ON p.user_id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::Unauthorized,
            _ => unexpected(e),
        })?;
        Ok((record.0, parse_role(&record.1)?))
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_chat_session(&self, user_id: Uuid, title: &str) -> PortResult<ChatSession> {
        let record = sqlx::query_as::<_, ChatSessionRecord>(
            "INSERT INTO chat_sessions (id, user_id, title) VALUES ($1, $2, $3) \
             RETURNING id, user_id, title, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_chat_session(&self, session_id: Uuid) -> PortResult<ChatSession> {
        let record = sqlx::query_as::<_, ChatSessionRecord>(
            "SELECT id, user_id, title, created_at, updated_at \
             FROM chat_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Chat session {} not found", session_id))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn list_chat_sessions(&self, user_id: Uuid, limit: i64) -> PortResult<Vec<ChatSession>> {
        let records = sqlx::query_as::<_, ChatSessionRecord>(
            "SELECT id, user_id, title, created_at, updated_at FROM chat_sessions \
             WHERE user_id = $1 ORDER BY updated_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn touch_chat_session(&self, session_id: Uuid) -> PortResult<()> {
        sqlx::query("UPDATE chat_sessions SET updated_at = NOW() WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn insert_chat_message(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> PortResult<ChatMessage> {
        let record = sqlx::query_as::<_, ChatMessageRecord>(
            "INSERT INTO chat_messages (id, session_id, user_id, role, content) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, session_id, user_id, role, content, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn list_chat_messages(&self, session_id: Uuid) -> PortResult<Vec<ChatMessage>> {
        let records = sqlx::query_as::<_, ChatMessageRecord>(
            "SELECT id, session_id, user_id, role, content, created_at FROM chat_messages \
             WHERE session_id = $1 ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn recent_chat_messages(
        &self,
        session_id: Uuid,
        limit: i64,
    ) -> PortResult<Vec<ChatMessage>> {
        // Newest `limit` rows, then flipped back to chronological order.
        let records = sqlx::query_as::<_, ChatMessageRecord>(
            "SELECT id, session_id, user_id, role, content, created_at FROM ( \
                 SELECT id, session_id, user_id, role, content, created_at \
                 FROM chat_messages WHERE session_id = $1 \
                 ORDER BY created_at DESC LIMIT $2 \
             ) AS recent ORDER BY created_at ASC",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn create_activity(
        &self,
        title: &str,
        description: Option<&str>,
        content: Option<serde_json::Value>,
    ) -> PortResult<Activity> {
        let record = sqlx::query_as::<_, ActivityRecord>(
            "INSERT INTO activities (id, title, description, content) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, title, description, content, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(description)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_activities(&self) -> PortResult<Vec<Activity>> {
        let records = sqlx::query_as::<_, ActivityRecord>(
            "SELECT id, title, description, content, created_at FROM activities \
             ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_activity(&self, activity_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM activities WHERE id = $1")
            .bind(activity_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Activity {} not found",
                activity_id
            )));
        }
        Ok(())
    }

    async fn list_activity_stats(&self) -> PortResult<Vec<(Uuid, ActivityStats)>> {
        let records = sqlx::query_as::<_, ActivityStatsRecord>(
            "SELECT activity_id, \
                    COUNT(DISTINCT user_id) AS participant_count, \
                    COUNT(*) AS total_responses, \
                    COUNT(*) FILTER (WHERE status = 'completed') AS completed_responses \
             FROM student_responses GROUP BY activity_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| {
                (
                    r.activity_id,
                    ActivityStats {
                        participant_count: r.participant_count,
                        total_responses: r.total_responses,
                        completed_responses: r.completed_responses,
                    },
                )
            })
            .collect())
    }

    async fn upsert_student_response(
        &self,
        user_id: Uuid,
        activity_id: Uuid,
        response_type: ResponseType,
        content: &str,
        status: &str,
    ) -> PortResult<StudentResponse> {
        let record = sqlx::query_as::<_, StudentResponseRecord>(
            "INSERT INTO student_responses (id, user_id, activity_id, response_type, content, status) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, activity_id, response_type) \
             DO UPDATE SET content = EXCLUDED.content, status = EXCLUDED.status \
             RETURNING id, user_id, activity_id, response_type, content, status, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(activity_id)
        .bind(response_type.as_str())
        .bind(content)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn count_students(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_profiles WHERE role = 'student'")
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn count_chat_sessions(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_sessions")
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn count_chat_messages(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_messages")
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn count_sessions_updated_since(&self, since: DateTime<Utc>) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_sessions WHERE updated_at >= $1")
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn recent_students(&self, limit: i64) -> PortResult<Vec<UserProfile>> {
        let records = sqlx::query_as::<_, ProfileRecord>(
            "SELECT user_id, email, name, role, created_at FROM user_profiles \
             WHERE role = 'student' ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn recent_sessions_overview(&self, limit: i64) -> PortResult<Vec<SessionOverview>> {
        let records = sqlx::query_as::<_, SessionOverviewRecord>(
            "SELECT s.id, s.title, p.name AS user_name, s.updated_at, \
                    COUNT(m.id) AS message_count \
             FROM chat_sessions s \
             JOIN user_profiles p ON p.user_id = s.user_id \
             LEFT JOIN chat_messages m ON m.session_id = s.id \
             GROUP BY s.id, s.title, p.name, s.updated_at \
             ORDER BY s.updated_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_students_overview(&self) -> PortResult<Vec<StudentOverview>> {
        let records = sqlx::query_as::<_, StudentOverviewRecord>(
            "SELECT p.user_id, p.name, p.role, p.created_at, \
                    COUNT(DISTINCT s.id) AS session_count, \
                    COUNT(DISTINCT m.id) AS message_count, \
                    MAX(s.updated_at) AS last_activity \
             FROM user_profiles p \
             LEFT JOIN chat_sessions s ON s.user_id = p.user_id \
             LEFT JOIN chat_messages m ON m.user_id = p.user_id \
             WHERE p.role = 'student' \
             GROUP BY p.user_id, p.name, p.role, p.created_at \
             ORDER BY p.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        // Sessions, messages and responses cascade via foreign keys.
        let result = sqlx::query("DELETE FROM user_profiles WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }
}
