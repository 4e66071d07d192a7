//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, OpenAiChatAdapter},
    config::Config,
    error::ApiError,
    web::{
        admin::{
            admin_stats_handler, create_activity_handler, delete_activity_handler,
            delete_student_handler, list_activities_admin_handler, list_students_handler,
        },
        auth::{login_handler, logout_handler, me_handler, signup_handler},
        chat_handler, list_activities_handler, list_chat_messages_handler,
        list_chat_sessions_handler, require_admin, require_auth,
        rest::ApiDoc,
        state::AppState,
        submit_response_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use edu_platform_core::ports::ChatCompletionService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize the Chat LLM Adapter ---
    // The server comes up without a model credential; the chat endpoint then
    // reports a configuration error until one is provided.
    let chat_llm: Option<Arc<dyn ChatCompletionService>> = match &config.openai_api_key {
        Some(api_key) => {
            let openai_config = OpenAIConfig::new().with_api_key(api_key);
            let openai_client = Client::with_config(openai_config);
            Some(Arc::new(OpenAiChatAdapter::new(
                openai_client,
                config.chat_model.clone(),
            )))
        }
        None => {
            warn!("OPENAI_API_KEY is not set; the chat endpoint is disabled.");
            None
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter,
        chat_llm,
        config: config.clone(),
    });

    // Browser clients authenticate with a bearer token, so the wildcard
    // origin the front end expects is safe here. The layer also answers
    // CORS preflight requests before any business logic runs.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(me_handler))
        .route("/chat", post(chat_handler))
        .route("/chat/sessions", get(list_chat_sessions_handler))
        .route(
            "/chat/sessions/{id}/messages",
            get(list_chat_messages_handler),
        )
        .route("/activities", get(list_activities_handler))
        .route("/activities/{id}/responses", post(submit_response_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Admin routes (auth + admin role required)
    let admin_routes = Router::new()
        .route("/admin/stats", get(admin_stats_handler))
        .route("/admin/students", get(list_students_handler))
        .route("/admin/students/{id}", delete(delete_student_handler))
        .route(
            "/admin/activities",
            get(list_activities_admin_handler).post(create_activity_handler),
        )
        .route("/admin/activities/{id}", delete(delete_activity_handler))
        .layer(axum_middleware::from_fn(require_admin))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
