pub mod admin;
pub mod auth;
pub mod chat;
pub mod middleware;
pub mod rest;
pub mod state;

// Re-export the handlers the binary needs to build the web server router.
pub use chat::chat_handler;
pub use middleware::{require_admin, require_auth};
pub use rest::{
    list_activities_handler, list_chat_messages_handler, list_chat_sessions_handler,
    submit_response_handler,
};
