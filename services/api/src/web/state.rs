//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use edu_platform_core::ports::{ChatCompletionService, DatabaseService};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
///
/// The clients are stateless, so no teardown is needed; every handler shares
/// these instances for the lifetime of the process.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    /// `None` when no model credential is configured. The chat endpoint checks
    /// this before performing any work and reports a configuration error.
    pub chat_llm: Option<Arc<dyn ChatCompletionService>>,
    pub config: Arc<Config>,
}
