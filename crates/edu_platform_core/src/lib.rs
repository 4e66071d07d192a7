pub mod domain;
pub mod ports;

pub use domain::{
    Activity, ActivityStats, ChatCompletion, ChatMessage, ChatSession, MessageRole,
    PromptMessage, ResponseType, SessionOverview, StudentOverview, StudentResponse, TokenUsage,
    UserCredentials, UserProfile, UserRole,
};
pub use ports::{ChatCompletionService, DatabaseService, PortError, PortResult};
