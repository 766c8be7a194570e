//! Voxpage - voice-driven page building over a realtime speech session
//!
//! The crate exposes a fixed set of page manipulation tools to a remote
//! realtime model, dispatches the model's function calls against an
//! in-memory element registry, and keeps the transport session alive
//! through failures.

pub mod assistant;
pub mod config;
pub mod dispatch;
pub mod images;
pub mod registry;
pub mod supervisor;
pub mod tools;
pub mod transport;

use thiserror::Error;

pub use assistant::{Assistant, AssistantBuilder, AssistantCommand, AssistantEvent, AssistantHandle};
pub use config::AssistantConfig;
pub use registry::{Element, ElementKind, ElementRegistry, SharedRegistry};
pub use tools::{ToolOutput, ToolSet};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoxError {
    #[error("{}", not_found_message(.0))]
    NotFound(Vec<String>),

    #[error("Element with ID {0} already exists")]
    DuplicateId(String),

    #[error("Invalid position '{0}'. Use \"before\", \"after\", \"prepend\", or \"append\"")]
    InvalidPosition(String),

    #[error("Unsupported element type: {0}")]
    UnsupportedElementType(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Circuit breaker is open. Too many connection failures (retry in {retry_in_ms}ms)")]
    CircuitOpen { retry_in_ms: u64 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

fn not_found_message(ids: &[String]) -> String {
    match ids {
        [single] => format!("Element with ID {} not found", single),
        many => format!("Elements not found: {}", many.join(", ")),
    }
}

impl VoxError {
    /// Shorthand for a single missing id
    pub fn not_found(id: impl Into<String>) -> Self {
        VoxError::NotFound(vec![id.into()])
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Bad requests from the model; the session keeps going
            VoxError::NotFound(_)
            | VoxError::DuplicateId(_)
            | VoxError::InvalidPosition(_)
            | VoxError::UnsupportedElementType(_)
            | VoxError::Validation(_) => true,
            // Typically transient
            VoxError::ExternalService(_) => true,
            VoxError::Transport(_) => true,
            VoxError::CircuitOpen { .. } => true,
            VoxError::Serialization(_) => true,
            // Require a restart or user intervention
            VoxError::Configuration(_) => false,
            VoxError::Channel(_) => false,
            VoxError::Io(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            VoxError::NotFound(_) | VoxError::DuplicateId(_) | VoxError::InvalidPosition(_) => {
                "The assistant referred to an element that does not fit the page.".to_string()
            }
            VoxError::UnsupportedElementType(_) | VoxError::Validation(_) => {
                "The assistant sent an invalid request.".to_string()
            }
            VoxError::ExternalService(_) => {
                "An external service failed. Please try again.".to_string()
            }
            VoxError::Transport(_) => {
                "Connection to the voice service failed. Use retry to reconnect.".to_string()
            }
            VoxError::CircuitOpen { .. } => {
                "Too many connection failures. Waiting before reconnecting.".to_string()
            }
            VoxError::Configuration(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            VoxError::Channel(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            VoxError::Serialization(_) => "Received a malformed message.".to_string(),
            VoxError::Io(_) => "File system error occurred.".to_string(),
        }
    }
}

impl From<std::io::Error> for VoxError {
    fn from(e: std::io::Error) -> Self {
        VoxError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for VoxError {
    fn from(e: serde_json::Error) -> Self {
        VoxError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for VoxError {
    fn from(e: reqwest::Error) -> Self {
        VoxError::ExternalService(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VoxError>;
