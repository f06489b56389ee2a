//! Error types for the assistant core and its collaborators
//!
//! Errors are classified by recoverability:
//! - Retryable: a collaborator that did not answer in time
//! - NonRetryable: invalid data, rejected requests, missing records
//! - RequiresUserAction: a configuration the user has to fix
//!
//! None of these are fatal to the conversation. The service turns every error
//! into a conversational reply.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::Source;

/// Error types for the assistant
#[derive(Debug, Error)]
pub enum AssistantError {
    // Retryable errors
    #[error("{0} did not respond in time")]
    Timeout(Source),

    // Non-retryable errors
    #[error("Invalid interval: start {start} is not before end {end}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("{source_name} rejected the request: {message}")]
    Rejected { source_name: Source, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to parse: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),

    // Requires user action
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Invalid business hours: {start}:00-{end}:00")]
    InvalidBusinessHours { start: u8, end: u8 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),
}

impl AssistantError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, AssistantError::Timeout(_))
    }

    /// Returns true if this error requires user action to resolve
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            AssistantError::UnknownTimezone(_)
                | AssistantError::InvalidBusinessHours { .. }
                | AssistantError::Configuration(_)
                | AssistantError::ConfigNotFound(_)
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            AssistantError::Timeout(_) => "The service took too long. Try again.",
            AssistantError::InvalidInterval { .. } => "Pick an end time after the start time.",
            AssistantError::UnknownTimezone(_) => {
                "Use an IANA timezone name such as Europe/London in ~/.execassist/config.json"
            }
            AssistantError::InvalidBusinessHours { .. } => {
                "Check workHoursStart and workHoursEnd in ~/.execassist/config.json"
            }
            AssistantError::Configuration(_) => "Check ~/.execassist/config.json",
            AssistantError::ConfigNotFound(_) => {
                "Create ~/.execassist/config.json or run with defaults."
            }
            AssistantError::Rejected { .. } => "Check the details and try again.",
            AssistantError::NotFound(_) => "It may have been removed already.",
            AssistantError::Parse(_) => "Check the data format is correct.",
            AssistantError::Io(_) => "Check file permissions and disk space.",
        }
    }
}

impl From<std::io::Error> for AssistantError {
    fn from(err: std::io::Error) -> Self {
        AssistantError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AssistantError {
    fn from(err: serde_json::Error) -> Self {
        AssistantError::Parse(err.to_string())
    }
}

/// Serializable error representation for API responses
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Retryable,
    NonRetryable,
    RequiresUserAction,
}

impl From<&AssistantError> for ErrorReply {
    fn from(err: &AssistantError) -> Self {
        let error_type = if err.requires_user_action() {
            ErrorType::RequiresUserAction
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::NonRetryable
        };

        ErrorReply {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
