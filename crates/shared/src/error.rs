use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload of a controller `error` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerError {
    pub message: String,
}

impl ControllerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaseKeyError {
    #[error("case key '{0}' is missing the '-' separator")]
    MissingSeparator(String),
    #[error("case key '{0}' does not hold two integers")]
    InvalidNumber(String),
}
