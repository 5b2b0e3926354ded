//! Status - Success/failure values returned across the handler boundary
//!
//! `PlatformError` is the typed error produced by the dispatcher; `Status`
//! is the flattened success flag plus message that debugger callers consume.

use std::fmt;

use thiserror::Error;

use super::structured::ConversionError;

/// Dispatcher errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("Handler class name is empty")]
    EmptyClassName,

    #[error("Failed to create scripted object '{class_name}': {reason}")]
    Construction { class_name: String, reason: String },

    #[error("No scripted object bound (calling '{method}')")]
    NoHandler { method: &'static str },

    #[error("Scripted object does not implement '{method}'")]
    MissingMethod { method: &'static str },

    #[error("'{method}' raised: {message}")]
    Raised { method: &'static str, message: String },

    #[error("Could not convert result of '{method}': {source}")]
    Conversion {
        method: &'static str,
        source: ConversionError,
    },

    #[error("{caller} ERROR = Null or invalid object ({message}).")]
    InvalidObject { caller: String, message: String },

    #[error("Malformed process info for '{key}': {reason}")]
    MalformedProcessInfo { key: String, reason: String },
}

/// Result of an operation that produces no value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    error: Option<String>,
}

impl Status {
    pub fn success() -> Self {
        Self { error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error: Some(if message.is_empty() {
                "unknown error".to_string()
            } else {
                message
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Failure message, `None` on success
    pub fn message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn into_result(self) -> Result<(), String> {
        match self.error {
            None => Ok(()),
            Some(message) => Err(message),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "success"),
            Some(message) => write!(f, "error: {}", message),
        }
    }
}

impl From<PlatformError> for Status {
    fn from(err: PlatformError) -> Self {
        Status::error(err.to_string())
    }
}

impl<E: Into<Status>> From<Result<Status, E>> for Status {
    fn from(result: Result<Status, E>) -> Self {
        match result {
            Ok(status) => status,
            Err(err) => err.into(),
        }
    }
}
