//! Error types for action primitives

use cdp_adapter::{DriverError, DriverErrorKind};
use thiserror::Error;

/// Failures raised while executing a built-in step kind
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// A required element did not appear
    #[error("Element not found: {0}")]
    NotFound(String),

    /// A wait (load, DOM settle, new tab) exceeded its budget
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// The step needs an element or page from the previous result and got something else
    #[error("Missing context: {0}")]
    MissingContext(String),

    /// The page handle no longer refers to an open tab
    #[error("Page not found: {0}")]
    PageNotFound(String),

    /// The driver cannot perform the operation on this target
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// Writing an artifact (screenshot) failed
    #[error("I/O error: {0}")]
    Io(String),

    /// CDP communication or protocol error
    #[error("CDP I/O error: {0}")]
    CdpIo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ActionError::NotFound(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ActionError::WaitTimeout(_))
    }
}

impl From<DriverError> for ActionError {
    fn from(err: DriverError) -> Self {
        let message = err.hint.clone().unwrap_or_else(|| err.to_string());
        match err.kind {
            DriverErrorKind::TargetNotFound => ActionError::NotFound(message),
            DriverErrorKind::NavTimeout => ActionError::WaitTimeout(message),
            DriverErrorKind::PageNotFound => ActionError::PageNotFound(message),
            DriverErrorKind::Unsupported => ActionError::Unsupported(message),
            DriverErrorKind::CdpIo => ActionError::CdpIo(message),
            DriverErrorKind::Internal => ActionError::Internal(message),
        }
    }
}

impl From<std::io::Error> for ActionError {
    fn from(err: std::io::Error) -> Self {
        ActionError::Io(err.to_string())
    }
}
