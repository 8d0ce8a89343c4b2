//! Error types for the race resolver

use action_primitives::ActionError;
use cdp_adapter::DriverError;
use thiserror::Error;

/// Race resolution error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Candidate set is unusable (duplicate or missing selectors)
    #[error("Invalid race configuration: {0}")]
    Configuration(String),

    /// A candidate resolved to a terminal failure
    #[error("{0}")]
    CandidateRejected(String),

    /// No candidate appeared and the retry budget is spent
    #[error("Race timeout: {0}")]
    Timeout(String),

    /// Reload or settle failed between attempts
    #[error("Driver error: {0}")]
    Driver(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LocatorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LocatorError::Timeout(_))
    }
}

impl From<DriverError> for LocatorError {
    fn from(err: DriverError) -> Self {
        if err.is_timeout() {
            LocatorError::Timeout(err.to_string())
        } else {
            LocatorError::Driver(err.to_string())
        }
    }
}

impl From<ActionError> for LocatorError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::WaitTimeout(message) => LocatorError::Timeout(message),
            other => LocatorError::Driver(other.to_string()),
        }
    }
}
