//! Flow execution error types

use action_locator::LocatorError;
use action_primitives::ActionError;
use thiserror::Error;

/// Flow execution errors
#[derive(Debug, Error, Clone)]
pub enum FlowError {
    /// Plan or step tree is unusable; raised before anything in the affected group runs
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A required element or page did not show up
    #[error("Not found: {0}")]
    NotFound(String),

    /// A step validator rejected an otherwise successful result
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A wait or race exceeded its budget
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Child steps configured on a step kind that cannot continue
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// Browser communication or artifact I/O failed
    #[error("Driver error: {0}")]
    Driver(String),

    /// Top-level error of a run, naming the deepest failing step
    #[error("Step {path} failed: {reason}")]
    StepFailed {
        path: String,
        #[source]
        reason: Box<FlowError>,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowError {
    pub fn is_configuration(&self) -> bool {
        matches!(self.root_cause(), FlowError::Configuration(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root_cause(), FlowError::Timeout(_))
    }

    /// The error below any `StepFailed` wrapping.
    pub fn root_cause(&self) -> &FlowError {
        match self {
            FlowError::StepFailed { reason, .. } => reason.root_cause(),
            other => other,
        }
    }
}

impl From<ActionError> for FlowError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::NotFound(message)
            | ActionError::MissingContext(message)
            | ActionError::PageNotFound(message) => FlowError::NotFound(message),
            ActionError::WaitTimeout(message) => FlowError::Timeout(message),
            ActionError::Unsupported(message) => FlowError::Unsupported(message),
            ActionError::Io(message) | ActionError::CdpIo(message) => FlowError::Driver(message),
            ActionError::Internal(message) => FlowError::Internal(message),
        }
    }
}

impl From<LocatorError> for FlowError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::Configuration(message) => FlowError::Configuration(message),
            LocatorError::CandidateRejected(message) => FlowError::NotFound(message),
            LocatorError::Timeout(message) => FlowError::Timeout(message),
            LocatorError::Driver(message) => FlowError::Driver(message),
            LocatorError::Internal(message) => FlowError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_skips_step_wrapping() {
        let err = FlowError::StepFailed {
            path: "find".into(),
            reason: Box::new(FlowError::Configuration("selector must be unique: #a".into())),
        };
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "Step find failed: Configuration error: selector must be unique: #a"
        );
    }

    #[test]
    fn lower_layer_errors_keep_their_category() {
        let err: FlowError = ActionError::WaitTimeout("load".into()).into();
        assert!(err.is_timeout());
        let err: FlowError = LocatorError::CandidateRejected("failed to find element: #x".into()).into();
        assert!(matches!(err, FlowError::NotFound(_)));
    }
}
