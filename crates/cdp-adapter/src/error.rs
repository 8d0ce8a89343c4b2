use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// High-level error categories surfaced by a page driver.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverErrorKind {
    #[error("navigation timed out")]
    NavTimeout,
    #[error("cdp i/o failure")]
    CdpIo,
    #[error("target element not found")]
    TargetNotFound,
    #[error("page not found")]
    PageNotFound,
    #[error("operation not supported")]
    Unsupported,
    #[error("internal error")]
    Internal,
}

/// Enriched error metadata passed back to higher layers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub hint: Option<String>,
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for DriverError {}

impl DriverError {
    pub fn new(kind: DriverErrorKind) -> Self {
        Self {
            kind,
            hint: None,
            data: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn not_found(hint: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::TargetNotFound).with_hint(hint)
    }

    pub fn timeout(hint: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::NavTimeout).with_hint(hint)
    }

    pub fn cdp(hint: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::CdpIo).with_hint(hint)
    }

    pub fn internal(hint: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Internal).with_hint(hint)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == DriverErrorKind::TargetNotFound
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == DriverErrorKind::NavTimeout
    }
}

impl From<chromiumoxide::error::CdpError> for DriverError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        DriverError::cdp(err.to_string())
    }
}
