//! Host-facing diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, ProviderError};

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The operation failed.
    Error,
    /// The operation succeeded with a caveat.
    Warning,
}

/// One message returned to the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// One-line summary.
    pub summary: String,
    /// Longer explanation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
    /// Attribute path, e.g. `disk.0.size`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Diagnostic {
    /// Error diagnostic.
    #[must_use]
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            path: None,
        }
    }

    /// Warning diagnostic.
    #[must_use]
    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            path: None,
        }
    }

    /// Attaches an attribute path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Converts a provider error; the summary names the error kind.
    #[must_use]
    pub fn from_error(error: &ProviderError) -> Self {
        let summary = match error.kind() {
            ErrorKind::Validation => "Invalid configuration",
            ErrorKind::NotFound => "Resource not found",
            ErrorKind::Conflict => "Remote state conflict",
            ErrorKind::PollTimeout => "Timed out waiting for the remote",
            ErrorKind::Cancelled => "Operation cancelled",
            ErrorKind::Transient | ErrorKind::RateLimited => "Linode API unavailable",
            ErrorKind::Internal => "Internal provider error",
        };
        Self {
            severity: Severity::Error,
            summary: summary.to_string(),
            detail: error.to_string(),
            path: error.attribute_path(),
        }
    }

    /// True for errors.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{level}: {}", self.summary)?;
        if let Some(path) = &self.path {
            write!(f, " [{path}]")?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// A failed callback together with the state the host must keep.
#[derive(Debug)]
pub struct Failure {
    /// The error.
    pub error: ProviderError,
    /// State that exists remotely, if any.
    pub state: Option<Value>,
}

impl Failure {
    /// Failure without state.
    #[must_use]
    pub const fn new(error: ProviderError) -> Self {
        Self { error, state: None }
    }

    /// Failure carrying partial state.
    #[must_use]
    pub const fn with_state(error: ProviderError, state: Option<Value>) -> Self {
        Self { error, state }
    }
}

impl From<ProviderError> for Failure {
    fn from(error: ProviderError) -> Self {
        Self::new(error)
    }
}
