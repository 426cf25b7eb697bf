//! Error types for the Linode provider.
//!
//! This module provides the error hierarchy for every layer of the provider
//! (configuration, the remote API, waiting on asynchronous work, planning,
//! schema handling and filters) together with the classifier that maps each
//! error onto a retry decision and a user-facing category.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// The main error type for the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider configuration errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Linode API errors.
    #[error("Linode API error: {0}")]
    Api(#[from] ApiError),

    /// Errors while waiting on asynchronous remote work.
    #[error("{0}")]
    Wait(#[from] WaitError),

    /// Planning errors.
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Attribute tree and schema errors.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Filter construction errors.
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Provider configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// No API token could be resolved.
    #[error("No API token configured: set `token`, LINODE_TOKEN, or a credential file profile")]
    MissingToken,

    /// The requested credential profile does not exist.
    #[error("Profile '{profile}' not found in {path}")]
    ProfileNotFound {
        /// Requested profile name.
        profile: String,
        /// Credential file that was searched.
        path: PathBuf,
    },

    /// The provider was used before `configure` succeeded.
    #[error("Provider is not configured")]
    NotConfigured,
}

/// Linode API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The requested object does not exist (HTTP 404).
    #[error("[404] Not found: {path}")]
    NotFound {
        /// Request path that returned 404.
        path: String,
    },

    /// Rate limited (HTTP 429).
    #[error("[429] Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Authentication or authorization failed.
    #[error("[{status}] Authentication failed: {message}")]
    AuthenticationFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// The remote rejected the request as invalid.
    #[error("[{status}] {message}")]
    Validation {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
        /// Field named by the API, if any.
        field: Option<String>,
    },

    /// The remote is in a state incompatible with the request.
    #[error("[{status}] Conflict: {message}")]
    Conflict {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Server-side failure (HTTP 5xx).
    #[error("[{status}] Server error: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Transport failure.
    #[error("Network error communicating with Linode: {message}")]
    Network {
        /// Description of the network error.
        message: String,
        /// Whether the request may have reached the API.
        sent: bool,
    },

    /// The response body could not be decoded.
    #[error("Invalid response from Linode API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Errors raised while waiting for asynchronous remote work.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The operation deadline elapsed.
    #[error("Timed out after {elapsed_secs}s waiting for {condition} (last observed: {last_observed})")]
    Timeout {
        /// Description of the awaited condition.
        condition: String,
        /// Last observed state.
        last_observed: String,
        /// Seconds spent in the operation.
        elapsed_secs: u64,
    },

    /// The awaited event finished with status `failed`.
    #[error("Event {event_id} ({action}) on {entity} failed")]
    EventFailed {
        /// Event id.
        event_id: u64,
        /// Event action.
        action: String,
        /// Entity description.
        entity: String,
    },

    /// The polled entity reached a failed terminal status.
    #[error("{entity} entered terminal status '{status}' while waiting for '{target}'")]
    TerminalStatus {
        /// Entity description.
        entity: String,
        /// Observed status.
        status: String,
        /// Awaited status.
        target: String,
    },

    /// A disk settled at a size other than the one requested.
    #[error("disk {disk_id} on instance {instance_id} settled at {actual} MB instead of {expected} MB")]
    DiskSizeMismatch {
        /// Instance id.
        instance_id: u64,
        /// Disk id.
        disk_id: u64,
        /// Requested size in MB.
        expected: u64,
        /// Observed size in MB.
        actual: u64,
    },

    /// The host cancelled the operation.
    #[error("Operation cancelled while {during}")]
    Cancelled {
        /// What the operation was doing when cancelled.
        during: String,
    },
}

/// Planning errors. These abort before any write is issued.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Region cannot change in place.
    #[error("region cannot be changed from '{from}' to '{to}' in place; the instance must be replaced")]
    RegionChange {
        /// Current region.
        from: String,
        /// Requested region.
        to: String,
    },

    /// The target plan cannot hold the current disks.
    #[error(
        "type '{target_type}' allows {allowance_mb} MB of disk but {used_mb} MB are allocated; \
         shrink or remove disks before downsizing"
    )]
    ResizeDoesNotFit {
        /// Requested plan type.
        target_type: String,
        /// Disk allowance of the target plan.
        allowance_mb: u64,
        /// Disk space in use.
        used_mb: u64,
    },

    /// Declared disks exceed the plan's allowance.
    #[error("disks total {total_mb} MB, which exceeds the {allowance_mb} MB allowed by type '{plan_type}'")]
    DisksExceedAllowance {
        /// Plan type.
        plan_type: String,
        /// Disk allowance of the plan.
        allowance_mb: u64,
        /// Total declared disk size.
        total_mb: u64,
    },

    /// Private networking cannot be disabled once enabled.
    #[error("private_ip cannot be disabled once it has been enabled")]
    PrivateIpDisable,

    /// More than one config exists and none is designated for boot.
    #[error("{count} configs are declared and boot_config_label does not select one")]
    AmbiguousBootConfig {
        /// Number of configs.
        count: usize,
    },

    /// `boot_config_label` names a config that does not exist.
    #[error("boot_config_label '{label}' does not match any declared config")]
    UnknownBootConfig {
        /// Requested label.
        label: String,
    },

    /// A device slot references a disk label that does not exist.
    #[error("config '{config}' device {slot} references unknown disk label '{label}'")]
    UnknownDiskLabel {
        /// Config label.
        config: String,
        /// Device slot.
        slot: String,
        /// Referenced disk label.
        label: String,
    },

    /// A disk's filesystem cannot change in place.
    #[error("disk '{label}' filesystem cannot change from {from} to {to}")]
    FilesystemChange {
        /// Disk label.
        label: String,
        /// Current filesystem.
        from: String,
        /// Requested filesystem.
        to: String,
    },

    /// Disk expansion only applies to implicit disks.
    #[error("disk_expansion cannot be enabled when disks are declared explicitly")]
    ExpansionWithExplicitDisks,

    /// A node pool definition is invalid.
    #[error("pool {index}: {message}")]
    InvalidPool {
        /// Position of the pool in the declared list.
        index: usize,
        /// Description of the problem.
        message: String,
    },

    /// A cluster must keep at least one node pool.
    #[error("at least one node pool is required")]
    NoNodePools,

    /// A declared value failed validation.
    #[error("{path}: {message}")]
    Invalid {
        /// Attribute path.
        path: String,
        /// Description of the problem.
        message: String,
    },
}

/// Attribute tree and schema errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// No resource or data source is registered under this name.
    #[error("Unknown {kind} '{name}'")]
    UnknownType {
        /// `resource` or `data source`.
        kind: &'static str,
        /// Requested type name.
        name: String,
    },

    /// The attribute tree does not match the typed model.
    #[error("{path}: expected {expected}: {message}")]
    TypeMismatch {
        /// Attribute path.
        path: String,
        /// Expected shape.
        expected: String,
        /// Decoder message.
        message: String,
    },

    /// A required attribute is missing.
    #[error("{path}: required attribute is missing")]
    Missing {
        /// Attribute path.
        path: String,
    },

    /// A nested block has more entries than allowed.
    #[error("{path}: at most {max} block(s) allowed, found {found}")]
    Cardinality {
        /// Attribute path.
        path: String,
        /// Maximum allowed entries.
        max: usize,
        /// Entries found.
        found: usize,
    },

    /// An attribute value failed a validator.
    #[error("{path}: {message}")]
    Invalid {
        /// Attribute path.
        path: String,
        /// Description of the problem.
        message: String,
    },
}

/// Filter construction errors.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A value could not be coerced to the field's type.
    #[error("filter '{name}': cannot interpret '{value}' as {expected}")]
    Coercion {
        /// Field name.
        name: String,
        /// Offending value.
        value: String,
        /// Expected type.
        expected: &'static str,
    },

    /// The field cannot be filtered on.
    #[error("filter '{name}' is not supported; supported fields: {supported}")]
    UnsupportedField {
        /// Field name.
        name: String,
        /// Comma separated list of supported fields.
        supported: String,
    },

    /// The match mode is not supported.
    #[error("match_by '{mode}' is not supported")]
    UnsupportedMatch {
        /// Requested mode.
        mode: String,
    },

    /// A serialized filter does not have the expected shape.
    #[error("malformed filter: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },
}

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Error categories surfaced to the host and used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 5xx and connection failures.
    Transient,
    /// HTTP 429.
    RateLimited,
    /// HTTP 404.
    NotFound,
    /// Actionable 4xx or invalid user input.
    Validation,
    /// The remote is busy or in an incompatible state.
    Conflict,
    /// A deadline elapsed while waiting.
    PollTimeout,
    /// The host cancelled the operation.
    Cancelled,
    /// Coercion failures, schema mismatches and programming errors.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::RateLimited => "rate limited",
            Self::NotFound => "not found",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::PollTimeout => "poll timeout",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Backoff bounds for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Attempts allowed for transient failures. Rate limiting does not count.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 8,
        }
    }
}

impl RetryPolicy {
    /// Exponential delay for the given zero-based attempt, clamped to the ceiling.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.min_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What the client should do after a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait and try again.
    Retry {
        /// How long to wait.
        delay: Duration,
        /// Whether the attempt counts toward the attempt cap.
        counted: bool,
    },
    /// Surface the error.
    Abort,
}

impl ProviderError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Api(api) => api.kind(),
            Self::Wait(WaitError::Timeout { .. }) => ErrorKind::PollTimeout,
            Self::Wait(WaitError::Cancelled { .. }) => ErrorKind::Cancelled,
            Self::Wait(
                WaitError::EventFailed { .. }
                | WaitError::TerminalStatus { .. }
                | WaitError::DiskSizeMismatch { .. },
            ) => ErrorKind::Conflict,
            Self::Config(_) | Self::Plan(_) => ErrorKind::Validation,
            Self::Schema(SchemaError::TypeMismatch { .. } | SchemaError::UnknownType { .. })
            | Self::Filter(_)
            | Self::Io(_)
            | Self::Internal(_) => ErrorKind::Internal,
            Self::Schema(_) => ErrorKind::Validation,
        }
    }

    /// Returns true if this error is a 404 from the API.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api(ApiError::NotFound { .. }))
    }

    /// Decides whether a failed request should be retried.
    ///
    /// `attempt` is the number of counted retries already made. Requests
    /// that are not `idempotent` are only repeated when rate limited or when
    /// they never reached the API.
    #[must_use]
    pub fn retry_decision(&self, attempt: u32, policy: &RetryPolicy, idempotent: bool) -> RetryDecision {
        let repeatable = idempotent || matches!(self, Self::Api(ApiError::Network { sent: false, .. }));
        match self {
            Self::Api(ApiError::RateLimited { retry_after_secs }) => RetryDecision::Retry {
                delay: Duration::from_secs(*retry_after_secs),
                counted: false,
            },
            _ if repeatable && self.kind() == ErrorKind::Transient && attempt < policy.max_attempts => {
                RetryDecision::Retry {
                    delay: policy.backoff(attempt),
                    counted: true,
                }
            }
            _ => RetryDecision::Abort,
        }
    }

    /// Attribute path associated with this error, when known.
    #[must_use]
    pub fn attribute_path(&self) -> Option<String> {
        match self {
            Self::Schema(
                SchemaError::TypeMismatch { path, .. }
                | SchemaError::Missing { path }
                | SchemaError::Cardinality { path, .. }
                | SchemaError::Invalid { path, .. },
            )
            | Self::Plan(PlanError::Invalid { path, .. }) => Some(path.clone()),
            Self::Plan(PlanError::RegionChange { .. }) => Some("region".to_string()),
            Self::Plan(PlanError::ResizeDoesNotFit { .. }) => Some("type".to_string()),
            Self::Plan(PlanError::PrivateIpDisable) => Some("private_ip".to_string()),
            Self::Plan(
                PlanError::AmbiguousBootConfig { .. } | PlanError::UnknownBootConfig { .. },
            ) => Some("boot_config_label".to_string()),
            Self::Plan(PlanError::ExpansionWithExplicitDisks) => Some("disk_expansion".to_string()),
            Self::Plan(PlanError::DisksExceedAllowance { .. } | PlanError::FilesystemChange { .. }) => {
                Some("disk".to_string())
            }
            Self::Plan(PlanError::InvalidPool { index, .. }) => Some(format!("pool.{index}")),
            Self::Plan(PlanError::NoNodePools) => Some("pool".to_string()),
            Self::Api(ApiError::Validation { field: Some(field), .. }) => Some(field.clone()),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

/// Error envelope returned by the Linode API.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    reason: String,
}

/// Default wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

impl ApiError {
    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::AuthenticationFailed { .. } | Self::Validation { .. } => ErrorKind::Validation,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Server { .. } | Self::Network { .. } => ErrorKind::Transient,
            Self::InvalidResponse { .. } => ErrorKind::Internal,
        }
    }

    /// Creates a network error for a request that may have been delivered.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            sent: true,
        }
    }

    /// Creates a network error for a request that never left the client,
    /// such as a refused connection.
    #[must_use]
    pub fn unsent(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            sent: false,
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Classifies a non-success HTTP response.
    ///
    /// `retry_after` is the raw `Retry-After` header value, if present.
    #[must_use]
    pub fn from_response(status: u16, path: &str, retry_after: Option<&str>, body: &str) -> Self {
        let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
        let field = envelope.errors.iter().find_map(|e| e.field.clone());
        let message = if envelope.errors.is_empty() {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("HTTP {status}")
            } else {
                trimmed.to_string()
            }
        } else {
            envelope
                .errors
                .iter()
                .map(|e| match &e.field {
                    Some(field) => format!("[{field}] {}", e.reason),
                    None => e.reason.clone(),
                })
                .collect::<Vec<_>>()
                .join("; ")
        };

        match status {
            404 => Self::NotFound {
                path: path.to_string(),
            },
            429 => Self::RateLimited {
                retry_after_secs: retry_after
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            401 | 403 => Self::AuthenticationFailed { status, message },
            409 => Self::Conflict { status, message },
            400 if is_busy_message(&message) => Self::Conflict { status, message },
            500..=599 => Self::Server { status, message },
            _ => Self::Validation {
                status,
                message,
                field,
            },
        }
    }
}

/// Linode reports in-flight work on an entity as a 400 with a "busy" reason.
fn is_busy_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("busy") || lower.contains("while it is")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        let err = ApiError::from_response(404, "/linode/instances/1", None, r#"{"errors":[{"reason":"Not found"}]}"#);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(ProviderError::from(err).is_not_found());
    }

    #[test]
    fn test_classify_rate_limited_uses_retry_after() {
        let err = ApiError::from_response(429, "/linode/instances", Some("12"), "");
        assert!(matches!(err, ApiError::RateLimited { retry_after_secs: 12 }));

        let fallback = ApiError::from_response(429, "/linode/instances", Some("soon"), "");
        assert!(matches!(
            fallback,
            ApiError::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS
            }
        ));
    }

    #[test]
    fn test_classify_validation_keeps_field_and_reason() {
        let body = r#"{"errors":[{"field":"label","reason":"Label must be unique"}]}"#;
        let err = ApiError::from_response(400, "/linode/instances", None, body);
        match &err {
            ApiError::Validation { message, field, .. } => {
                assert_eq!(message, "[label] Label must be unique");
                assert_eq!(field.as_deref(), Some("label"));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
        assert_eq!(
            ProviderError::from(err).attribute_path().as_deref(),
            Some("label")
        );
    }

    #[test]
    fn test_classify_busy_as_conflict() {
        let body = r#"{"errors":[{"reason":"Linode busy."}]}"#;
        let err = ApiError::from_response(400, "/linode/instances/1/resize", None, body);
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_classify_server_error_is_transient() {
        let err = ApiError::from_response(503, "/linode/instances", None, "upstream unavailable");
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_backoff_is_exponential_and_clamped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(16));
        assert_eq!(policy.backoff(5), Duration::from_secs(30));
        assert_eq!(policy.backoff(40), Duration::from_secs(30));
    }

    #[test]
    fn test_rate_limit_does_not_consume_attempts() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        let err = ProviderError::from(ApiError::RateLimited { retry_after_secs: 3 });
        assert_eq!(
            err.retry_decision(10, &policy, false),
            RetryDecision::Retry {
                delay: Duration::from_secs(3),
                counted: false
            }
        );
    }

    #[test]
    fn test_transient_retries_stop_at_cap() {
        let policy = RetryPolicy::default();
        let err = ProviderError::from(ApiError::network("connection reset"));
        assert!(matches!(
            err.retry_decision(0, &policy, true),
            RetryDecision::Retry { counted: true, .. }
        ));
        assert_eq!(
            err.retry_decision(policy.max_attempts, &policy, true),
            RetryDecision::Abort
        );
    }

    #[test]
    fn test_creates_are_not_repeated_after_delivery() {
        let policy = RetryPolicy::default();
        let reset = ProviderError::from(ApiError::network("connection reset"));
        assert_eq!(reset.retry_decision(0, &policy, false), RetryDecision::Abort);

        let server = ProviderError::from(ApiError::from_response(502, "/linode/instances", None, ""));
        assert_eq!(server.retry_decision(0, &policy, false), RetryDecision::Abort);

        let refused = ProviderError::from(ApiError::unsent("connection refused"));
        assert!(matches!(
            refused.retry_decision(0, &policy, false),
            RetryDecision::Retry { counted: true, .. }
        ));
    }

    #[test]
    fn test_validation_is_never_retried() {
        let err = ProviderError::from(ApiError::Validation {
            status: 400,
            message: "bad".to_string(),
            field: None,
        });
        assert_eq!(err.retry_decision(0, &RetryPolicy::default(), true), RetryDecision::Abort);
    }

    #[test]
    fn test_wait_errors_map_to_kinds() {
        let timeout = ProviderError::from(WaitError::Timeout {
            condition: "status running".to_string(),
            last_observed: "booting".to_string(),
            elapsed_secs: 1200,
        });
        assert_eq!(timeout.kind(), ErrorKind::PollTimeout);

        let cancelled = ProviderError::from(WaitError::Cancelled {
            during: "polling".to_string(),
        });
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);
    }
}
