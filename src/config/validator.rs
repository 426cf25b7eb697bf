//! Provider configuration validation.
//!
//! Field-level bounds come from the `validator` derive on
//! [`ProviderConfig`]; this module adds the checks that need context, such
//! as URL shape, and collects everything into a [`ValidationResult`].

use tracing::{debug, warn};
use validator::Validate;

use crate::error::{ConfigError, ProviderError, Result};

use super::spec::ProviderConfig;

/// Validator for provider configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a provider configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found.
    pub fn validate(&self, config: &ProviderConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        for warning in &result.warnings {
            warn!("{warning}");
        }

        if let Some(first) = result.errors.first() {
            return Err(ProviderError::Config(ConfigError::ValidationError {
                message: first.message.clone(),
                field: Some(first.field.clone()),
            }));
        }

        debug!("Provider configuration validation passed");
        Ok(result)
    }

    /// Collects every problem without failing.
    #[must_use]
    pub fn check(&self, config: &ProviderConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if let Err(errors) = config.validate() {
            for (field, field_errors) in errors.field_errors() {
                for error in field_errors {
                    result.errors.push(ValidationError {
                        field: field.to_string(),
                        message: error
                            .message
                            .as_ref()
                            .map_or_else(|| format!("invalid value ({})", error.code), ToString::to_string),
                    });
                }
            }
            if result.errors.is_empty() {
                result.errors.push(ValidationError {
                    field: String::from("config"),
                    message: errors.to_string(),
                });
            }
        }

        if let Some(url) = config.url.as_deref() {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                result.errors.push(ValidationError {
                    field: String::from("url"),
                    message: format!("'{url}' must start with http:// or https://"),
                });
            } else if url.starts_with("http://") {
                result
                    .warnings
                    .push(format!("API url '{url}' is not using TLS"));
            }
        }

        if let Some(version) = config.api_version.as_deref() {
            if version.trim_matches('/').is_empty() || version.contains(char::is_whitespace) {
                result.errors.push(ValidationError {
                    field: String::from("api_version"),
                    message: format!("'{version}' is not a valid API version"),
                });
            }
        }

        if config.token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            result.errors.push(ValidationError {
                field: String::from("token"),
                message: String::from("token cannot be empty"),
            });
        }

        if config.skip_instance_ready_poll {
            result.warnings.push(String::from(
                "skip_instance_ready_poll is set; instances may not be running when create returns",
            ));
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let validator = ConfigValidator::new();
        let config = ProviderConfig {
            token: Some("abc".to_string()),
            ..ProviderConfig::default()
        };
        assert!(validator.validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_bad_url() {
        let config = ProviderConfig {
            url: Some("ftp://api.linode.com".to_string()),
            ..ProviderConfig::default()
        };
        let result = ConfigValidator::new().check(&config);
        assert!(result.errors.iter().any(|e| e.field == "url"));
    }

    #[test]
    fn test_plain_http_is_a_warning() {
        let config = ProviderConfig {
            url: Some("http://localhost:8080".to_string()),
            ..ProviderConfig::default()
        };
        let result = ConfigValidator::new().check(&config);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_reports_field_bounds() {
        let config = ProviderConfig {
            lke_node_ready_poll_ms: 0,
            ..ProviderConfig::default()
        };
        let result = ConfigValidator::new().check(&config);
        assert!(result.errors.iter().any(|e| e.field == "lke_node_ready_poll_ms"));
    }

    #[test]
    fn test_empty_token_rejected() {
        let config = ProviderConfig {
            token: Some("  ".to_string()),
            ..ProviderConfig::default()
        };
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(err.to_string().contains("token"));
    }
}
