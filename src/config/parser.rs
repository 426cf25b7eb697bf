//! Provider configuration loading.
//!
//! Configuration is resolved in three layers: a YAML file, `LINODE_*`
//! environment overrides, and finally the Linode CLI credential file, which
//! only fills values that are still unset.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ProviderError, Result};

use super::spec::{DEFAULT_PROFILE, ProviderConfig};

/// Configuration parser for the provider.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving `.env`.
    base_path: Option<PathBuf>,
}

/// One profile from the credential file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialProfile {
    /// API token.
    pub token: Option<String>,
    /// API URL.
    pub api_url: Option<String>,
    /// API version.
    pub api_version: Option<String>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving `.env`.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ProviderConfig> {
        let path = path.as_ref();
        info!("Loading provider configuration from: {}", path.display());

        if !path.exists() {
            return Err(ProviderError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ProviderConfig> {
        debug!("Parsing YAML provider configuration");

        if content.trim().is_empty() {
            return Ok(ProviderConfig::default());
        }

        serde_yaml::from_str(content).map_err(|e| {
            ProviderError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })
    }

    /// Resolves a configuration from an optional file, the process
    /// environment and the credential file.
    ///
    /// # Errors
    ///
    /// Returns an error if any layer is malformed or no token can be found.
    pub fn resolve(&self, path: Option<&Path>) -> Result<ProviderConfig> {
        let mut config = match path {
            Some(path) => self.load_file(path)?,
            None => ProviderConfig::default(),
        };
        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        Self::apply_credential_file(&mut config)?;
        super::ConfigValidator::new().validate(&config)?;
        Ok(config)
    }

    /// Applies `LINODE_*` overrides using the given variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a boolean or numeric variable cannot be parsed.
    pub fn apply_env_overrides<F>(config: &mut ProviderConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("LINODE_TOKEN") {
            debug!("Overriding token from environment");
            config.token = Some(token);
        }
        if let Some(url) = get("LINODE_URL") {
            debug!("Overriding url from environment");
            config.url = Some(url);
        }
        if let Some(version) = get("LINODE_API_VERSION") {
            config.api_version = Some(version);
        }
        if let Some(prefix) = get("LINODE_UA_PREFIX") {
            config.ua_prefix = prefix;
        }
        if let Some(path) = get("LINODE_CONFIG") {
            config.config_path = Some(PathBuf::from(path));
        }
        if let Some(profile) = get("LINODE_PROFILE") {
            config.config_profile = Some(profile);
        }

        let flags: [(&str, &mut bool); 4] = [
            ("LINODE_SKIP_INSTANCE_READY_POLL", &mut config.skip_instance_ready_poll),
            ("LINODE_SKIP_INSTANCE_DELETE_POLL", &mut config.skip_instance_delete_poll),
            ("LINODE_SKIP_IMPLICIT_REBOOTS", &mut config.skip_implicit_reboots),
            ("LINODE_DISABLE_INTERNAL_CACHE", &mut config.disable_internal_cache),
        ];
        for (key, slot) in flags {
            if let Some(raw) = get(key) {
                *slot = parse_bool(key, &raw)?;
            }
        }

        let numbers: [(&str, &mut u64); 5] = [
            ("LINODE_MIN_RETRY_DELAY_MS", &mut config.min_retry_delay_ms),
            ("LINODE_MAX_RETRY_DELAY_MS", &mut config.max_retry_delay_ms),
            ("LINODE_EVENT_POLL_MS", &mut config.event_poll_ms),
            ("LINODE_LKE_EVENT_POLL_MS", &mut config.lke_event_poll_ms),
            ("LINODE_LKE_NODE_READY_POLL_MS", &mut config.lke_node_ready_poll_ms),
        ];
        for (key, slot) in numbers {
            if let Some(raw) = get(key) {
                *slot = raw.trim().parse().map_err(|_| {
                    ConfigError::validation(format!("'{raw}' is not a number"), key)
                })?;
            }
        }

        Ok(())
    }

    /// Fills token, URL and version from the credential file when unset.
    ///
    /// A missing file is only an error when a non-default profile was
    /// requested explicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the profile is missing,
    /// or no token is available afterwards.
    pub fn apply_credential_file(config: &mut ProviderConfig) -> Result<()> {
        let explicit_profile = config
            .config_profile
            .as_deref()
            .is_some_and(|p| p != DEFAULT_PROFILE);

        if config.token.is_some() && !explicit_profile {
            return Ok(());
        }

        let Some(path) = config.credential_file() else {
            return Err(ConfigError::MissingToken.into());
        };

        if !path.exists() {
            if explicit_profile {
                return Err(ConfigError::FileNotFound { path }.into());
            }
            debug!("No credential file at {}", path.display());
            return if config.token.is_some() {
                Ok(())
            } else {
                Err(ConfigError::MissingToken.into())
            };
        }

        let content = std::fs::read_to_string(&path)?;
        let sections = parse_credential_file(&content);
        let profile_name = resolve_profile_name(&sections, config.config_profile.as_deref());

        let Some(section) = sections.get(&profile_name) else {
            if explicit_profile || config.token.is_none() {
                return Err(ConfigError::ProfileNotFound {
                    profile: profile_name,
                    path,
                }
                .into());
            }
            return Ok(());
        };

        let profile = CredentialProfile {
            token: section.get("token").cloned(),
            api_url: section
                .get("api_url")
                .or_else(|| section.get("url"))
                .cloned(),
            api_version: section.get("api_version").cloned(),
        };
        info!("Using credential profile '{profile_name}' from {}", path.display());

        if config.token.is_none() {
            config.token = profile.token;
        }
        if config.url.is_none() {
            config.url = profile.api_url;
        }
        if config.api_version.is_none() {
            config.api_version = profile.api_version;
        }

        if config.token.is_none() {
            return Err(ConfigError::MissingToken.into());
        }
        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ProviderError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::validation(format!("'{raw}' is not a boolean"), key).into()),
    }
}

/// Parses `[section]` / `key = value` lines. Comments start with `#` or `;`.
fn parse_credential_file(content: &str) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        let (Some(section), Some((key, value))) = (&current, line.split_once('=')) else {
            continue;
        };
        sections
            .entry(section.clone())
            .or_default()
            .insert(key.trim().to_string(), value.trim().to_string());
    }

    sections
}

/// `[default] default-user = name` redirects the default profile.
fn resolve_profile_name(
    sections: &BTreeMap<String, BTreeMap<String, String>>,
    requested: Option<&str>,
) -> String {
    if let Some(name) = requested.filter(|p| *p != DEFAULT_PROFILE) {
        return name.to_string();
    }
    sections
        .get(DEFAULT_PROFILE)
        .and_then(|s| s.get("default-user"))
        .filter(|user| sections.contains_key(user.as_str()))
        .cloned()
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let parser = ConfigParser::new();
        let config = parser.parse_yaml("token: abc\n", None).unwrap();
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert_eq!(config.event_poll_ms, 4000);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
token: abc
url: http://localhost:9000
api_version: v4beta
ua_prefix: ci
skip_instance_ready_poll: true
skip_implicit_reboots: true
disable_internal_cache: true
min_retry_delay_ms: 10
max_retry_delay_ms: 50
event_poll_ms: 25
lke_event_poll_ms: 30
lke_node_ready_poll_ms: 35
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        assert_eq!(config.api_base(), "http://localhost:9000/v4beta");
        assert!(config.skip_instance_ready_poll);
        assert!(config.skip_implicit_reboots);
        assert!(config.disable_internal_cache);
        assert_eq!(config.lke_node_ready_poll_ms, 35);
    }

    #[test]
    fn test_parse_rejects_unknown_shape() {
        let result = ConfigParser::new().parse_yaml("event_poll_ms: fast\n", None);
        assert!(matches!(
            result,
            Err(ProviderError::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LINODE_TOKEN", "from-env"),
            ("LINODE_URL", "http://127.0.0.1:1234"),
            ("LINODE_SKIP_IMPLICIT_REBOOTS", "true"),
            ("LINODE_EVENT_POLL_MS", "150"),
            ("LINODE_UA_PREFIX", ""),
        ]);
        let mut config = ProviderConfig::default();
        ConfigParser::apply_env_overrides(&mut config, |k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.token.as_deref(), Some("from-env"));
        assert_eq!(config.url.as_deref(), Some("http://127.0.0.1:1234"));
        assert!(config.skip_implicit_reboots);
        assert_eq!(config.event_poll_ms, 150);
        assert!(config.ua_prefix.is_empty());
    }

    #[test]
    fn test_env_override_rejects_bad_bool() {
        let mut config = ProviderConfig::default();
        let result = ConfigParser::apply_env_overrides(&mut config, |k| {
            (k == "LINODE_DISABLE_INTERNAL_CACHE").then(|| "maybe".to_string())
        });
        assert!(result.is_err());
    }

    fn credential_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_credential_file_default_user() {
        let file = credential_file(
            "[default]\ndefault-user = alice\n\n[alice]\ntoken = alice-token\napi_version = v4beta\n",
        );
        let mut config = ProviderConfig {
            config_path: Some(file.path().to_path_buf()),
            ..ProviderConfig::default()
        };
        ConfigParser::apply_credential_file(&mut config).unwrap();
        assert_eq!(config.token.as_deref(), Some("alice-token"));
        assert_eq!(config.api_version.as_deref(), Some("v4beta"));
    }

    #[test]
    fn test_credential_file_explicit_profile_overrides_nothing_set() {
        let file = credential_file("; comment\n[work]\ntoken = work-token\napi_url = http://work\n");
        let mut config = ProviderConfig {
            url: Some("http://explicit".to_string()),
            config_path: Some(file.path().to_path_buf()),
            config_profile: Some("work".to_string()),
            ..ProviderConfig::default()
        };
        ConfigParser::apply_credential_file(&mut config).unwrap();
        assert_eq!(config.token.as_deref(), Some("work-token"));
        assert_eq!(config.url.as_deref(), Some("http://explicit"));
    }

    #[test]
    fn test_credential_file_missing_profile() {
        let file = credential_file("[default]\ntoken = t\n");
        let mut config = ProviderConfig {
            config_path: Some(file.path().to_path_buf()),
            config_profile: Some("nope".to_string()),
            ..ProviderConfig::default()
        };
        let result = ConfigParser::apply_credential_file(&mut config);
        assert!(matches!(
            result,
            Err(ProviderError::Config(ConfigError::ProfileNotFound { .. }))
        ));
    }

    #[test]
    fn test_missing_token_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProviderConfig {
            config_path: Some(dir.path().join("absent")),
            ..ProviderConfig::default()
        };
        let result = ConfigParser::apply_credential_file(&mut config);
        assert!(matches!(
            result,
            Err(ProviderError::Config(ConfigError::MissingToken))
        ));
    }

    #[test]
    fn test_token_without_credential_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProviderConfig {
            token: Some("t".to_string()),
            config_path: Some(dir.path().join("absent")),
            ..ProviderConfig::default()
        };
        assert!(ConfigParser::apply_credential_file(&mut config).is_ok());
    }
}
