use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{ConduitError, Result};

/// Main configuration structure for Conduit
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Inbound HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream inference API location and key
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Credential exchange settings for the auth endpoint
    #[serde(default)]
    pub auth: AuthConfig,
    /// Payload defaults applied by the relay entry points
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Config {
    /// Parse a config file from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConduitError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| ConduitError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load the config from an explicit path, or from the first default
    /// location that exists, or fall back to defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        for path in default_config_paths() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(&path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Resolve the process-wide upstream credentials.
    ///
    /// The API key comes from the environment variable named by
    /// `upstream.api_key_env`, falling back to an inline `upstream.api_key`.
    pub fn credentials(&self) -> Result<Credentials> {
        let from_env = std::env::var(&self.upstream.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());

        let api_key = from_env
            .or_else(|| self.upstream.api_key.clone().filter(|k| !k.is_empty()))
            .ok_or_else(|| {
                ConduitError::Config(format!(
                    "API key not set: export {} or set upstream.api_key",
                    self.upstream.api_key_env
                ))
            })?;

        Credentials::new(api_key, &self.upstream.base_url)
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::home_dir().map(|h| h.join(".conduit").join("config.toml")),
        dirs::config_dir().map(|c| c.join("conduit").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// API key and base URL shared by the token manager and the relay.
///
/// Immutable once built; handed around as `Arc<Credentials>`.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    base_url: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ConduitError::Config("API key must be provided".to_string()));
        }

        let parsed = Url::parse(base_url)
            .map_err(|e| ConduitError::Config(format!("Invalid base URL '{base_url}': {e}")))?;
        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(ConduitError::Config(format!(
                "Unsupported URL scheme '{scheme}': only http and https are allowed"
            )));
        }

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an upstream API path such as `/api/v1/stream`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// The first five characters of the key, for log lines
    pub fn masked_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(5).collect();
        format!("{prefix}***")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.masked_key())
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Inbound HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:9000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:9000".to_string()
}

/// Upstream API configuration
#[derive(Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the inference API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable name for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Inline API key, used only when the environment variable is unset
    #[serde(default)]
    pub api_key: Option<String>,
    /// Connect timeout for streaming calls; reads are never timed out
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            api_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_api_key_env() -> String {
    "CONDUIT_API_KEY".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

/// Fixed credential triple the upstream auth endpoint expects, plus the
/// bound on how long a single exchange may take.
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_username")]
    pub username: String,
    #[serde(default = "default_auth_password")]
    pub password: String,
    #[serde(default = "default_auth_scope")]
    pub scope: String,
    /// Timeout for the whole token exchange, in seconds
    #[serde(default = "default_auth_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: default_auth_username(),
            password: default_auth_password(),
            scope: default_auth_scope(),
            timeout_secs: default_auth_timeout_secs(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("scope", &self.scope)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_auth_username() -> String {
    "regular_user".to_string()
}

fn default_auth_password() -> String {
    "userPassword123".to_string()
}

fn default_auth_scope() -> String {
    "user".to_string()
}

fn default_auth_timeout_secs() -> u64 {
    30
}

/// Defaults applied when assembling upstream payloads
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Model code used when a request does not name one
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
        }
    }
}

fn default_model() -> String {
    "3a-buildit-first-conv-text".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.upstream.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.upstream.api_key_env, "CONDUIT_API_KEY");
        assert!(config.upstream.api_key.is_none());
        assert_eq!(config.upstream.connect_timeout_secs, 30);
        assert_eq!(config.auth.username, "regular_user");
        assert_eq!(config.auth.scope, "user");
        assert_eq!(config.auth.timeout_secs, 30);
        assert_eq!(config.relay.default_model, "3a-buildit-first-conv-text");
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[server]
listen_addr = "0.0.0.0:8080"

[upstream]
base_url = "https://api.example.com/"
api_key_env = "MY_KEY"
api_key = "inline-key"
connect_timeout_secs = 5

[auth]
username = "svc"
password = "hunter2"
scope = "admin"
timeout_secs = 10

[relay]
default_model = "tiny"
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.upstream.base_url, "https://api.example.com/");
        assert_eq!(config.upstream.api_key_env, "MY_KEY");
        assert_eq!(config.upstream.api_key.as_deref(), Some("inline-key"));
        assert_eq!(config.upstream.connect_timeout_secs, 5);
        assert_eq!(config.auth.username, "svc");
        assert_eq!(config.auth.password, "hunter2");
        assert_eq!(config.auth.scope, "admin");
        assert_eq!(config.auth.timeout_secs, 10);
        assert_eq!(config.relay.default_model, "tiny");
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let toml_str = r#"
[upstream]
base_url = "https://api.example.com"
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse partial TOML");

        assert_eq!(config.server.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.upstream.base_url, "https://api.example.com");
        assert_eq!(config.auth.timeout_secs, 30);
    }

    #[test]
    fn test_credentials_from_inline_key() {
        let mut config = Config::default();
        config.upstream.api_key_env = "CONDUIT_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        config.upstream.api_key = Some("dvt_abcdef".to_string());
        config.upstream.base_url = "https://api.example.com/".to_string();

        let creds = config.credentials().unwrap();
        assert_eq!(creds.api_key(), "dvt_abcdef");
        assert_eq!(creds.base_url(), "https://api.example.com");
        assert_eq!(
            creds.endpoint("/api/v1/stream"),
            "https://api.example.com/api/v1/stream"
        );
    }

    #[test]
    fn test_credentials_missing_key() {
        let mut config = Config::default();
        config.upstream.api_key_env = "CONDUIT_TEST_KEY_THAT_IS_NEVER_SET".to_string();

        let err = config.credentials().unwrap_err();
        assert!(matches!(err, ConduitError::Config(_)));
        assert!(err.to_string().contains("CONDUIT_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_credentials_reject_bad_url() {
        assert!(Credentials::new("key", "not a url").is_err());
        assert!(Credentials::new("key", "ftp://example.com").is_err());
        assert!(Credentials::new("", "https://example.com").is_err());
    }

    #[test]
    fn test_credentials_debug_masks_key() {
        let creds = Credentials::new("dvt_228496802c7f", "https://api.example.com").unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("dvt_2***"));
        assert!(!debug.contains("228496802c7f"));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nlisten_addr = \"127.0.0.1:1234\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:1234");
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
