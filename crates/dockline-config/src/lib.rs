#![deny(unsafe_code)]

//! Connection configuration loading and validation for Dockline.
//!
//! Loads TOML configuration files, overlays the standard Docker environment
//! variables (`DOCKER_HOST`, `DOCKER_API_VERSION`), and resolves the daemon
//! address into a [`DockerHost`]. [`AppConfig`] is the central configuration
//! structure shared by the library and the CLI.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default daemon address on Unix hosts.
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Port used for `tcp://` hosts that omit one.
pub const DEFAULT_TCP_PORT: u16 = 2375;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon connection settings.
    #[serde(default)]
    pub docker: DockerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Default registry credentials used by pull/push and `check_auth`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<RegistryAuthConfig>,
}

/// Daemon connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Daemon address: `unix:///path`, an absolute socket path,
    /// `tcp://host:port`, or `http://host:port`.
    #[serde(default = "default_host")]
    pub host: String,

    /// API version prefix (e.g. "1.43"). Unset means unversioned paths.
    #[serde(default)]
    pub api_version: Option<String>,

    /// Per-call deadline in seconds (0 = no deadline).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_version: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_DOCKER_HOST.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Registry credentials as expressed in TOML.
///
/// ## TOML Example
///
/// ```toml
/// [auth]
/// username = "alice"
/// password = "hunter2"
/// email = "alice@example.com"
/// serveraddress = "https://index.docker.io/v1/"
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct RegistryAuthConfig {
    pub username: String,
    #[serde(default, serialize_with = "serialize_redacted")]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_server_address")]
    pub serveraddress: String,
}

impl fmt::Debug for RegistryAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuthConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("email", &self.email)
            .field("serveraddress", &self.serveraddress)
            .finish()
    }
}

/// Rendered configs never carry the registry password.
fn serialize_redacted<S: serde::Serializer>(password: &str, ser: S) -> Result<S::Ok, S::Error> {
    if password.is_empty() {
        ser.serialize_str("")
    } else {
        ser.serialize_str("[REDACTED]")
    }
}

fn default_server_address() -> String {
    "https://index.docker.io/v1/".to_string()
}

/// A resolved daemon address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerHost {
    /// Unix domain socket at the given path.
    Unix(PathBuf),
    /// Plain TCP (no TLS).
    Tcp { host: String, port: u16 },
}

impl DockerHost {
    /// Parse a `DOCKER_HOST`-style address.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConfigError::Validation(
                "docker.host must not be empty".to_string(),
            ));
        }
        if s.starts_with('/') {
            return Ok(DockerHost::Unix(PathBuf::from(s)));
        }
        // Socket paths are taken literally, never URL-decoded.
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() || path == "/" {
                return Err(ConfigError::Validation(format!(
                    "docker.host {s:?} has no socket path"
                )));
            }
            return Ok(DockerHost::Unix(PathBuf::from(path)));
        }

        // http:// is treated as an alias for tcp:// so the default port
        // stays 2375 rather than the scheme default of 80.
        let normalized = match s.strip_prefix("http://") {
            Some(rest) => format!("tcp://{rest}"),
            None => s.to_string(),
        };

        let url = url::Url::parse(&normalized)
            .map_err(|e| ConfigError::Validation(format!("invalid docker.host {s:?}: {e}")))?;

        match url.scheme() {
            "tcp" => {
                let host = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| {
                        ConfigError::Validation(format!("docker.host {s:?} has no host name"))
                    })?
                    .to_string();
                let port = url.port().unwrap_or(DEFAULT_TCP_PORT);
                if port == 0 {
                    return Err(ConfigError::Validation(format!(
                        "docker.host {s:?} must use a non-zero port"
                    )));
                }
                Ok(DockerHost::Tcp { host, port })
            }
            other => Err(ConfigError::Validation(format!(
                "docker.host scheme must be unix, tcp or http, got {other:?}"
            ))),
        }
    }

    /// Value for the HTTP `Host` header.
    pub fn authority(&self) -> String {
        match self {
            DockerHost::Unix(_) => "localhost".to_string(),
            DockerHost::Tcp { host, port } => format!("{host}:{port}"),
        }
    }
}

impl fmt::Display for DockerHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerHost::Unix(path) => write!(f, "unix://{}", path.display()),
            DockerHost::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `DOCKER_HOST` and `DOCKER_API_VERSION` from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay environment values obtained from `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DOCKER_HOST").filter(|v| !v.is_empty()) {
            debug!(host = %host, "DOCKER_HOST overrides configured host");
            self.docker.host = host;
        }
        if let Some(version) = lookup("DOCKER_API_VERSION").filter(|v| !v.is_empty()) {
            debug!(version = %version, "DOCKER_API_VERSION overrides configured version");
            self.docker.api_version = Some(version);
        }
        self.validate()
    }

    /// Resolve the configured host string.
    pub fn docker_host(&self) -> Result<DockerHost, ConfigError> {
        DockerHost::parse(&self.docker.host)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        DockerHost::parse(&self.docker.host)?;

        if let Some(version) = &self.docker.api_version
            && !is_valid_api_version(version)
        {
            return Err(ConfigError::Validation(format!(
                "docker.api_version must look like \"1.43\", got {version:?}"
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        if let Some(auth) = &self.auth
            && auth.username.is_empty()
        {
            return Err(ConfigError::Validation(
                "auth.username must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn is_valid_api_version(v: &str) -> bool {
    let mut parts = v.split('.');
    let (Some(major), Some(minor), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let numeric = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    numeric(major) && numeric(minor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.docker.host, "unix:///var/run/docker.sock");
        assert_eq!(config.docker.api_version, None);
        assert_eq!(config.docker.timeout_secs, 120);
        assert_eq!(config.logging.level, "info");
        assert!(config.auth.is_none());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(
            config.docker_host().unwrap(),
            DockerHost::Unix(PathBuf::from("/var/run/docker.sock"))
        );
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [docker]
            host = "tcp://10.0.0.5:2376"
            api_version = "1.43"
            timeout_secs = 30

            [logging]
            level = "debug"

            [auth]
            username = "alice"
            password = "hunter2"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.docker.api_version.as_deref(), Some("1.43"));
        assert_eq!(config.docker.timeout_secs, 30);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.docker_host().unwrap(),
            DockerHost::Tcp {
                host: "10.0.0.5".to_string(),
                port: 2376
            }
        );
        let auth = config.auth.unwrap();
        assert_eq!(auth.username, "alice");
        assert_eq!(auth.serveraddress, "https://index.docker.io/v1/");
    }

    // ── Host parsing ──────────────────────────────────────────────────

    #[test]
    fn test_host_bare_path() {
        assert_eq!(
            DockerHost::parse("/run/user/1000/docker.sock").unwrap(),
            DockerHost::Unix(PathBuf::from("/run/user/1000/docker.sock"))
        );
    }

    #[test]
    fn test_host_tcp_default_port() {
        assert_eq!(
            DockerHost::parse("tcp://docker.internal").unwrap(),
            DockerHost::Tcp {
                host: "docker.internal".to_string(),
                port: 2375
            }
        );
    }

    #[test]
    fn test_host_http_alias() {
        let host = DockerHost::parse("http://127.0.0.1:4243").unwrap();
        assert_eq!(host.authority(), "127.0.0.1:4243");
        assert_eq!(host.to_string(), "tcp://127.0.0.1:4243");
    }

    #[test]
    fn test_host_unix_authority() {
        let host = DockerHost::parse("unix:///var/run/docker.sock").unwrap();
        assert_eq!(host.authority(), "localhost");
        assert_eq!(host.to_string(), "unix:///var/run/docker.sock");
    }

    #[test]
    fn test_host_unix_path_is_literal() {
        assert_eq!(
            DockerHost::parse("unix://var/run/docker.sock").unwrap(),
            DockerHost::Unix(PathBuf::from("var/run/docker.sock"))
        );
        assert_eq!(
            DockerHost::parse("unix:///tmp/my dir/docker.sock").unwrap(),
            DockerHost::Unix(PathBuf::from("/tmp/my dir/docker.sock"))
        );
        assert_eq!(
            DockerHost::parse("unix:///tmp/a%20b.sock").unwrap(),
            DockerHost::Unix(PathBuf::from("/tmp/a%20b.sock"))
        );
    }

    #[test]
    fn test_host_rejects_bad_inputs() {
        assert!(DockerHost::parse("").is_err());
        assert!(DockerHost::parse("unix://").is_err());
        assert!(DockerHost::parse("npipe:////./pipe/docker_engine").is_err());
        assert!(DockerHost::parse("tcp://127.0.0.1:0").is_err());
        assert!(DockerHost::parse("not a url").is_err());
    }

    // ── Validation ────────────────────────────────────────────────────

    #[test]
    fn test_validation_rejects_bad_api_version() {
        for bad in ["1", "v1.43", "1.43.0", "1.x", ""] {
            let toml = format!("[docker]\napi_version = {bad:?}\n");
            assert!(AppConfig::parse(&toml).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_validation_rejects_bad_log_level() {
        let toml = r#"
            [logging]
            level = "chatty"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_username() {
        let toml = r#"
            [auth]
            username = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_auth_debug_redacts_password() {
        let auth = RegistryAuthConfig {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
            email: String::new(),
            serveraddress: default_server_address(),
        };
        let dbg = format!("{auth:?}");
        assert!(dbg.contains("alice"));
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn test_rendered_config_redacts_password() {
        let config = AppConfig::parse("[auth]\nusername = \"alice\"\npassword = \"hunter2\"\n").unwrap();
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("alice"));
        assert!(!text.contains("hunter2"));
        assert!(text.contains("[REDACTED]"));
        assert_eq!(config.auth.as_ref().unwrap().password, "hunter2");
    }

    // ── Environment overlay ───────────────────────────────────────────

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = [
            ("DOCKER_HOST", "tcp://192.168.1.10:2375"),
            ("DOCKER_API_VERSION", "1.41"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.docker.host, "tcp://192.168.1.10:2375");
        assert_eq!(config.docker.api_version.as_deref(), Some("1.41"));
    }

    #[test]
    fn test_env_overlay_ignores_empty_values() {
        let mut config = AppConfig::default();
        config
            .apply_env_from(|_| Some(String::new()))
            .unwrap();
        assert_eq!(config.docker.host, DEFAULT_DOCKER_HOST);
    }

    #[test]
    fn test_env_overlay_validates() {
        let mut config = AppConfig::default();
        let result = config.apply_env_from(|k| (k == "DOCKER_HOST").then(|| "ftp://x".to_string()));
        assert!(result.is_err());
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[test_log::test(tokio::test)]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dockline.toml");
        tokio::fs::write(&path, b"[docker]\nhost = \"tcp://localhost:2375\"\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.docker.host, "tcp://localhost:2375");
    }

    #[test_log::test(tokio::test)]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test_log::test(tokio::test)]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = AppConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = AppConfig::parse("[docker]\napi_version = \"1.43\"\n").unwrap();
        let text = toml::to_string_pretty(&config).unwrap();
        let reparsed = AppConfig::parse(&text).unwrap();
        assert_eq!(reparsed.docker.api_version.as_deref(), Some("1.43"));
    }
}
