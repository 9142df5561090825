//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::Path;

use dockline_config::{AppConfig, RegistryAuthConfig};

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .unix_socket(daemon.socket_path().unwrap())
///     .api_version("1.43")
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn host(mut self, host: &str) -> Self {
        self.config.docker.host = host.to_string();
        self
    }

    pub fn unix_socket(mut self, path: &Path) -> Self {
        self.config.docker.host = format!("unix://{}", path.display());
        self
    }

    pub fn api_version(mut self, version: &str) -> Self {
        self.config.docker.api_version = Some(version.to_string());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.docker.timeout_secs = secs;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn registry_auth(mut self, username: &str, password: &str) -> Self {
        self.config.auth = Some(RegistryAuthConfig {
            username: username.to_string(),
            password: password.to_string(),
            email: String::new(),
            serveraddress: "https://index.docker.io/v1/".to_string(),
        });
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
