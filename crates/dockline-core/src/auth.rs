//! Registry credentials.
//!
//! The same credential shape is posted to `/auth` and, base64-encoded, sent
//! in the `X-Registry-Auth` header of pull and push requests. The daemon
//! decides whether they are valid; the client only carries them.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::Result;

/// Header carrying encoded credentials on pull/push.
pub const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

/// Registry login. The password is zeroized on drop and never printed.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    pub serveraddress: String,
}

impl AuthConfig {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        serveraddress: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            email: String::new(),
            serveraddress: serveraddress.into(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Encode for the `X-Registry-Auth` header.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE.encode(json))
    }
}

impl From<&dockline_config::RegistryAuthConfig> for AuthConfig {
    fn from(cfg: &dockline_config::RegistryAuthConfig) -> Self {
        Self {
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            email: cfg.email.clone(),
            serveraddress: cfg.serveraddress.clone(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("email", &self.email)
            .field("serveraddress", &self.serveraddress)
            .finish()
    }
}

impl Drop for AuthConfig {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// Header list for calls that may carry credentials.
pub(crate) fn registry_headers(auth: Option<&AuthConfig>) -> Result<Vec<(&'static str, String)>> {
    match auth {
        Some(auth) => Ok(vec![(REGISTRY_AUTH_HEADER, auth.encode()?)]),
        None => Ok(Vec::new()),
    }
}
