//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables with `__`
//! separating nested keys (`OIDC__ISSUER_URL`, `COOKIES__ENCRYPTION_KEY`).
//!
//! See [`OAuth2Config`](identity_admin_platform_access::OAuth2Config) for
//! identity provider configuration.

use identity_admin_platform_access::OAuth2Config;
use serde::Deserialize;

/// Where the browser lands after login and logout unless told otherwise.
pub const DEFAULT_UI_URL: &str = "/ui/";

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// OIDC authentication configuration.
    pub oidc: OAuth2Config,

    /// Cookie configuration.
    pub cookies: CookieConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    /// Outbound HTTP client configuration.
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}

/// Cookie-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    /// Key for cookie encryption. Must be exactly 32 bytes.
    pub encryption_key: String,

    /// Lifetime of the nonce, state and next-to cookies, in seconds.
    #[serde(default = "default_auth_ttl_seconds")]
    pub auth_ttl_seconds: i64,

    /// Lifetime of the token cookies, in seconds.
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: i64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure: bool,
}

fn default_auth_ttl_seconds() -> i64 {
    300
}

fn default_session_ttl_seconds() -> i64 {
    3600
}

fn default_secure_cookies() -> bool {
    true
}

/// Authentication flow configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// UI entry point.
    #[serde(default = "default_ui_url")]
    pub ui_url: String,

    /// Additional paths served without authentication, comma separated.
    #[serde(default)]
    pub public_paths: String,
}

fn default_ui_url() -> String {
    DEFAULT_UI_URL.to_string()
}

impl AuthConfig {
    /// Returns the extra public paths, parsed from the comma-separated string.
    #[must_use]
    pub fn extra_public_paths(&self) -> Vec<&str> {
        self.public_paths
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            ui_url: default_ui_url(),
            public_paths: String::new(),
        }
    }
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Timeout for calls to the identity provider, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Values stay strings until deserialized, so an all-digit key or
    /// secret is read verbatim; numbers and booleans are converted per field.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::default().separator("__"))
    }

    fn from_source<T>(source: T) -> Result<Self, config::ConfigError>
    where
        T: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}
