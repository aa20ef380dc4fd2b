//! Authentication module for the identity-admin server.
//!
//! This module provides:
//! - OIDC login against an external identity provider (`oidc`)
//! - Access and ID token verification strategies (`verifier`)
//! - Encrypted session cookies (`cipher`, `cookies`)
//! - Two-stage bearer/cookie authentication middleware (`middleware`)
//! - Login, callback, logout and `me` handlers (`routes`)
//!
//! # Session Model
//!
//! There is no server-side session store. The browser holds the provider's
//! ID, access and refresh tokens in encrypted cookies and every request is
//! re-authenticated from them. Machine clients send a bearer access token
//! instead, which takes precedence over any cookies.

pub mod cipher;
pub mod cookies;
pub mod middleware;
pub mod oidc;
pub mod revocation;
pub mod routes;
#[cfg(test)]
pub(crate) mod testing;
pub mod verifier;

pub use cookies::{CookieKind, CookieManager};
pub use middleware::{
    CurrentPrincipal, OptionalPrincipal, authenticated, bearer_stage, cookie_stage,
};
pub use oidc::{OAuth2Context, OidcClient, OidcError};
pub use routes::{callback, login, logout, me};
pub use verifier::TokenVerifier;

use crate::config::AuthConfig;
use std::sync::Arc;

/// Paths served without authentication.
pub const PUBLIC_PATHS: [&str; 4] = [
    "/api/v0/auth",
    "/api/v0/auth/callback",
    "/api/v0/status",
    "/api/v0/version",
];

/// Routing settings for the authentication flow.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    ui_url: String,
    public_paths: Vec<String>,
}

impl AuthSettings {
    /// Creates settings with the built-in public paths plus `extra_public_paths`.
    #[must_use]
    pub fn new(ui_url: impl Into<String>, extra_public_paths: &[&str]) -> Self {
        let public_paths = PUBLIC_PATHS
            .iter()
            .chain(extra_public_paths)
            .map(|p| (*p).to_string())
            .collect();
        Self {
            ui_url: ui_url.into(),
            public_paths,
        }
    }

    /// Where the browser lands after login and logout.
    #[must_use]
    pub fn ui_url(&self) -> &str {
        &self.ui_url
    }

    /// Returns true if `path` is served without authentication.
    ///
    /// Matching is exact; `/api/v0/auth/me` is not public even though
    /// `/api/v0/auth` is.
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p == path)
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_UI_URL, &[])
    }
}

impl From<&AuthConfig> for AuthSettings {
    fn from(config: &AuthConfig) -> Self {
        Self::new(config.ui_url.clone(), &config.extra_public_paths())
    }
}

/// Shared application state.
pub struct AppState {
    /// The identity provider.
    pub oauth2: Arc<dyn OAuth2Context>,
    /// Encrypted cookie access.
    pub cookies: CookieManager,
    pub settings: AuthSettings,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        oauth2: Arc<dyn OAuth2Context>,
        cookies: CookieManager,
        settings: AuthSettings,
    ) -> Self {
        Self {
            oauth2,
            cookies,
            settings,
        }
    }
}
