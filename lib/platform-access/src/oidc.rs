//! OAuth2 / OIDC relying-party configuration.
//!
//! The configuration is read once at startup and is immutable for the
//! lifetime of the process, including the choice of token verification
//! strategy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How access tokens are verified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStrategy {
    /// Verify JWTs locally against the provider's published keys.
    #[default]
    Jwks,
    /// Ask the provider's userinfo endpoint about the token.
    Userinfo,
}

impl VerificationStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jwks => "jwks",
            Self::Userinfo => "userinfo",
        }
    }
}

impl fmt::Display for VerificationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unknown verification strategy name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStrategyError {
    pub value: String,
}

impl fmt::Display for UnknownStrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown verification strategy '{}', expected 'jwks' or 'userinfo'",
            self.value
        )
    }
}

impl std::error::Error for UnknownStrategyError {}

impl FromStr for VerificationStrategy {
    type Err = UnknownStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jwks" => Ok(Self::Jwks),
            "userinfo" => Ok(Self::Userinfo),
            _ => Err(UnknownStrategyError {
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration for the OIDC identity provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Config {
    /// The OIDC issuer URL, used for discovery.
    issuer_url: String,
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// The OAuth2 client secret.
    client_secret: String,
    /// Redirect URI of the callback endpoint
    /// (e.g., "https://admin.example.com/api/v0/auth/callback").
    redirect_uri: String,
    /// OAuth2 scopes to request as a comma-separated string.
    /// Default: "openid,email,profile,offline_access"
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Access token verification strategy. Default: jwks
    #[serde(default)]
    verification_strategy: VerificationStrategy,
    /// Base URL of the provider admin API, used to revoke login sessions.
    #[serde(default)]
    admin_url: Option<String>,
    /// RFC 7009 token revocation endpoint. Default: "<issuer>/oauth2/revoke"
    #[serde(default)]
    revocation_url: Option<String>,
}

fn default_scopes() -> String {
    "openid,email,profile,offline_access".to_string()
}

impl OAuth2Config {
    /// Creates a new configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        issuer_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            issuer_url,
            client_id,
            client_secret,
            redirect_uri,
            scopes: default_scopes(),
            verification_strategy: VerificationStrategy::default(),
            admin_url: None,
            revocation_url: None,
        }
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(
        issuer_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> OAuth2ConfigBuilder {
        OAuth2ConfigBuilder::new(issuer_url, client_id, client_secret, redirect_uri)
    }

    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the OAuth2 scopes to request, parsed from comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    #[must_use]
    pub fn verification_strategy(&self) -> VerificationStrategy {
        self.verification_strategy
    }

    /// Returns the provider admin API base URL, without a trailing slash.
    #[must_use]
    pub fn admin_url(&self) -> Option<&str> {
        self.admin_url.as_deref().map(|u| u.trim_end_matches('/'))
    }

    /// Returns the token revocation endpoint.
    #[must_use]
    pub fn revocation_url(&self) -> String {
        match &self.revocation_url {
            Some(url) => url.clone(),
            None => format!("{}/oauth2/revoke", self.issuer_url.trim_end_matches('/')),
        }
    }
}

/// Builder for `OAuth2Config`.
#[derive(Debug)]
pub struct OAuth2ConfigBuilder {
    config: OAuth2Config,
    scopes: Vec<String>,
}

impl OAuth2ConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(
        issuer_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        let config = OAuth2Config::new(issuer_url, client_id, client_secret, redirect_uri);
        let scopes = config.scopes().into_iter().map(str::to_string).collect();
        Self { config, scopes }
    }

    #[must_use]
    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Adds a scope unless it is already requested.
    #[must_use]
    pub fn add_scope(mut self, scope: String) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    #[must_use]
    pub fn verification_strategy(mut self, strategy: VerificationStrategy) -> Self {
        self.config.verification_strategy = strategy;
        self
    }

    #[must_use]
    pub fn admin_url(mut self, url: String) -> Self {
        self.config.admin_url = Some(url);
        self
    }

    #[must_use]
    pub fn revocation_url(mut self, url: String) -> Self {
        self.config.revocation_url = Some(url);
        self
    }

    #[must_use]
    pub fn build(mut self) -> OAuth2Config {
        self.config.scopes = self.scopes.join(",");
        self.config
    }
}
