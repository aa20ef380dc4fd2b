//! Logout against the identity provider.
//!
//! Logging out is two steps, run in order:
//! 1. Revoke the login session through the provider's admin API, so the
//!    provider will not silently log the user back in.
//! 2. Revoke the refresh and access tokens at the RFC 7009 endpoint.
//!
//! The second step only runs once the first has succeeded.

use identity_admin_core::Result;
use identity_admin_platform_access::{OAuth2Config, Principal, ProviderErrorBody};
use reqwest::StatusCode;
use std::fmt;

/// Errors from logging out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutError {
    /// No principal was attached to the request.
    MissingPrincipal,
    /// The provider did not revoke the login session.
    SessionRevocation {
        reason: String,
        provider: Option<ProviderErrorBody>,
    },
    /// The provider did not revoke a token.
    TokenRevocation {
        reason: String,
        provider: Option<ProviderErrorBody>,
    },
}

impl fmt::Display for LogoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (step, reason, provider) = match self {
            Self::MissingPrincipal => return write!(f, "no principal to log out"),
            Self::SessionRevocation { reason, provider } => {
                ("failed to revoke login session", reason, provider)
            }
            Self::TokenRevocation { reason, provider } => {
                ("failed to revoke token", reason, provider)
            }
        };
        match provider {
            Some(body) => write!(f, "{step}: {reason} ({body})"),
            None => write!(f, "{step}: {reason}"),
        }
    }
}

impl std::error::Error for LogoutError {}

/// Client for the provider's revocation endpoints.
#[derive(Debug, Clone)]
pub struct RevocationClient {
    http_client: reqwest::Client,
    admin_url: Option<String>,
    revocation_url: String,
    client_id: String,
    client_secret: String,
}

impl RevocationClient {
    #[must_use]
    pub fn new(http_client: reqwest::Client, config: &OAuth2Config) -> Self {
        Self {
            http_client,
            admin_url: config.admin_url().map(str::to_string),
            revocation_url: config.revocation_url(),
            client_id: config.client_id().to_string(),
            client_secret: config.client_secret().to_string(),
        }
    }

    /// Ends the caller's session at the provider.
    ///
    /// Service principals have no login session and skip straight to token
    /// revocation.
    pub async fn logout(&self, principal: Option<&Principal>) -> Result<(), LogoutError> {
        let principal = principal.ok_or(LogoutError::MissingPrincipal)?;

        if let Some(session_id) = principal.session() {
            self.revoke_login_session(session_id).await?;
        }

        if let Some(refresh_token) = principal.refresh_token() {
            self.revoke_token(refresh_token, "refresh_token").await?;
        }
        if let Some(access_token) = principal.access_token() {
            self.revoke_token(access_token, "access_token").await?;
        }

        tracing::info!(subject = principal.identifier(), "logged out");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn revoke_login_session(&self, session_id: &str) -> Result<(), LogoutError> {
        let Some(admin_url) = &self.admin_url else {
            tracing::warn!("no provider admin URL configured, skipping login session revocation");
            return Ok(());
        };

        let url = reqwest::Url::parse_with_params(
            &format!("{admin_url}/admin/oauth2/auth/sessions/login"),
            &[("sid", session_id)],
        )
        .map_err(|e| LogoutError::SessionRevocation {
            reason: format!("invalid admin URL: {e}"),
            provider: None,
        })?;

        let response = self
            .http_client
            .delete(url)
            .send()
            .await
            .map_err(|e| LogoutError::SessionRevocation {
                reason: e.to_string(),
                provider: None,
            })?;

        if response.status().is_success() {
            return Ok(());
        }

        let (status, provider) = read_error(response).await;
        tracing::warn!(%status, "provider refused to revoke login session");
        Err(LogoutError::SessionRevocation {
            reason: format!("provider returned {status}"),
            provider,
        }
        .into())
    }

    #[tracing::instrument(skip(self, token))]
    async fn revoke_token(&self, token: &str, token_type_hint: &str) -> Result<(), LogoutError> {
        let response = self
            .http_client
            .post(&self.revocation_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token), ("token_type_hint", token_type_hint)])
            .send()
            .await
            .map_err(|e| LogoutError::TokenRevocation {
                reason: e.to_string(),
                provider: None,
            })?;

        if response.status().is_success() {
            return Ok(());
        }

        let (status, provider) = read_error(response).await;
        tracing::warn!(%status, token_type_hint, "provider refused to revoke token");
        Err(LogoutError::TokenRevocation {
            reason: format!("provider returned {status} for {token_type_hint}"),
            provider,
        }
        .into())
    }
}

async fn read_error(response: reqwest::Response) -> (StatusCode, Option<ProviderErrorBody>) {
    let status = response.status();
    (status, response.json::<ProviderErrorBody>().await.ok())
}
