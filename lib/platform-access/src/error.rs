//! Error types for the platform-access crate.
//!
//! - `AuthenticationError`: why a credential could not be turned into a
//!   principal. `AuthenticationError::kind` classifies it into the closed
//!   [`ErrorKind`] set the middleware branches on.
//! - `ProviderErrorBody`: the `{error, error_description}` body the identity
//!   provider returns on failed OAuth2 calls.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of an authentication failure.
///
/// The cookie stage only attempts a token refresh for [`ErrorKind::Expired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The token was well formed and correctly signed but is past `exp`.
    Expired,
    /// The signature did not verify or the token was unsigned.
    InvalidSignature,
    /// The token was not issued for this client.
    AudienceMismatch,
    /// The identity provider could not be reached.
    NetworkFailure,
    /// Anything else: malformed tokens, bad claims, provider rejections.
    Other,
}

/// Errors from authentication operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// Neither an ID token nor an access token cookie was presented.
    MissingToken,
    /// The token has expired.
    TokenExpired { reason: String },
    /// Signature verification failed.
    InvalidSignature { reason: String },
    /// The audience does not include the configured client.
    AudienceMismatch { reason: String },
    /// The token is malformed or a claim failed validation.
    InvalidToken { reason: String },
    /// Transport-level failure talking to the identity provider.
    ProviderUnreachable { reason: String },
    /// The identity provider answered with an error.
    ProviderError { reason: String },
    /// Exchanging the refresh token for new credentials failed.
    RefreshFailed { reason: String },
}

impl AuthenticationError {
    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TokenExpired { .. } => ErrorKind::Expired,
            Self::InvalidSignature { .. } => ErrorKind::InvalidSignature,
            Self::AudienceMismatch { .. } => ErrorKind::AudienceMismatch,
            Self::ProviderUnreachable { .. } => ErrorKind::NetworkFailure,
            Self::MissingToken
            | Self::InvalidToken { .. }
            | Self::ProviderError { .. }
            | Self::RefreshFailed { .. } => ErrorKind::Other,
        }
    }

    /// Returns true if the error means the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.kind() == ErrorKind::Expired
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => write!(f, "no authentication token found"),
            Self::TokenExpired { reason } => write!(f, "token is expired: {reason}"),
            Self::InvalidSignature { reason } => {
                write!(f, "invalid token signature: {reason}")
            }
            Self::AudienceMismatch { reason } => write!(f, "audience mismatch: {reason}"),
            Self::InvalidToken { reason } => write!(f, "invalid token: {reason}"),
            Self::ProviderUnreachable { reason } => {
                write!(f, "identity provider unreachable: {reason}")
            }
            Self::ProviderError { reason } => write!(f, "identity provider error: {reason}"),
            Self::RefreshFailed { reason } => write!(f, "token refresh failed: {reason}"),
        }
    }
}

impl std::error::Error for AuthenticationError {}

/// Structured error body returned by the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl fmt::Display for ProviderErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => write!(f, "{}", self.error),
        }
    }
}
