//! Token verification strategies.
//!
//! - [`JwksVerifier`] checks JWT signatures locally against the key set
//!   published by the provider, along with issuer, audience and expiry.
//! - [`UserinfoVerifier`] asks the provider's userinfo endpoint about access
//!   tokens, for providers that issue opaque tokens. ID tokens are still
//!   verified locally.
//!
//! The strategy is picked once at startup from
//! [`VerificationStrategy`](identity_admin_platform_access::VerificationStrategy).

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use identity_admin_platform_access::{
    AuthenticationError, ProviderErrorBody, ServicePrincipal, UserPrincipal,
};
use openidconnect::core::{
    CoreIdToken, CoreIdTokenVerifier, CoreJsonWebKeySet, CoreJwsSigningAlgorithm,
};
use openidconnect::{ClaimsVerificationError, ClientId, ClientSecret, IssuerUrl, Nonce};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

/// Turns raw tokens into principals.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verifies an access token presented by a machine client.
    async fn verify_access_token(&self, raw: &str)
    -> Result<ServicePrincipal, AuthenticationError>;

    /// Verifies an ID token from a browser session.
    async fn verify_id_token(&self, raw: &str) -> Result<UserPrincipal, AuthenticationError>;
}

/// Verifies JWTs against the provider's published keys.
pub struct JwksVerifier {
    verifier: CoreIdTokenVerifier<'static>,
}

impl JwksVerifier {
    /// Creates a verifier for tokens issued by `issuer` to `client_id`.
    ///
    /// HMAC-signed tokens are checked against the client secret.
    #[must_use]
    pub fn new(
        client_id: &str,
        client_secret: &str,
        issuer: IssuerUrl,
        keys: CoreJsonWebKeySet,
        allowed_algs: Vec<CoreJwsSigningAlgorithm>,
    ) -> Self {
        let verifier = CoreIdTokenVerifier::new_confidential_client(
            ClientId::new(client_id.to_string()),
            ClientSecret::new(client_secret.to_string()),
            issuer,
            keys,
        )
        .set_allowed_algs(allowed_algs);
        Self { verifier }
    }

    fn verify<T: DeserializeOwned>(&self, raw: &str) -> Result<T, AuthenticationError> {
        let token = CoreIdToken::from_str(raw).map_err(|e| AuthenticationError::InvalidToken {
            reason: format!("malformed JWT: {e}"),
        })?;
        token
            .claims(&self.verifier, accept_any_nonce)
            .map_err(classify_claims_error)?;
        decode_payload(raw)
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify_access_token(
        &self,
        raw: &str,
    ) -> Result<ServicePrincipal, AuthenticationError> {
        let claims: SubjectClaims = self.verify(raw)?;
        Ok(ServicePrincipal::new(claims.sub))
    }

    async fn verify_id_token(&self, raw: &str) -> Result<UserPrincipal, AuthenticationError> {
        self.verify(raw)
    }
}

/// Nonces are compared against the login cookie by the callback handler, not
/// here, so session tokens can be re-verified on every request.
fn accept_any_nonce(_: Option<&Nonce>) -> Result<(), String> {
    Ok(())
}

fn classify_claims_error(err: ClaimsVerificationError) -> AuthenticationError {
    let reason = err.to_string();
    match err {
        ClaimsVerificationError::Expired(_) => AuthenticationError::TokenExpired { reason },
        ClaimsVerificationError::InvalidAudience(_) => {
            AuthenticationError::AudienceMismatch { reason }
        }
        ClaimsVerificationError::SignatureVerification(_) => {
            AuthenticationError::InvalidSignature { reason }
        }
        _ => AuthenticationError::InvalidToken { reason },
    }
}

/// Decodes the JWT payload into `T` without checking anything.
///
/// Only called after the token has passed [`JwksVerifier::verify`].
fn decode_payload<T: DeserializeOwned>(raw: &str) -> Result<T, AuthenticationError> {
    let payload = raw
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthenticationError::InvalidToken {
            reason: "invalid JWT format".to_string(),
        })?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthenticationError::InvalidToken {
            reason: format!("failed to decode JWT payload: {e}"),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| AuthenticationError::InvalidToken {
        reason: format!("failed to parse JWT claims: {e}"),
    })
}

#[derive(Debug, Deserialize)]
struct SubjectClaims {
    sub: String,
}

/// Verifies access tokens with the provider's userinfo endpoint.
pub struct UserinfoVerifier {
    http_client: reqwest::Client,
    userinfo_url: String,
    client_id: String,
    id_tokens: JwksVerifier,
}

impl UserinfoVerifier {
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        userinfo_url: String,
        client_id: String,
        id_tokens: JwksVerifier,
    ) -> Self {
        Self {
            http_client,
            userinfo_url,
            client_id,
            id_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserinfoClaims {
    sub: String,
    #[serde(default, deserialize_with = "one_or_many")]
    aud: Vec<String>,
}

/// Accepts `aud` as a single string or an array of strings.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(aud) => vec![aud],
        OneOrMany::Many(aud) => aud,
    })
}

#[async_trait]
impl TokenVerifier for UserinfoVerifier {
    async fn verify_access_token(
        &self,
        raw: &str,
    ) -> Result<ServicePrincipal, AuthenticationError> {
        let response = self
            .http_client
            .get(&self.userinfo_url)
            .bearer_auth(raw)
            .send()
            .await
            .map_err(|e| AuthenticationError::ProviderUnreachable {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .json::<ProviderErrorBody>()
                .await
                .unwrap_or_default();
            return Err(AuthenticationError::ProviderError {
                reason: format!("userinfo returned {status}: {body}"),
            });
        }

        let claims: UserinfoClaims =
            response
                .json()
                .await
                .map_err(|e| AuthenticationError::InvalidToken {
                    reason: format!("unreadable userinfo response: {e}"),
                })?;

        if !claims.aud.iter().any(|aud| *aud == self.client_id) {
            return Err(AuthenticationError::AudienceMismatch {
                reason: format!(
                    "client '{}' not in token audience {:?}",
                    self.client_id, claims.aud
                ),
            });
        }

        Ok(ServicePrincipal::new(claims.sub))
    }

    async fn verify_id_token(&self, raw: &str) -> Result<UserPrincipal, AuthenticationError> {
        self.id_tokens.verify_id_token(raw).await
    }
}
