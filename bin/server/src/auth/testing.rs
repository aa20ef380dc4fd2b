//! Test doubles and helpers shared by the auth tests.
//!
//! [`FakeVerifier`] reads the verdict from the token itself:
//! `valid:<sub>`, `expired:<sub>`, `forged:<sub>` or `foreign:<sub>`.

use async_trait::async_trait;
use axum::{
    body::to_bytes,
    http::header,
    response::Response,
};
use axum_extra::extract::{CookieJar, cookie::Cookie};
use identity_admin_core::Result;
use identity_admin_platform_access::{
    AuthenticationError, Principal, ServicePrincipal, TokenSet, UserPrincipal,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use openidconnect::IssuerUrl;
use openidconnect::core::{CoreJsonWebKeySet, CoreJwsSigningAlgorithm};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};

use super::cipher::{CookieCipher, KEY_SIZE};
use super::oidc::{OAuth2Context, OidcError};
use super::revocation::LogoutError;
use super::verifier::{JwksVerifier, TokenVerifier};
use super::{AppState, AuthSettings, CookieKind, CookieManager};
use crate::config::CookieConfig;

pub const ISSUER: &str = "https://idp.example.com";
pub const CLIENT_ID: &str = "admin-ui";
pub const CLIENT_SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const LOGIN_URL: &str = "https://idp.example.com/oauth2/auth";

pub fn cookie_config() -> CookieConfig {
    CookieConfig {
        encryption_key: "k".repeat(KEY_SIZE),
        auth_ttl_seconds: 300,
        session_ttl_seconds: 3600,
        secure: true,
    }
}

pub fn cookie_manager() -> CookieManager {
    let cipher = CookieCipher::new(&[7u8; KEY_SIZE]).expect("valid key");
    CookieManager::new(cipher, Duration::minutes(5), Duration::hours(1), true)
}

pub fn app_state(oauth2: Arc<FakeOAuth2>) -> Arc<AppState> {
    Arc::new(AppState::new(oauth2, cookie_manager(), AuthSettings::default()))
}

/// Builds a `Cookie` request header holding encrypted values.
pub fn cookie_header(cookies: &CookieManager, values: &[(CookieKind, &str)]) -> String {
    values
        .iter()
        .fold(CookieJar::new(), |jar, (kind, value)| {
            cookies.set(jar, *kind, value, Duration::hours(1))
        })
        .iter()
        .map(|c| format!("{}={}", c.name(), c.value()))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Returns the last `Set-Cookie` for `kind` in the response.
pub fn response_cookie(response: &Response, kind: CookieKind) -> Option<Cookie<'static>> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| Cookie::parse(v.to_string()).ok())
        .filter(|c| c.name() == kind.name())
        .last()
}

/// Returns true if the cookie tells the browser to drop it.
pub fn is_cleared(cookie: &Cookie<'_>) -> bool {
    cookie.value().is_empty()
        && cookie
            .expires_datetime()
            .is_some_and(|at| at <= OffsetDateTime::UNIX_EPOCH)
}

pub fn decrypt(
    cookies: &CookieManager,
    kind: CookieKind,
    cookie: Cookie<'static>,
) -> Option<String> {
    cookies.get(&CookieJar::new().add(cookie), kind)
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// A verifier trusting HS256 tokens signed with [`CLIENT_SECRET`].
pub fn jwks_verifier(issuer: &str) -> JwksVerifier {
    JwksVerifier::new(
        CLIENT_ID,
        CLIENT_SECRET,
        IssuerUrl::new(issuer.to_string()).expect("issuer URL"),
        CoreJsonWebKeySet::new(vec![]),
        vec![CoreJwsSigningAlgorithm::HmacSha256],
    )
}

/// ID token claims for `user-1`, expiring `expires_in` seconds from now.
pub fn claims(issuer: &str, expires_in: i64) -> Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "iss": issuer,
        "sub": "user-1",
        "aud": CLIENT_ID,
        "iat": now - 60,
        "exp": now + expires_in,
        "email": "ada@example.com",
        "name": "Ada Lovelace",
        "sid": "session-1",
        "nonce": "mock-nonce"
    })
}

pub fn mint(claims: Value) -> String {
    mint_with_secret(claims, CLIENT_SECRET)
}

pub fn mint_with_secret(claims: Value, secret: &str) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("sign token")
}

/// Verifier deciding from the token text, counting calls.
#[derive(Default)]
pub struct FakeVerifier {
    access_calls: AtomicUsize,
    id_calls: AtomicUsize,
}

impl FakeVerifier {
    pub fn access_calls(&self) -> usize {
        self.access_calls.load(Ordering::SeqCst)
    }

    pub fn id_calls(&self) -> usize {
        self.id_calls.load(Ordering::SeqCst)
    }
}

fn verdict(raw: &str) -> std::result::Result<String, AuthenticationError> {
    let reason = raw.to_string();
    match raw.split_once(':') {
        Some(("valid", subject)) => Ok(subject.to_string()),
        Some(("expired", _)) => Err(AuthenticationError::TokenExpired { reason }),
        Some(("forged", _)) => Err(AuthenticationError::InvalidSignature { reason }),
        Some(("foreign", _)) => Err(AuthenticationError::AudienceMismatch { reason }),
        _ => Err(AuthenticationError::InvalidToken {
            reason: format!("unrecognized token {raw:?}"),
        }),
    }
}

#[async_trait]
impl TokenVerifier for FakeVerifier {
    async fn verify_access_token(
        &self,
        raw: &str,
    ) -> std::result::Result<ServicePrincipal, AuthenticationError> {
        self.access_calls.fetch_add(1, Ordering::SeqCst);
        verdict(raw).map(ServicePrincipal::new)
    }

    async fn verify_id_token(
        &self,
        raw: &str,
    ) -> std::result::Result<UserPrincipal, AuthenticationError> {
        self.id_calls.fetch_add(1, Ordering::SeqCst);
        verdict(raw).map(|subject| {
            UserPrincipal::new(subject)
                .with_session_id("session-1")
                .with_nonce("mock-nonce")
        })
    }
}

/// In-memory identity provider.
#[derive(Default)]
pub struct FakeOAuth2 {
    pub verifier: FakeVerifier,
    /// Result of the code exchange; `None` makes it fail.
    pub exchanged: Option<TokenSet>,
    /// Result of a refresh; `None` makes it fail.
    pub refreshed: Option<TokenSet>,
    pub logout_error: Option<LogoutError>,
    pub(crate) refresh_calls: AtomicUsize,
    pub(crate) last_refresh_token: Mutex<Option<String>>,
    pub(crate) logged_out: Mutex<Option<Principal>>,
}

impl FakeOAuth2 {
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().expect("lock").clone()
    }

    pub fn logged_out(&self) -> Option<Principal> {
        self.logged_out.lock().expect("lock").clone()
    }
}

#[async_trait]
impl OAuth2Context for FakeOAuth2 {
    fn login_redirect(&self, nonce: &str, state: &str) -> String {
        format!("{LOGIN_URL}?client_id={CLIENT_ID}&nonce={nonce}&state={state}")
    }

    async fn retrieve_tokens(&self, _code: &str) -> Result<TokenSet, OidcError> {
        match &self.exchanged {
            Some(tokens) => Ok(tokens.clone()),
            None => Err(OidcError::TokenExchange("invalid_grant".to_string()).into()),
        }
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, OidcError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_token.lock().expect("lock") = Some(refresh_token.to_string());
        match &self.refreshed {
            Some(tokens) => Ok(tokens.clone()),
            None => Err(OidcError::TokenRefresh("invalid_grant".to_string()).into()),
        }
    }

    fn verifier(&self) -> &dyn TokenVerifier {
        &self.verifier
    }

    async fn logout(&self, principal: Option<&Principal>) -> Result<(), LogoutError> {
        let principal = principal.ok_or(LogoutError::MissingPrincipal)?;
        *self.logged_out.lock().expect("lock") = Some(principal.clone());
        match &self.logout_error {
            Some(e) => Err(e.clone().into()),
            None => Ok(()),
        }
    }
}
