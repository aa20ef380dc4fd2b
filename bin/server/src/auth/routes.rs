//! Authentication routes for login, callback, logout and the current user.

use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use identity_admin_platform_access::{Principal, TokenSet};
use openidconnect::{CsrfToken, Nonce};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use super::{AppState, CookieKind, CurrentPrincipal, OptionalPrincipal};
use crate::error::ApiError;

/// Query parameters for the login route.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Relative path to return to once logged in.
    next: Option<String>,
}

/// Query parameters for the OIDC callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

/// Initiates the OIDC login flow by redirecting to the identity provider.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    jar: CookieJar,
) -> Response {
    let nonce = Nonce::new_random();
    let csrf_token = CsrfToken::new_random();
    let (jar, auth_url) = begin_login(
        &state,
        jar,
        nonce.secret(),
        csrf_token.secret(),
        query.next.as_deref(),
    );
    (jar, found(&auth_url)).into_response()
}

/// Stores the login state cookies and returns the provider URL.
fn begin_login(
    state: &AppState,
    jar: CookieJar,
    nonce: &str,
    csrf_token: &str,
    next: Option<&str>,
) -> (CookieJar, String) {
    let ttl = state.cookies.auth_ttl();
    let mut jar = state.cookies.set(jar, CookieKind::Nonce, nonce, ttl);
    jar = state.cookies.set(jar, CookieKind::State, csrf_token, ttl);

    match next {
        Some(next) if is_local_path(next) => {
            jar = state.cookies.set(jar, CookieKind::NextTo, next, ttl);
        }
        Some(next) => tracing::warn!(next, "ignoring non-local login return path"),
        None => {}
    }

    (jar, state.oauth2.login_redirect(nonce, csrf_token))
}

/// Accepts `/path` but not `//host/path` or absolute URLs.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

/// Handles the OIDC callback after the user authenticates with the identity provider.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Response {
    let tokens = match complete_login(&state, &query, &jar).await {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::warn!(error = %e, "login callback rejected");
            let jar = state.cookies.clear_login_state(jar);
            return (jar, e).into_response();
        }
    };

    let target = state
        .cookies
        .get(&jar, CookieKind::NextTo)
        .unwrap_or_else(|| state.settings.ui_url().to_string());

    let ttl = state.cookies.session_ttl();
    let mut jar = state.cookies.clear_login_state(jar);
    jar = state.cookies.clear(jar, CookieKind::NextTo);
    if let Some(id_token) = &tokens.id_token {
        jar = state.cookies.set(jar, CookieKind::IdToken, id_token, ttl);
    }
    jar = state
        .cookies
        .set(jar, CookieKind::AccessToken, &tokens.access_token, ttl);
    if let Some(refresh_token) = &tokens.refresh_token {
        jar = state
            .cookies
            .set(jar, CookieKind::RefreshToken, refresh_token, ttl);
    }

    (jar, found(&target)).into_response()
}

/// Validates the callback and exchanges the code for tokens.
async fn complete_login(
    state: &AppState,
    query: &CallbackQuery,
    jar: &CookieJar,
) -> Result<TokenSet, AuthError> {
    let (Some(code), Some(returned_state)) = (
        query.code.as_deref().filter(|c| !c.is_empty()),
        query.state.as_deref().filter(|s| !s.is_empty()),
    ) else {
        return Err(AuthError::MissingParameters);
    };

    let expected_state = state
        .cookies
        .get(jar, CookieKind::State)
        .ok_or(AuthError::MissingStateCookie)?;
    if returned_state != expected_state {
        return Err(AuthError::StateMismatch);
    }

    let tokens = state
        .oauth2
        .retrieve_tokens(code)
        .await
        .map_err(|report| AuthError::TokenExchange(report.current_context().to_string()))?;

    let id_token = tokens
        .id_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingIdToken)?;
    let principal = state
        .oauth2
        .verifier()
        .verify_id_token(id_token)
        .await
        .map_err(|e| AuthError::IdTokenVerification(e.to_string()))?;

    let expected_nonce = state
        .cookies
        .get(jar, CookieKind::Nonce)
        .ok_or(AuthError::MissingNonceCookie)?;
    if principal.nonce() != expected_nonce {
        return Err(AuthError::NonceMismatch);
    }

    tracing::info!(subject = principal.subject(), "login completed");
    Ok(tokens)
}

/// Logs the caller out at the identity provider.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    OptionalPrincipal(principal): OptionalPrincipal,
    jar: CookieJar,
) -> Response {
    match state.oauth2.logout(principal.as_ref()).await {
        Ok(()) => {
            let jar = state.cookies.clear_tokens(jar);
            (jar, found(state.settings.ui_url())).into_response()
        }
        Err(report) => {
            let e = report.current_context();
            tracing::warn!(error = %e, "logout failed");
            let mut jar = state.cookies.clear_login_state(jar);
            jar = state.cookies.clear(jar, CookieKind::NextTo);
            (jar, AuthError::Logout(e.to_string())).into_response()
        }
    }
}

/// Returns the authenticated principal.
pub async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> Json<Principal> {
    Json(principal)
}

/// A 302 redirect.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    MissingParameters,
    MissingStateCookie,
    StateMismatch,
    TokenExchange(String),
    MissingIdToken,
    IdTokenVerification(String),
    MissingNonceCookie,
    NonceMismatch,
    Logout(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParameters => write!(f, "missing code or state parameter"),
            Self::MissingStateCookie => write!(f, "missing state cookie"),
            Self::StateMismatch => write!(f, "state parameter does not match state cookie"),
            Self::TokenExchange(msg) => write!(f, "failed to exchange code for tokens: {msg}"),
            Self::MissingIdToken => write!(f, "token response contained no id token"),
            Self::IdTokenVerification(msg) => write!(f, "failed to verify id token: {msg}"),
            Self::MissingNonceCookie => write!(f, "missing nonce cookie"),
            Self::NonceMismatch => write!(f, "id token nonce does not match nonce cookie"),
            Self::Logout(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::bad_request(self.to_string()).into_response()
    }
}
