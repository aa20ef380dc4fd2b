//! Authentication middleware and extractors for Axum.
//!
//! Requests pass through two stages, bearer first:
//!
//! 1. [`bearer_stage`] verifies an `Authorization: Bearer` access token. A bad
//!    token is a hard 401; no header at all falls through to the next stage.
//! 2. [`cookie_stage`] authenticates from the session cookies unless the
//!    bearer stage already attached a [`Principal`], refreshing expired
//!    tokens once when a refresh token is available.
//!
//! Every 401 clears the token cookies, so a client with stale cookies has to
//! log in again rather than retry with them.

use axum::{
    Router,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use identity_admin_platform_access::{AuthenticationError, Principal, UserPrincipal};
use std::collections::HashSet;
use std::sync::Arc;

use super::{AppState, CookieKind, CookieManager, OAuth2Context};
use crate::error::ApiError;

/// Wraps `router` in both authentication stages, bearer outermost.
pub fn authenticated(
    router: Router<Arc<AppState>>,
    state: Arc<AppState>,
) -> Router<Arc<AppState>> {
    router
        .layer(middleware::from_fn_with_state(state.clone(), cookie_stage))
        .layer(middleware::from_fn_with_state(state, bearer_stage))
}

/// Stage 1: bearer access tokens.
pub async fn bearer_stage(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if state.settings.is_public(request.uri().path()) {
        return next.run(request).await;
    }
    let Some(token) = bearer_token(request.headers()) else {
        return next.run(request).await;
    };

    match state.oauth2.verifier().verify_access_token(&token).await {
        Ok(principal) => {
            tracing::debug!(subject = principal.subject(), "authenticated bearer token");
            request
                .extensions_mut()
                .insert(Principal::Service(principal.with_access_token(token)));
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(error = %e, kind = ?e.kind(), "bearer token rejected");
            let jar = state.cookies.clear_tokens(jar);
            (
                jar,
                ApiError::unauthorized(format!("unauthorized: invalid bearer token, {e}")),
            )
                .into_response()
        }
    }
}

/// Stage 2: session cookies.
pub async fn cookie_stage(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if state.settings.is_public(request.uri().path())
        || request.extensions().get::<Principal>().is_some()
    {
        return next.run(request).await;
    }

    let (jar, outcome) =
        authenticate_from_cookies(state.oauth2.as_ref(), &state.cookies, jar).await;
    match outcome {
        Ok(principal) => {
            tracing::debug!(subject = principal.subject(), "authenticated session cookies");
            request.extensions_mut().insert(Principal::User(principal));
            let response = next.run(request).await;
            merge_cookies(jar, response)
        }
        Err(e) => {
            tracing::warn!(error = %e, kind = ?e.kind(), "cookie authentication failed");
            let jar = state.cookies.clear_tokens(jar);
            (
                jar,
                ApiError::unauthorized(format!(
                    "unauthorized: unable to authenticate from either bearer or cookie token, {e}"
                )),
            )
                .into_response()
        }
    }
}

/// Resolves a user principal from the session cookies.
///
/// Returns the jar alongside the outcome: a successful refresh overwrites the
/// token cookies and those writes must reach the response.
pub async fn authenticate_from_cookies(
    oauth2: &dyn OAuth2Context,
    cookies: &CookieManager,
    jar: CookieJar,
) -> (CookieJar, Result<UserPrincipal, AuthenticationError>) {
    let id_token = cookies.get(&jar, CookieKind::IdToken);
    let access_token = cookies.get(&jar, CookieKind::AccessToken);
    let refresh_token = cookies.get(&jar, CookieKind::RefreshToken);

    if id_token.is_none() && access_token.is_none() {
        return (jar, Err(AuthenticationError::MissingToken));
    }
    let id_token = id_token.unwrap_or_default();
    let access_token = access_token.unwrap_or_default();

    let verifier = oauth2.verifier();
    let (access_result, id_result) = tokio::join!(
        verifier.verify_access_token(&access_token),
        verifier.verify_id_token(&id_token),
    );

    // The access token decides whether a refresh is worth attempting.
    let error = match (access_result, id_result) {
        (Ok(_), Ok(principal)) => {
            let principal =
                principal.with_tokens(id_token, access_token, refresh_token.unwrap_or_default());
            return (jar, Ok(principal));
        }
        (Err(e), _) | (Ok(_), Err(e)) => e,
    };

    match refresh_token {
        Some(refresh_token) if error.is_expired() => {
            refresh_session(oauth2, cookies, jar, &refresh_token).await
        }
        _ => (jar, Err(error)),
    }
}

async fn refresh_session(
    oauth2: &dyn OAuth2Context,
    cookies: &CookieManager,
    jar: CookieJar,
    refresh_token: &str,
) -> (CookieJar, Result<UserPrincipal, AuthenticationError>) {
    tracing::debug!("session tokens expired, refreshing");

    let tokens = match oauth2.refresh_token(refresh_token).await {
        Ok(tokens) => tokens.or_refresh_token(refresh_token),
        Err(report) => {
            return (
                jar,
                Err(AuthenticationError::RefreshFailed {
                    reason: report.current_context().to_string(),
                }),
            );
        }
    };
    let Some(id_token) = tokens.id_token.filter(|t| !t.is_empty()) else {
        return (
            jar,
            Err(AuthenticationError::RefreshFailed {
                reason: "refresh response contained no id token".to_string(),
            }),
        );
    };
    let access_token = tokens.access_token;
    let refresh_token = tokens.refresh_token.unwrap_or_default();

    let ttl = cookies.session_ttl();
    let jar = cookies.set(jar, CookieKind::IdToken, &id_token, ttl);
    let jar = cookies.set(jar, CookieKind::AccessToken, &access_token, ttl);
    let jar = cookies.set(jar, CookieKind::RefreshToken, &refresh_token, ttl);

    match oauth2.verifier().verify_id_token(&id_token).await {
        Ok(principal) => {
            tracing::info!(subject = principal.subject(), "refreshed session tokens");
            (
                jar,
                Ok(principal.with_tokens(id_token, access_token, refresh_token)),
            )
        }
        Err(e) => (jar, Err(e)),
    }
}

/// Appends the cookies written while authenticating to the handler's
/// response. A cookie the handler set itself wins over the middleware's.
fn merge_cookies(jar: CookieJar, mut response: Response) -> Response {
    let handler_cookies: HashSet<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(set_cookie_name)
        .collect();

    let written = jar.into_response();
    for value in written.headers().get_all(header::SET_COOKIE) {
        let Some(name) = set_cookie_name(value) else {
            continue;
        };
        if !handler_cookies.contains(&name) {
            response
                .headers_mut()
                .append(header::SET_COOKIE, value.clone());
        }
    }
    response
}

fn set_cookie_name(value: &HeaderValue) -> Option<String> {
    let (name, _) = value.to_str().ok()?.split_once('=')?;
    Some(name.trim().to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.to_string())
    } else {
        None
    }
}

/// Extractor for the principal attached by the middleware.
///
/// Rejects with 401 when no principal is present, which only happens for
/// routes not wrapped by [`authenticated`].
pub struct CurrentPrincipal(pub Principal);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or_else(|| {
                tracing::error!(path = %parts.uri.path(), "no principal attached to request");
                ApiError::unauthorized("unauthorized: no authenticated principal")
            })
    }
}

/// Extractor for optionally getting the attached principal.
pub struct OptionalPrincipal(pub Option<Principal>);

impl<S> FromRequestParts<S> for OptionalPrincipal
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalPrincipal(parts.extensions.get::<Principal>().cloned()))
    }
}
