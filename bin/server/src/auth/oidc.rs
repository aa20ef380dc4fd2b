//! OIDC client implementation using the openidconnect crate.
//!
//! [`OAuth2Context`] is the seam the middleware and handlers talk to;
//! [`OidcClient`] implements it against a discovered provider.

use async_trait::async_trait;
use identity_admin_core::Result;
use identity_admin_platform_access::{OAuth2Config, Principal, TokenSet, VerificationStrategy};
use oauth2::{ErrorResponse, RequestTokenError};
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, RedirectUrl,
    RefreshToken, Scope,
};
use std::sync::Arc;

use super::revocation::{LogoutError, RevocationClient};
use super::verifier::{JwksVerifier, TokenVerifier, UserinfoVerifier};

/// Everything the authentication flow needs from the identity provider.
#[async_trait]
pub trait OAuth2Context: Send + Sync {
    /// Builds the provider authorization URL for an authorization-code login
    /// bound to `nonce` and `state`.
    fn login_redirect(&self, nonce: &str, state: &str) -> String;

    /// Exchanges an authorization code for tokens.
    async fn retrieve_tokens(&self, code: &str) -> Result<TokenSet, OidcError>;

    /// Exchanges a refresh token for new tokens.
    ///
    /// When the provider does not rotate the refresh token the one passed in
    /// is returned in the token set.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, OidcError>;

    /// The verifier selected at startup.
    fn verifier(&self) -> &dyn TokenVerifier;

    /// Revokes the caller's login session and tokens.
    async fn logout(&self, principal: Option<&Principal>) -> Result<(), LogoutError>;
}

/// OIDC client for authenticating users.
pub struct OidcClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    config: OAuth2Config,
    http_client: reqwest::Client,
    verifier: Arc<dyn TokenVerifier>,
    revocation: RevocationClient,
}

impl OidcClient {
    /// Creates a new OIDC client by discovering the provider metadata.
    ///
    /// # Errors
    ///
    /// Fails if a configured URL is invalid, discovery fails, or the userinfo
    /// strategy is selected and the provider publishes no userinfo endpoint.
    #[tracing::instrument(skip_all, fields(issuer = config.issuer_url()))]
    pub async fn discover(
        config: OAuth2Config,
        http_client: reqwest::Client,
    ) -> Result<Self, OidcError> {
        let issuer_url = IssuerUrl::new(config.issuer_url().to_string())
            .map_err(|e| OidcError::Configuration(format!("invalid issuer URL: {e}")))?;

        let provider_metadata =
            CoreProviderMetadata::discover_async(issuer_url.clone(), &http_client)
                .await
                .map_err(|e| OidcError::Discovery(format!("failed to discover provider: {e}")))?;

        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string())
            .map_err(|e| OidcError::Configuration(format!("invalid redirect URI: {e}")))?;

        let allowed_algs = provider_metadata
            .id_token_signing_alg_values_supported()
            .clone();
        let jwks = JwksVerifier::new(
            config.client_id(),
            config.client_secret(),
            issuer_url,
            provider_metadata.jwks().clone(),
            allowed_algs,
        );

        let verifier: Arc<dyn TokenVerifier> = match config.verification_strategy() {
            VerificationStrategy::Jwks => Arc::new(jwks),
            VerificationStrategy::Userinfo => {
                let userinfo_url = provider_metadata
                    .userinfo_endpoint()
                    .ok_or_else(|| {
                        OidcError::Configuration(
                            "userinfo verification selected but provider has no userinfo endpoint"
                                .to_string(),
                        )
                    })?
                    .url()
                    .to_string();
                Arc::new(UserinfoVerifier::new(
                    http_client.clone(),
                    userinfo_url,
                    config.client_id().to_string(),
                    jwks,
                ))
            }
        };

        tracing::info!(
            strategy = %config.verification_strategy(),
            "OIDC provider discovered"
        );

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id().to_string()),
            client_secret: ClientSecret::new(config.client_secret().to_string()),
            redirect_url,
            revocation: RevocationClient::new(http_client.clone(), &config),
            config,
            http_client,
            verifier,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }
}

#[async_trait]
impl OAuth2Context for OidcClient {
    fn login_redirect(&self, nonce: &str, state: &str) -> String {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let nonce = Nonce::new(nonce.to_string());
        let state = CsrfToken::new(state.to_string());
        let mut auth_request = client.authorize_url(
            CoreAuthenticationFlow::AuthorizationCode,
            move || state,
            move || nonce,
        );

        // "openid" is always sent by the flow itself
        for scope in self.config.scopes() {
            if scope != "openid" {
                auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
            }
        }

        let (auth_url, _, _) = auth_request.url();
        auth_url.to_string()
    }

    async fn retrieve_tokens(&self, code: &str) -> Result<TokenSet, OidcError> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let token_response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| OidcError::Configuration(format!("token endpoint error: {e}")))?
            .request_async(&self.http_client)
            .await
            .map_err(|e| OidcError::TokenExchange(describe_token_error(e)))?;

        token_set(&token_response)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, OidcError> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let refresh = RefreshToken::new(refresh_token.to_string());
        let token_response = client
            .exchange_refresh_token(&refresh)
            .map_err(|e| OidcError::Configuration(format!("token endpoint error: {e}")))?
            .request_async(&self.http_client)
            .await
            .map_err(|e| OidcError::TokenRefresh(describe_token_error(e)))?;

        Ok(token_set(&token_response)?.or_refresh_token(refresh_token))
    }

    fn verifier(&self) -> &dyn TokenVerifier {
        self.verifier.as_ref()
    }

    async fn logout(&self, principal: Option<&Principal>) -> Result<(), LogoutError> {
        self.revocation.logout(principal).await
    }
}

/// Reads the raw token strings out of a token response.
///
/// The response is serialized back to its wire form, which carries the
/// `id_token` as the compact JWT string.
fn token_set<TR>(token_response: &TR) -> Result<TokenSet, OidcError>
where
    TR: serde::Serialize,
{
    let response_json = serde_json::to_value(token_response).map_err(|e| {
        OidcError::TokenExchange(format!("failed to serialize token response: {e}"))
    })?;
    let tokens = serde_json::from_value(response_json)
        .map_err(|e| OidcError::TokenExchange(format!("unexpected token response: {e}")))?;
    Ok(tokens)
}

/// Describes a failed token request, preferring the provider's own
/// `error: error_description` when it sent one.
fn describe_token_error<RE, T>(err: RequestTokenError<RE, T>) -> String
where
    RE: std::error::Error + 'static,
    T: ErrorResponse + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => response.to_string(),
        other => other.to_string(),
    }
}

/// OIDC-related errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OidcError {
    /// Configuration error (invalid URLs, missing endpoints, etc.)
    Configuration(String),
    /// Failed to discover provider metadata.
    Discovery(String),
    /// Authorization code exchange failed.
    TokenExchange(String),
    /// Refresh token exchange failed.
    TokenRefresh(String),
}

impl std::fmt::Display for OidcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "OIDC configuration error: {msg}"),
            Self::Discovery(msg) => write!(f, "OIDC discovery error: {msg}"),
            Self::TokenExchange(msg) => write!(f, "OIDC token exchange error: {msg}"),
            Self::TokenRefresh(msg) => write!(f, "OIDC token refresh error: {msg}"),
        }
    }
}

impl std::error::Error for OidcError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{self, CLIENT_ID, CLIENT_SECRET};
    use identity_admin_platform_access::{ErrorKind, UserPrincipal};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(userinfo: bool) -> MockServer {
        let server = MockServer::start().await;
        let issuer = server.uri();
        let mut metadata = json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/oauth2/auth"),
            "token_endpoint": format!("{issuer}/oauth2/token"),
            "jwks_uri": format!("{issuer}/.well-known/jwks.json"),
            "response_types_supported": ["code"],
            "subject_types_supported": ["public"],
            "id_token_signing_alg_values_supported": ["RS256", "HS256"]
        });
        if userinfo {
            metadata["userinfo_endpoint"] = json!(format!("{issuer}/userinfo"));
        }

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [] })))
            .mount(&server)
            .await;
        server
    }

    fn config(server: &MockServer, strategy: VerificationStrategy) -> OAuth2Config {
        OAuth2Config::builder(
            server.uri(),
            CLIENT_ID.to_string(),
            CLIENT_SECRET.to_string(),
            "http://localhost:8000/api/v0/auth/callback".to_string(),
        )
        .verification_strategy(strategy)
        .admin_url(server.uri())
        .build()
    }

    async fn client(server: &MockServer) -> OidcClient {
        OidcClient::discover(
            config(server, VerificationStrategy::Jwks),
            reqwest::Client::new(),
        )
        .await
        .expect("discovery succeeds")
    }

    #[tokio::test]
    async fn login_redirect_carries_nonce_state_and_scopes() {
        let server = provider(false).await;
        let client = client(&server).await;

        let url = client.login_redirect("mock-nonce", "mock-state");

        assert!(url.starts_with(&format!("{}/oauth2/auth?", server.uri())));
        assert!(url.contains("nonce=mock-nonce"));
        assert!(url.contains("state=mock-state"));
        assert!(url.contains(&format!("client_id={CLIENT_ID}")));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("offline_access"));
        assert_eq!(url.matches("openid").count(), 1);
    }

    #[tokio::test]
    async fn discovery_failure_is_fatal() {
        let server = MockServer::start().await;

        let err = OidcClient::discover(
            config(&server, VerificationStrategy::Jwks),
            reqwest::Client::new(),
        )
        .await
        .err()
        .expect("discovery fails");

        assert!(matches!(err.current_context(), OidcError::Discovery(_)));
    }

    #[tokio::test]
    async fn userinfo_strategy_requires_userinfo_endpoint() {
        let server = provider(false).await;

        let err = OidcClient::discover(
            config(&server, VerificationStrategy::Userinfo),
            reqwest::Client::new(),
        )
        .await
        .err()
        .expect("no userinfo endpoint");

        assert!(matches!(err.current_context(), OidcError::Configuration(_)));
    }

    #[tokio::test]
    async fn userinfo_strategy_verifies_access_tokens_remotely() {
        let server = provider(true).await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "sub": "machine", "aud": [CLIENT_ID] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = OidcClient::discover(
            config(&server, VerificationStrategy::Userinfo),
            reqwest::Client::new(),
        )
        .await
        .expect("discovery succeeds");

        let principal = client
            .verifier()
            .verify_access_token("opaque")
            .await
            .expect("valid");
        assert_eq!(principal.subject(), "machine");
    }

    #[tokio::test]
    async fn jwks_strategy_verifies_id_tokens_from_provider() {
        let server = provider(false).await;
        let client = client(&server).await;
        let token = testing::mint(testing::claims(&server.uri(), 3600));

        let principal: UserPrincipal = client
            .verifier()
            .verify_id_token(&token)
            .await
            .expect("valid");
        assert_eq!(principal.subject(), "user-1");

        let expired = testing::mint(testing::claims(&server.uri(), -3600));
        let err = client
            .verifier()
            .verify_id_token(&expired)
            .await
            .expect_err("expired");
        assert_eq!(err.kind(), ErrorKind::Expired);
    }

    #[tokio::test]
    async fn retrieve_tokens_returns_raw_tokens() {
        let server = provider(false).await;
        let id_token = testing::mint(testing::claims(&server.uri(), 3600));
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-1",
                "token_type": "bearer",
                "expires_in": 3600,
                "id_token": id_token,
                "refresh_token": "refresh-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = client(&server)
            .await
            .retrieve_tokens("auth-code")
            .await
            .expect("exchange succeeds");

        assert_eq!(tokens.access_token, "access-1");
        assert_eq!(tokens.id_token.as_deref(), Some(id_token.as_str()));
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn refresh_keeps_previous_refresh_token_when_not_rotated() {
        let server = provider(false).await;
        let id_token = testing::mint(testing::claims(&server.uri(), 3600));
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-2",
                "token_type": "bearer",
                "id_token": id_token
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = client(&server)
            .await
            .refresh_token("refresh-1")
            .await
            .expect("refresh succeeds");

        assert_eq!(tokens.access_token, "access-2");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn refresh_rejection_carries_provider_error() {
        let server = provider(false).await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "refresh token revoked"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .refresh_token("refresh-1")
            .await
            .expect_err("refresh fails");

        match err.current_context() {
            OidcError::TokenRefresh(msg) => assert!(msg.contains("invalid_grant"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn logout_revokes_through_admin_api() {
        let server = provider(false).await;
        Mock::given(method("DELETE"))
            .and(path("/admin/oauth2/auth/sessions/login"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/revoke"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let principal = Principal::from(
            UserPrincipal::new("user-1")
                .with_session_id("session-1")
                .with_tokens("id", "access", "refresh"),
        );
        client(&server)
            .await
            .logout(Some(&principal))
            .await
            .expect("logout succeeds");
    }
}
