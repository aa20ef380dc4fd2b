//! Caller identity and OAuth2 configuration for the identity admin API.
//!
//! This crate provides:
//! - The principal model (`Principal`, `ServicePrincipal`, `UserPrincipal`)
//! - Relying-party configuration (`OAuth2Config`, `VerificationStrategy`)
//! - Token material returned by the provider (`TokenSet`)
//! - Authentication errors and their classification (`AuthenticationError`, `ErrorKind`)
//!
//! # Example
//!
//! ```
//! use identity_admin_platform_access::{Principal, UserPrincipal};
//!
//! // Claims from a verified ID token
//! let claims = r#"{"sub":"user-123","email":"ada@example.com","sid":"s-1","nonce":"n-1"}"#;
//! let user: UserPrincipal = serde_json::from_str(claims).unwrap();
//!
//! // Raw tokens are attached by the middleware, never read from claims
//! let principal = Principal::from(user.with_tokens("id", "access", "refresh"));
//!
//! assert_eq!(principal.identifier(), "user-123");
//! assert_eq!(principal.session(), Some("s-1"));
//! assert_eq!(principal.refresh_token(), Some("refresh"));
//! ```

pub mod error;
pub mod oidc;
pub mod principal;
pub mod token;

pub use error::{AuthenticationError, ErrorKind, ProviderErrorBody};
pub use oidc::{OAuth2Config, OAuth2ConfigBuilder, UnknownStrategyError, VerificationStrategy};
pub use principal::{Principal, ServicePrincipal, UserPrincipal};
pub use token::TokenSet;
