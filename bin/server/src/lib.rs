//! identity-admin web server.
//!
//! This crate provides the authentication layer of the identity platform
//! admin API: OIDC login against the platform's own provider, encrypted
//! session cookies and bearer/cookie request authentication.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
