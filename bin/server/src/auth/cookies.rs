//! Encrypted session cookies.
//!
//! Every cookie the server sets is HttpOnly, SameSite=Lax and carries a value
//! sealed by [`CookieCipher`]. Values never reach the browser in plaintext.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::{Duration, OffsetDateTime};

use super::cipher::{CipherError, CookieCipher};
use crate::config::CookieConfig;

/// Path of the OAuth2 callback, the only place login state cookies are sent.
pub const CALLBACK_PATH: &str = "/api/v0/auth/callback";

/// The cookies managed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CookieKind {
    /// Nonce bound into the ID token at login.
    Nonce,
    /// CSRF state echoed back by the provider on callback.
    State,
    IdToken,
    AccessToken,
    RefreshToken,
    /// Where to send the browser once login completes.
    NextTo,
}

impl CookieKind {
    /// The session token cookies.
    pub const TOKENS: [Self; 3] = [Self::IdToken, Self::AccessToken, Self::RefreshToken];

    /// The cookies that only live for the duration of a login flow.
    pub const LOGIN_STATE: [Self; 3] = [Self::Nonce, Self::State, Self::NextTo];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Nonce => "nonce",
            Self::State => "state",
            Self::IdToken => "id-token",
            Self::AccessToken => "access-token",
            Self::RefreshToken => "refresh-token",
            Self::NextTo => "next-to",
        }
    }

    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Nonce | Self::State => CALLBACK_PATH,
            Self::IdToken | Self::AccessToken | Self::RefreshToken | Self::NextTo => "/",
        }
    }
}

/// Reads, writes and clears the encrypted cookies.
#[derive(Debug, Clone)]
pub struct CookieManager {
    cipher: CookieCipher,
    auth_ttl: Duration,
    session_ttl: Duration,
    secure: bool,
}

impl CookieManager {
    #[must_use]
    pub fn new(
        cipher: CookieCipher,
        auth_ttl: Duration,
        session_ttl: Duration,
        secure: bool,
    ) -> Self {
        Self {
            cipher,
            auth_ttl,
            session_ttl,
            secure,
        }
    }

    /// Builds a manager from configuration.
    ///
    /// # Errors
    ///
    /// Fails when the encryption key is not 32 bytes long.
    pub fn from_config(config: &CookieConfig) -> Result<Self, CipherError> {
        let cipher = CookieCipher::new(config.encryption_key.as_bytes())?;
        Ok(Self::new(
            cipher,
            Duration::seconds(config.auth_ttl_seconds),
            Duration::seconds(config.session_ttl_seconds),
            config.secure,
        ))
    }

    /// Lifetime of the login state cookies.
    #[must_use]
    pub fn auth_ttl(&self) -> Duration {
        self.auth_ttl
    }

    /// Lifetime of the session token cookies.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Encrypts `value` and adds it to the jar.
    ///
    /// If encryption fails the error is logged and the jar is returned
    /// unchanged; the caller continues without the cookie.
    #[must_use]
    pub fn set(&self, jar: CookieJar, kind: CookieKind, value: &str, ttl: Duration) -> CookieJar {
        match self.cipher.encrypt(value) {
            Ok(sealed) => jar.add(self.build(
                kind,
                sealed,
                OffsetDateTime::now_utc() + ttl,
                Some(ttl),
            )),
            Err(e) => {
                tracing::error!(
                    cookie = kind.name(),
                    error = %e,
                    "failed to encrypt cookie, not setting it"
                );
                jar
            }
        }
    }

    /// Returns the decrypted value of a cookie.
    ///
    /// Absent and empty cookies yield `None`, as do values that fail to
    /// decrypt (logged at warn level).
    #[must_use]
    pub fn get(&self, jar: &CookieJar, kind: CookieKind) -> Option<String> {
        let cookie = jar.get(kind.name())?;
        if cookie.value().is_empty() {
            return None;
        }
        match self.cipher.decrypt(cookie.value()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(cookie = kind.name(), error = %e, "discarding undecryptable cookie");
                None
            }
        }
    }

    /// Expires a cookie in the browser.
    #[must_use]
    pub fn clear(&self, jar: CookieJar, kind: CookieKind) -> CookieJar {
        jar.add(self.build(kind, String::new(), OffsetDateTime::UNIX_EPOCH, None))
    }

    /// Expires the ID, access and refresh token cookies.
    #[must_use]
    pub fn clear_tokens(&self, jar: CookieJar) -> CookieJar {
        CookieKind::TOKENS
            .into_iter()
            .fold(jar, |jar, kind| self.clear(jar, kind))
    }

    /// Expires the nonce and state cookies left over from a login flow.
    #[must_use]
    pub fn clear_login_state(&self, jar: CookieJar) -> CookieJar {
        self.clear(self.clear(jar, CookieKind::Nonce), CookieKind::State)
    }

    fn build(
        &self,
        kind: CookieKind,
        value: String,
        expires: OffsetDateTime,
        max_age: Option<Duration>,
    ) -> Cookie<'static> {
        let mut cookie = Cookie::build((kind.name(), value))
            .path(kind.path())
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .expires(expires);
        if let Some(max_age) = max_age {
            cookie = cookie.max_age(max_age);
        }
        cookie.build()
    }
}
