//! Authenticated caller identities.
//!
//! A principal is resolved once per request by the authentication middleware
//! and is never persisted. Two flavors exist:
//! - [`ServicePrincipal`]: built from a bearer access token presented directly
//!   by a machine client. It has no login session.
//! - [`UserPrincipal`]: built from the ID token stored in the browser session
//!   cookies. It carries the login session ID and the nonce bound at login.
//!
//! Both keep the raw credential material they were built from so later steps
//! (refresh, revocation) can use it. Raw tokens never appear in the JSON form.

use serde::{Deserialize, Serialize};

/// Identity resolved from a bearer access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePrincipal {
    /// The `sub` claim of the access token.
    #[serde(rename = "sub")]
    subject: String,
    #[serde(skip)]
    access_token: String,
}

impl ServicePrincipal {
    /// Creates a service principal for the given subject.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            access_token: String::new(),
        }
    }

    /// Attaches the raw access token the principal was verified from.
    #[must_use]
    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = access_token.into();
        self
    }

    /// Returns the subject claim.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the raw access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

/// Identity resolved from the ID token of a browser login session.
///
/// Deserializing from a verified claim set fills the identity fields only;
/// the raw token fields are set by the middleware through
/// [`UserPrincipal::with_tokens`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPrincipal {
    #[serde(rename = "sub")]
    subject: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    /// Login session ID at the identity provider.
    #[serde(rename = "sid", default)]
    session_id: String,
    #[serde(default)]
    nonce: String,
    #[serde(skip)]
    id_token: String,
    #[serde(skip)]
    access_token: String,
    #[serde(skip)]
    refresh_token: String,
}

impl UserPrincipal {
    /// Creates a user principal with only a subject set.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            name: String::new(),
            email: String::new(),
            session_id: String::new(),
            nonce: String::new(),
            id_token: String::new(),
            access_token: String::new(),
            refresh_token: String::new(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Sets the login session ID.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Sets the nonce claim.
    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = nonce.into();
        self
    }

    /// Attaches the raw tokens the principal was authenticated with.
    #[must_use]
    pub fn with_tokens(
        mut self,
        id_token: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        self.id_token = id_token.into();
        self.access_token = access_token.into();
        self.refresh_token = refresh_token.into();
        self
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the nonce claim carried by the ID token.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    #[must_use]
    pub fn id_token(&self) -> &str {
        &self.id_token
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }
}

/// The caller identity attached to a request.
///
/// Which variant is present tells downstream code which credential chain
/// authenticated the request; the accessors give a uniform view over both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Principal {
    /// Authenticated through an `Authorization: Bearer` header.
    Service(ServicePrincipal),
    /// Authenticated through the session cookies.
    User(UserPrincipal),
}

impl Principal {
    /// Returns the subject identifier of the caller.
    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Self::Service(p) => p.subject(),
            Self::User(p) => p.subject(),
        }
    }

    /// Returns the login session ID, if the principal has one.
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        match self {
            Self::Service(_) => None,
            Self::User(p) => non_empty(p.session_id()),
        }
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Self::Service(p) => non_empty(p.access_token()),
            Self::User(p) => non_empty(p.access_token()),
        }
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            Self::Service(_) => None,
            Self::User(p) => non_empty(p.refresh_token()),
        }
    }

    #[must_use]
    pub fn id_token(&self) -> Option<&str> {
        match self {
            Self::Service(_) => None,
            Self::User(p) => non_empty(p.id_token()),
        }
    }
}

impl From<ServicePrincipal> for Principal {
    fn from(p: ServicePrincipal) -> Self {
        Self::Service(p)
    }
}

impl From<UserPrincipal> for Principal {
    fn from(p: UserPrincipal) -> Self {
        Self::User(p)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}
