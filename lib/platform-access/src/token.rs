//! Token material returned by the identity provider.

use serde::{Deserialize, Serialize};

/// Tokens obtained from an authorization-code exchange or a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenSet {
    /// Creates a token set holding only an access token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            id_token: None,
            refresh_token: None,
        }
    }

    #[must_use]
    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Keeps `previous` as the refresh token when the provider did not
    /// rotate it.
    #[must_use]
    pub fn or_refresh_token(mut self, previous: &str) -> Self {
        if self.refresh_token.as_deref().is_none_or(str::is_empty) && !previous.is_empty() {
            self.refresh_token = Some(previous.to_string());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotated_refresh_token_wins() {
        let tokens = TokenSet::new("access")
            .with_refresh_token("rotated")
            .or_refresh_token("previous");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rotated"));
    }

    #[test]
    fn previous_refresh_token_carried_over() {
        let tokens = TokenSet::new("access").or_refresh_token("previous");
        assert_eq!(tokens.refresh_token.as_deref(), Some("previous"));

        let none = TokenSet::new("access").or_refresh_token("");
        assert_eq!(none.refresh_token, None);
    }

    #[test]
    fn deserializes_provider_shape() {
        let tokens: TokenSet = serde_json::from_str(
            r#"{"access_token":"a","id_token":"i","token_type":"bearer","expires_in":3600}"#,
        )
        .expect("deserialize");
        assert_eq!(tokens.access_token, "a");
        assert_eq!(tokens.id_token.as_deref(), Some("i"));
        assert_eq!(tokens.refresh_token, None);
    }
}
