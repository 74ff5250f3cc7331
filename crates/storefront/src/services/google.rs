//! Google OAuth 2.0 sign-in.
//!
//! # OAuth Flow
//!
//! 1. Store a random `state` in the session and redirect to [`OAuthProvider::authorization_url`]
//! 2. Google redirects back with `code` and `state`
//! 3. Exchange the code with [`OAuthProvider::exchange_code`], which also
//!    fetches the profile from the `OpenID` userinfo endpoint

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use rand::distr::Alphanumeric;
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;

use modernshop_core::Email;

use crate::config::GoogleConfig;
use crate::models::GoogleProfile;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Errors talking to the identity provider.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("profile request failed: {0}")]
    Profile(String),
}

/// An OAuth identity provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Where to send the browser to start sign-in.
    fn authorization_url(&self, state: &str) -> String;

    /// Trade the callback `code` for the signed-in user's profile.
    async fn exchange_code(&self, code: &str) -> Result<GoogleProfile, OAuthError>;
}

/// A random 32-character `state` parameter.
#[must_use]
pub fn generate_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
}

impl UserInfo {
    /// Only a verified, well-formed address is kept.
    fn into_profile(self) -> GoogleProfile {
        let email = self
            .email
            .filter(|_| self.email_verified)
            .and_then(|e| Email::parse(&e).ok());
        GoogleProfile {
            id: self.sub,
            email,
            display_name: self.name,
        }
    }
}

/// Client for Google's OAuth and userinfo endpoints.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    inner: Arc<GoogleOAuthClientInner>,
}

struct GoogleOAuthClientInner {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    callback_url: String,
}

impl GoogleOAuthClient {
    #[must_use]
    pub fn new(config: &GoogleConfig) -> Self {
        Self {
            inner: Arc::new(GoogleOAuthClientInner {
                client: reqwest::Client::new(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.expose_secret().to_string(),
                callback_url: config.callback_url.clone(),
            }),
        }
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthClient {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{AUTHORIZE_URL}?\
            client_id={}&\
            response_type=code&\
            redirect_uri={}&\
            scope=openid%20email%20profile&\
            state={}",
            urlencoding::encode(&self.inner.client_id),
            urlencoding::encode(&self.inner.callback_url),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<GoogleProfile, OAuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.inner.client_id.as_str()),
            ("client_secret", self.inner.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.inner.callback_url.as_str()),
        ];

        let response = self
            .inner
            .client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OAuthError::TokenExchange(text));
        }
        let token: TokenResponse = response.json().await?;

        let response = self
            .inner
            .client
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OAuthError::Profile(format!(
                "userinfo returned {}",
                response.status()
            )));
        }
        let info: UserInfo = response.json().await?;

        Ok(info.into_profile())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use testing::ScriptedOAuthProvider;

#[cfg(any(test, feature = "test-support"))]
mod testing {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::{OAuthError, OAuthProvider};
    use crate::models::GoogleProfile;

    /// Maps authorization codes to canned profiles.
    #[derive(Default)]
    pub struct ScriptedOAuthProvider {
        profiles: HashMap<String, GoogleProfile>,
    }

    impl ScriptedOAuthProvider {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn with_profile(mut self, code: &str, profile: GoogleProfile) -> Self {
            self.profiles.insert(code.to_owned(), profile);
            self
        }
    }

    #[async_trait]
    impl OAuthProvider for ScriptedOAuthProvider {
        fn authorization_url(&self, state: &str) -> String {
            format!("https://accounts.test/authorize?state={}", urlencoding::encode(state))
        }

        async fn exchange_code(&self, code: &str) -> Result<GoogleProfile, OAuthError> {
            self.profiles
                .get(code)
                .cloned()
                .ok_or_else(|| OAuthError::TokenExchange(format!("unknown code {code}")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn test_state_is_32_alphanumerics() {
        let state = generate_state();
        assert_eq!(state.len(), 32);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(state, generate_state());
    }

    #[test]
    fn test_authorization_url_encodes_parameters() {
        let client = GoogleOAuthClient::new(&GoogleConfig {
            client_id: "id 1".to_owned(),
            client_secret: SecretString::from("s".to_owned()),
            callback_url: "http://localhost:3000/auth/google/callback".to_owned(),
        });
        let url = client.authorization_url("abc");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=id%201"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fgoogle%2Fcallback"));
        assert!(url.contains("state=abc"));
        assert!(url.contains("scope=openid%20email%20profile"));
    }

    #[test]
    fn test_unverified_email_is_dropped() {
        let info: UserInfo = serde_json::from_str(
            r#"{"sub":"g-1","email":"Bob@Mail.com","email_verified":false,"name":"Bob"}"#,
        )
        .unwrap();
        let profile = info.into_profile();
        assert_eq!(profile.id, "g-1");
        assert_eq!(profile.email, None);

        let info: UserInfo = serde_json::from_str(
            r#"{"sub":"g-1","email":"Bob@Mail.com","email_verified":true}"#,
        )
        .unwrap();
        assert_eq!(
            info.into_profile().email.unwrap().as_str(),
            "bob@mail.com"
        );
    }
}
