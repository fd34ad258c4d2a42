//! Google sign-in (OAuth 2.0 authorization code flow).

use rand::Rng;
use rand::distr::Alphanumeric;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use crate::config::GoogleOAuthConfig;
use crate::services::auth::AuthError;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Path Google redirects back to, relative to the public base URL.
pub const CALLBACK_PATH: &str = "/api/v2/auth/google/callback";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Profile fields from the userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: String,
}

/// Google OAuth client.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
}

impl GoogleOAuthClient {
    /// Create a client that redirects back to `{base_url}{CALLBACK_PATH}`.
    #[must_use]
    pub fn new(config: &GoogleOAuthConfig, base_url: &str, client: reqwest::Client) -> Self {
        Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: format!("{}{CALLBACK_PATH}", base_url.trim_end_matches('/')),
        }
    }

    /// Consent screen URL carrying `state`.
    #[must_use]
    pub fn authorization_url(&self, state: &str) -> String {
        Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
                ("prompt", "select_account"),
            ],
        )
        .map(String::from)
        .unwrap_or_else(|_| AUTHORIZE_URL.to_owned())
    }

    /// Exchange an authorization code and fetch the signed-in profile.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::OAuthProvider` if either call fails or the email
    /// is not verified by Google.
    pub async fn exchange_code(&self, code: &str) -> Result<GoogleProfile, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(provider_error)?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::OAuthProvider(format!(
                "Token exchange failed: {text}"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(provider_error)?;

        let profile: GoogleProfile = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(provider_error)?
            .json()
            .await
            .map_err(provider_error)?;

        if !profile.email_verified {
            return Err(AuthError::OAuthProvider("email not verified".to_owned()));
        }

        Ok(profile)
    }
}

fn provider_error(e: reqwest::Error) -> AuthError {
    AuthError::OAuthProvider(e.to_string())
}

/// Random CSRF `state` value.
#[must_use]
pub fn generate_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> GoogleOAuthClient {
        GoogleOAuthClient::new(
            &GoogleOAuthConfig {
                client_id: "abc.apps.googleusercontent.com".to_owned(),
                client_secret: SecretString::from("shh"),
            },
            "https://api.example.com/",
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_authorization_url() {
        let url = Url::parse(&client().authorization_url("xyz")).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["state"], "xyz");
        assert_eq!(params["response_type"], "code");
        assert_eq!(
            params["redirect_uri"],
            "https://api.example.com/api/v2/auth/google/callback"
        );
    }

    #[test]
    fn test_state_is_random() {
        let a = generate_state();
        assert_eq!(a.len(), 32);
        assert_ne!(a, generate_state());
    }
}
