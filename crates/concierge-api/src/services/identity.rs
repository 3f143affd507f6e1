//! OAuth2 identity provider client (authorize URL + token endpoint)

use super::{IdentityProvider, error_detail};
use crate::{
    error::{Error, Result},
    types::Scopes,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Static OAuth2 client registration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
}

impl OAuthSettings {
    /// Report the first missing field, if any
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
            ("redirect_uri", &self.redirect_uri),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("identity.{} is not set", name)));
            }
        }
        Ok(())
    }
}

/// OAuth2 client talking to a real identity provider
pub struct OAuthClient {
    client: reqwest::Client,
    settings: OAuthSettings,
}

impl OAuthClient {
    pub fn new(settings: OAuthSettings) -> Self {
        Self::with_client(reqwest::Client::new(), settings)
    }

    pub fn with_client(client: reqwest::Client, settings: OAuthSettings) -> Self {
        Self { client, settings }
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<String> {
        let response = self
            .client
            .post(&self.settings.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "Token endpoint rejected request");
            return Err(Error::api(status.as_u16(), error_detail(&body)));
        }

        parse_token_response(&body)
    }
}

#[async_trait]
impl IdentityProvider for OAuthClient {
    fn authorization_url(&self, scopes: &Scopes, nonce: &str) -> String {
        let scope = scopes.joined();
        let auth_params = [
            ("client_id", self.settings.client_id.as_str()),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("response_type", "code"),
            ("response_mode", "query"),
            ("state", nonce),
            ("nonce", nonce),
        ];

        let params_str = auth_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", self.settings.authorize_url, params_str)
    }

    async fn client_credentials(&self, scopes: &Scopes) -> Result<String> {
        let scope = scopes.joined();
        tracing::debug!(scope = %scope, "Requesting client-credentials token");
        self.request_token(&[
            ("grant_type", "client_credentials"),
            ("scope", &scope),
            ("client_id", &self.settings.client_id),
            ("client_secret", &self.settings.client_secret),
        ])
        .await
    }

    async fn exchange_code(&self, code: &str, scopes: &Scopes) -> Result<String> {
        let scope = scopes.joined();
        tracing::debug!(scope = %scope, "Exchanging authorization code");
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("scope", &scope),
            ("redirect_uri", &self.settings.redirect_uri),
            ("client_id", &self.settings.client_id),
            ("client_secret", &self.settings.client_secret),
        ])
        .await
    }
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

fn parse_token_response(body: &str) -> Result<String> {
    let data: TokenResponse = serde_json::from_str(body)
        .map_err(|e| Error::MalformedToken(format!("Failed to parse token response: {}", e)))?;
    match data.access_token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(Error::MalformedToken(
            "Token response has no access_token".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> OAuthSettings {
        OAuthSettings {
            client_id: "concierge-client".into(),
            client_secret: "s3cret".into(),
            authorize_url: "https://idp.example.com/oauth2/authorize".into(),
            token_url: "https://idp.example.com/oauth2/token".into(),
            redirect_uri: "http://localhost:3000/callback".into(),
        }
    }

    #[test]
    fn test_authorization_url_carries_all_params() {
        let client = OAuthClient::new(settings());
        let url = client.authorization_url(
            &Scopes::new(["openid", "create_bookings"]),
            "a1b2c3d4e5f60718",
        );

        assert!(url.starts_with("https://idp.example.com/oauth2/authorize?"));
        assert!(url.contains("client_id=concierge-client"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback"));
        assert!(url.contains("scope=create_bookings%20openid"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("response_mode=query"));
        assert!(url.contains("state=a1b2c3d4e5f60718"));
        assert!(url.contains("nonce=a1b2c3d4e5f60718"));
        assert!(!url.contains("s3cret"));
    }

    #[test]
    fn test_parse_token_response() {
        let token = parse_token_response(
            r#"{"access_token": "abc", "token_type": "Bearer", "expires_in": 3600}"#,
        )
        .unwrap();
        assert_eq!(token, "abc");
    }

    #[test]
    fn test_token_response_without_access_token_is_malformed() {
        let err = parse_token_response(r#"{"token_type": "Bearer"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedToken(_)));

        let err = parse_token_response("<html>oops</html>").unwrap_err();
        assert!(matches!(err, Error::MalformedToken(_)));
    }

    #[test]
    fn test_settings_validation() {
        assert!(settings().validate().is_ok());

        let mut missing = settings();
        missing.client_secret = String::new();
        let err = missing.validate().unwrap_err();
        assert!(err.to_string().contains("client_secret"));
    }
}
