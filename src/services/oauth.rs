use url::Url;
use zeroize::Zeroizing;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::session::TokenGrant,
};

/// Client for the identity platform's authorize and token endpoints.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: Zeroizing<String>,
    redirect_uri: String,
    scopes: String,
    authorize_endpoint: Url,
    token_endpoint: String,
}

impl OAuthClient {
    /// Creates a new `OAuthClient` sharing the given connection pool.
    pub fn new(config: &Config, http: reqwest::Client) -> Result<Self> {
        let authorize_endpoint = Url::parse(&config.authorize_url())
            .map_err(|e| AppError::Internal(format!("Invalid authorize URL: {}", e)))?;

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            authorize_endpoint,
            token_endpoint: config.token_url(),
        })
    }

    /// Builds the URL the browser is sent to in order to sign in.
    pub fn authorize_url(&self, state: &str) -> String {
        let mut url = self.authorize_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &self.scopes)
            .append_pair("state", state);
        url.into()
    }

    /// Exchanges an authorization code for the first token set of a session.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        self.request_token(&[("grant_type", "authorization_code"), ("code", code)])
            .await
    }

    /// Exchanges a refresh token for a new token set.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn request_token(&self, grant: &[(&str, &str)]) -> Result<TokenGrant> {
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", self.scopes.as_str()),
        ];
        form.extend_from_slice(grant);

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            tracing::warn!(
                "Token endpoint rejected request ({}): {}",
                status,
                String::from_utf8_lossy(&body)
            );
            return Err(AppError::Upstream { status, body });
        }

        sonic_rs::from_slice(&body)
            .map_err(|e| AppError::Internal(format!("Malformed token response: {}", e)))
    }
}
