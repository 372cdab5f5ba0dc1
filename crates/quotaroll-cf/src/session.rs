//! Authenticated session against the Cloud Foundry API
//!
//! Login is a two step exchange: `GET {api}/v2/info` names the UAA token
//! endpoint, then a client-credentials grant against
//! `{token_endpoint}/oauth/token` yields a bearer token. The token is cached
//! and exchanged again shortly before it expires, so a long pagination run
//! does not fail halfway through.

use chrono::{DateTime, Duration, Utc};
use quotaroll_core::error::{QuotarollError, Result};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Form body of the client-credentials grant
const TOKEN_REQUEST_BODY: &str = "grant_type=client_credentials&response_type=token";

/// Tokens this close to expiry are exchanged again before use
const REFRESH_MARGIN_SECS: i64 = 30;

/// Lifetime assumed when the token response omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct InfoResponse {
    token_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Authenticated client for one API endpoint
pub struct CfSession {
    client: reqwest::Client,
    api_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<AccessToken>>,
}

impl CfSession {
    /// Discover the token endpoint and authenticate.
    ///
    /// # Errors
    ///
    /// Returns `QuotarollError::Fetch` if either request fails or answers
    /// with a non-success status.
    pub async fn login(api_url: &str, client_id: &str, client_secret: &str) -> Result<Self> {
        let client = reqwest::Client::new();
        let api_url = api_url.trim_end_matches('/').to_string();

        let info_url = format!("{api_url}/v2/info");
        let info: InfoResponse = send_json(client.get(&info_url), &info_url).await?;
        debug!("Token endpoint is {}", info.token_endpoint);

        let session = Self {
            token_url: format!("{}/oauth/token", info.token_endpoint.trim_end_matches('/')),
            client,
            api_url,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: RwLock::new(None),
        };
        session.refresh_token().await?;
        info!("Authenticated against {}", session.api_url);
        Ok(session)
    }

    /// Base URL of the API, without a trailing slash
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Absolute URL for an API path; absolute URLs pass through unchanged
    pub fn resolve(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else if path_or_url.starts_with('/') {
            format!("{}{}", self.api_url, path_or_url)
        } else {
            format!("{}/{}", self.api_url, path_or_url)
        }
    }

    /// Authenticated GET, decoding the JSON body
    pub async fn get<T: DeserializeOwned>(&self, path_or_url: &str) -> Result<T> {
        let url = self.resolve(path_or_url);
        let token = self.bearer_token().await?;
        send_json(self.client.get(&url).bearer_auth(token), &url).await
    }

    /// Current token, exchanging a new one when it is about to expire
    async fn bearer_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if let Some(token) = token.as_ref().filter(|t| t.is_fresh(Utc::now())) {
                return Ok(token.value.clone());
            }
        }
        debug!("Access token expired or about to expire, re-authenticating");
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> Result<String> {
        let mut cache = self.token.write().await;
        if let Some(token) = cache.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let request = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(TOKEN_REQUEST_BODY);
        let response: TokenResponse = send_json(request, &self.token_url).await?;

        let lifetime = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let token = AccessToken {
            value: response.access_token,
            expires_at: Utc::now() + Duration::seconds(lifetime),
        };
        let value = token.value.clone();
        *cache = Some(token);
        Ok(value)
    }
}

fn fetch_error(url: &str, reason: impl Into<String>) -> QuotarollError {
    QuotarollError::Fetch {
        url: url.to_string(),
        reason: reason.into(),
    }
}

async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder, url: &str) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| fetch_error(url, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(fetch_error(url, format!("status {status}: {}", body.trim())));
    }

    response
        .json()
        .await
        .map_err(|e| fetch_error(url, format!("invalid response body: {e}")))
}
