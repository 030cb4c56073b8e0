//! Authenticated HTTP client for the marketplace API
//!
//! Wraps reqwest::Client with bearer token injection, a single
//! refresh-and-retry on 401, and envelope unwrapping.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::TokenStore;
use crate::config::Config;
use crate::error::MeetingError;
use crate::models::ApiEnvelope;

const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Authenticated marketplace client.
pub struct MarketplaceClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    access_token: RwLock<String>,
}

impl MarketplaceClient {
    /// Load config and build client. Attempts token refresh if the access token is expired.
    pub async fn new() -> Result<Self> {
        let mut config = Config::load()?;

        let needs_refresh = config.get_access_token().map_or(true, |t| t.is_expired());
        if needs_refresh {
            if config.get_refresh_token().is_some() {
                tracing::info!("Session missing or expired, refreshing...");
                match crate::auth::refresh().await {
                    Ok(true) => {
                        config = Config::load()?;
                        tracing::info!("Token refreshed");
                    }
                    Ok(false) => {
                        bail!("No refresh token available. Run 'gigmeet login'.");
                    }
                    Err(e) => {
                        bail!("Token refresh failed: {:#}. Run 'gigmeet login'.", e);
                    }
                }
            } else {
                bail!("Session expired and no refresh token. Run 'gigmeet login'.");
            }
        }

        let token = config
            .get_access_token()
            .context("No session. Run 'gigmeet login' first.")?;
        Self::with_token(config.api_base_url(), token.token, config.request_timeout())
    }

    /// Build a client around an explicit token, without touching stored config.
    pub fn with_token(base_url: String, token: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            access_token: RwLock::new(token),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path` with `query` encoded as URL parameters.
    pub async fn get<T, Q>(&self, path: &str, query: &Q) -> Result<T, MeetingError>
    where
        T: DeserializeOwned,
        Q: Serialize + Sync,
    {
        let url = self.url(path);
        self.execute("GET", &url, || self.http.get(&url).query(query))
            .await
    }

    /// POST `body` as JSON to `path`.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, MeetingError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let url = self.url(path);
        self.execute("POST", &url, || self.http.post(&url).json(body))
            .await
    }

    async fn execute<T, F>(&self, method: &str, url: &str, make: F) -> Result<T, MeetingError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut refreshed = false;
        loop {
            let token = self.access_token.read().await.clone();
            let request_id = Uuid::new_v4().to_string();
            tracing::debug!("{} {} [{}]", method, url, request_id);

            let resp = make()
                .bearer_auth(&token)
                .header(REQUEST_ID_HEADER, &request_id)
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;

            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED && !refreshed {
                tracing::info!("401 for {} {}, refreshing session", method, url);
                refreshed = true;
                self.refresh_session().await?;
                continue;
            }

            let body = resp.text().await.map_err(|e| self.transport_error(e))?;
            tracing::debug!("{} {} -> {}", method, url, status.as_u16());
            return parse_envelope(status.as_u16(), &body);
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> MeetingError {
        if e.is_timeout() {
            MeetingError::Timeout(self.timeout.as_secs())
        } else {
            MeetingError::from(e)
        }
    }

    async fn refresh_session(&self) -> Result<(), MeetingError> {
        match crate::auth::refresh().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(MeetingError::Session(
                    "no refresh token; run 'gigmeet login'".into(),
                ))
            }
            Err(e) => return Err(MeetingError::Session(format!("{:#}", e))),
        }
        let token = Config::load()
            .ok()
            .and_then(|c| c.get_access_token())
            .ok_or_else(|| MeetingError::Session("refresh stored no access token".into()))?;
        *self.access_token.write().await = token.token;
        Ok(())
    }
}

/// Decode a response body into its payload.
///
/// Bodies that are not an envelope still map to the taxonomy by status.
pub fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, MeetingError> {
    match serde_json::from_str::<ApiEnvelope<T>>(body) {
        Ok(envelope) => envelope.into_result(status),
        Err(e) if (200..300).contains(&status) => {
            Err(MeetingError::Api(format!("malformed response: {}", e)))
        }
        Err(_) => {
            let snippet: String = body.chars().take(200).collect();
            let message = if snippet.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, snippet)
            };
            Err(MeetingError::from_status(status, message))
        }
    }
}
