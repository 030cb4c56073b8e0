//! Marketplace session endpoints: password login and token refresh

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::TokenStore;
use crate::config::Config;
use crate::models::{ApiEnvelope, Role};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub name: Option<String>,
}

/// Token payload returned by both login and refresh.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub user: Option<SessionUser>,
}

async fn post_session(url: &str, body: &serde_json::Value, config: &Config) -> Result<SessionTokens> {
    tracing::debug!("Session POST {}", url);

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let resp = client
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("Session POST {} failed", url))?;

    let status = resp.status();
    let envelope: ApiEnvelope<SessionTokens> = resp
        .json()
        .await
        .with_context(|| format!("Failed to parse session response (HTTP {})", status.as_u16()))?;
    envelope
        .into_result(status.as_u16())
        .with_context(|| format!("Session request to {} rejected", url))
}

/// Store tokens (and identity, when present) from a session response.
fn store_tokens(config: &mut Config, tokens: SessionTokens) {
    config.set_access_token(tokens.access_token, tokens.expires_in);
    if let Some(rt) = tokens.refresh_token {
        config.set_refresh_token(rt);
    }
    if let Some(user) = tokens.user {
        config.set_identity(user.id, user.role);
    }
}

/// Exchange email and password for a session and persist it.
pub async fn password_login(email: &str, password: &str) -> Result<SessionUser> {
    let mut config = Config::load()?;
    let url = format!("{}/auth/login", config.api_base_url());
    let body = serde_json::json!({ "email": email, "password": password });

    let mut tokens = post_session(&url, &body, &config).await?;
    let user = tokens
        .user
        .take()
        .context("Login response missing 'user'")?;

    config.set_identity(user.id.clone(), user.role);
    store_tokens(&mut config, tokens);
    config.save()?;
    Ok(user)
}

/// Refresh the access token using the stored refresh token.
/// Returns Ok(true) if refresh succeeded, Ok(false) if there is nothing to refresh with.
pub async fn refresh() -> Result<bool> {
    let mut config = Config::load()?;
    let refresh_token = match config.get_refresh_token() {
        Some(rt) => rt,
        None => return Ok(false),
    };

    tracing::info!("Refreshing session token...");
    let url = format!("{}/auth/refresh", config.api_base_url());
    let body = serde_json::json!({ "refreshToken": refresh_token });

    let tokens = match post_session(&url, &body, &config).await {
        Ok(tokens) => tokens,
        Err(e) => {
            bail!("Session refresh failed: {:#}", e);
        }
    };
    store_tokens(&mut config, tokens);
    config.save()?;
    tracing::info!("Session token refreshed");
    Ok(true)
}
