//! Authentication module for the marketplace API
//!
//! Password login yields an access/refresh token pair; the access token is
//! refreshed transparently when it expires or a request comes back 401.

pub mod session;
pub mod tokens;

use anyhow::{Context, Result};

use crate::config::Config;
pub use session::refresh;
pub use tokens::{StoredToken, TokenStore};

/// Environment variable consulted for the password when none is given.
pub const PASSWORD_ENV: &str = "GIGMEET_PASSWORD";

fn read_password() -> Result<String> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(pw);
        }
    }
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Log in with email and password
pub async fn login(email: &str, force: bool) -> Result<()> {
    if !force {
        let config = Config::load()?;
        if let Some(token) = config.get_access_token() {
            if !token.is_expired() {
                println!("Already logged in (session valid). Use --force to re-authenticate.");
                return Ok(());
            }
            // Try refresh before asking for a password
            if config.get_refresh_token().is_some() {
                tracing::info!("Session expired, attempting refresh...");
                match refresh().await {
                    Ok(true) => {
                        println!("Session refreshed successfully.");
                        return Ok(());
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!("Refresh failed, falling back to password: {:#}", e);
                    }
                }
            }
        }
    }

    let password = read_password()?;
    let user = session::password_login(email, &password).await?;
    println!(
        "Logged in as {} ({}).",
        user.name.as_deref().unwrap_or(&user.id),
        user.role
    );
    Ok(())
}

/// Clear stored credentials
pub async fn logout() -> Result<()> {
    let mut config = Config::load()?;
    config.clear_tokens();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Display current auth status
pub async fn status() -> Result<()> {
    let config = Config::load()?;

    println!("API:         {}", config.api_base_url());

    match config.get_access_token() {
        Some(token) if !token.is_expired() => {
            println!("Session:     valid");
            if let Some(exp) = token.expires_at {
                println!("  expires_at: {}", exp);
            }
        }
        Some(_) => {
            println!("Session:     expired");
        }
        None => {
            println!("Session:     none");
        }
    }

    match config.get_refresh_token() {
        Some(_) => println!("Refresh tok: present"),
        None => println!("Refresh tok: none"),
    }

    match (&config.user_id, config.role) {
        (Some(id), Some(role)) => println!("User:        {} ({})", id, role),
        _ => println!("User:        unknown"),
    }
    println!("UTC offset:  {} min", config.utc_offset_minutes);

    if config.get_access_token().is_none() {
        println!("\nRun 'gigmeet login <email>' to authenticate.");
    }

    Ok(())
}
