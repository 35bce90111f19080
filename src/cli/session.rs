//! `login`, `logout` and `token status`.

use std::io::BufRead;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cli::args::LoginArgs;
use crate::cli::output::{OutputOptions, emit};
use crate::core::Finsync;
use crate::error::{FinsyncError, Result};
use crate::storage::ResolvedConfig;
use crate::util::describe_expiry;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginOutput<'a> {
    username: &'a str,
    expires_at: DateTime<Utc>,
}

/// Execute `login`.
///
/// # Errors
///
/// Returns the classified login failure, or an error if no password could be read.
pub async fn login(sdk: &Finsync, args: &LoginArgs, out: OutputOptions) -> Result<()> {
    let password = match &args.password {
        Some(password) => password.clone(),
        None => read_password_line(std::io::stdin().lock())?,
    };

    let expires_at = super::settle(sdk.login(&args.username, &password).await)?;
    let output = LoginOutput {
        username: &args.username,
        expires_at,
    };
    emit(out, "login", &output, || {
        format!(
            "Logged in as {}; access token {}",
            args.username,
            describe_expiry(expires_at, Utc::now())
        )
    })
}

fn read_password_line(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(FinsyncError::ConfigInvalid {
            key: "password".to_string(),
            value: String::new(),
            message: "pass --password, set FINSYNC_PASSWORD, or pipe it on stdin".to_string(),
        });
    }
    Ok(password)
}

/// Execute `logout`.
///
/// # Errors
///
/// Returns an error if stored credentials or cached rows cannot be removed.
pub fn logout(sdk: &Finsync, out: OutputOptions) -> Result<()> {
    let was_authenticated = sdk.is_authenticated();
    sdk.logout()?;
    emit(
        out,
        "logout",
        &serde_json::json!({ "wasAuthenticated": was_authenticated }),
        || {
            if was_authenticated {
                "Logged out.".to_string()
            } else {
                "No session was stored; local cache cleared.".to_string()
            }
        },
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    pub authenticated: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
    pub refresh_due: bool,
    pub base_url: String,
    pub token_url: String,
    pub credentials_path: String,
}

impl TokenStatus {
    #[must_use]
    pub fn collect(sdk: &Finsync, config: &ResolvedConfig, now: DateTime<Utc>) -> Self {
        let tokens = sdk.tokens();
        let expires_at = tokens.expires_at();
        Self {
            authenticated: tokens.is_authenticated(),
            expires_at,
            expired: expires_at.is_some_and(|at| at <= now),
            refresh_due: tokens.needs_refresh(config.refresh_leeway),
            base_url: config.base_url.clone(),
            token_url: config.token_url.clone(),
            credentials_path: tokens.path().display().to_string(),
        }
    }

    #[must_use]
    pub fn render_human(&self, now: DateTime<Utc>) -> String {
        let Some(expires_at) = self.expires_at.filter(|_| self.authenticated) else {
            return format!("Not logged in ({})", self.base_url);
        };
        let mut line = format!(
            "Logged in to {}; access token {}",
            self.base_url,
            describe_expiry(expires_at, now)
        );
        if self.refresh_due && !self.expired {
            line.push_str(" (will refresh on next request)");
        }
        line
    }
}

/// Execute `token status`.
///
/// # Errors
///
/// Returns an error only if output serialization fails.
pub fn token_status(sdk: &Finsync, config: &ResolvedConfig, out: OutputOptions) -> Result<()> {
    let now = Utc::now();
    let status = TokenStatus::collect(sdk, config, now);
    emit(out, "token status", &status, || status.render_human(now))
}
