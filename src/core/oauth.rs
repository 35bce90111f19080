//! Token endpoint client.
//!
//! Two grants are supported: `refresh_token` (used by the refresh
//! coordinator) and `password` (interactive login). Both POST JSON to the
//! configured token URL and receive the same [`TokenGrant`] payload.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::http::{ApiRequest, Transport};
use super::refresh::{RefreshFailure, TokenRefresher};
use super::result::error_from_response;
use crate::error::ApiError;

/// Successful token endpoint response.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry, absolute epoch seconds.
    pub access_token_exp: i64,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("access_token_exp", &self.access_token_exp)
            .finish()
    }
}

impl TokenGrant {
    /// Expiry as a timestamp; out-of-range values are treated as already expired.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.access_token_exp, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Client for the token endpoint.
#[derive(Clone)]
pub struct TokenClient {
    transport: Arc<dyn Transport>,
    token_url: String,
}

impl std::fmt::Debug for TokenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenClient")
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

impl TokenClient {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, token_url: impl Into<String>) -> Self {
        Self {
            transport,
            token_url: token_url.into(),
        }
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; an invalid refresh token classifies as
    /// `Authentication(InvalidRefreshToken)`.
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        self.grant("refresh_token", json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        }))
        .await
    }

    /// Exchange user credentials for a token pair.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; wrong credentials classify as
    /// `Authentication(InvalidCredentials)`.
    pub async fn password_grant(&self, username: &str, password: &str) -> Result<TokenGrant, ApiError> {
        self.grant("password", json!({
            "grant_type": "password",
            "username": username,
            "password": password,
        }))
        .await
    }

    async fn grant(
        &self,
        grant_type: &'static str,
        body: serde_json::Value,
    ) -> Result<TokenGrant, ApiError> {
        let request = ApiRequest::token_grant(&self.token_url, body);

        let response = self.transport.send(&request).await.map_err(ApiError::from)?;
        if !response.is_success() {
            let err = error_from_response(&response);
            tracing::warn!(
                grant_type,
                status = response.status,
                code = err.code.as_deref().unwrap_or(""),
                "Token request rejected"
            );
            return Err(err);
        }

        let grant: TokenGrant = response
            .json()
            .map_err(|e| ApiError::deserialization(format!("token response: {e}")))?;
        tracing::debug!(grant_type, expires_at = %grant.expires_at(), "Token granted");
        Ok(grant)
    }
}

#[async_trait]
impl TokenRefresher for TokenClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshFailure> {
        self.refresh_grant(refresh_token)
            .await
            .map_err(RefreshFailure::Failed)
    }
}
