//! Bearer credentials for outgoing requests.
//!
//! [`CredentialInterceptor`] wraps another [`Transport`]. It attaches the
//! stored access token, and when the server answers 401 it obtains a fresh
//! token from the [`RefreshCoordinator`] and replays the request once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::http::{ApiRequest, ApiResponse, RequestKind, Transport, TransportFailure};
use super::refresh::RefreshCoordinator;

/// Transport decorator that authenticates requests.
pub struct CredentialInterceptor {
    inner: Arc<dyn Transport>,
    coordinator: RefreshCoordinator,
    refresh_leeway: Duration,
}

impl std::fmt::Debug for CredentialInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialInterceptor")
            .field("coordinator", &self.coordinator)
            .field("refresh_leeway", &self.refresh_leeway)
            .finish_non_exhaustive()
    }
}

impl CredentialInterceptor {
    /// `refresh_leeway` of zero disables refreshing ahead of expiry.
    #[must_use]
    pub fn new(
        inner: Arc<dyn Transport>,
        coordinator: RefreshCoordinator,
        refresh_leeway: Duration,
    ) -> Self {
        Self {
            inner,
            coordinator,
            refresh_leeway,
        }
    }

    /// Token to send with the next request, refreshing first if it is about to expire.
    async fn current_token(&self) -> Result<Option<String>, TransportFailure> {
        let tokens = self.coordinator.tokens();
        if !self.refresh_leeway.is_zero() && tokens.needs_refresh(self.refresh_leeway) {
            let current = tokens.access_token();
            if current
                .as_deref()
                .is_some_and(|t| self.coordinator.issued_inside(t, self.refresh_leeway))
            {
                debug!("Refreshed token already expires within leeway; sending as is");
                return Ok(current);
            }
            debug!("Access token near expiry; refreshing before send");
            return self
                .coordinator
                .refreshed_token(current.as_deref())
                .await
                .map(Some)
                .map_err(TransportFailure::Reauthentication);
        }
        Ok(tokens.access_token())
    }
}

fn authorize(request: &ApiRequest, token: Option<&str>) -> ApiRequest {
    token.map_or_else(|| request.clone(), |t| request.with_bearer(t))
}

#[async_trait]
impl Transport for CredentialInterceptor {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportFailure> {
        if request.kind == RequestKind::TokenGrant {
            return self.inner.send(request).await;
        }

        let token = self.current_token().await?;
        let response = self.inner.send(&authorize(request, token.as_deref())).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        debug!(path = %request.target, "Request unauthorized; refreshing session");
        match self.coordinator.refreshed_token(token.as_deref()).await {
            Ok(fresh) => {
                // Exactly one replay; its response is final whatever the status.
                let replayed = self.inner.send(&request.with_bearer(&fresh)).await?;
                if replayed.is_unauthorized() {
                    warn!(path = %request.target, "Request unauthorized after token refresh");
                }
                Ok(replayed)
            }
            Err(failure) => {
                debug!(path = %request.target, error = %failure, "Session refresh failed");
                Ok(ApiResponse {
                    refresh_failure: Some(failure),
                    ..response
                })
            }
        }
    }
}
