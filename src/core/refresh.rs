//! Single-flight token refresh.
//!
//! However many requests fail authentication at once, at most one refresh
//! call is in flight. The first caller moves the coordinator from `Idle` to
//! `Refreshing` and spawns the refresh as its own task; every caller (the
//! first included) parks on a oneshot and is released with that cycle's
//! outcome. Running the refresh detached means a caller that gives up or is
//! cancelled cannot leave the coordinator stuck in `Refreshing`.
//!
//! A failed refresh ends the session: stored tokens are cleared and
//! [`SessionEvent::ReauthenticationRequired`] is broadcast once. Requests
//! rejected with the same token after that get the same failure back
//! without a second event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use super::oauth::TokenGrant;
use crate::error::{ApiError, ApiErrorKind, AuthFailure};
use crate::storage::TokenStore;

/// Capacity of the session event channel.
const SESSION_EVENT_CAPACITY: usize = 16;

// =============================================================================
// Events and Failures
// =============================================================================

/// Session lifecycle notifications for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were stored by a login.
    LoggedIn { expires_at: DateTime<Utc> },
    /// The access token was replaced by a refresh.
    TokenRefreshed { expires_at: DateTime<Utc> },
    /// The session could not be renewed; tokens were cleared and the user must log in.
    ReauthenticationRequired { reason: AuthFailure },
    /// The host logged out.
    LoggedOut,
}

/// Why a refreshed token could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    /// No refresh token is stored; nothing was sent.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The token endpoint rejected the refresh or could not be reached.
    #[error("token refresh failed: {0}")]
    Failed(ApiError),

    /// This caller stopped waiting for the shared refresh.
    #[error("timed out waiting for token refresh")]
    TimedOut,

    /// The new tokens could not be persisted.
    #[error("could not store refreshed tokens: {0}")]
    Storage(String),
}

impl RefreshFailure {
    /// Classification of the failed request this refresh was meant to rescue.
    #[must_use]
    pub const fn kind(&self) -> ApiErrorKind {
        match self {
            Self::MissingRefreshToken => ApiErrorKind::Authentication(AuthFailure::MissingRefreshToken),
            Self::Failed(e) => e.kind,
            Self::TimedOut => ApiErrorKind::Timeout,
            Self::Storage(_) => ApiErrorKind::Unknown,
        }
    }

    /// Authentication reason reported with the forced-logout event.
    #[must_use]
    pub const fn auth_failure(&self) -> AuthFailure {
        match self {
            Self::MissingRefreshToken => AuthFailure::MissingRefreshToken,
            Self::Failed(ApiError {
                kind: ApiErrorKind::Authentication(reason),
                ..
            }) => *reason,
            Self::Failed(ApiError {
                kind: ApiErrorKind::Validation,
                ..
            }) => AuthFailure::InvalidRefreshToken,
            _ => AuthFailure::Other,
        }
    }

    /// Whether stored credentials were discarded because of this failure.
    #[must_use]
    pub const fn ended_session(&self) -> bool {
        !matches!(self, Self::TimedOut)
    }
}

/// Performs the actual refresh call.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange `refresh_token` for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshFailure>;
}

// =============================================================================
// Coordinator
// =============================================================================

type Outcome = Result<String, RefreshFailure>;

enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<oneshot::Sender<Outcome>> },
}

/// The session-ending failure and the access token it applied to.
struct EndedSession {
    token: Option<String>,
    failure: RefreshFailure,
}

/// Access token produced by the latest successful refresh.
struct Issued {
    access_token: String,
    lifetime: chrono::TimeDelta,
}

struct Inner {
    tokens: Arc<TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    state: Mutex<RefreshState>,
    ended: Mutex<Option<EndedSession>>,
    issued: Mutex<Option<Issued>>,
    events: broadcast::Sender<SessionEvent>,
    wait_timeout: Duration,
    refreshes: AtomicU64,
}

/// Shares one refresh among all callers that need a new access token.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("wait_timeout", &self.inner.wait_timeout)
            .field("refreshes", &self.refresh_count())
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(
        tokens: Arc<TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        wait_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                tokens,
                refresher,
                state: Mutex::new(RefreshState::Idle),
                ended: Mutex::new(None),
                issued: Mutex::new(None),
                events,
                wait_timeout,
                refreshes: AtomicU64::new(0),
            }),
        }
    }

    /// Token store this coordinator updates.
    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.inner.tokens
    }

    /// Number of refresh calls started so far.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.inner.refreshes.load(Ordering::SeqCst)
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Broadcast a session event; having no subscribers is fine.
    ///
    /// Login and logout start over, so a later failure ends the new session
    /// with its own event.
    pub fn emit(&self, event: SessionEvent) {
        if matches!(event, SessionEvent::LoggedIn { .. } | SessionEvent::LoggedOut) {
            *self.inner.ended() = None;
        }
        let _ = self.inner.events.send(event);
    }

    /// Whether `token` came from the latest refresh with a lifetime no longer
    /// than `leeway`, i.e. refreshing ahead of expiry cannot get ahead of it.
    #[must_use]
    pub fn issued_inside(&self, token: &str, leeway: Duration) -> bool {
        let leeway = chrono::TimeDelta::from_std(leeway).unwrap_or(chrono::TimeDelta::MAX);
        self.inner
            .issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|issued| issued.access_token == token && issued.lifetime <= leeway)
    }

    /// Whether a refresh is currently in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.lock(), RefreshState::Refreshing { .. })
    }

    /// Obtain an access token newer than `failed`.
    ///
    /// `failed` is the token the caller's request was rejected with (`None` if
    /// it carried none). If the stored token already differs, a refresh
    /// completed in the meantime and the stored token is returned without any
    /// network call. Otherwise the caller joins the current refresh cycle,
    /// starting one if none is running.
    ///
    /// # Errors
    ///
    /// Returns the cycle's [`RefreshFailure`], or [`RefreshFailure::TimedOut`]
    /// if the wait exceeds the configured bound.
    pub async fn refreshed_token(&self, failed: Option<&str>) -> Outcome {
        let receiver = {
            let mut state = self.inner.lock();
            let (sender, receiver) = oneshot::channel();
            if let RefreshState::Refreshing { waiters } = &mut *state {
                waiters.push(sender);
                debug!(waiting = waiters.len(), "Joined in-flight token refresh");
            } else {
                let current = self.inner.tokens.access_token();
                if let Some(current) = current.filter(|c| Some(c.as_str()) != failed) {
                    debug!("Access token already refreshed");
                    return Ok(current);
                }

                let ended = self
                    .inner
                    .ended()
                    .as_ref()
                    .filter(|e| e.token.as_deref() == failed)
                    .map(|e| e.failure.clone());
                if let Some(failure) = ended {
                    debug!("Session already ended for this token");
                    return Err(failure);
                }

                let Some(refresh_token) = self.inner.tokens.refresh_token() else {
                    drop(state);
                    let failure = RefreshFailure::MissingRefreshToken;
                    self.inner.end_session(failed.map(str::to_owned), &failure);
                    return Err(failure);
                };

                *state = RefreshState::Refreshing {
                    waiters: vec![sender],
                };
                self.inner.refreshes.fetch_add(1, Ordering::SeqCst);
                let rejected = failed.map(str::to_owned);
                tokio::spawn(Arc::clone(&self.inner).run_refresh(refresh_token, rejected));
            }
            receiver
        };

        match tokio::time::timeout(self.inner.wait_timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RefreshFailure::Failed(ApiError::network(
                "token refresh task ended without a result",
            ))),
            Err(_) => {
                warn!(
                    timeout_ms = u64::try_from(self.inner.wait_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Gave up waiting for token refresh"
                );
                Err(RefreshFailure::TimedOut)
            }
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ended(&self) -> MutexGuard<'_, Option<EndedSession>> {
        self.ended.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_refresh(self: Arc<Self>, refresh_token: String, rejected: Option<String>) {
        debug!("Refreshing access token");
        let outcome = match self.refresher.refresh(&refresh_token).await {
            Ok(grant) => {
                let expires_at = grant.expires_at();
                match self
                    .tokens
                    .save(grant.access_token.clone(), grant.refresh_token, expires_at)
                {
                    Ok(()) => {
                        info!(%expires_at, "Access token refreshed");
                        *self.issued.lock().unwrap_or_else(PoisonError::into_inner) = Some(Issued {
                            access_token: grant.access_token.clone(),
                            lifetime: expires_at - Utc::now(),
                        });
                        let _ = self.events.send(SessionEvent::TokenRefreshed { expires_at });
                        Ok(grant.access_token)
                    }
                    Err(e) => Err(RefreshFailure::Storage(e.to_string())),
                }
            }
            Err(failure) => Err(failure),
        };

        match &outcome {
            Ok(_) => *self.ended() = None,
            Err(failure) => self.end_session(rejected, failure),
        }

        let previous = std::mem::replace(&mut *self.lock(), RefreshState::Idle);
        let waiters = match previous {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        };
        debug!(released = waiters.len(), ok = outcome.is_ok(), "Releasing refresh waiters");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Clear credentials, remember why, and announce the forced logout.
    fn end_session(&self, token: Option<String>, failure: &RefreshFailure) {
        let reason = failure.auth_failure();
        warn!(reason = reason.description(), error = %failure, "Session ended; reauthentication required");
        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "Failed to remove stored credentials");
        }
        *self.ended() = Some(EndedSession {
            token,
            failure: failure.clone(),
        });
        let _ = self
            .events
            .send(SessionEvent::ReauthenticationRequired { reason });
    }
}
