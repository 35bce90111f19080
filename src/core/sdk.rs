//! SDK root.
//!
//! [`Finsync`] owns the session: one [`TokenStore`], one
//! [`RefreshCoordinator`], the authenticated transport stack and the record
//! store. Resource managers handed out by it share all of these.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::http::{ReqwestTransport, Transport, build_client};
use super::interceptor::CredentialInterceptor;
use super::oauth::TokenClient;
use super::refresh::{RefreshCoordinator, SessionEvent};
use super::result::ApiResult;
use super::sync::{ResourceSyncManager, SyncReport};
use crate::error::{ApiError, ApiErrorKind, Result};
use crate::models::{Account, Message, Provider, ProviderAccount, Resource, ResourceKind, Transaction};
use crate::storage::{
    AesGcmCipher, RecordStore, ResolvedConfig, SecureStorage, SqliteRecordStore, TokenStore,
};

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`Finsync`] from resolved configuration.
///
/// Each collaborator defaults to the production implementation and can be
/// replaced before [`FinsyncBuilder::build`].
pub struct FinsyncBuilder {
    config: ResolvedConfig,
    transport: Option<Arc<dyn Transport>>,
    secure: Option<Arc<dyn SecureStorage>>,
    store: Option<Arc<dyn RecordStore>>,
}

impl FinsyncBuilder {
    #[must_use]
    pub fn new(config: ResolvedConfig) -> Self {
        Self {
            config,
            transport: None,
            secure: None,
            store: None,
        }
    }

    /// Unauthenticated transport the session is layered over.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Cipher for the persisted credentials.
    #[must_use]
    pub fn secure_storage(mut self, secure: Arc<dyn SecureStorage>) -> Self {
        self.secure = Some(secure);
        self
    }

    #[must_use]
    pub fn record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the SDK, opening default collaborators for anything not supplied.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client, the keyring-backed cipher or the
    /// cache database cannot be created.
    pub fn build(self) -> Result<Finsync> {
        let config = self.config;

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let client = build_client(config.timeout, &config.api_version)?;
                Arc::new(ReqwestTransport::new(client, &config.base_url)?)
            }
        };
        let secure = match self.secure {
            Some(secure) => secure,
            None => Arc::new(AesGcmCipher::from_keyring(&config.keyring_service)?),
        };
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(SqliteRecordStore::open(&config.database_path)?),
        };

        let tokens = Arc::new(TokenStore::new(config.credentials_path.clone(), secure));
        let token_client = TokenClient::new(Arc::clone(&transport), config.token_url.clone());
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&tokens),
            Arc::new(token_client.clone()),
            config.refresh_wait_timeout,
        );
        let authenticated: Arc<dyn Transport> = Arc::new(CredentialInterceptor::new(
            transport,
            coordinator.clone(),
            config.refresh_leeway,
        ));

        debug!(
            base_url = %config.base_url,
            token_url = %config.token_url,
            timeout_secs = config.timeout.as_secs(),
            "SDK initialised"
        );

        Ok(Finsync {
            tokens,
            coordinator,
            token_client,
            transport: authenticated,
            store,
            refresh_leeway: config.refresh_leeway,
        })
    }
}

// =============================================================================
// Finsync
// =============================================================================

/// Root object owning one authenticated session.
pub struct Finsync {
    tokens: Arc<TokenStore>,
    coordinator: RefreshCoordinator,
    token_client: TokenClient,
    transport: Arc<dyn Transport>,
    store: Arc<dyn RecordStore>,
    refresh_leeway: Duration,
}

impl std::fmt::Debug for Finsync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Finsync")
            .field("authenticated", &self.tokens.is_authenticated())
            .field("coordinator", &self.coordinator)
            .field("refresh_leeway", &self.refresh_leeway)
            .finish_non_exhaustive()
    }
}

impl Finsync {
    /// Shorthand for `FinsyncBuilder::new(config).build()`.
    ///
    /// # Errors
    ///
    /// See [`FinsyncBuilder::build`].
    pub fn open(config: ResolvedConfig) -> Result<Self> {
        FinsyncBuilder::new(config).build()
    }

    #[must_use]
    pub fn builder(config: ResolvedConfig) -> FinsyncBuilder {
        FinsyncBuilder::new(config)
    }

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------

    /// Exchange user credentials for a token pair and store it.
    ///
    /// Resolves to the access token expiry.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<DateTime<Utc>> {
        let grant = match self.token_client.password_grant(username, password).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!(kind = %e.kind, "Login failed");
                return ApiResult::Error(e);
            }
        };

        let expires_at = grant.expires_at();
        if let Err(e) = self
            .tokens
            .save(grant.access_token, grant.refresh_token, expires_at)
        {
            return ApiResult::Error(ApiError::new(
                ApiErrorKind::Unknown,
                format!("store credentials: {e}"),
            ));
        }

        info!(%expires_at, "Logged in");
        self.coordinator.emit(SessionEvent::LoggedIn { expires_at });
        ApiResult::Success(expires_at)
    }

    /// Forget the stored credentials and every cached record.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials file or the cache cannot be cleared.
    pub fn logout(&self) -> Result<()> {
        self.tokens.clear()?;
        let mut removed = 0;
        for kind in ResourceKind::ALL {
            removed += self.store.clear(*kind)?;
        }
        info!(cached_rows = removed, "Logged out");
        self.coordinator.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated()
    }

    /// Session lifecycle notifications, including forced logout.
    #[must_use]
    pub fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.coordinator.subscribe()
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Number of token refreshes started by this session.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.coordinator.refresh_count()
    }

    /// Authenticated transport, for calls outside the resource managers.
    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    // -------------------------------------------------------------------------
    // Resources
    // -------------------------------------------------------------------------

    /// Manager for any resource family.
    #[must_use]
    pub fn resource<R: Resource>(&self) -> ResourceSyncManager<R> {
        ResourceSyncManager::new(Arc::clone(&self.transport), Arc::clone(&self.store))
    }

    #[must_use]
    pub fn providers(&self) -> ResourceSyncManager<Provider> {
        self.resource()
    }

    #[must_use]
    pub fn provider_accounts(&self) -> ResourceSyncManager<ProviderAccount> {
        self.resource()
    }

    #[must_use]
    pub fn accounts(&self) -> ResourceSyncManager<Account> {
        self.resource()
    }

    #[must_use]
    pub fn transactions(&self) -> ResourceSyncManager<Transaction> {
        self.resource()
    }

    #[must_use]
    pub fn messages(&self) -> ResourceSyncManager<Message> {
        self.resource()
    }

    /// Refresh every family concurrently.
    ///
    /// Outcomes follow [`ResourceKind::ALL`] order. A failure in one family
    /// does not stop the others; a 401 in several of them still triggers a
    /// single token refresh.
    pub async fn refresh_all_families(&self) -> Vec<ApiResult<SyncReport>> {
        let (providers, provider_accounts, accounts, transactions, messages) = (
            self.providers(),
            self.provider_accounts(),
            self.accounts(),
            self.transactions(),
            self.messages(),
        );
        let outcomes = futures::join!(
            providers.refresh_all(),
            provider_accounts.refresh_all(),
            accounts.refresh_all(),
            transactions.refresh_all(),
            messages.refresh_all()
        );
        vec![outcomes.0, outcomes.1, outcomes.2, outcomes.3, outcomes.4]
    }
}
