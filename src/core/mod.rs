//! Authenticated transport, token refresh, and resource synchronisation.

pub mod http;
pub mod interceptor;
pub mod logging;
pub mod oauth;
pub mod refresh;
pub mod result;
pub mod sdk;
pub mod sync;

pub use http::{
    ApiRequest, ApiResponse, HttpMethod, ReqwestTransport, RequestKind, Transport,
    TransportFailure, build_client,
};
pub use interceptor::CredentialInterceptor;
pub use oauth::{TokenClient, TokenGrant};
pub use refresh::{RefreshCoordinator, RefreshFailure, SessionEvent, TokenRefresher};
pub use result::{ApiResult, error_from_response, into_result, into_unit_result};
pub use sdk::{Finsync, FinsyncBuilder};
pub use sync::{ResourceSyncManager, SyncReport};
