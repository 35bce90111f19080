//! CLI argument parsing and command dispatch.

pub mod args;
pub mod output;
pub mod session;
pub mod sync;

pub use args::{CacheCommand, Cli, Commands, TokenCommand};
pub use output::OutputOptions;

use crate::core::{ApiResult, Finsync};
use crate::error::{ApiError, ApiErrorKind, FinsyncError, Result};

/// Turn a settled [`ApiResult`] into a crate result.
pub(crate) fn settle<T>(outcome: ApiResult<T>) -> Result<T> {
    match outcome.into_settled() {
        Some(result) => result.map_err(FinsyncError::from),
        None => Err(ApiError::new(ApiErrorKind::Unknown, "operation produced no outcome").into()),
    }
}

/// Like [`settle`], reporting an authentication failure that ended the
/// session as [`FinsyncError::ReauthenticationRequired`].
pub(crate) fn settle_session<T>(sdk: &Finsync, outcome: ApiResult<T>) -> Result<T> {
    settle(outcome).map_err(|e| match e.api_kind() {
        Some(ApiErrorKind::Authentication(reason)) if !sdk.is_authenticated() => {
            FinsyncError::ReauthenticationRequired { reason }
        }
        _ => e,
    })
}
