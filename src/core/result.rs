//! Uniform wrapping of network outcomes.
//!
//! Every remote call ends as an [`ApiResult`]. Classification into an
//! [`ApiErrorKind`] happens here, once; callers never look at raw statuses.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::http::{ApiResponse, TransportFailure};
use crate::error::{ApiError, ApiErrorKind};

/// Tri-state outcome observed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum ApiResult<T> {
    /// No outcome yet.
    Loading,
    Success(T),
    Error(ApiError),
}

impl<T> Default for ApiResult<T> {
    fn default() -> Self {
        Self::Loading
    }
}

impl<T> ApiResult<T> {
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub const fn error(&self) -> Option<&ApiError> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Transform the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResult<U> {
        match self {
            Self::Loading => ApiResult::Loading,
            Self::Success(value) => ApiResult::Success(f(value)),
            Self::Error(e) => ApiResult::Error(e),
        }
    }

    /// `None` while loading; otherwise the settled outcome.
    pub fn into_settled(self) -> Option<Result<T, ApiError>> {
        match self {
            Self::Loading => None,
            Self::Success(value) => Some(Ok(value)),
            Self::Error(e) => Some(Err(e)),
        }
    }
}

impl<T> From<Result<T, ApiError>> for ApiResult<T> {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) => Self::Error(e),
        }
    }
}

// =============================================================================
// Classification
// =============================================================================

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Classify a non-2xx response.
///
/// Structured bodies (`{"error": {"error_code", "message"}}`) are classified
/// by status and server code. Without one the response is a generic
/// `Network` error, except 401 and 403, which keep their authentication and
/// authorization kinds. A refresh annotation overrides the kind with the
/// refresh failure's.
#[must_use]
pub fn error_from_response(response: &ApiResponse) -> ApiError {
    let mut error = match serde_json::from_slice::<ErrorEnvelope>(&response.body) {
        Ok(envelope) => {
            let message = envelope
                .error
                .message
                .unwrap_or_else(|| format!("HTTP {}", response.status));
            ApiError::from_status(response.status, envelope.error.error_code, message)
        }
        Err(_) if matches!(response.status, 401 | 403) => {
            ApiError::from_status(response.status, None, format!("HTTP {}", response.status))
        }
        Err(_) => ApiError {
            status: Some(response.status),
            ..ApiError::network(format!("HTTP {}", response.status))
        },
    };

    if let Some(failure) = &response.refresh_failure {
        error.kind = failure.kind();
        error.message = format!("{} ({failure})", error.message);
    }
    error
}

impl From<TransportFailure> for ApiError {
    fn from(failure: TransportFailure) -> Self {
        match failure {
            TransportFailure::Timeout(message) => Self::timeout(message),
            TransportFailure::Connect(message) | TransportFailure::Other(message) => {
                Self::network(message)
            }
            TransportFailure::Reauthentication(refresh) => {
                Self::new(refresh.kind(), refresh.to_string())
            }
        }
    }
}

/// Turn a transport outcome into an [`ApiResult`].
///
/// 2xx bodies decode into `T` (an undecodable body is a `Deserialization`
/// error); everything else is classified. No retries happen here.
pub fn into_result<T: DeserializeOwned>(
    outcome: Result<ApiResponse, TransportFailure>,
) -> ApiResult<T> {
    match outcome {
        Err(failure) => {
            tracing::debug!(error = %failure, "Request produced no response");
            ApiResult::Error(failure.into())
        }
        Ok(response) if response.is_success() => match response.json::<T>() {
            Ok(value) => ApiResult::Success(value),
            Err(e) => {
                tracing::warn!(status = response.status, error = %e, "Response body did not decode");
                ApiResult::Error(ApiError {
                    kind: ApiErrorKind::Deserialization,
                    status: Some(response.status),
                    code: None,
                    message: e.to_string(),
                })
            }
        },
        Ok(response) => {
            let error = error_from_response(&response);
            tracing::debug!(
                status = response.status,
                kind = %error.kind,
                code = error.code.as_deref().unwrap_or(""),
                "Request failed"
            );
            ApiResult::Error(error)
        }
    }
}

/// Like [`into_result`] for calls whose success body is irrelevant (e.g. DELETE).
pub fn into_unit_result(outcome: Result<ApiResponse, TransportFailure>) -> ApiResult<()> {
    match outcome {
        Ok(response) if response.is_success() => ApiResult::Success(()),
        other => into_result::<serde_json::Value>(other).map(|_| ()),
    }
}
