//! Error types for finsync.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Two layers of errors live here:
//!
//! - [`ApiError`] / [`ApiErrorKind`]: the closed classification of a remote
//!   call outcome. Classification happens exactly once, at the network result
//!   boundary (see [`classify`]); everything downstream branches on the kind,
//!   never on raw status codes.
//! - [`FinsyncError`]: the crate-wide error for local failures (configuration,
//!   storage, secure storage) and for API errors that escape to the host.
//!
//! `FinsyncError` is categorized into six categories:
//! - **Authentication**: missing or rejected credentials
//! - **Network**: timeouts and connectivity
//! - **Configuration**: config file parsing and validation
//! - **Storage**: local cache and credential persistence
//! - **Api**: classified remote failures that are not auth or network
//! - **Internal**: unexpected errors
//!
//! Each error has a stable error code (e.g., `FSYNC-A001`) for programmatic handling.

pub mod suggestions;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use suggestions::FixSuggestion;

// =============================================================================
// API Error Classification
// =============================================================================

/// Reason an authentication failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailure {
    /// Access token expired or revoked.
    InvalidAccessToken,
    /// Refresh token expired or revoked.
    InvalidRefreshToken,
    /// Username/password rejected during login.
    InvalidCredentials,
    /// The user has been suspended.
    SuspendedUser,
    /// This device has been suspended.
    SuspendedDevice,
    /// Too many failed attempts; the account is locked.
    AccountLocked,
    /// No refresh token is stored, so no refresh was attempted.
    MissingRefreshToken,
    /// Any other authentication failure.
    Other,
}

impl AuthFailure {
    /// Short human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::InvalidAccessToken => "access token invalid or expired",
            Self::InvalidRefreshToken => "refresh token invalid or expired",
            Self::InvalidCredentials => "invalid username or password",
            Self::SuspendedUser => "user suspended",
            Self::SuspendedDevice => "device suspended",
            Self::AccountLocked => "account locked",
            Self::MissingRefreshToken => "no refresh token available",
            Self::Other => "authentication failed",
        }
    }
}

/// Closed set of remote failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum ApiErrorKind {
    /// Credentials missing, invalid, or suspended (HTTP 401).
    Authentication(AuthFailure),
    /// Valid credentials without permission (HTTP 403).
    Authorization,
    /// Malformed request parameters (HTTP 400/422).
    Validation,
    /// Resource does not exist (HTTP 404).
    NotFound,
    /// Resource already exists or state conflict (HTTP 409).
    Conflict,
    /// Too many requests (HTTP 429).
    RateLimited,
    /// Server-side failure (HTTP 5xx).
    Server,
    /// Connectivity failure before a response arrived.
    Network,
    /// The request or a refresh wait timed out.
    Timeout,
    /// Response body could not be decoded.
    Deserialization,
    /// Anything else.
    Unknown,
}

impl ApiErrorKind {
    /// Whether this kind is an authentication failure.
    #[must_use]
    pub const fn is_authentication(self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Whether this kind is reported by the server (as opposed to the transport or decoder).
    #[must_use]
    pub const fn is_server_reported(self) -> bool {
        !matches!(self, Self::Network | Self::Timeout | Self::Deserialization)
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication(reason) => write!(f, "authentication error ({})", reason.description()),
            Self::Authorization => write!(f, "authorization error"),
            Self::Validation => write!(f, "validation error"),
            Self::NotFound => write!(f, "not found"),
            Self::Conflict => write!(f, "conflict"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Server => write!(f, "server error"),
            Self::Network => write!(f, "network error"),
            Self::Timeout => write!(f, "timeout"),
            Self::Deserialization => write!(f, "invalid response"),
            Self::Unknown => write!(f, "unknown error"),
        }
    }
}

/// A classified remote failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    /// Classification.
    pub kind: ApiErrorKind,
    /// HTTP status code, when a response was received.
    pub status: Option<u16>,
    /// Server-supplied error code (e.g. `F0101`), when present.
    pub code: Option<String>,
    /// Human-readable detail; the server message when one was supplied.
    pub message: String,
}

impl ApiError {
    /// Create an error with no status or server code.
    #[must_use]
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// Create an error classified from a status code and optional server code.
    #[must_use]
    pub fn from_status(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind: classify(status, code.as_deref()),
            status: Some(status),
            code,
            message: message.into(),
        }
    }

    /// Generic connectivity error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    /// Timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Timeout, message)
    }

    /// Body could not be decoded.
    #[must_use]
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Deserialization, message)
    }
}

// Server error codes.
const CODE_INVALID_ACCESS_TOKEN: &str = "F0101";
const CODE_INVALID_REFRESH_TOKEN: &str = "F0110";
const CODE_INVALID_USERNAME_PASSWORD: &str = "F0111";
const CODE_SUSPENDED_USER: &str = "F0112";
const CODE_SUSPENDED_DEVICE: &str = "F0113";
const CODE_ACCOUNT_LOCKED: &str = "F0114";
const CODE_NOT_FOUND: &str = "F0300";
const CODE_ALREADY_EXISTS: &str = "F0400";

/// Classify a remote failure.
///
/// Pure function of the HTTP status and the optional server error code. The
/// status decides the family; the code refines it (authentication reason) or
/// overrides it when the server reports a more specific condition.
#[must_use]
pub fn classify(status: u16, code: Option<&str>) -> ApiErrorKind {
    if let Some(code) = code {
        match code {
            CODE_INVALID_ACCESS_TOKEN => {
                return ApiErrorKind::Authentication(AuthFailure::InvalidAccessToken);
            }
            CODE_INVALID_REFRESH_TOKEN => {
                return ApiErrorKind::Authentication(AuthFailure::InvalidRefreshToken);
            }
            CODE_INVALID_USERNAME_PASSWORD => {
                return ApiErrorKind::Authentication(AuthFailure::InvalidCredentials);
            }
            CODE_SUSPENDED_USER => return ApiErrorKind::Authentication(AuthFailure::SuspendedUser),
            CODE_SUSPENDED_DEVICE => {
                return ApiErrorKind::Authentication(AuthFailure::SuspendedDevice);
            }
            CODE_ACCOUNT_LOCKED => return ApiErrorKind::Authentication(AuthFailure::AccountLocked),
            CODE_NOT_FOUND => return ApiErrorKind::NotFound,
            CODE_ALREADY_EXISTS => return ApiErrorKind::Conflict,
            c if c.starts_with("F000") => return ApiErrorKind::Validation,
            c if c.starts_with("F9") => return ApiErrorKind::Server,
            _ => {}
        }
    }

    match status {
        400 | 422 => ApiErrorKind::Validation,
        401 => ApiErrorKind::Authentication(AuthFailure::Other),
        403 => ApiErrorKind::Authorization,
        404 => ApiErrorKind::NotFound,
        408 | 504 => ApiErrorKind::Timeout,
        409 => ApiErrorKind::Conflict,
        429 => ApiErrorKind::RateLimited,
        500..=599 => ApiErrorKind::Server,
        _ => ApiErrorKind::Unknown,
    }
}

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing, rejected, or suspended credentials.
    Authentication,
    /// Timeouts and connectivity.
    Network,
    /// Config file parsing, validation, or missing values.
    Configuration,
    /// Local cache or credential persistence.
    Storage,
    /// Classified remote failures other than auth/network.
    Api,
    /// Unexpected errors.
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Authentication => "Authentication error",
            Self::Network => "Network error",
            Self::Configuration => "Configuration error",
            Self::Storage => "Storage error",
            Self::Api => "API error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Authentication => "A",
            Self::Network => "N",
            Self::Configuration => "C",
            Self::Storage => "S",
            Self::Api => "P",
            Self::Internal => "X",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for the command-line host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Not logged in, or the session was revoked
    AuthRequired = 2,
    /// Bad configuration or arguments
    ConfigError = 3,
    /// Timeout
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

// =============================================================================
// Crate Error
// =============================================================================

/// Main error type for finsync operations.
#[derive(Error, Debug)]
pub enum FinsyncError {
    // ==========================================================================
    // Authentication errors (Category: Authentication)
    // ==========================================================================
    /// No credentials are stored.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The session ended and the user must log in again.
    #[error("reauthentication required: {}", .reason.description())]
    ReauthenticationRequired { reason: AuthFailure },

    // ==========================================================================
    // Remote errors (Category: depends on kind)
    // ==========================================================================
    /// A classified remote failure.
    #[error(transparent)]
    Api(#[from] ApiError),

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    /// Unknown resource family name.
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    // ==========================================================================
    // Storage errors (Category: Storage)
    // ==========================================================================
    /// Local record cache failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// Secure storage (keystore or cipher) failure.
    #[error("secure storage error: {0}")]
    SecureStorage(String),

    // ==========================================================================
    // I/O errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for FinsyncError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Cache(e.to_string())
    }
}

impl FinsyncError {
    /// Map error to a process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::NotAuthenticated | Self::ReauthenticationRequired { .. } => ExitCode::AuthRequired,
            Self::Api(e) => match e.kind {
                ApiErrorKind::Authentication(_) => ExitCode::AuthRequired,
                ApiErrorKind::Timeout => ExitCode::Timeout,
                _ => ExitCode::GeneralError,
            },
            Self::ConfigParse { .. } | Self::ConfigInvalid { .. } | Self::UnknownResource(_) => {
                ExitCode::ConfigError
            }
            Self::Cache(_) | Self::SecureStorage(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                ExitCode::GeneralError
            }
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotAuthenticated | Self::ReauthenticationRequired { .. } => {
                ErrorCategory::Authentication
            }
            Self::Api(e) => match e.kind {
                ApiErrorKind::Authentication(_) => ErrorCategory::Authentication,
                ApiErrorKind::Network | ApiErrorKind::Timeout => ErrorCategory::Network,
                _ => ErrorCategory::Api,
            },
            Self::ConfigParse { .. } | Self::ConfigInvalid { .. } | Self::UnknownResource(_) => {
                ErrorCategory::Configuration
            }
            Self::Cache(_) | Self::SecureStorage(_) => ErrorCategory::Storage,
            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `FSYNC-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "FSYNC-A001",
            Self::ReauthenticationRequired { .. } => "FSYNC-A002",
            Self::Api(e) => match e.kind {
                ApiErrorKind::Authentication(_) => "FSYNC-A010",
                ApiErrorKind::Network => "FSYNC-N001",
                ApiErrorKind::Timeout => "FSYNC-N002",
                ApiErrorKind::Authorization => "FSYNC-P001",
                ApiErrorKind::Validation => "FSYNC-P002",
                ApiErrorKind::NotFound => "FSYNC-P003",
                ApiErrorKind::Conflict => "FSYNC-P004",
                ApiErrorKind::RateLimited => "FSYNC-P005",
                ApiErrorKind::Server => "FSYNC-P006",
                ApiErrorKind::Deserialization => "FSYNC-P020",
                ApiErrorKind::Unknown => "FSYNC-P099",
            },
            Self::ConfigParse { .. } => "FSYNC-C001",
            Self::ConfigInvalid { .. } => "FSYNC-C002",
            Self::UnknownResource(_) => "FSYNC-C010",
            Self::Cache(_) => "FSYNC-S001",
            Self::SecureStorage(_) => "FSYNC-S002",
            Self::Io(_) => "FSYNC-X001",
            Self::Json(_) => "FSYNC-X002",
            Self::Other(_) => "FSYNC-X099",
        }
    }

    /// Whether the host may reasonably retry the operation later.
    ///
    /// The SDK itself never retries these; the flag is advisory for hosts.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Api(e) => matches!(
                e.kind,
                ApiErrorKind::Network
                    | ApiErrorKind::Timeout
                    | ApiErrorKind::Server
                    | ApiErrorKind::RateLimited
            ),
            _ => false,
        }
    }

    /// The classified API error kind, if this error came from the network.
    #[must_use]
    pub const fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Self::Api(e) => Some(e.kind),
            Self::ReauthenticationRequired { reason } => Some(ApiErrorKind::Authentication(*reason)),
            _ => None,
        }
    }

    /// Returns actionable fix suggestions for this error.
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::NotAuthenticated => suggestions::not_authenticated_suggestions(),
            Self::ReauthenticationRequired { reason } => {
                suggestions::reauthentication_suggestions(*reason)
            }
            Self::Api(e) => suggestions::api_error_suggestions(e),
            Self::ConfigParse { path, message } => {
                suggestions::config_parse_suggestions(path, message)
            }
            Self::ConfigInvalid { key, value, message } => {
                suggestions::config_invalid_suggestions(key, value, message)
            }
            Self::UnknownResource(name) => suggestions::unknown_resource_suggestions(name),
            Self::Cache(msg) => suggestions::cache_suggestions(msg),
            Self::SecureStorage(msg) => suggestions::secure_storage_suggestions(msg),
            Self::Io(err) => vec![FixSuggestion::new(
                vec!["# Check file permissions and disk space".to_string()],
                format!("I/O error: {err}. Check file permissions and available disk space."),
            )],
            Self::Json(err) => vec![FixSuggestion::new(
                vec!["finsync cache clear".to_string()],
                format!("JSON error: {err}. Local data may be corrupted."),
            )],
            Self::Other(err) => vec![FixSuggestion::new(
                Vec::new(),
                format!("Unexpected error: {err}. Please report this issue."),
            )],
        }
    }
}

/// Result type alias for finsync operations.
pub type Result<T> = std::result::Result<T, FinsyncError>;

// =============================================================================
// Tests
// =============================================================================
