//! Fix suggestion database for finsync errors.
//!
//! Maps error types to actionable fix suggestions: commands, context
//! explanations, and prevention tips.

use super::{ApiError, ApiErrorKind, AuthFailure};

// =============================================================================
// Fix Suggestion Types
// =============================================================================

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct FixSuggestion {
    /// Primary fix commands in order of preference.
    pub commands: Vec<String>,

    /// Explanation of why this error occurred.
    pub context: String,

    /// Tips to prevent this error in the future.
    pub prevention: Option<String>,
}

impl FixSuggestion {
    /// Creates a new fix suggestion with required fields.
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
            prevention: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }
}

// =============================================================================
// Suggestion Generators
// =============================================================================

/// Generates fix suggestions when no credentials are stored.
#[must_use]
pub fn not_authenticated_suggestions() -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["finsync login --username <email>".to_string()],
        "No stored session was found. Log in to obtain an access and refresh token.",
    )]
}

/// Generates fix suggestions when the session was revoked.
#[must_use]
pub fn reauthentication_suggestions(reason: AuthFailure) -> Vec<FixSuggestion> {
    let context = match reason {
        AuthFailure::SuspendedUser | AuthFailure::SuspendedDevice | AuthFailure::AccountLocked => {
            format!(
                "The server refused this session ({}). Logging in again will not help \
                 until the suspension is lifted.",
                reason.description()
            )
        }
        _ => format!(
            "The session could not be refreshed ({}). Stored tokens were cleared.",
            reason.description()
        ),
    };

    vec![
        FixSuggestion::new(
            vec![
                "finsync token status".to_string(),
                "finsync login --username <email>".to_string(),
            ],
            context,
        )
        .with_prevention(
            "Refresh tokens expire when unused for long periods; syncing regularly keeps \
             the session alive.",
        ),
    ]
}

/// Generates fix suggestions for classified remote failures.
#[must_use]
pub fn api_error_suggestions(err: &ApiError) -> Vec<FixSuggestion> {
    match err.kind {
        ApiErrorKind::Authentication(reason) => reauthentication_suggestions(reason),
        ApiErrorKind::Authorization => vec![FixSuggestion::new(
            vec!["finsync token status".to_string()],
            format!(
                "The server understood the request but this user may not access the \
                 resource: {}",
                err.message
            ),
        )],
        ApiErrorKind::Validation => vec![FixSuggestion::new(
            Vec::new(),
            format!("The request was rejected as invalid: {}", err.message),
        )],
        ApiErrorKind::NotFound | ApiErrorKind::Conflict => vec![FixSuggestion::new(
            vec!["finsync sync <resource>".to_string()],
            format!(
                "Local data may be out of date ({}). Syncing refreshes the cache.",
                err.kind
            ),
        )],
        ApiErrorKind::Network | ApiErrorKind::Timeout | ApiErrorKind::Server => {
            vec![
                FixSuggestion::new(
                    vec!["# Check your network connection and retry".to_string()],
                    format!("The server could not be reached or failed: {}", err.message),
                )
                .with_prevention(
                    "finsync does not retry these automatically; retry later or raise \
                     `api.timeout_seconds` in the config file.",
                ),
            ]
        }
        ApiErrorKind::RateLimited => vec![FixSuggestion::new(
            Vec::new(),
            "Too many requests were sent. Wait a moment before retrying.",
        )],
        ApiErrorKind::Deserialization | ApiErrorKind::Unknown => vec![FixSuggestion::new(
            vec!["finsync --log-level debug sync <resource>".to_string()],
            format!(
                "The server response was not understood: {}. The API version may \
                 not match `api.api_version`.",
                err.message
            ),
        )],
    }
}

/// Generates fix suggestions for config parse errors.
#[must_use]
pub fn config_parse_suggestions(path: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("$EDITOR {path}")],
        format!("The config file could not be parsed: {message}"),
    )]
}

/// Generates fix suggestions for invalid config values.
#[must_use]
pub fn config_invalid_suggestions(key: &str, value: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        Vec::new(),
        format!("Config value '{key}' = '{value}' is invalid: {message}"),
    )]
}

/// Generates fix suggestions for unknown resource names.
#[must_use]
pub fn unknown_resource_suggestions(name: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["finsync sync providers".to_string()],
        format!(
            "'{name}' is not a known resource. Known resources: providers, \
             provider-accounts, accounts, transactions, messages."
        ),
    )]
}

/// Generates fix suggestions for local cache failures.
#[must_use]
pub fn cache_suggestions(message: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["finsync cache clear".to_string()],
            format!("The local cache database failed: {message}"),
        )
        .with_prevention("Avoid running several finsync processes against one database."),
    ]
}

/// Generates fix suggestions for secure storage failures.
#[must_use]
pub fn secure_storage_suggestions(message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["finsync logout".to_string(), "finsync login --username <email>".to_string()],
        format!(
            "The platform keystore could not be used: {message}. Stored tokens are \
             unreadable without their key."
        ),
    )]
}
