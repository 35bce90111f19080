//! Stdout/stderr rendering shared by the commands.
//!
//! JSON output is wrapped in an envelope carrying a schema version and the
//! command name so scripts can dispatch on it.

use serde::Serialize;

use crate::error::{FinsyncError, Result};

/// Version tag for JSON envelopes.
pub const SCHEMA_VERSION: &str = "finsync.v1";

/// Output options derived from global flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputOptions {
    pub json: bool,
    pub pretty: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    data: &'a T,
}

fn encode<T: Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

/// Render `data` inside the JSON envelope.
///
/// # Errors
///
/// Returns an error if `data` cannot be serialized.
pub fn render_json<T: Serialize>(command: &str, data: &T, pretty: bool) -> Result<String> {
    let envelope = Envelope {
        schema_version: SCHEMA_VERSION,
        command,
        data,
    };
    Ok(encode(&envelope, pretty)?)
}

/// Print either the JSON envelope or the human text.
///
/// # Errors
///
/// Returns an error if `data` cannot be serialized.
pub fn emit<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: impl FnOnce() -> String,
) -> Result<()> {
    if options.json {
        println!("{}", render_json(command, data, options.pretty)?);
    } else {
        println!("{}", human());
    }
    Ok(())
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorJson {
    error_code: &'static str,
    category: String,
    message: String,
    is_retryable: bool,
    suggestions: Vec<SuggestionJson>,
}

#[derive(Serialize)]
struct SuggestionJson {
    commands: Vec<String>,
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prevention: Option<String>,
}

/// Render an error for stderr.
#[must_use]
pub fn render_error(error: &FinsyncError, options: OutputOptions) -> String {
    if options.json {
        let json = ErrorJson {
            error_code: error.error_code(),
            category: error.category().to_string(),
            message: error.to_string(),
            is_retryable: error.is_retryable(),
            suggestions: error
                .fix_suggestions()
                .into_iter()
                .map(|s| SuggestionJson {
                    commands: s.commands,
                    context: s.context,
                    prevention: s.prevention,
                })
                .collect(),
        };
        if let Ok(rendered) = encode(&json, options.pretty) {
            return rendered;
        }
    }
    render_plain(error)
}

fn render_plain(error: &FinsyncError) -> String {
    let mut lines = vec![format!("Error [{}]: {error}", error.error_code())];

    let suggestions = error.fix_suggestions();
    if let Some(suggestion) = suggestions.first() {
        if let Some(cmd) = suggestion.commands.iter().find(|c| !c.starts_with('#')) {
            lines.push(format!("Fix: {cmd}"));
        }
        lines.push(suggestion.context.clone());
    }
    lines.join("\n")
}
