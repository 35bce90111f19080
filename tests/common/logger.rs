//! Per-test progress logging.
#![allow(dead_code)]
//!
//! `TestLogger` prints phase markers and a final verdict with elapsed time so
//! a failing integration test shows how far it got. Output goes to stderr
//! (captured by the test harness unless `--nocapture`).
//!
//! - `TEST_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! - `TEST_LOG_JSON` - `1`/`true` for one JSON object per line

use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use super::log_capture::TestLogCapture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.write_str(label)
    }
}

struct Settings {
    min_level: LogLevel,
    json: bool,
}

fn settings() -> &'static Settings {
    static SETTINGS: OnceLock<Settings> = OnceLock::new();
    SETTINGS.get_or_init(|| Settings {
        min_level: std::env::var("TEST_LOG_LEVEL")
            .ok()
            .and_then(|v| LogLevel::parse(&v))
            .unwrap_or(LogLevel::Info),
        json: std::env::var("TEST_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
    })
}

#[derive(Serialize)]
struct Entry<'a> {
    timestamp: String,
    level: LogLevel,
    test: &'a str,
    phase: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_ms: Option<u64>,
}

/// Logger scoped to one test.
pub struct TestLogger {
    test: String,
    phase: std::cell::RefCell<String>,
    started: Instant,
}

impl TestLogger {
    #[must_use]
    pub fn new(test: &str) -> Self {
        let logger = Self {
            test: test.to_string(),
            phase: std::cell::RefCell::new("setup".to_string()),
            started: Instant::now(),
        };
        logger.info("started");
        logger
    }

    /// Logger plus a capture of the SDK's tracing events.
    #[must_use]
    pub fn with_capture(test: &str) -> (Self, TestLogCapture) {
        (Self::new(test), TestLogCapture::start())
    }

    pub fn phase(&self, phase: &str) {
        *self.phase.borrow_mut() = phase.to_string();
        self.debug(&format!("phase: {phase}"));
    }

    pub fn debug(&self, message: &str) {
        self.write(LogLevel::Debug, message, None);
    }

    pub fn info(&self, message: &str) {
        self.write(LogLevel::Info, message, None);
    }

    pub fn warn(&self, message: &str) {
        self.write(LogLevel::Warn, message, None);
    }

    pub fn finish_ok(&self) {
        self.write(LogLevel::Info, "passed", Some(self.elapsed_ms()));
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn write(&self, level: LogLevel, message: &str, elapsed_ms: Option<u64>) {
        let settings = settings();
        if level < settings.min_level {
            return;
        }
        let phase = self.phase.borrow();
        if settings.json {
            let entry = Entry {
                timestamp: Utc::now().to_rfc3339(),
                level,
                test: &self.test,
                phase: &phase,
                message,
                elapsed_ms,
            };
            if let Ok(line) = serde_json::to_string(&entry) {
                eprintln!("{line}");
            }
        } else {
            let elapsed = elapsed_ms.map_or_else(String::new, |ms| format!(" ({ms}ms)"));
            eprintln!("[{level:<5}] {}::{phase} {message}{elapsed}", self.test);
        }
    }
}
