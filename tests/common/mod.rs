//! Common test utilities for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: mock backend endpoints and request inspection
//! - `log_capture`: tracing event capture for log assertions
//! - `logger`: per-test progress logging

pub mod fixtures;
pub mod log_capture;
pub mod logger;
