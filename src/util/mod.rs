//! Utility functions.

pub mod time;

pub use time::{describe_expiry, format_countdown, format_relative_time};
