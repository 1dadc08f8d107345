//! Foundational low-level utilities shared across topicbot crates.
//!
//! Provides time helpers used to stamp topic bindings and char-boundary-safe
//! truncation used when rendering backend output and error bodies.

pub mod text_utils;
pub mod time_utils;

pub use text_utils::{truncate_chars, truncate_with_marker};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
