//! Core error types shared across the crate.

pub mod error;

pub use error::{DepscanError, ErrorContext, user_friendly_error};
