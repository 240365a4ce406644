//! `a2a-core` — shared data model, error taxonomy, and configuration for the
//! A2A agent server runtime.
//!
//! This crate has no async runtime dependency of its own; it is the
//! vocabulary every other crate in the workspace builds on.

pub mod config;
pub mod error;
pub mod types;

pub use error::{A2aError, Result};
pub use types::*;
