//! # finlens Common Library
//!
//! Shared code for finlens services including:
//! - Error type
//! - Bootstrap configuration loading
//! - Event types and the broadcast event bus
//! - Fetch status vocabulary

pub mod config;
pub mod error;
pub mod events;
pub mod status;

pub use error::{Error, Result};
pub use status::SourceStatus;
