//! Shared types for the qproof services
//!
//! Common error type, configuration resolution, event bus and SSE helpers
//! used by the extraction-quality service.

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
