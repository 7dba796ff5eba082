//! REST API client module for the polls service.
//!
//! This module provides the `PollsClient` for listing, reading, creating
//! and voting on polls. Protected endpoints use JWT bearer tokens obtained
//! from the `token/` endpoint and renewed through `token/refresh/`.

pub mod client;
pub mod error;

pub use client::{normalize_base_url, PollsClient, DEFAULT_TIMEOUT_SECS};
pub use error::ApiError;
