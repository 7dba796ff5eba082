//! Core library for pollster, a client for the polls API.
//!
//! - [`auth`]: session store, token refresh and authenticated requests
//! - [`api`]: typed client for the poll endpoints
//! - [`models`]: polls, choices, votes
//! - [`views`]: routes, loaders and view models for the presentation layer
//! - [`config`]: configuration file and environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;
pub mod views;

pub use api::{ApiError, PollsClient};
pub use auth::{AuthClient, AuthResponse, RefreshError, Session, SessionStore};
pub use config::Config;
