//! Authentication: session persistence, token refresh and authenticated requests.
//!
//! This module provides:
//! - `SessionStore`: access token, refresh token and username over a durable backend
//! - `SlotStorage` backends: JSON file, OS keychain, in-memory
//! - `TokenRefresher`: exchanges the refresh token for a new access token
//! - `AuthClient`: bearer-token requests with one refresh-and-retry on 401

pub mod credentials;
pub mod error;
pub mod refresh;
pub mod request;
pub mod session;
pub mod storage;

pub use credentials::KeyringStorage;
pub use error::RefreshError;
pub use refresh::TokenRefresher;
pub use request::{AuthClient, AuthResponse};
pub use session::{Session, SessionStore};
pub use storage::{FileStorage, MemoryStorage, SlotStorage};
