use reqwest::StatusCode;
use thiserror::Error;

/// Why a token refresh did not produce a new access token.
///
/// Every variant clears the session before it is returned.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Refresh rejected with status {0}")]
    Rejected(StatusCode),

    #[error("Network error during refresh: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),
}
