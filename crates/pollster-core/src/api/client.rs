//! API client for the polls REST API.
//!
//! Public reads go out anonymously. Writes and results go through
//! [`AuthClient`], which handles bearer tokens and refresh.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::auth::{AuthClient, SessionStore, TokenRefresher};
use crate::models::{NewPoll, Poll, Vote};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Login endpoint, relative to the API base
const LOGIN_PATH: &str = "token/";

/// Poll collection endpoint, relative to the API base
const POLLS_PATH: &str = "polls/";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access: String,
    refresh: String,
}

#[derive(Debug, Serialize)]
struct VoteRequest {
    choice_id: i64,
}

/// Client for the polls API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct PollsClient {
    client: Client,
    base_url: Url,
    auth: AuthClient,
}

impl PollsClient {
    /// Create a client for the API rooted at `base_url`.
    /// A missing trailing slash is added so relative joins stay under the base.
    pub fn new(base_url: &str, store: Arc<SessionStore>, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;
        let refresher = TokenRefresher::new(client.clone(), &base_url, store.clone())?;
        let auth = AuthClient::new(client.clone(), store, refresher);

        Ok(Self {
            client,
            base_url,
            auth,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        self.auth.store()
    }

    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    fn poll_url(&self, poll_id: i64, suffix: &str) -> Result<Url, ApiError> {
        self.url(&format!("{}{}/{}", POLLS_PATH, poll_id, suffix))
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get_public<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn auth_get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let builder = self
            .auth
            .request(Method::GET, url)
            .header(header::ACCEPT, "application/json");
        let response = self.auth.send(builder).await?.error_for_status().await?;
        response.json().await
    }

    async fn auth_post<T: DeserializeOwned, B: Serialize>(&self, url: Url, body: &B) -> Result<T, ApiError> {
        let builder = self
            .auth
            .request(Method::POST, url)
            .header(header::ACCEPT, "application/json")
            .json(body);
        let response = self.auth.send(builder).await?.error_for_status().await?;
        response.json().await
    }

    // ===== Session =====

    /// Exchange credentials for a token pair and start a session
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH)?)
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest { username, password })
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        let tokens: LoginResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        self.store().set(&tokens.access, &tokens.refresh, Some(username));
        info!(username, "Logged in");
        Ok(())
    }

    /// Drop the session. No network call is made.
    pub fn logout(&self) {
        self.store().clear();
        info!("Logged out");
    }

    // ===== Polls =====

    /// Fetch all polls. Public, no token needed.
    pub async fn list_polls(&self) -> Result<Vec<Poll>, ApiError> {
        self.get_public(self.url(POLLS_PATH)?).await
    }

    /// Fetch one poll.
    ///
    /// Poll data is public: when the session holds a token the request is
    /// authenticated, and a 401 falls back to an anonymous fetch.
    pub async fn poll_detail(&self, poll_id: i64) -> Result<Poll, ApiError> {
        let url = self.poll_url(poll_id, "")?;

        if self.store().access_token().is_some() {
            let builder = self
                .auth
                .request(Method::GET, url.clone())
                .header(header::ACCEPT, "application/json");
            let response = self.auth.send(builder).await?;
            if response.status() != reqwest::StatusCode::UNAUTHORIZED {
                return response.error_for_status().await?.json().await;
            }
            debug!(poll_id, "Authenticated detail fetch rejected, falling back to public");
        }

        self.get_public(url).await
    }

    /// Fetch vote counts for a poll. Requires a session.
    pub async fn poll_results(&self, poll_id: i64) -> Result<Poll, ApiError> {
        let url = self.poll_url(poll_id, "results/")?;
        self.auth_get(url).await
    }

    /// Create a poll. Requires a session.
    pub async fn create_poll(&self, poll: &NewPoll) -> Result<Poll, ApiError> {
        let url = self.url(POLLS_PATH)?;
        let created: Poll = self.auth_post(url, poll).await?;
        info!(poll_id = created.id, "Poll created");
        Ok(created)
    }

    /// Cast a vote. Requires a session.
    pub async fn vote(&self, poll_id: i64, choice_id: i64) -> Result<Vote, ApiError> {
        let url = self.poll_url(poll_id, "vote/")?;
        let vote: Vote = self
            .auth_post(url, &VoteRequest { choice_id })
            .await?;
        info!(poll_id, choice_id, "Vote cast");
        Ok(vote)
    }
}

/// Parse a base URL and make sure it ends with `/`
pub fn normalize_base_url(base_url: &str) -> Result<Url, url::ParseError> {
    let trimmed = base_url.trim();
    if trimmed.ends_with('/') {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("{}/", trimmed))
    }
}
