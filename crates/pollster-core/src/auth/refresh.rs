use std::sync::Arc;

use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::{RefreshError, SessionStore};

/// Path of the refresh endpoint, relative to the API base
pub const REFRESH_PATH: &str = "token/refresh/";

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Exchanges the stored refresh token for a new access token.
#[derive(Clone)]
pub struct TokenRefresher {
    client: Client,
    refresh_url: Url,
    store: Arc<SessionStore>,
}

impl TokenRefresher {
    pub fn new(client: Client, base_url: &Url, store: Arc<SessionStore>) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            refresh_url: base_url.join(REFRESH_PATH)?,
            store,
        })
    }

    /// Obtain a new access token. Makes at most one network call.
    ///
    /// Any failure clears the session. On success the refresh token and
    /// username are kept and only the access token is replaced.
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        let Some(refresh_token) = self.store.refresh_token() else {
            debug!("No refresh token, clearing session");
            self.store.clear();
            return Err(RefreshError::NoRefreshToken);
        };

        match self.exchange(&refresh_token).await {
            Ok(access) => {
                let username = self.store.username();
                self.store.set(&access, &refresh_token, username.as_deref());
                debug!("Access token refreshed");
                Ok(access)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                self.store.clear();
                Err(e)
            }
        }
    }

    async fn exchange(&self, refresh_token: &str) -> Result<String, RefreshError> {
        let response = self
            .client
            .post(self.refresh_url.clone())
            .header(header::ACCEPT, "application/json")
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected(status));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        Ok(body.access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::{ACCESS_TOKEN_SLOT, REFRESH_TOKEN_SLOT, USERNAME_SLOT};
    use crate::auth::MemoryStorage;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_with(slots: &[(&str, &str)]) -> Arc<SessionStore> {
        Arc::new(SessionStore::new(Box::new(MemoryStorage::with_slots(
            slots.iter().copied(),
        ))))
    }

    fn refresher(server: &MockServer, store: Arc<SessionStore>) -> TokenRefresher {
        let base = Url::parse(&format!("{}/api/", server.uri())).unwrap();
        TokenRefresher::new(Client::new(), &base, store).unwrap()
    }

    #[tokio::test]
    async fn test_missing_refresh_token_clears_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = store_with(&[(ACCESS_TOKEN_SLOT, "stale"), (USERNAME_SLOT, "alice")]);
        let result = refresher(&server, store.clone()).refresh().await;

        assert!(matches!(result, Err(RefreshError::NoRefreshToken)));
        assert!(store.get().is_empty());
    }

    #[tokio::test]
    async fn test_success_preserves_refresh_token_and_username() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .and(body_json(serde_json::json!({ "refresh": "r1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access": "new" })))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with(&[
            (ACCESS_TOKEN_SLOT, "old"),
            (REFRESH_TOKEN_SLOT, "r1"),
            (USERNAME_SLOT, "alice"),
        ]);
        let token = refresher(&server, store.clone()).refresh().await.unwrap();

        assert_eq!(token, "new");
        let session = store.get();
        assert_eq!(session.access_token.as_deref(), Some("new"));
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
        assert_eq!(session.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_repeated_refresh_keeps_username() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access": "next" })))
            .expect(2)
            .mount(&server)
            .await;

        let store = store_with(&[
            (ACCESS_TOKEN_SLOT, "a0"),
            (REFRESH_TOKEN_SLOT, "r1"),
            (USERNAME_SLOT, "alice"),
        ]);
        let refresher = refresher(&server, store.clone());
        refresher.refresh().await.unwrap();
        refresher.refresh().await.unwrap();

        assert_eq!(store.username().as_deref(), Some("alice"));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "detail": "Token is invalid or expired"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with(&[
            (ACCESS_TOKEN_SLOT, "a0"),
            (REFRESH_TOKEN_SLOT, "bad"),
            (USERNAME_SLOT, "alice"),
        ]);
        let result = refresher(&server, store.clone()).refresh().await;

        assert!(matches!(result, Err(RefreshError::Rejected(s)) if s.as_u16() == 401));
        assert!(store.get().is_empty());
    }

    #[tokio::test]
    async fn test_unparsable_body_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let store = store_with(&[(ACCESS_TOKEN_SLOT, "a0"), (REFRESH_TOKEN_SLOT, "r1")]);
        let result = refresher(&server, store.clone()).refresh().await;

        assert!(matches!(result, Err(RefreshError::InvalidResponse(_))));
        assert!(store.get().is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_clears_session() {
        // Port 9 on localhost is not listening; the connection is refused
        let base = Url::parse("http://127.0.0.1:9/api/").unwrap();
        let store = store_with(&[(ACCESS_TOKEN_SLOT, "a0"), (REFRESH_TOKEN_SLOT, "r1")]);
        let refresher = TokenRefresher::new(Client::new(), &base, store.clone()).unwrap();

        let result = refresher.refresh().await;

        assert!(matches!(result, Err(RefreshError::Network(_))));
        assert!(store.get().is_empty());
    }
}
