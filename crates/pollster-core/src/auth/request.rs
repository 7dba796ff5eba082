//! Bearer-token requests with one transparent refresh-and-retry.
//!
//! A call moves through at most these steps:
//!
//! 1. No access token stored: refresh first. If that fails the call ends with
//!    [`AuthResponse::Unauthorized`] and the target is never contacted.
//! 2. Send the request with `Authorization: Bearer <token>`. Anything other
//!    than a 401 is returned as-is.
//! 3. On a 401, refresh once. If that fails the original 401 is returned;
//!    otherwise the request is re-sent once with the new token and that
//!    response is returned whatever its status.
//!
//! A token that cannot be sent as a header value is handled like a rejected
//! one. It never turns into an error the caller would hit on every call.

use std::sync::Arc;

use reqwest::{header, Client, Method, Request, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::{SessionStore, TokenRefresher};
use crate::api::ApiError;

/// Body of the synthetic unauthorized result
pub const AUTH_REQUIRED_BODY: &str = r#"{"detail":"Authentication required"}"#;

/// Outcome of an authenticated call.
#[derive(Debug)]
pub enum AuthResponse {
    /// The target's response, unmodified. May carry any status.
    Response(Response),
    /// No token could be obtained. Behaves like a 401 with
    /// `{"detail": "Authentication required"}`.
    Unauthorized,
}

impl AuthResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthResponse::Response(r) => r.status(),
            AuthResponse::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    /// True for the synthetic result only, not for a real 401 from the target
    pub fn is_terminal_unauthorized(&self) -> bool {
        matches!(self, AuthResponse::Unauthorized)
    }

    pub async fn text(self) -> Result<String, ApiError> {
        match self {
            AuthResponse::Response(r) => Ok(r.text().await?),
            AuthResponse::Unauthorized => Ok(AUTH_REQUIRED_BODY.to_string()),
        }
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let body = self.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Turn a non-success outcome into an [`ApiError`], passing success through.
    pub async fn error_for_status(self) -> Result<Self, ApiError> {
        let status = self.status();
        if status.is_success() {
            return Ok(self);
        }
        let body = self.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}

/// HTTP client that authenticates every request from the session store.
/// Clone is cheap: the reqwest client and store are shared.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    store: Arc<SessionStore>,
    refresher: TokenRefresher,
}

impl AuthClient {
    pub fn new(client: Client, store: Arc<SessionStore>, refresher: TokenRefresher) -> Self {
        Self {
            client,
            store,
            refresher,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Start building a request. Send it with [`AuthClient::send`].
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    pub async fn send(&self, builder: RequestBuilder) -> Result<AuthResponse, ApiError> {
        let request = builder.build()?;
        self.execute(request).await
    }

    /// Run the refresh-and-retry sequence for one request.
    ///
    /// Refresh failures never surface as errors. `Err` means the target
    /// request itself could not be sent. A token that cannot be carried in a
    /// header counts as rejected: a stored one is refreshed like a 401, a
    /// refreshed one clears the session.
    pub async fn execute(&self, request: Request) -> Result<AuthResponse, ApiError> {
        let bearer = match self.store.access_token() {
            Some(token) => bearer_value(&token),
            None => match self.refresher.refresh().await {
                Ok(token) => match bearer_value(&token) {
                    Some(value) => Some(value),
                    None => {
                        warn!("Refreshed access token is not a valid header value, clearing session");
                        self.store.clear();
                        return Ok(AuthResponse::Unauthorized);
                    }
                },
                Err(e) => {
                    debug!(url = %request.url(), reason = %e, "No usable token, returning unauthorized");
                    return Ok(AuthResponse::Unauthorized);
                }
            },
        };

        let retry = request.try_clone().ok_or(ApiError::NotReplayable)?;

        // The rejected first attempt, if one was sent
        let rejected = match bearer {
            Some(value) => {
                let response = self.client.execute(with_bearer(request, value)).await?;
                if response.status() != StatusCode::UNAUTHORIZED {
                    return Ok(AuthResponse::Response(response));
                }
                debug!(url = %retry.url(), "Target rejected token, refreshing");
                Some(response)
            }
            None => {
                warn!("Stored access token is not a valid header value, refreshing");
                None
            }
        };
        let rejected = || match rejected {
            Some(response) => AuthResponse::Response(response),
            None => AuthResponse::Unauthorized,
        };

        match self.refresher.refresh().await {
            Ok(token) => match bearer_value(&token) {
                Some(value) => {
                    let response = self.client.execute(with_bearer(retry, value)).await?;
                    debug!(url = %response.url(), status = %response.status(), "Retried with refreshed token");
                    Ok(AuthResponse::Response(response))
                }
                None => {
                    warn!("Refreshed access token is not a valid header value, clearing session");
                    self.store.clear();
                    Ok(rejected())
                }
            },
            Err(e) => {
                debug!(reason = %e, "Refresh after rejection failed");
                Ok(rejected())
            }
        }
    }
}

/// `Bearer <token>` as a header value, or `None` when the token has
/// characters a header cannot carry
fn bearer_value(token: &str) -> Option<header::HeaderValue> {
    let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token)).ok()?;
    value.set_sensitive(true);
    Some(value)
}

/// Insert the bearer header, replacing any Authorization header the caller set
fn with_bearer(mut request: Request, value: header::HeaderValue) -> Request {
    request.headers_mut().insert(header::AUTHORIZATION, value);
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::{ACCESS_TOKEN_SLOT, REFRESH_TOKEN_SLOT, USERNAME_SLOT};
    use crate::auth::{MemoryStorage, Session};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        server: MockServer,
        store: Arc<SessionStore>,
        client: AuthClient,
        base: Url,
    }

    impl Harness {
        async fn new(slots: &[(&str, &str)]) -> Self {
            let server = MockServer::start().await;
            let base = Url::parse(&format!("{}/api/", server.uri())).unwrap();
            let store = Arc::new(SessionStore::new(Box::new(MemoryStorage::with_slots(
                slots.iter().copied(),
            ))));
            let http = Client::new();
            let refresher = TokenRefresher::new(http.clone(), &base, store.clone()).unwrap();
            let client = AuthClient::new(http, store.clone(), refresher);
            Self {
                server,
                store,
                client,
                base,
            }
        }

        fn url(&self, path: &str) -> Url {
            self.base.join(path).unwrap()
        }

        async fn requests_to(&self, target: &str) -> usize {
            self.server
                .received_requests()
                .await
                .unwrap_or_default()
                .iter()
                .filter(|r| r.url.path() == target)
                .count()
        }
    }

    fn full_session(access: &str) -> Vec<(&str, &str)> {
        vec![
            (ACCESS_TOKEN_SLOT, access),
            (REFRESH_TOKEN_SLOT, "r1"),
            (USERNAME_SLOT, "alice"),
        ]
    }

    #[tokio::test]
    async fn test_no_tokens_returns_unauthorized_without_contacting_target() {
        let h = Harness::new(&[]).await;
        Mock::given(method("GET"))
            .and(path("/api/polls/1/results/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&h.server)
            .await;

        let url = h.url("polls/1/results/");
        let result = h.client.send(h.client.request(Method::GET, url)).await.unwrap();

        assert!(result.is_terminal_unauthorized());
        assert_eq!(result.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = result.json().await.unwrap();
        assert_eq!(body["detail"], "Authentication required");
        assert_eq!(h.requests_to("/api/polls/1/results/").await, 0);
        assert_eq!(h.requests_to("/api/token/refresh/").await, 0);
        assert!(h.store.get().is_empty());
    }

    #[tokio::test]
    async fn test_valid_token_passes_response_through() {
        let h = Harness::new(&full_session("good")).await;
        Mock::given(method("GET"))
            .and(path("/api/polls/1/"))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
            .expect(1)
            .mount(&h.server)
            .await;

        let url = h.url("polls/1/");
        let result = h.client.send(h.client.request(Method::GET, url)).await.unwrap();

        assert_eq!(result.status(), StatusCode::OK);
        let body: serde_json::Value = result.json().await.unwrap();
        assert_eq!(body, json!({ "id": 1 }));
        assert_eq!(h.requests_to("/api/token/refresh/").await, 0);
    }

    #[tokio::test]
    async fn test_other_errors_pass_through_without_refresh() {
        let h = Harness::new(&full_session("good")).await;
        Mock::given(method("POST"))
            .and(path("/api/polls/1/vote/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "Invalid choice ID" })))
            .expect(1)
            .mount(&h.server)
            .await;

        let url = h.url("polls/1/vote/");
        let builder = h.client.request(Method::POST, url).json(&json!({ "choice_id": 99 }));
        let result = h.client.send(builder).await.unwrap();

        assert_eq!(result.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.requests_to("/api/token/refresh/").await, 0);
        assert_eq!(h.store.access_token().as_deref(), Some("good"));
    }

    #[tokio::test]
    async fn test_token_less_call_refreshes_first() {
        let h = Harness::new(&[(REFRESH_TOKEN_SLOT, "r1"), (USERNAME_SLOT, "alice")]).await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "fresh" })))
            .expect(1)
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/polls/"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&h.server)
            .await;

        let url = h.url("polls/");
        let result = h.client.send(h.client.request(Method::GET, url)).await.unwrap();

        assert_eq!(result.status(), StatusCode::OK);
        assert_eq!(h.store.access_token().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_and_retries_once() {
        let h = Harness::new(&full_session("expired")).await;
        Mock::given(method("GET"))
            .and(path("/api/polls/2/"))
            .and(header("authorization", "Bearer expired"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "new" })))
            .expect(1)
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/polls/2/"))
            .and(header("authorization", "Bearer new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 2 })))
            .expect(1)
            .mount(&h.server)
            .await;

        let url = h.url("polls/2/");
        let result = h.client.send(h.client.request(Method::GET, url)).await.unwrap();

        assert_eq!(result.status(), StatusCode::OK);
        assert_eq!(h.requests_to("/api/polls/2/").await, 2);
    }

    #[tokio::test]
    async fn test_retry_that_also_fails_is_returned_without_third_attempt() {
        let h = Harness::new(&full_session("expired")).await;
        Mock::given(method("GET"))
            .and(path("/api/polls/3/results/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "still no" })))
            .expect(2)
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "new" })))
            .expect(1)
            .mount(&h.server)
            .await;

        let url = h.url("polls/3/results/");
        let result = h.client.send(h.client.request(Method::GET, url)).await.unwrap();

        assert_eq!(result.status(), StatusCode::UNAUTHORIZED);
        assert!(!result.is_terminal_unauthorized());
        // The refreshed session is kept; the caller decides what to do next
        assert_eq!(h.store.access_token().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_rejected_refresh_after_401_clears_session_and_returns_original() {
        let h = Harness::new(&full_session("expired")).await;
        Mock::given(method("POST"))
            .and(path("/api/polls/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "original" })))
            .expect(1)
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&h.server)
            .await;

        let url = h.url("polls/");
        let builder = h.client.request(Method::POST, url).json(&json!({ "question": "q" }));
        let result = h.client.send(builder).await.unwrap();

        assert_eq!(result.status(), StatusCode::UNAUTHORIZED);
        assert!(!result.is_terminal_unauthorized());
        let body: serde_json::Value = result.json().await.unwrap();
        assert_eq!(body["detail"], "original");
        assert_eq!(h.store.get(), Session::default());
    }

    #[tokio::test]
    async fn test_rejected_refresh_without_token_is_synthetic_401() {
        let h = Harness::new(&[(REFRESH_TOKEN_SLOT, "revoked"), (USERNAME_SLOT, "alice")]).await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&h.server)
            .await;

        let url = h.url("polls/");
        let result = h.client.send(h.client.request(Method::GET, url)).await.unwrap();

        assert!(result.is_terminal_unauthorized());
        assert_eq!(h.requests_to("/api/polls/").await, 0);
        assert!(h.store.get().is_empty());
    }

    #[tokio::test]
    async fn test_token_less_then_401_refreshes_twice() {
        let h = Harness::new(&[(REFRESH_TOKEN_SLOT, "r1")]).await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "t" })))
            .expect(2)
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/polls/4/results/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&h.server)
            .await;

        let url = h.url("polls/4/results/");
        let result = h.client.send(h.client.request(Method::GET, url)).await.unwrap();

        assert_eq!(result.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unusable_refreshed_token_ends_session() {
        let h = Harness::new(&[(REFRESH_TOKEN_SLOT, "r1"), (USERNAME_SLOT, "alice")]).await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "bad\ntoken" })))
            .expect(1)
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/polls/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&h.server)
            .await;

        let result = h.client.send(h.client.request(Method::GET, h.url("polls/"))).await.unwrap();
        assert!(result.is_terminal_unauthorized());
        assert!(h.store.get().is_empty());

        // Nothing left to refresh with, so the next call ends without traffic
        let again = h.client.send(h.client.request(Method::GET, h.url("polls/"))).await.unwrap();
        assert!(again.is_terminal_unauthorized());
        assert_eq!(h.requests_to("/api/token/refresh/").await, 1);
        assert_eq!(h.requests_to("/api/polls/").await, 0);
    }

    #[tokio::test]
    async fn test_unusable_stored_token_is_refreshed_before_sending() {
        let h = Harness::new(&full_session("bad\ntoken")).await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .and(body_json(json!({ "refresh": "r1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "good" })))
            .expect(1)
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/polls/6/"))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 6 })))
            .expect(1)
            .mount(&h.server)
            .await;

        let result = h.client.send(h.client.request(Method::GET, h.url("polls/6/"))).await.unwrap();

        assert_eq!(result.status(), StatusCode::OK);
        assert_eq!(h.requests_to("/api/polls/6/").await, 1);
        assert_eq!(h.store.access_token().as_deref(), Some("good"));
    }

    #[tokio::test]
    async fn test_unusable_token_after_401_returns_original_response() {
        let h = Harness::new(&full_session("expired")).await;
        Mock::given(method("GET"))
            .and(path("/api/polls/7/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "original" })))
            .expect(1)
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "bad\rtoken" })))
            .expect(1)
            .mount(&h.server)
            .await;

        let result = h.client.send(h.client.request(Method::GET, h.url("polls/7/"))).await.unwrap();

        assert!(!result.is_terminal_unauthorized());
        let body: serde_json::Value = result.json().await.unwrap();
        assert_eq!(body["detail"], "original");
        assert!(h.store.get().is_empty());
    }

    #[tokio::test]
    async fn test_bearer_overrides_caller_authorization_and_keeps_other_headers() {
        let h = Harness::new(&full_session("good")).await;
        Mock::given(method("GET"))
            .and(path("/api/polls/"))
            .and(header("authorization", "Bearer good"))
            .and(header("x-trace", "abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&h.server)
            .await;

        let url = h.url("polls/");
        let builder = h
            .client
            .request(Method::GET, url)
            .header("Authorization", "Basic Zm9vOmJhcg==")
            .header("X-Trace", "abc");
        let result = h.client.send(builder).await.unwrap();

        assert_eq!(result.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_vote_scenario_with_expired_token() {
        let h = Harness::new(&full_session("expired")).await;
        Mock::given(method("POST"))
            .and(path("/api/polls/5/vote/"))
            .and(header("authorization", "Bearer expired"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .and(body_json(json!({ "refresh": "r1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "new" })))
            .expect(1)
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/polls/5/vote/"))
            .and(header("authorization", "Bearer new"))
            .and(body_json(json!({ "choice_id": 3 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 5, "votes_count": 3 })))
            .expect(1)
            .mount(&h.server)
            .await;

        let url = h.url("polls/5/vote/");
        let builder = h.client.request(Method::POST, url).json(&json!({ "choice_id": 3 }));
        let result = h.client.send(builder).await.unwrap();

        assert_eq!(result.status(), StatusCode::OK);
        let body: serde_json::Value = result.json().await.unwrap();
        assert_eq!(body, json!({ "id": 5, "votes_count": 3 }));
        assert_eq!(
            h.store.get(),
            Session {
                access_token: Some("new".into()),
                refresh_token: Some("r1".into()),
                username: Some("alice".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_token_less_calls_each_refresh() {
        let h = Harness::new(&[(REFRESH_TOKEN_SLOT, "r1")]).await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "t" })))
            .expect(2)
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/polls/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(2)
            .mount(&h.server)
            .await;

        let first = h.client.send(h.client.request(Method::GET, h.url("polls/")));
        let second = h.client.send(h.client.request(Method::GET, h.url("polls/")));
        let (a, b) = futures::join!(first, second);

        assert!(a.unwrap().is_success());
        assert!(b.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_session_change_is_published_on_refresh_failure() {
        let h = Harness::new(&[(REFRESH_TOKEN_SLOT, "revoked"), (USERNAME_SLOT, "alice")]).await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&h.server)
            .await;

        let mut rx = h.store.subscribe();
        let url = h.url("polls/");
        let _ = h.client.send(h.client.request(Method::GET, url)).await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_empty());
    }
}
