//! Routes and view loaders.
//!
//! The router maps a `#...` location to a [`Route`]; each loader fetches what
//! its route needs and returns a plain view model for the presentation layer
//! to render.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::api::{ApiError, PollsClient};
use crate::auth::Session;
use crate::models::Poll;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    PollList,
    PollDetail(i64),
    CreatePoll,
    /// `#poll/<id>` with an id that is not a number
    NotFound,
}

impl Route {
    /// Parse a location hash. Unknown locations fall back to the poll list.
    pub fn parse(hash: &str) -> Self {
        let hash = hash.trim();
        let hash = hash.strip_prefix('#').unwrap_or(hash);

        if let Some(id) = hash.strip_prefix("poll/") {
            return match id.trim_end_matches('/').parse::<i64>() {
                Ok(id) => Route::PollDetail(id),
                Err(_) => Route::NotFound,
            };
        }
        if hash == "create-poll" {
            return Route::CreatePoll;
        }
        Route::PollList
    }

    pub fn hash(&self) -> String {
        match self {
            Route::PollList | Route::NotFound => String::new(),
            Route::PollDetail(id) => format!("#poll/{}", id),
            Route::CreatePoll => "#create-poll".to_string(),
        }
    }
}

/// Logged-in state shown in the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    LoggedIn { username: String },
    LoggedOut,
}

impl AuthStatus {
    /// Logged in when both tokens and a username are stored
    pub fn from_session(session: &Session) -> Self {
        match &session.username {
            Some(username) if session.is_authenticated() => AuthStatus::LoggedIn {
                username: username.clone(),
            },
            _ => AuthStatus::LoggedOut,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self, AuthStatus::LoggedIn { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollListView {
    Empty,
    Polls(Vec<Poll>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailMode {
    /// Poll has ended: show tallies
    Results,
    /// Logged in and open: offer the choices for voting
    VoteForm,
    /// Logged out and open: list choices and ask for a login
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceResult {
    pub choice_id: i64,
    pub text: String,
    pub votes: u64,
    /// Share of all votes, rounded to one decimal
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultsView {
    pub total_votes: u64,
    pub choices: Vec<ChoiceResult>,
}

impl ResultsView {
    pub fn from_poll(poll: &Poll) -> Self {
        let total_votes = poll.total_votes();
        let choices = poll
            .choices
            .iter()
            .map(|c| ChoiceResult {
                choice_id: c.id,
                text: c.choice_text.clone(),
                votes: c.votes_count,
                percentage: percentage(c.votes_count, total_votes),
            })
            .collect();
        Self {
            total_votes,
            choices,
        }
    }
}

fn percentage(votes: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = votes as f64 * 100.0 / total as f64;
    (raw * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollDetailView {
    pub poll: Poll,
    pub mode: DetailMode,
    pub expired: bool,
    pub results: ResultsView,
}

impl PollDetailView {
    pub fn build(poll: Poll, logged_in: bool, now: DateTime<Utc>) -> Self {
        let expired = poll.is_expired(now);
        let mode = if expired {
            DetailMode::Results
        } else if logged_in {
            DetailMode::VoteForm
        } else {
            DetailMode::ReadOnly
        };
        let results = ResultsView::from_poll(&poll);
        Self {
            poll,
            mode,
            expired,
            results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatePollView {
    /// Username is shown when known; the tokens alone open the form
    Form { username: Option<String> },
    LoginRequired,
}

/// What a route resolved to
#[derive(Debug, Clone, PartialEq)]
pub enum Page {
    PollList(PollListView),
    PollDetail(PollDetailView),
    CreatePoll(CreatePollView),
    NotFound,
}

pub async fn load_poll_list(client: &PollsClient) -> Result<PollListView, ApiError> {
    let polls = client.list_polls().await?;
    debug!(count = polls.len(), "Poll list loaded");
    if polls.is_empty() {
        Ok(PollListView::Empty)
    } else {
        Ok(PollListView::Polls(polls))
    }
}

pub async fn load_poll_detail(client: &PollsClient, poll_id: i64) -> Result<PollDetailView, ApiError> {
    let poll = client.poll_detail(poll_id).await?;
    // Read after the fetch: a failed refresh during it logs the user out
    let logged_in = AuthStatus::from_session(&client.store().get()).is_logged_in();
    Ok(PollDetailView::build(poll, logged_in, Utc::now()))
}

pub fn load_create_poll(session: &Session) -> CreatePollView {
    if session.is_authenticated() {
        CreatePollView::Form {
            username: session.username.clone(),
        }
    } else {
        CreatePollView::LoginRequired
    }
}

/// Resolve a route into a page by calling its loader
pub async fn dispatch(client: &PollsClient, route: Route) -> Result<Page, ApiError> {
    debug!(?route, "Dispatching route");
    match route {
        Route::PollList => Ok(Page::PollList(load_poll_list(client).await?)),
        Route::PollDetail(id) => Ok(Page::PollDetail(load_poll_detail(client, id).await?)),
        Route::CreatePoll => Ok(Page::CreatePoll(load_create_poll(&client.store().get()))),
        Route::NotFound => Ok(Page::NotFound),
    }
}
