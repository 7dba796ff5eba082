//! Command handlers.
//!
//! `App` owns the configuration and the API client. Each command loads what
//! it needs through the core's loaders and prints the rendered result.

use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pollster_core::config::{Config, ENV_PASSWORD};
use pollster_core::models::NewPoll;
use pollster_core::views::{self, AuthStatus, Route};
use pollster_core::{PollsClient, Session};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::render;

pub struct App {
    config: Config,
    client: PollsClient,
    session_changes: watch::Receiver<Session>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let store = config
            .open_session_store()
            .context("Failed to open session storage")?;
        let session_changes = store.subscribe();
        let client = PollsClient::new(&config.api_base_url, store, config.request_timeout())
            .context("Failed to create API client")?;

        Ok(Self {
            config,
            client,
            session_changes,
        })
    }

    fn auth_status(&self) -> AuthStatus {
        AuthStatus::from_session(&self.client.store().get())
    }

    /// Print the header again if the session changed while a command ran
    pub fn report_session_change(&mut self) {
        if self.session_changes.has_changed().unwrap_or(false) {
            let session = self.session_changes.borrow_and_update().clone();
            let status = AuthStatus::from_session(&session);
            info!(logged_in = status.is_logged_in(), "Session changed");
            eprintln!("{}", render::auth_line(&status));
        }
    }

    pub async fn open(&self, location: &str) -> Result<()> {
        let route = Route::parse(location);
        let page = views::dispatch(&self.client, route).await?;
        print!("{}", render::page(&page));
        Ok(())
    }

    pub async fn list(&self) -> Result<()> {
        self.open(&Route::PollList.hash()).await
    }

    pub async fn show(&self, poll_id: i64) -> Result<()> {
        self.open(&Route::PollDetail(poll_id).hash()).await
    }

    /// Ended polls and unknown choices are rejected by the server
    pub async fn vote(&self, poll_id: i64, choice_id: i64) -> Result<()> {
        let vote = self.client.vote(poll_id, choice_id).await?;

        // Show updated tallies
        match self.client.poll_results(poll_id).await {
            Ok(updated) => {
                print!("{}", render::vote_cast(&vote, Some(&updated)));
                print!("{}", render::results(&views::ResultsView::from_poll(&updated)));
            }
            Err(e) => {
                warn!(error = %e, "Could not load results after voting");
                print!("{}", render::vote_cast(&vote, None));
            }
        }
        Ok(())
    }

    pub async fn create(
        &self,
        question: &str,
        choices: &[String],
        ends: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let view = views::load_create_poll(&self.client.store().get());
        if view == views::CreatePollView::LoginRequired {
            print!("{}", render::create_poll(&view));
            return Ok(());
        }

        let new_poll = NewPoll::new(question, choices, ends)?;
        let created = self.client.create_poll(&new_poll).await?;
        print!("{}", render::poll_created(&created));
        Ok(())
    }

    pub async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username.or_else(|| self.config.last_username.clone()) {
            Some(name) => name,
            None => prompt_username()?,
        };
        if username.is_empty() {
            anyhow::bail!("Username and password required");
        }

        let password = match std::env::var(ENV_PASSWORD) {
            Ok(password) if !password.is_empty() => password,
            _ => rpassword::prompt_password("Password: ")?,
        };
        if password.is_empty() {
            anyhow::bail!("Username and password required");
        }

        self.client.login(&username, &password).await?;

        self.config.last_username = Some(username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        Ok(())
    }

    pub fn logout(&self) {
        self.client.logout();
    }

    pub fn whoami(&self) {
        println!("{}", render::auth_line(&self.auth_status()));
        println!("API: {}", self.client.base_url());
    }
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}
