//! Text rendering of view models.
//!
//! Every function here is pure: view model in, string out.

use std::fmt::Write;

use pollster_core::models::{Poll, Vote};
use pollster_core::utils::{format_date, format_datetime, percent_bar, truncate_string};
use pollster_core::views::{
    AuthStatus, CreatePollView, DetailMode, Page, PollDetailView, PollListView, ResultsView,
};

/// Width of the results bar in characters
const BAR_WIDTH: usize = 30;

/// Maximum question length in the poll list
const LIST_QUESTION_WIDTH: usize = 60;

pub fn auth_line(status: &AuthStatus) -> String {
    match status {
        AuthStatus::LoggedIn { username } => format!("Signed in as {}", username),
        AuthStatus::LoggedOut => "Not signed in (run `pollster login`)".to_string(),
    }
}

pub fn page(page: &Page) -> String {
    match page {
        Page::PollList(view) => poll_list(view),
        Page::PollDetail(view) => poll_detail(view),
        Page::CreatePoll(view) => create_poll(view),
        Page::NotFound => "Poll not found.\n".to_string(),
    }
}

pub fn poll_list(view: &PollListView) -> String {
    match view {
        PollListView::Empty => "No polls available yet.\n".to_string(),
        PollListView::Polls(polls) => polls.iter().map(poll_card).collect(),
    }
}

pub fn poll_card(poll: &Poll) -> String {
    let ends = match &poll.end_date {
        Some(end) => format!("Ends: {}", format_date(end)),
        None => "No end date".to_string(),
    };
    format!(
        "[{}] {}\n    Published: {} | {} | #poll/{}\n",
        poll.id,
        truncate_string(&poll.question, LIST_QUESTION_WIDTH),
        format_date(&poll.pub_date),
        ends,
        poll.id
    )
}

pub fn poll_detail(view: &PollDetailView) -> String {
    let poll = &view.poll;
    let mut out = String::new();
    let _ = writeln!(out, "{}", poll.question);
    let _ = writeln!(out, "Published: {}", format_datetime(&poll.pub_date));
    match &poll.end_date {
        Some(end) => {
            let _ = writeln!(out, "Ends: {}", format_datetime(end));
        }
        None => {
            let _ = writeln!(out, "No end date specified");
        }
    }
    out.push('\n');

    match view.mode {
        DetailMode::Results => {
            out.push_str(&results(&view.results));
            if view.expired {
                out.push_str("This poll has ended.\n");
            }
        }
        DetailMode::VoteForm => {
            for choice in &poll.choices {
                let _ = writeln!(out, "  ({}) {}", choice.id, choice.choice_text);
            }
            let _ = writeln!(out, "\nVote with: pollster vote {} <choice id>", poll.id);
        }
        DetailMode::ReadOnly => {
            for choice in &poll.choices {
                let _ = writeln!(out, "  - {}", choice.choice_text);
            }
            out.push_str("\nPlease log in to cast your vote.\n");
        }
    }
    out
}

pub fn results(view: &ResultsView) -> String {
    let mut out = String::from("Results\n");
    for choice in &view.choices {
        let _ = writeln!(
            out,
            "  {:<24} [{}] {:>5.1}%  {} votes",
            truncate_string(&choice.text, 24),
            percent_bar(choice.percentage, BAR_WIDTH),
            choice.percentage,
            choice.votes
        );
    }
    let _ = writeln!(out, "Total Votes: {}", view.total_votes);
    out
}

pub fn create_poll(view: &CreatePollView) -> String {
    match view {
        CreatePollView::Form { username } => {
            let mut out = match username {
                Some(name) => format!("Creating a poll as {}.\n", name),
                None => "Creating a poll.\n".to_string(),
            };
            out.push_str(
                "Usage: pollster create \"<question>\" --choice <text> --choice <text> [--ends <RFC 3339 time>]\n",
            );
            out
        }
        CreatePollView::LoginRequired => {
            "You must be logged in to create a poll. Run `pollster login` first.\n".to_string()
        }
    }
}

/// `poll` names the choice when the updated poll could be loaded
pub fn vote_cast(vote: &Vote, poll: Option<&Poll>) -> String {
    let choice = poll
        .and_then(|p| p.choice(vote.choice))
        .map(|c| c.choice_text.as_str())
        .unwrap_or("your choice");
    format!("Vote cast successfully for \"{}\"!\n", choice)
}

pub fn poll_created(poll: &Poll) -> String {
    format!("Poll created successfully! View it with: pollster open '#poll/{}'\n", poll.id)
}
