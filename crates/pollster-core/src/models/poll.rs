use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fewest choices a poll may be created with
pub const MIN_CHOICES: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: i64,
    pub question: String,
    pub pub_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl Poll {
    /// A poll with an end date in the past no longer accepts votes
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_date.map(|end| end < now).unwrap_or(false)
    }

    pub fn total_votes(&self) -> u64 {
        self.choices.iter().map(|c| c.votes_count).sum()
    }

    pub fn choice(&self, choice_id: i64) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == choice_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub id: i64,
    pub choice_text: String,
    #[serde(default)]
    pub votes_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: i64,
    pub choice: i64,
    pub user: Option<i64>,
    pub voted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewChoice {
    pub choice_text: String,
}

/// A poll ready to submit. Only constructible through [`NewPoll::new`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPoll {
    question: String,
    choices: Vec<NewChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<DateTime<Utc>>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a question")]
    EmptyQuestion,

    #[error("Please enter at least two choices")]
    TooFewChoices,
}

impl NewPoll {
    /// Validate a new poll. Choices are trimmed and blank ones dropped.
    pub fn new<I, S>(
        question: &str,
        choices: I,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }

        let choices: Vec<NewChoice> = choices
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .map(|choice_text| NewChoice { choice_text })
            .collect();
        if choices.len() < MIN_CHOICES {
            return Err(ValidationError::TooFewChoices);
        }

        Ok(Self {
            question: question.to_string(),
            choices,
            end_date,
        })
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn choices(&self) -> &[NewChoice] {
        &self.choices
    }

    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }
}
