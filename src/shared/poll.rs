//! Poll Data Structure
//!
//! A poll is the votable, version-stamped collaborative entity of a trip.
//! The transitions in this module are pure: the client applies them
//! optimistically and the in-process backend applies the very same
//! functions when it accepts a mutation, so an optimistic guess and the
//! server outcome agree unless somebody else changed the poll meanwhile.
//!
//! # Rules
//!
//! - `total_votes` is always the sum of the option vote counts
//! - A single-choice poll accepts exactly one option per submission
//! - A closed poll accepts no votes and no vote removals
//! - When vote change is allowed, a new submission replaces the voter's
//!   previous selection; otherwise a second submission is rejected
//! - Re-submitting exactly the current selection is rejected, since it
//!   would change nothing
//! - Only the creator may close or delete a poll

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::shared::error::SharedError;

/// Lifecycle status of a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Active,
    Closed,
}

/// One selectable answer of a poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub text: String,
    pub votes: u32,
    /// Users who picked this option
    #[serde(default)]
    pub voters: Vec<String>,
}

impl PollOption {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            votes: 0,
            voters: Vec::new(),
        }
    }
}

/// A poll attached to a trip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub trip_id: String,
    pub question: String,
    pub options: Vec<PollOption>,
    pub total_votes: u32,
    pub status: PollStatus,
    /// Optimistic-lock version, bumped by the server on every accepted mutation
    pub version: i64,
    pub allow_multiple: bool,
    pub allow_vote_change: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Request to create a poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPoll {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple: bool,
    #[serde(default = "default_allow_vote_change")]
    pub allow_vote_change: bool,
}

fn default_allow_vote_change() -> bool {
    true
}

impl NewPoll {
    pub fn new(question: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            question: question.into(),
            options,
            allow_multiple: false,
            allow_vote_change: true,
        }
    }

    /// Allow several options per submission
    pub fn multiple_choice(mut self) -> Self {
        self.allow_multiple = true;
        self
    }

    /// Reject a second submission from the same voter
    pub fn locked_votes(mut self) -> Self {
        self.allow_vote_change = false;
        self
    }

    pub fn validate(&self) -> Result<(), SharedError> {
        if self.question.trim().is_empty() {
            return Err(SharedError::validation("question", "A poll needs a question"));
        }
        if self.options.len() < 2 {
            return Err(SharedError::validation(
                "options",
                "A poll needs at least two options",
            ));
        }
        if self.options.iter().any(|o| o.trim().is_empty()) {
            return Err(SharedError::validation("options", "Poll options cannot be empty"));
        }
        Ok(())
    }
}

impl Poll {
    /// Materialize a poll from a creation request
    ///
    /// Option ids are derived from the poll id so that an optimistic poll
    /// created offline keeps stable option ids until the server replaces it.
    pub fn from_new(
        id: impl Into<String>,
        trip_id: impl Into<String>,
        created_by: impl Into<String>,
        request: &NewPoll,
    ) -> Result<Self, SharedError> {
        request.validate()?;
        let id = id.into();
        let options = request
            .options
            .iter()
            .enumerate()
            .map(|(i, text)| PollOption::new(format!("{}-opt-{}", id, i + 1), text.trim()))
            .collect();

        Ok(Self {
            id,
            trip_id: trip_id.into(),
            question: request.question.trim().to_string(),
            options,
            total_votes: 0,
            status: PollStatus::Active,
            version: 1,
            allow_multiple: request.allow_multiple,
            allow_vote_change: request.allow_vote_change,
            created_by: created_by.into(),
            created_at: Utc::now(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.status == PollStatus::Closed
    }

    pub fn option(&self, option_id: &str) -> Option<&PollOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    /// Whether the user has a vote on any option
    pub fn has_voted(&self, user_id: &str) -> bool {
        self.options
            .iter()
            .any(|o| o.voters.iter().any(|v| v == user_id))
    }

    /// Check a vote submission against the poll rules without changing it
    pub fn validate_vote(&self, user_id: &str, option_ids: &[String]) -> Result<(), SharedError> {
        if self.is_closed() {
            return Err(SharedError::validation("status", "This poll is closed"));
        }
        if option_ids.is_empty() {
            return Err(SharedError::validation(
                "option_ids",
                "At least one option must be selected",
            ));
        }
        if !self.allow_multiple && option_ids.len() > 1 {
            return Err(SharedError::validation(
                "option_ids",
                "This poll only allows one option to be selected",
            ));
        }

        let mut seen = HashSet::new();
        for option_id in option_ids {
            if !seen.insert(option_id.as_str()) {
                return Err(SharedError::validation(
                    "option_ids",
                    format!("Option '{}' was selected twice", option_id),
                ));
            }
            if self.option(option_id).is_none() {
                return Err(SharedError::not_found("option", option_id.clone()));
            }
        }

        if self.has_voted(user_id) {
            if !self.allow_vote_change {
                return Err(SharedError::validation(
                    "option_ids",
                    "You have already voted on this poll",
                ));
            }
            if self.has_selection(user_id, option_ids) {
                return Err(SharedError::validation(
                    "option_ids",
                    "You already voted for this selection",
                ));
            }
        }
        Ok(())
    }

    /// Whether the user's current votes are exactly `option_ids`
    pub fn has_selection(&self, user_id: &str, option_ids: &[String]) -> bool {
        let current: HashSet<&str> = self
            .options
            .iter()
            .filter(|o| o.voters.iter().any(|v| v == user_id))
            .map(|o| o.id.as_str())
            .collect();
        let requested: HashSet<&str> = option_ids.iter().map(String::as_str).collect();
        !current.is_empty() && current == requested
    }

    /// Record a vote, replacing the user's previous selection
    pub fn apply_vote(&mut self, user_id: &str, option_ids: &[String]) -> Result<(), SharedError> {
        self.validate_vote(user_id, option_ids)?;
        self.clear_votes_of(user_id);

        for option in self.options.iter_mut() {
            if option_ids.iter().any(|id| *id == option.id) {
                option.votes += 1;
                option.voters.push(user_id.to_string());
            }
        }
        self.recount();
        Ok(())
    }

    /// Remove every vote the user holds on this poll
    pub fn remove_vote(&mut self, user_id: &str) -> Result<(), SharedError> {
        if self.is_closed() {
            return Err(SharedError::validation("status", "This poll is closed"));
        }
        if !self.has_voted(user_id) {
            return Err(SharedError::validation(
                "user_id",
                "You have not voted on this poll",
            ));
        }
        self.clear_votes_of(user_id);
        self.recount();
        Ok(())
    }

    /// Close the poll; creator only
    pub fn close(&mut self, user_id: &str) -> Result<(), SharedError> {
        self.ensure_creator(user_id, "close")?;
        if self.is_closed() {
            return Err(SharedError::validation("status", "This poll is already closed"));
        }
        self.status = PollStatus::Closed;
        Ok(())
    }

    /// Reject users other than the creator
    pub fn ensure_creator(&self, user_id: &str, action: &str) -> Result<(), SharedError> {
        if self.created_by != user_id {
            return Err(SharedError::validation(
                "created_by",
                format!("Only the poll creator can {} this poll", action),
            ));
        }
        Ok(())
    }

    /// Whether `total_votes` matches the option counts
    pub fn is_consistent(&self) -> bool {
        self.total_votes == self.options.iter().map(|o| o.votes).sum::<u32>()
    }

    fn clear_votes_of(&mut self, user_id: &str) {
        for option in self.options.iter_mut() {
            let before = option.voters.len();
            option.voters.retain(|v| v != user_id);
            let removed = (before - option.voters.len()) as u32;
            option.votes = option.votes.saturating_sub(removed);
        }
    }

    fn recount(&mut self) {
        self.total_votes = self.options.iter().map(|o| o.votes).sum();
    }
}
