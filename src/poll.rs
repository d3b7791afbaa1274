// src/poll.rs
//! Input checks applied before anything reaches a store.

use crate::error::PollError;
use crate::models::{PollId, VoterId};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 6;
pub const MAX_QUESTION_LEN: usize = 200;
pub const MAX_OPTION_LEN: usize = 100;

/// A poll definition that passed validation and can be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPoll {
    question: String,
    options: Vec<String>,
}

impl NewPoll {
    /// Trims the question and every option, drops blank options, then
    /// enforces the 2..=6 option bound and the length limits.
    pub fn new<I, S>(question: &str, options: I) -> Result<Self, PollError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let question = question.trim();
        if question.is_empty() {
            return Err(PollError::Validation("question is required".into()));
        }
        if question.chars().count() > MAX_QUESTION_LEN {
            return Err(PollError::Validation(format!(
                "question must be at most {MAX_QUESTION_LEN} characters"
            )));
        }

        let options: Vec<String> = options
            .into_iter()
            .map(|o| o.as_ref().trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&options.len()) {
            return Err(PollError::Validation(format!(
                "a poll needs between {MIN_OPTIONS} and {MAX_OPTIONS} non-empty options, got {}",
                options.len()
            )));
        }
        if let Some(long) = options.iter().find(|o| o.chars().count() > MAX_OPTION_LEN) {
            return Err(PollError::Validation(format!(
                "option {long:?} is longer than {MAX_OPTION_LEN} characters"
            )));
        }

        Ok(Self {
            question: question.to_string(),
            options,
        })
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }
}

impl VoterId {
    pub fn parse(raw: &str) -> Result<Self, PollError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PollError::Validation("voter id is required".into()));
        }
        if raw.chars().count() > VoterId::MAX_LEN {
            return Err(PollError::Validation(format!(
                "voter id must be at most {} characters",
                VoterId::MAX_LEN
            )));
        }
        Ok(VoterId::from_trusted(raw.to_string()))
    }
}

pub fn parse_poll_id(raw: &str) -> Result<PollId, PollError> {
    raw.parse()
        .map_err(|_| PollError::InvalidIdentifier(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_bounds() {
        let empty: [&str; 0] = [];
        assert!(NewPoll::new("Q", empty).is_err());
        assert!(NewPoll::new("Q", ["A"]).is_err());
        assert!(NewPoll::new("Q", ["A", "B"]).is_ok());
        assert!(NewPoll::new("Q", ["1", "2", "3", "4", "5", "6"]).is_ok());
        assert!(matches!(
            NewPoll::new("Q", ["1", "2", "3", "4", "5", "6", "7"]),
            Err(PollError::Validation(_))
        ));
    }

    #[test]
    fn test_blank_options_are_dropped_before_counting() {
        let poll = NewPoll::new("  Pick one ", [" A ", "   ", "B", ""]).unwrap();
        assert_eq!(poll.question(), "Pick one");
        assert_eq!(poll.options(), ["A", "B"]);

        assert!(NewPoll::new("Q", ["A", " ", ""]).is_err());
    }

    #[test]
    fn test_question_required() {
        assert!(matches!(
            NewPoll::new("   ", ["A", "B"]),
            Err(PollError::Validation(_))
        ));
    }

    #[test]
    fn test_length_limits() {
        let long_question = "q".repeat(MAX_QUESTION_LEN + 1);
        assert!(NewPoll::new(&long_question, ["A", "B"]).is_err());
        let max_question = "q".repeat(MAX_QUESTION_LEN);
        assert!(NewPoll::new(&max_question, ["A", "B"]).is_ok());

        let long_option = "o".repeat(MAX_OPTION_LEN + 1);
        assert!(NewPoll::new("Q", ["A", long_option.as_str()]).is_err());
    }

    #[test]
    fn test_voter_id_parse() {
        assert_eq!(VoterId::parse(" v1 ").unwrap().as_str(), "v1");
        assert!(VoterId::parse("").is_err());
        assert!(VoterId::parse(&"x".repeat(VoterId::MAX_LEN + 1)).is_err());
    }

    #[test]
    fn test_parse_poll_id() {
        let id = PollId::new();
        assert_eq!(parse_poll_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_poll_id("123"),
            Err(PollError::InvalidIdentifier(raw)) if raw == "123"
        ));
    }
}
