// models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a poll. Always a v4 UUID in its hyphenated text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollId(Uuid);

impl PollId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PollId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for PollId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for PollId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque token naming the party casting a vote. Not authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterId(String);

impl VoterId {
    pub const MAX_LEN: usize = 128;

    /// Wraps a token that already passed `VoterId::parse` checks.
    pub(crate) fn from_trusted(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub text: String,
    pub votes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: PollId,
    pub question: String,
    pub options: Vec<PollOption>,
    pub created_at: DateTime<Utc>,
}

impl Poll {
    pub fn tallies(&self) -> Vec<u64> {
        self.options.iter().map(|o| o.votes).collect()
    }

    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|o| o.votes).sum()
    }

    /// Converts a caller-supplied index into a position in `options`.
    pub fn option_position(&self, index: i64) -> Option<usize> {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.options.len())
    }
}

/// One accepted vote in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub poll_id: PollId,
    pub voter_id: VoterId,
    pub option_index: usize,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/polls`.
#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<OptionInput>,
}

/// Options may be sent either as bare strings or as `{ "text": ... }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OptionInput {
    Text(String),
    Object { text: String },
}

impl OptionInput {
    pub fn into_text(self) -> String {
        match self {
            OptionInput::Text(text) | OptionInput::Object { text } => text,
        }
    }
}

/// Body of `POST /api/polls/{id}/vote`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub option_index: i64,
    pub voter_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub message: &'static str,
    pub poll: Poll,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub repaired: bool,
    pub previous: Vec<u64>,
    pub poll: Poll,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_poll() -> Poll {
        Poll {
            id: PollId::new(),
            question: "Pick one".to_string(),
            options: vec![
                PollOption { text: "A".to_string(), votes: 3 },
                PollOption { text: "B".to_string(), votes: 1 },
            ],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_poll_id_parse() {
        let id = PollId::new();
        assert_eq!(id.to_string().parse::<PollId>().unwrap(), id);
        assert!("not-a-uuid".parse::<PollId>().is_err());
        assert!("".parse::<PollId>().is_err());
    }

    #[test]
    fn test_option_position_bounds() {
        let poll = sample_poll();
        assert_eq!(poll.option_position(0), Some(0));
        assert_eq!(poll.option_position(1), Some(1));
        assert_eq!(poll.option_position(2), None);
        assert_eq!(poll.option_position(-1), None);
    }

    #[test]
    fn test_poll_serializes_camel_case() {
        let poll = sample_poll();
        let json = serde_json::to_value(&poll).unwrap();
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["options"][0]["votes"], 3);
        assert_eq!(json["id"], poll.id.to_string());
        assert_eq!(poll.total_votes(), 4);
        assert_eq!(poll.tallies(), vec![3, 1]);
    }

    #[test]
    fn test_option_input_accepts_both_shapes() {
        let req: CreatePollRequest = serde_json::from_str(
            r#"{"question":"Q","options":["A",{"text":"B"}]}"#,
        )
        .unwrap();
        let texts: Vec<String> = req.options.into_iter().map(OptionInput::into_text).collect();
        assert_eq!(texts, vec!["A", "B"]);
    }

    #[test]
    fn test_vote_request_voter_optional() {
        let req: VoteRequest = serde_json::from_str(r#"{"optionIndex":1}"#).unwrap();
        assert_eq!(req.option_index, 1);
        assert!(req.voter_id.is_none());
    }
}
