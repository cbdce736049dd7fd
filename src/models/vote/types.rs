use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    Love,
    Flexible,
    Concerns,
    No,
}

impl VoteType {
    pub const ALL: [VoteType; 4] = [VoteType::Love, VoteType::Flexible, VoteType::Concerns, VoteType::No];

    /// Objections must be explained.
    pub fn requires_comment(&self) -> bool {
        matches!(self, VoteType::Concerns | VoteType::No)
    }

    pub fn is_supportive(&self) -> bool {
        matches!(self, VoteType::Love | VoteType::Flexible)
    }
}

string_enum!(VoteType, "vote type", {
    VoteType::Love => "love",
    VoteType::Flexible => "flexible",
    VoteType::Concerns => "concerns",
    VoteType::No => "no",
});

/// A user's live vote on a proposal. One row per (proposal, user).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vote {
    pub id: i64,
    pub proposal_id: i64,
    pub user_id: i64,
    pub vote_type: VoteType,
    pub comment: Option<String>,
    pub voted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw request body for casting a vote. Validated by `Ballot::validate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub vote_type: Option<String>,
    pub comment: Option<String>,
}

/// A ballot that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidBallot {
    pub vote_type: VoteType,
    pub comment: Option<String>,
}

impl Ballot {
    pub fn new(vote_type: VoteType, comment: Option<&str>) -> Self {
        Ballot {
            vote_type: Some(vote_type.as_str().to_string()),
            comment: comment.map(String::from),
        }
    }

    pub fn validate(&self) -> Result<ValidBallot, String> {
        let raw = self
            .vote_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "voteType is required".to_string())?;
        let vote_type = raw.parse::<VoteType>()?;

        let comment = self
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from);

        if vote_type.requires_comment() && comment.is_none() {
            return Err(format!("A comment is required when voting '{vote_type}'"));
        }

        Ok(ValidBallot { vote_type, comment })
    }
}

/// Row written by the vote upsert.
#[derive(Debug, Clone)]
pub struct VoteUpsert {
    pub proposal_id: i64,
    pub user_id: i64,
    pub vote_type: VoteType,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

/// Counts shown next to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VoteSummary {
    pub supportive: usize,
    pub opposed: usize,
    pub total: usize,
}

impl VoteSummary {
    pub fn from_votes(votes: &[Vote]) -> Self {
        let supportive = votes.iter().filter(|v| v.vote_type.is_supportive()).count();
        VoteSummary {
            supportive,
            opposed: votes.len() - supportive,
            total: votes.len(),
        }
    }
}
