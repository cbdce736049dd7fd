//! Consensus calculation. Pure: the verdict depends only on the set of
//! current votes, the voter pool and the clock reading passed in.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::models::proposal::ProposalStatus;
use crate::models::vote::{Vote, VoteType};

/// Tunable weights and thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusPolicy {
    pub flexible_weight: f64,
    pub concerns_weight: f64,
    pub min_participation: f64,
    pub min_support: f64,
    pub veto_share: f64,
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        ConsensusPolicy {
            flexible_weight: 0.5,
            concerns_weight: 0.5,
            min_participation: 0.5,
            min_support: 0.5,
            veto_share: 1.0 / 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Open,
    Approved,
    Rejected,
    /// Expired without a single vote.
    Expired,
}

impl Verdict {
    /// Status a proposal moves to for this verdict; `None` while open.
    pub fn terminal_status(&self) -> Option<ProposalStatus> {
        match self {
            Verdict::Open => None,
            Verdict::Approved => Some(ProposalStatus::Approved),
            Verdict::Rejected => Some(ProposalStatus::Rejected),
            Verdict::Expired => Some(ProposalStatus::Expired),
        }
    }
}

pub struct ConsensusInput<'a> {
    pub votes: &'a [Vote],
    pub voter_ids: &'a [i64],
    pub expires_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusResult {
    pub verdict: Verdict,
    pub vote_counts: BTreeMap<VoteType, usize>,
    pub positive_score: f64,
    pub negative_score: f64,
    pub participation: f64,
    pub total_voters: usize,
    pub votes_cast: usize,
    /// Any `no` vote present.
    pub has_strong_objection: bool,
    pub pending_voters: Vec<i64>,
    pub hours_remaining: i64,
    pub expired: bool,
    /// The verdict came from the end-of-window fallback rather than from
    /// the veto or approval rules.
    pub expiry_fallback: bool,
}

// Float shares are compared with a small tolerance so that 1/3 >= 1/3 holds.
const EPSILON: f64 = 1e-9;

fn meets(numerator: f64, total: usize, threshold: f64) -> bool {
    total > 0 && numerator / total as f64 + EPSILON >= threshold
}

pub fn calculate(input: &ConsensusInput<'_>, policy: &ConsensusPolicy) -> ConsensusResult {
    let pool: HashSet<i64> = input.voter_ids.iter().copied().collect();
    let counted: Vec<&Vote> = input
        .votes
        .iter()
        .filter(|v| pool.contains(&v.user_id))
        .collect();

    let mut vote_counts: BTreeMap<VoteType, usize> =
        VoteType::ALL.into_iter().map(|vt| (vt, 0)).collect();
    for vote in &counted {
        *vote_counts.entry(vote.vote_type).or_default() += 1;
    }
    let count = |vt: VoteType| vote_counts.get(&vt).copied().unwrap_or(0) as f64;

    let positive_score = count(VoteType::Love) + policy.flexible_weight * count(VoteType::Flexible);
    let negative_score = count(VoteType::No) + policy.concerns_weight * count(VoteType::Concerns);
    let no_votes = count(VoteType::No);

    let total_voters = pool.len();
    let votes_cast = counted.len();
    let participation = if total_voters == 0 {
        0.0
    } else {
        votes_cast as f64 / total_voters as f64
    };
    let expired = input.now >= input.expires_at;

    // Once the window has closed, whatever votes exist decide on balance,
    // at any participation level.
    let (verdict, expiry_fallback) = if no_votes > 0.0 && meets(no_votes, total_voters, policy.veto_share) {
        (Verdict::Rejected, false)
    } else if no_votes == 0.0
        && meets(votes_cast as f64, total_voters, policy.min_participation)
        && positive_score > negative_score
        && meets(positive_score, total_voters, policy.min_support)
    {
        (Verdict::Approved, false)
    } else if expired {
        let fallback = if votes_cast == 0 {
            Verdict::Expired
        } else if positive_score > negative_score {
            Verdict::Approved
        } else {
            Verdict::Rejected
        };
        (fallback, true)
    } else {
        (Verdict::Open, false)
    };

    let voted: HashSet<i64> = counted.iter().map(|v| v.user_id).collect();
    let pending_voters = input
        .voter_ids
        .iter()
        .copied()
        .filter(|id| !voted.contains(id))
        .collect();

    let hours_remaining = (input.expires_at - input.now).num_hours().max(0);

    ConsensusResult {
        verdict,
        vote_counts,
        positive_score,
        negative_score,
        participation,
        total_voters,
        votes_cast,
        has_strong_objection: no_votes > 0.0,
        pending_voters,
        hours_remaining,
        expired,
        expiry_fallback,
    }
}
