//! Slot contention: proposals aimed at the same day and time slot compete,
//! and a slot summary reports which one (if any) has won.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::proposal::{Proposal, ProposalStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Voting,
    Winner,
    Tie,
    NoQuorum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    Open,
    Approved,
    Closed,
}

impl CandidateState {
    pub fn of(status: ProposalStatus) -> Self {
        match status {
            ProposalStatus::Pending | ProposalStatus::Voting => CandidateState::Open,
            ProposalStatus::Approved => CandidateState::Approved,
            _ => CandidateState::Closed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotCandidate {
    pub proposal_id: i64,
    pub score: f64,
    pub state: CandidateState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotScore {
    pub proposal_id: i64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSummary {
    pub slot_key: String,
    pub status: SlotStatus,
    pub winner_id: Option<i64>,
    /// Highest score first.
    pub ranking: Vec<SlotScore>,
}

/// Groups proposals by `slot_key`, keeping input order inside each group.
/// Withdrawn proposals never compete.
pub fn group_by_slot<'a, I>(proposals: I) -> BTreeMap<String, Vec<&'a Proposal>>
where
    I: IntoIterator<Item = &'a Proposal>,
{
    let mut groups: BTreeMap<String, Vec<&'a Proposal>> = BTreeMap::new();
    for p in proposals {
        if p.status != ProposalStatus::Withdrawn {
            groups.entry(p.slot_key()).or_default().push(p);
        }
    }
    groups
}

/// Ids of the other open proposals competing for `proposal`'s slot.
pub fn competing_ids(all: &[Proposal], proposal: &Proposal) -> Vec<i64> {
    let key = proposal.slot_key();
    all.iter()
        .filter(|p| p.id != proposal.id && p.is_open() && p.slot_key() == key)
        .map(|p| p.id)
        .collect()
}

pub fn determine_outcome(slot_key: &str, candidates: &[SlotCandidate]) -> SlotSummary {
    let mut ranked: Vec<&SlotCandidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    let ranking = ranked
        .iter()
        .map(|c| SlotScore {
            proposal_id: c.proposal_id,
            score: c.score,
        })
        .collect();

    let summary = |status, winner_id| SlotSummary {
        slot_key: slot_key.to_string(),
        status,
        winner_id,
        ranking,
    };

    let approved: Vec<&&SlotCandidate> = ranked
        .iter()
        .filter(|c| c.state == CandidateState::Approved)
        .collect();
    if approved.len() == 1 {
        return summary(SlotStatus::Winner, Some(approved[0].proposal_id));
    }
    if ranked.len() >= 2 && ranked[0].score == ranked[1].score && ranked[0].score > 0.0 {
        return summary(SlotStatus::Tie, None);
    }
    if ranked.iter().any(|c| c.state == CandidateState::Open) {
        return summary(SlotStatus::Voting, None);
    }
    summary(SlotStatus::NoQuorum, None)
}
