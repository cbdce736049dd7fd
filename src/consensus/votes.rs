use chrono::Utc;
use serde::Serialize;

use super::lifecycle::{settle, settle_if_expired};
use super::voter_pool::load_members;
use super::{Engine, EventKind};
use crate::auth::abac::{Capability, require_capability};
use crate::errors::AppError;
use crate::models::proposal::{Proposal, ProposalStatus};
use crate::models::vote::{Ballot, Vote, VoteUpsert};
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CastOutcome {
    pub vote: Vote,
    pub is_update: bool,
    /// Proposal state after consensus was re-evaluated.
    pub proposal: Proposal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteList {
    pub votes: Vec<Vote>,
    pub current_user_vote: Option<Vote>,
}

fn already_resolved() -> AppError {
    AppError::Conflict("Proposal has already been resolved".to_string())
}

/// Casts or overwrites the caller's vote, then re-evaluates consensus.
pub async fn cast_vote<S: Store>(
    engine: &Engine<S>,
    trip_id: i64,
    proposal_id: i64,
    user_id: i64,
    ballot: &Ballot,
) -> Result<CastOutcome, AppError> {
    let ballot = ballot.validate().map_err(AppError::Validation)?;

    let members = load_members(&engine.store, trip_id).await?;
    let proposal = engine
        .store
        .find_proposal(trip_id, proposal_id)
        .await?
        .ok_or_else(|| AppError::not_found("Proposal"))?;
    require_capability(&members, user_id, Capability::Vote)?;
    let pool = members.voter_pool();

    let mut proposal = settle_if_expired(engine, proposal, &pool).await?;
    if !proposal.is_open() {
        return Err(already_resolved());
    }

    let (vote, is_update) = engine
        .store
        .upsert_vote(&VoteUpsert {
            proposal_id,
            user_id,
            vote_type: ballot.vote_type,
            comment: ballot.comment,
            at: Utc::now(),
        })
        .await?
        .ok_or_else(already_resolved)?;

    if proposal.status == ProposalStatus::Pending
        && engine
            .store
            .transition_status(proposal_id, &[ProposalStatus::Pending], ProposalStatus::Voting, None)
            .await?
    {
        proposal.status = ProposalStatus::Voting;
    }

    log::debug!(
        "User {user_id} voted {} on proposal {proposal_id} (update: {is_update})",
        vote.vote_type
    );
    engine.publish(EventKind::VoteChanged, trip_id, proposal_id, Some(proposal.status));

    let proposal = settle(engine, proposal, &pool).await?;
    Ok(CastOutcome {
        vote,
        is_update,
        proposal,
    })
}

/// Deletes the caller's own vote while the proposal is open.
pub async fn remove_vote<S: Store>(
    engine: &Engine<S>,
    trip_id: i64,
    proposal_id: i64,
    user_id: i64,
) -> Result<Proposal, AppError> {
    let members = load_members(&engine.store, trip_id).await?;
    require_capability(&members, user_id, Capability::View)?;
    let pool = members.voter_pool();

    let proposal = engine
        .store
        .find_proposal(trip_id, proposal_id)
        .await?
        .ok_or_else(|| AppError::not_found("Proposal"))?;
    let proposal = settle_if_expired(engine, proposal, &pool).await?;
    if !proposal.is_open() {
        return Err(already_resolved());
    }

    if !engine.store.delete_vote(proposal_id, user_id).await? {
        // Either there was no vote, or the proposal closed underneath us.
        let current = engine.store.find_proposal(trip_id, proposal_id).await?;
        return match current {
            Some(p) if !p.is_open() => Err(already_resolved()),
            _ => Err(AppError::not_found("Vote")),
        };
    }

    log::debug!("User {user_id} removed their vote on proposal {proposal_id}");
    engine.publish(EventKind::VoteChanged, trip_id, proposal_id, Some(proposal.status));
    settle(engine, proposal, &pool).await
}

/// All votes on a proposal, oldest first, plus the caller's own.
pub async fn list_votes<S: Store>(
    engine: &Engine<S>,
    trip_id: i64,
    proposal_id: i64,
    user_id: i64,
) -> Result<VoteList, AppError> {
    let members = load_members(&engine.store, trip_id).await?;
    require_capability(&members, user_id, Capability::View)?;
    engine
        .store
        .find_proposal(trip_id, proposal_id)
        .await?
        .ok_or_else(|| AppError::not_found("Proposal"))?;

    let votes = engine.store.find_votes(proposal_id).await?;
    let current_user_vote = votes.iter().find(|v| v.user_id == user_id).cloned();
    Ok(VoteList {
        votes,
        current_user_vote,
    })
}
