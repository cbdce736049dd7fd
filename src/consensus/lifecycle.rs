use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;

use super::calculator::{self, ConsensusInput, ConsensusResult, Verdict};
use super::executor::{apply_or_alert, new_activity_id};
use super::slots::{self, CandidateState, SlotCandidate, SlotSummary};
use super::voter_pool::{VoterPool, load_members};
use super::{Engine, EventKind};
use crate::auth::abac::{Capability, require_capability, require_proposer};
use crate::errors::AppError;
use crate::models::proposal::{
    NewProposal, Proposal, ProposalAction, ProposalDraft, ProposalFilter, ProposalStatus,
    Resolution, ResolutionMethod, StatusFilter,
};
use crate::models::vote::{Vote, VoteSummary, VoteType};
use crate::store::Store;

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// A proposal as clients see it: the row plus its votes and the consensus
/// computed from them at read time.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalView {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub votes: Vec<Vote>,
    pub vote_summary: VoteSummary,
    pub consensus: ConsensusResult,
    pub current_user_vote: Option<VoteType>,
    /// Other open proposals aimed at the same day and slot.
    pub competing_proposals: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalListing {
    pub proposals: Vec<ProposalView>,
    pub total_voters: usize,
    pub slots: Vec<SlotSummary>,
}

fn not_found_proposal() -> AppError {
    AppError::not_found("Proposal")
}

fn already_resolved() -> AppError {
    AppError::Conflict("Proposal has already been resolved".to_string())
}

pub(crate) fn evaluate<S>(
    engine: &Engine<S>,
    proposal: &Proposal,
    votes: &[Vote],
    pool: &VoterPool,
) -> ConsensusResult {
    calculator::calculate(
        &ConsensusInput {
            votes,
            voter_ids: &pool.voter_ids,
            expires_at: proposal.expires_at,
            now: Utc::now(),
        },
        &engine.settings.policy,
    )
}

fn build_view(
    proposal: Proposal,
    votes: Vec<Vote>,
    consensus: ConsensusResult,
    viewer_id: i64,
    open: &[Proposal],
) -> ProposalView {
    let current_user_vote = votes
        .iter()
        .find(|v| v.user_id == viewer_id)
        .map(|v| v.vote_type);
    let competing_proposals = slots::competing_ids(open, &proposal);
    ProposalView {
        vote_summary: VoteSummary::from_votes(&votes),
        proposal,
        votes,
        consensus,
        current_user_vote,
        competing_proposals,
    }
}

async fn load_proposal<S: Store>(
    engine: &Engine<S>,
    trip_id: i64,
    proposal_id: i64,
) -> Result<Proposal, AppError> {
    engine
        .store
        .find_proposal(trip_id, proposal_id)
        .await?
        .ok_or_else(not_found_proposal)
}

// ---------------------------------------------------------------------------
// Consensus transitions
// ---------------------------------------------------------------------------

/// Re-evaluates an open proposal and moves it to a terminal status if the
/// calculator says so. Only the caller whose compare-and-set succeeds runs
/// the executor and publishes; everyone else just gets the current row.
pub(crate) async fn settle<S: Store>(
    engine: &Engine<S>,
    proposal: Proposal,
    pool: &VoterPool,
) -> Result<Proposal, AppError> {
    if !proposal.is_open() {
        return Ok(proposal);
    }
    let votes = engine.store.find_votes(proposal.id).await?;
    let result = evaluate(engine, &proposal, &votes, pool);
    let Some(to) = result.verdict.terminal_status() else {
        return Ok(proposal);
    };

    let method = if result.expiry_fallback {
        ResolutionMethod::Expired
    } else {
        ResolutionMethod::Consensus
    };
    let resolution = Resolution {
        at: Utc::now(),
        by: None,
        method: Some(method),
    };
    let won = engine
        .store
        .transition_status(proposal.id, &ProposalStatus::OPEN, to, Some(&resolution))
        .await?;

    let current = load_proposal(engine, proposal.trip_id, proposal.id).await?;
    if !won {
        return Ok(current);
    }

    log::info!(
        "Proposal {} on trip {} resolved {} by {} ({} of {} voted)",
        proposal.id,
        proposal.trip_id,
        to,
        method,
        result.votes_cast,
        result.total_voters
    );
    if result.verdict == Verdict::Approved {
        apply_or_alert(engine, &current).await;
    }
    engine.publish(EventKind::ProposalUpdated, current.trip_id, current.id, Some(current.status));
    load_proposal(engine, current.trip_id, current.id).await
}

/// Settles the proposal first if it is open but already past its expiry.
pub(crate) async fn settle_if_expired<S: Store>(
    engine: &Engine<S>,
    proposal: Proposal,
    pool: &VoterPool,
) -> Result<Proposal, AppError> {
    if proposal.is_open() && proposal.is_expired_at(Utc::now()) {
        settle(engine, proposal, pool).await
    } else {
        Ok(proposal)
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

pub async fn propose<S: Store>(
    engine: &Engine<S>,
    trip_id: i64,
    proposer_id: i64,
    draft: &ProposalDraft,
) -> Result<Proposal, AppError> {
    let mut spec = draft.validate().map_err(AppError::Validation)?;

    let members = load_members(&engine.store, trip_id).await?;
    require_capability(&members, proposer_id, Capability::Propose)?;

    let itinerary = engine
        .store
        .load_itinerary(trip_id)
        .await?
        .ok_or_else(|| AppError::not_found("Trip"))?;
    let day_count = itinerary.days.len();
    if spec.target_day as usize >= day_count {
        return Err(AppError::Validation(format!(
            "Target day {} is outside the itinerary ({day_count} days)",
            spec.target_day
        )));
    }

    let now = Utc::now();
    if spec.activity.id.is_none() {
        spec.activity.id = Some(new_activity_id(now));
    }

    let proposal = engine
        .store
        .insert_proposal(&NewProposal {
            trip_id,
            proposer_id,
            spec,
            created_at: now,
            expires_at: now + engine.settings.expiry,
        })
        .await?;

    log::info!(
        "Proposal {} created on trip {} by user {} ({} for day {})",
        proposal.id,
        trip_id,
        proposer_id,
        proposal.proposal_type,
        proposal.target_day
    );
    engine.publish(EventKind::ProposalCreated, trip_id, proposal.id, Some(proposal.status));
    Ok(proposal)
}

pub async fn withdraw<S: Store>(
    engine: &Engine<S>,
    trip_id: i64,
    proposal_id: i64,
    requester_id: i64,
) -> Result<Proposal, AppError> {
    let members = load_members(&engine.store, trip_id).await?;
    let proposal = load_proposal(engine, trip_id, proposal_id).await?;
    require_proposer(&proposal, requester_id, "withdraw")?;

    let proposal = settle_if_expired(engine, proposal, &members.voter_pool()).await?;
    if !proposal.is_open() {
        return Err(already_resolved());
    }

    let resolution = Resolution {
        at: Utc::now(),
        by: Some(requester_id),
        method: None,
    };
    let won = engine
        .store
        .transition_status(
            proposal_id,
            &ProposalStatus::OPEN,
            ProposalStatus::Withdrawn,
            Some(&resolution),
        )
        .await?;
    if !won {
        return Err(already_resolved());
    }

    log::info!("Proposal {proposal_id} on trip {trip_id} withdrawn by user {requester_id}");
    engine.publish(
        EventKind::ProposalUpdated,
        trip_id,
        proposal_id,
        Some(ProposalStatus::Withdrawn),
    );
    load_proposal(engine, trip_id, proposal_id).await
}

/// Owner override: approve or reject regardless of votes.
pub async fn force_resolve<S: Store>(
    engine: &Engine<S>,
    trip_id: i64,
    proposal_id: i64,
    owner_id: i64,
    action: ProposalAction,
) -> Result<Proposal, AppError> {
    let to = match action {
        ProposalAction::Approve => ProposalStatus::Approved,
        ProposalAction::Reject => ProposalStatus::Rejected,
        ProposalAction::Withdraw => {
            return Err(AppError::Validation(
                "Withdrawal is not an owner override".to_string(),
            ));
        }
    };

    let members = load_members(&engine.store, trip_id).await?;
    require_capability(&members, owner_id, Capability::ForceResolve)?;
    let proposal = load_proposal(engine, trip_id, proposal_id).await?;
    let proposal = settle_if_expired(engine, proposal, &members.voter_pool()).await?;
    if !proposal.is_open() {
        return Err(already_resolved());
    }

    let resolution = Resolution {
        at: Utc::now(),
        by: Some(owner_id),
        method: Some(ResolutionMethod::OwnerOverride),
    };
    let won = engine
        .store
        .transition_status(proposal_id, &ProposalStatus::OPEN, to, Some(&resolution))
        .await?;
    if !won {
        return Err(already_resolved());
    }

    log::info!("Proposal {proposal_id} on trip {trip_id} {to} by owner override");
    let current = load_proposal(engine, trip_id, proposal_id).await?;
    if to == ProposalStatus::Approved {
        apply_or_alert(engine, &current).await;
    }
    engine.publish(EventKind::ProposalUpdated, trip_id, proposal_id, Some(to));
    load_proposal(engine, trip_id, proposal_id).await
}

/// Hard delete, proposer only, while still pending.
pub async fn delete<S: Store>(
    engine: &Engine<S>,
    trip_id: i64,
    proposal_id: i64,
    requester_id: i64,
) -> Result<(), AppError> {
    load_members(&engine.store, trip_id).await?;
    let proposal = load_proposal(engine, trip_id, proposal_id).await?;
    require_proposer(&proposal, requester_id, "delete")?;

    if proposal.status != ProposalStatus::Pending {
        return Err(AppError::Conflict(
            "Only pending proposals can be deleted".to_string(),
        ));
    }
    if !engine.store.delete_pending_proposal(proposal_id).await? {
        return Err(AppError::Conflict(
            "Only pending proposals can be deleted".to_string(),
        ));
    }

    log::info!("Proposal {proposal_id} on trip {trip_id} deleted by user {requester_id}");
    engine.publish(EventKind::ProposalDeleted, trip_id, proposal_id, None);
    Ok(())
}

pub async fn get_proposal<S: Store>(
    engine: &Engine<S>,
    trip_id: i64,
    proposal_id: i64,
    viewer_id: i64,
) -> Result<ProposalView, AppError> {
    let members = load_members(&engine.store, trip_id).await?;
    require_capability(&members, viewer_id, Capability::View)?;
    let pool = members.voter_pool();

    let proposal = load_proposal(engine, trip_id, proposal_id).await?;
    let proposal = settle_if_expired(engine, proposal, &pool).await?;

    let votes = engine.store.find_votes(proposal.id).await?;
    let consensus = evaluate(engine, &proposal, &votes, &pool);
    let open = engine
        .store
        .find_proposals(
            trip_id,
            &ProposalFilter {
                status: StatusFilter::Active,
                ..Default::default()
            },
        )
        .await?;

    Ok(build_view(proposal, votes, consensus, viewer_id, &open))
}

pub async fn list_proposals<S: Store>(
    engine: &Engine<S>,
    trip_id: i64,
    viewer_id: i64,
    filter: &ProposalFilter,
) -> Result<ProposalListing, AppError> {
    let members = load_members(&engine.store, trip_id).await?;
    require_capability(&members, viewer_id, Capability::View)?;
    let pool = members.voter_pool();

    let mut proposals = Vec::new();
    for proposal in engine.store.find_proposals(trip_id, filter).await? {
        let proposal = settle_if_expired(engine, proposal, &pool).await?;
        // Settling can move a row out of the requested status.
        if filter.matches(&proposal) {
            proposals.push(proposal);
        }
    }

    let unfiltered_active = filter.status == StatusFilter::Active
        && filter.day.is_none()
        && filter.time_slot.is_none();
    let open: Vec<Proposal> = if unfiltered_active {
        proposals.clone()
    } else {
        engine
            .store
            .find_proposals(
                trip_id,
                &ProposalFilter {
                    status: StatusFilter::Active,
                    ..Default::default()
                },
            )
            .await?
    };

    let ids: Vec<i64> = proposals.iter().map(|p| p.id).collect();
    let mut votes_by_proposal: HashMap<i64, Vec<Vote>> = HashMap::new();
    for vote in engine.store.find_votes_for(&ids).await? {
        votes_by_proposal.entry(vote.proposal_id).or_default().push(vote);
    }

    let views: Vec<ProposalView> = proposals
        .into_iter()
        .map(|p| {
            let votes = votes_by_proposal.remove(&p.id).unwrap_or_default();
            let consensus = evaluate(engine, &p, &votes, &pool);
            build_view(p, votes, consensus, viewer_id, &open)
        })
        .collect();

    let slots = slots::group_by_slot(views.iter().map(|v| &v.proposal))
        .into_iter()
        .map(|(key, group)| {
            let candidates: Vec<SlotCandidate> = group
                .iter()
                .filter_map(|p| views.iter().find(|v| v.proposal.id == p.id))
                .map(|v| SlotCandidate {
                    proposal_id: v.proposal.id,
                    score: v.consensus.positive_score,
                    state: CandidateState::of(v.proposal.status),
                })
                .collect();
            slots::determine_outcome(&key, &candidates)
        })
        .collect();

    Ok(ProposalListing {
        proposals: views,
        total_voters: pool.total(),
        slots,
    })
}
