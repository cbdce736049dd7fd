use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ItineraryStore, ProposalStore, TripStore, VoteStore};
use crate::errors::AppError;
use crate::models::proposal::{NewProposal, Proposal, ProposalFilter, ProposalStatus, Resolution};
use crate::models::trip::{Collaborator, Itinerary, ItineraryDay, Trip, TripRole};
use crate::models::vote::{Vote, VoteUpsert};

#[derive(Default)]
struct State {
    trips: HashMap<i64, TripRecord>,
    proposals: BTreeMap<i64, Proposal>,
    votes: Vec<Vote>,
    next_trip_id: i64,
    next_proposal_id: i64,
    next_vote_id: i64,
}

struct TripRecord {
    trip: Trip,
    collaborators: Vec<Collaborator>,
    itinerary: Itinerary,
}

/// Process-local store with the same guarantees as the Postgres one.
///
/// Every operation yields to the scheduler before touching state, so
/// concurrent engine calls interleave at the persistence boundary the way
/// they do against a real database. Each operation is atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn boundary(&self) -> MutexGuard<'_, State> {
        tokio::task::yield_now().await;
        self.lock()
    }

    /// Creates a trip with the given itinerary days. Returns the trip id.
    pub fn insert_trip(&self, owner_id: i64, title: &str, days: Vec<ItineraryDay>) -> i64 {
        let mut state = self.lock();
        state.next_trip_id += 1;
        let id = state.next_trip_id;
        state.trips.insert(
            id,
            TripRecord {
                trip: Trip {
                    id,
                    owner_id,
                    title: title.to_string(),
                },
                collaborators: Vec::new(),
                itinerary: Itinerary { days, version: 0 },
            },
        );
        id
    }

    /// Adds or re-roles a collaborator.
    pub fn add_collaborator(&self, trip_id: i64, user_id: i64, role: TripRole) {
        let mut state = self.lock();
        if let Some(record) = state.trips.get_mut(&trip_id) {
            match record.collaborators.iter_mut().find(|c| c.user_id == user_id) {
                Some(existing) => existing.role = role,
                None => record.collaborators.push(Collaborator { user_id, role }),
            }
        }
    }

    pub fn remove_collaborator(&self, trip_id: i64, user_id: i64) {
        let mut state = self.lock();
        if let Some(record) = state.trips.get_mut(&trip_id) {
            record.collaborators.retain(|c| c.user_id != user_id);
        }
    }
}

impl TripStore for MemoryStore {
    async fn find_trip(&self, trip_id: i64) -> Result<Option<Trip>, AppError> {
        let state = self.boundary().await;
        Ok(state.trips.get(&trip_id).map(|r| r.trip.clone()))
    }

    async fn find_collaborators(&self, trip_id: i64) -> Result<Vec<Collaborator>, AppError> {
        let state = self.boundary().await;
        Ok(state
            .trips
            .get(&trip_id)
            .map(|r| r.collaborators.clone())
            .unwrap_or_default())
    }
}

impl ItineraryStore for MemoryStore {
    async fn load_itinerary(&self, trip_id: i64) -> Result<Option<Itinerary>, AppError> {
        let state = self.boundary().await;
        Ok(state.trips.get(&trip_id).map(|r| r.itinerary.clone()))
    }

    async fn save_itinerary(
        &self,
        trip_id: i64,
        expected_version: i64,
        days: &[ItineraryDay],
    ) -> Result<bool, AppError> {
        let mut state = self.boundary().await;
        let Some(record) = state.trips.get_mut(&trip_id) else {
            return Ok(false);
        };
        if record.itinerary.version != expected_version {
            return Ok(false);
        }
        record.itinerary = Itinerary {
            days: days.to_vec(),
            version: expected_version + 1,
        };
        Ok(true)
    }
}

impl ProposalStore for MemoryStore {
    async fn insert_proposal(&self, new: &NewProposal) -> Result<Proposal, AppError> {
        let mut state = self.boundary().await;
        if !state.trips.contains_key(&new.trip_id) {
            return Err(AppError::not_found("Trip"));
        }
        state.next_proposal_id += 1;
        let id = state.next_proposal_id;
        let spec = &new.spec;
        let proposal = Proposal {
            id,
            trip_id: new.trip_id,
            proposer_id: new.proposer_id,
            proposal_type: spec.proposal_type,
            activity: spec.activity.clone(),
            target_day: spec.target_day,
            target_time_slot: spec.target_time_slot,
            target_activity_id: spec.target_activity_id.clone(),
            note: spec.note.clone(),
            status: ProposalStatus::Pending,
            created_at: new.created_at,
            updated_at: new.created_at,
            expires_at: new.expires_at,
            resolved_at: None,
            resolved_by: None,
            resolution_method: None,
            applied_at: None,
        };
        state.proposals.insert(id, proposal.clone());
        Ok(proposal)
    }

    async fn find_proposal(&self, trip_id: i64, proposal_id: i64) -> Result<Option<Proposal>, AppError> {
        let state = self.boundary().await;
        Ok(state
            .proposals
            .get(&proposal_id)
            .filter(|p| p.trip_id == trip_id)
            .cloned())
    }

    async fn find_proposals(&self, trip_id: i64, filter: &ProposalFilter) -> Result<Vec<Proposal>, AppError> {
        let state = self.boundary().await;
        let mut found: Vec<Proposal> = state
            .proposals
            .values()
            .filter(|p| p.trip_id == trip_id && filter.matches(p))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn transition_status(
        &self,
        proposal_id: i64,
        from: &[ProposalStatus],
        to: ProposalStatus,
        resolution: Option<&Resolution>,
    ) -> Result<bool, AppError> {
        let mut state = self.boundary().await;
        let Some(proposal) = state.proposals.get_mut(&proposal_id) else {
            return Ok(false);
        };
        if !from.contains(&proposal.status) {
            return Ok(false);
        }
        proposal.status = to;
        proposal.updated_at = Utc::now();
        if let Some(r) = resolution {
            proposal.resolved_at = Some(r.at);
            proposal.resolved_by = r.by.or(proposal.resolved_by);
            proposal.resolution_method = r.method.or(proposal.resolution_method);
        }
        Ok(true)
    }

    async fn mark_applied(&self, proposal_id: i64, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut state = self.boundary().await;
        match state.proposals.get_mut(&proposal_id) {
            Some(p) if p.applied_at.is_none() => {
                p.applied_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_pending_proposal(&self, proposal_id: i64) -> Result<bool, AppError> {
        let mut state = self.boundary().await;
        let pending = state
            .proposals
            .get(&proposal_id)
            .is_some_and(|p| p.status == ProposalStatus::Pending);
        if !pending {
            return Ok(false);
        }
        state.proposals.remove(&proposal_id);
        state.votes.retain(|v| v.proposal_id != proposal_id);
        Ok(true)
    }

    async fn find_expired_open(&self, now: DateTime<Utc>) -> Result<Vec<Proposal>, AppError> {
        let state = self.boundary().await;
        Ok(state
            .proposals
            .values()
            .filter(|p| p.is_open() && p.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn find_unapplied_approved(&self) -> Result<Vec<Proposal>, AppError> {
        let state = self.boundary().await;
        Ok(state
            .proposals
            .values()
            .filter(|p| p.status == ProposalStatus::Approved && p.applied_at.is_none())
            .cloned()
            .collect())
    }
}

impl VoteStore for MemoryStore {
    async fn upsert_vote(&self, upsert: &VoteUpsert) -> Result<Option<(Vote, bool)>, AppError> {
        let mut state = self.boundary().await;
        let open = state
            .proposals
            .get(&upsert.proposal_id)
            .is_some_and(|p| p.is_open());
        if !open {
            return Ok(None);
        }

        if let Some(existing) = state
            .votes
            .iter_mut()
            .find(|v| v.proposal_id == upsert.proposal_id && v.user_id == upsert.user_id)
        {
            existing.vote_type = upsert.vote_type;
            existing.comment = upsert.comment.clone();
            existing.updated_at = upsert.at;
            return Ok(Some((existing.clone(), true)));
        }

        state.next_vote_id += 1;
        let vote = Vote {
            id: state.next_vote_id,
            proposal_id: upsert.proposal_id,
            user_id: upsert.user_id,
            vote_type: upsert.vote_type,
            comment: upsert.comment.clone(),
            voted_at: upsert.at,
            updated_at: upsert.at,
        };
        state.votes.push(vote.clone());
        Ok(Some((vote, false)))
    }

    async fn delete_vote(&self, proposal_id: i64, user_id: i64) -> Result<bool, AppError> {
        let mut state = self.boundary().await;
        let open = state
            .proposals
            .get(&proposal_id)
            .is_some_and(|p| p.is_open());
        if !open {
            return Ok(false);
        }
        let before = state.votes.len();
        state
            .votes
            .retain(|v| !(v.proposal_id == proposal_id && v.user_id == user_id));
        Ok(state.votes.len() < before)
    }

    async fn find_votes(&self, proposal_id: i64) -> Result<Vec<Vote>, AppError> {
        let state = self.boundary().await;
        let mut votes: Vec<Vote> = state
            .votes
            .iter()
            .filter(|v| v.proposal_id == proposal_id)
            .cloned()
            .collect();
        votes.sort_by(|a, b| a.voted_at.cmp(&b.voted_at).then(a.id.cmp(&b.id)));
        Ok(votes)
    }

    async fn find_votes_for(&self, proposal_ids: &[i64]) -> Result<Vec<Vote>, AppError> {
        let state = self.boundary().await;
        let mut votes: Vec<Vote> = state
            .votes
            .iter()
            .filter(|v| proposal_ids.contains(&v.proposal_id))
            .cloned()
            .collect();
        votes.sort_by(|a, b| a.voted_at.cmp(&b.voted_at).then(a.id.cmp(&b.id)));
        Ok(votes)
    }
}
