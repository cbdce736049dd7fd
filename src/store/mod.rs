//! Persistence ports used by the consensus engine.
//!
//! Each aggregate gets its own trait so backends can be assembled piecewise;
//! `Store` is the bundle the engine is generic over. `PgStore` (in `db`)
//! is the production backend, `MemoryStore` the process-local one.

#![allow(async_fn_in_trait)]

pub mod memory;

pub use memory::MemoryStore;

use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::models::proposal::{NewProposal, Proposal, ProposalFilter, ProposalStatus, Resolution};
use crate::models::trip::{Collaborator, Itinerary, ItineraryDay, Trip};
use crate::models::vote::{Vote, VoteUpsert};

pub trait TripStore {
    async fn find_trip(&self, trip_id: i64) -> Result<Option<Trip>, AppError>;
    /// Collaborator rows in join order.
    async fn find_collaborators(&self, trip_id: i64) -> Result<Vec<Collaborator>, AppError>;
}

pub trait ItineraryStore {
    async fn load_itinerary(&self, trip_id: i64) -> Result<Option<Itinerary>, AppError>;
    /// Saves `days` only if the stored version still equals
    /// `expected_version`, bumping it. Returns `false` on a version conflict.
    async fn save_itinerary(
        &self,
        trip_id: i64,
        expected_version: i64,
        days: &[ItineraryDay],
    ) -> Result<bool, AppError>;
}

pub trait ProposalStore {
    async fn insert_proposal(&self, proposal: &NewProposal) -> Result<Proposal, AppError>;
    async fn find_proposal(&self, trip_id: i64, proposal_id: i64) -> Result<Option<Proposal>, AppError>;
    /// Newest first.
    async fn find_proposals(&self, trip_id: i64, filter: &ProposalFilter) -> Result<Vec<Proposal>, AppError>;
    /// Atomic compare-and-set on the status column. Returns `true` only for
    /// the caller that actually moved the proposal out of one of `from`.
    async fn transition_status(
        &self,
        proposal_id: i64,
        from: &[ProposalStatus],
        to: ProposalStatus,
        resolution: Option<&Resolution>,
    ) -> Result<bool, AppError>;
    /// Records that the approved activity is in the itinerary. `false` if it
    /// was already recorded.
    async fn mark_applied(&self, proposal_id: i64, at: DateTime<Utc>) -> Result<bool, AppError>;
    /// Hard-deletes a proposal (and its votes) while it is still pending.
    async fn delete_pending_proposal(&self, proposal_id: i64) -> Result<bool, AppError>;
    async fn find_expired_open(&self, now: DateTime<Utc>) -> Result<Vec<Proposal>, AppError>;
    async fn find_unapplied_approved(&self) -> Result<Vec<Proposal>, AppError>;
}

pub trait VoteStore {
    /// Inserts or overwrites the (proposal, user) vote, but only while the
    /// proposal is open. `None` means the proposal is no longer open; the
    /// flag is `true` when an existing vote was overwritten.
    async fn upsert_vote(&self, vote: &VoteUpsert) -> Result<Option<(Vote, bool)>, AppError>;
    /// Deletes the user's vote while the proposal is open.
    async fn delete_vote(&self, proposal_id: i64, user_id: i64) -> Result<bool, AppError>;
    /// Ordered by `voted_at` ascending.
    async fn find_votes(&self, proposal_id: i64) -> Result<Vec<Vote>, AppError>;
    async fn find_votes_for(&self, proposal_ids: &[i64]) -> Result<Vec<Vote>, AppError>;
}

pub trait Store: TripStore + ItineraryStore + ProposalStore + VoteStore {}

impl<T> Store for T where T: TripStore + ItineraryStore + ProposalStore + VoteStore {}
