use crate::errors::AppError;
use crate::models::trip::{Collaborator, Trip, TripRole};
use crate::store::TripStore;

/// A trip together with its collaborator rows.
#[derive(Debug, Clone)]
pub struct TripMembers {
    pub trip: Trip,
    pub collaborators: Vec<Collaborator>,
}

impl TripMembers {
    /// Effective role of a user, `None` for outsiders.
    ///
    /// Ownership comes from the trip row alone; a collaborator row that says
    /// `owner` for someone else grants editor rights.
    pub fn role_of(&self, user_id: i64) -> Option<TripRole> {
        if user_id == self.trip.owner_id {
            return Some(TripRole::Owner);
        }
        self.collaborators
            .iter()
            .find(|c| c.user_id == user_id)
            .map(|c| match c.role {
                TripRole::Owner => TripRole::Editor,
                other => other,
            })
    }

    pub fn voter_pool(&self) -> VoterPool {
        let mut voter_ids = vec![self.trip.owner_id];
        for c in &self.collaborators {
            let votes = matches!(c.role, TripRole::Owner | TripRole::Editor | TripRole::Voter);
            if votes && !voter_ids.contains(&c.user_id) {
                voter_ids.push(c.user_id);
            }
        }
        VoterPool { voter_ids }
    }
}

/// Users entitled to vote: the owner first, then editor/voter
/// collaborators in join order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterPool {
    pub voter_ids: Vec<i64>,
}

impl VoterPool {
    pub fn total(&self) -> usize {
        self.voter_ids.len()
    }
}

pub async fn load_members<S: TripStore>(store: &S, trip_id: i64) -> Result<TripMembers, AppError> {
    let trip = store
        .find_trip(trip_id)
        .await?
        .ok_or_else(|| AppError::not_found("Trip"))?;
    let collaborators = store.find_collaborators(trip_id).await?;
    Ok(TripMembers { trip, collaborators })
}

pub async fn resolve_voter_pool<S: TripStore>(store: &S, trip_id: i64) -> Result<VoterPool, AppError> {
    Ok(load_members(store, trip_id).await?.voter_pool())
}
