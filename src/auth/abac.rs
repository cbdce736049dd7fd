//! Trip-scoped capability checks.
//!
//! Capabilities derive from the role a user holds on the trip:
//!
//! ```text
//!              view  propose  vote  force_resolve
//!   owner       x       x      x         x
//!   editor      x       x      x
//!   voter       x       x      x
//!   viewer      x
//! ```
//!
//! Proposer-only actions (withdraw, delete) are checked against the
//! proposal itself, not the role table.

use crate::consensus::voter_pool::TripMembers;
use crate::errors::AppError;
use crate::models::proposal::Proposal;
use crate::models::trip::TripRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    View,
    Propose,
    Vote,
    ForceResolve,
}

impl Capability {
    fn denial(&self) -> &'static str {
        match self {
            Capability::View => "You are not a member of this trip",
            Capability::Propose => "Only trip owners, editors and voters can create proposals",
            Capability::Vote => "Only trip owners, editors and voters can vote",
            Capability::ForceResolve => "Only the trip owner can approve or reject proposals directly",
        }
    }
}

pub fn role_allows(role: TripRole, capability: Capability) -> bool {
    match capability {
        Capability::View => true,
        Capability::Propose | Capability::Vote => {
            matches!(role, TripRole::Owner | TripRole::Editor | TripRole::Voter)
        }
        Capability::ForceResolve => role == TripRole::Owner,
    }
}

/// Returns the user's role if it grants `capability`, `PermissionDenied`
/// otherwise (outsiders included).
pub fn require_capability(
    members: &TripMembers,
    user_id: i64,
    capability: Capability,
) -> Result<TripRole, AppError> {
    match members.role_of(user_id) {
        Some(role) if role_allows(role, capability) => Ok(role),
        _ => Err(AppError::PermissionDenied(capability.denial().to_string())),
    }
}

/// Withdraw and delete belong to the proposer alone.
pub fn require_proposer(proposal: &Proposal, user_id: i64, action: &str) -> Result<(), AppError> {
    if proposal.proposer_id == user_id {
        Ok(())
    } else {
        Err(AppError::PermissionDenied(format!(
            "Only the proposer can {action} this proposal"
        )))
    }
}
