//! Applies an approved proposal to the trip itinerary.
//!
//! Runs only for the caller that won the status compare-and-set, but is
//! still idempotent: an activity whose id is already in the target day is
//! not inserted again. The save is version-checked and retried, so two
//! approvals landing on the same trip at once both end up in the itinerary.

use chrono::{DateTime, Utc};
use rand::Rng;

use super::Engine;
use crate::errors::AppError;
use crate::models::proposal::{Proposal, ProposalType};
use crate::models::trip::{Activity, ItineraryDay};
use crate::store::Store;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `proposed-{unix_millis}-{9 base36 chars}`
pub fn new_activity_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("proposed-{}-{}", now.timestamp_millis(), suffix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Inserted,
    AlreadyPresent,
}

/// The activity as it goes into the itinerary. Rows created before ids were
/// assigned at creation get a stable id derived from the proposal.
pub fn final_activity(proposal: &Proposal) -> Activity {
    let mut activity = proposal.activity.clone();
    if activity.id.is_none() {
        activity.id = Some(format!("proposal-{}", proposal.id));
    }
    activity
}

/// Inserts the proposal's activity into its target day and re-sorts that
/// day by start time. Activities without a parsable start time go last;
/// ties keep their existing order.
pub fn place_activity(days: &mut [ItineraryDay], proposal: &Proposal) -> Result<Placement, String> {
    let index = proposal.target_day as usize;
    let total = days.len();
    let day = days
        .get_mut(index)
        .ok_or_else(|| format!("Target day {index} does not exist (itinerary has {total} days)"))?;

    let activity = final_activity(proposal);
    if day.activities.iter().any(|a| a.id == activity.id) {
        return Ok(Placement::AlreadyPresent);
    }

    if proposal.proposal_type == ProposalType::Replacement {
        let target = proposal.target_activity_id.as_deref();
        let before = day.activities.len();
        day.activities.retain(|a| a.id.as_deref() != target);
        if day.activities.len() == before {
            log::warn!(
                "Proposal {}: replacement target {:?} not found on day {}, inserting anyway",
                proposal.id,
                target,
                index
            );
        }
    }

    day.activities.push(activity);
    day.activities.sort_by_key(|a| {
        let start = a.start();
        (start.is_none(), start)
    });
    Ok(Placement::Inserted)
}

/// Writes the approved activity into the itinerary and records
/// `applied_at`. Returns `Ok(false)` when the version race could not be
/// won within the retry limit.
pub async fn apply_approved<S: Store>(engine: &Engine<S>, proposal: &Proposal) -> Result<bool, AppError> {
    let store = &engine.store;
    for attempt in 1..=engine.settings.itinerary_retry_limit {
        let mut itinerary = store
            .load_itinerary(proposal.trip_id)
            .await?
            .ok_or_else(|| AppError::not_found("Trip"))?;

        let placement = place_activity(&mut itinerary.days, proposal).map_err(AppError::Internal)?;
        if placement == Placement::Inserted
            && !store
                .save_itinerary(proposal.trip_id, itinerary.version, &itinerary.days)
                .await?
        {
            log::warn!(
                "Itinerary version conflict on trip {} applying proposal {} (attempt {attempt})",
                proposal.trip_id,
                proposal.id
            );
            continue;
        }

        store.mark_applied(proposal.id, Utc::now()).await?;
        log::info!(
            "Applied proposal {} to trip {} day {}",
            proposal.id,
            proposal.trip_id,
            proposal.target_day
        );
        return Ok(true);
    }
    Ok(false)
}

/// Post-approval step. The approval itself stands; failures here are raised
/// as operational alerts and left for the expiry sweep to retry.
pub async fn apply_or_alert<S: Store>(engine: &Engine<S>, proposal: &Proposal) {
    match apply_approved(engine, proposal).await {
        Ok(true) => {}
        Ok(false) => log::error!(
            "ALERT: proposal {} approved but itinerary of trip {} still unmodified after {} attempts",
            proposal.id,
            proposal.trip_id,
            engine.settings.itinerary_retry_limit
        ),
        Err(e) => log::error!(
            "ALERT: proposal {} approved but applying it to trip {} failed: {e}",
            proposal.id,
            proposal.trip_id
        ),
    }
}
