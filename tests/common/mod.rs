//! Shared test infrastructure for engine and HTTP tests.
//!
//! Every test builds its own `MemoryStore`-backed engine with one seeded
//! trip, so tests never share state.

#![allow(dead_code)]

use chrono::Duration;
use serde_json::{Value, json};

use tripsync::consensus::{Engine, EngineSettings};
use tripsync::models::proposal::{Proposal, ProposalDraft};
use tripsync::models::trip::{Activity, ItineraryDay, TripRole};
use tripsync::store::{ItineraryStore, MemoryStore};

// ============================================================================
// TEST CONSTANTS
// ============================================================================

pub const OWNER: i64 = 1;
pub const EDITOR: i64 = 2;
pub const VOTER: i64 = 3;
pub const VOTER_TWO: i64 = 4;
pub const VIEWER: i64 = 5;
pub const OUTSIDER: i64 = 99;

// ============================================================================
// FIXTURE
// ============================================================================

pub struct Fixture {
    pub engine: Engine<MemoryStore>,
    pub trip_id: i64,
}

/// Voter pool: owner, editor, two voters (4 voters). Viewer can only read.
///
/// Day 0 holds breakfast at 08:00 and dinner at 19:00; day 1 is empty;
/// day 2 holds a 12:00 lunch with id `lunch-1`.
pub fn setup() -> Fixture {
    setup_with(EngineSettings::default())
}

/// Same trip, but proposals expire after `expiry`.
pub fn setup_with_expiry(expiry: Duration) -> Fixture {
    setup_with(EngineSettings {
        expiry,
        ..Default::default()
    })
}

pub fn setup_with(settings: EngineSettings) -> Fixture {
    let store = MemoryStore::new();
    let trip_id = store.insert_trip(OWNER, "Lisbon long weekend", seed_days());
    store.add_collaborator(trip_id, EDITOR, TripRole::Editor);
    store.add_collaborator(trip_id, VOTER, TripRole::Voter);
    store.add_collaborator(trip_id, VOTER_TWO, TripRole::Voter);
    store.add_collaborator(trip_id, VIEWER, TripRole::Viewer);

    Fixture {
        engine: Engine::new(store, settings),
        trip_id,
    }
}

fn activity(id: &str, name: &str, start: &str) -> Activity {
    let mut a = Activity::new(name, Some(start));
    a.id = Some(id.to_string());
    a
}

pub fn seed_days() -> Vec<ItineraryDay> {
    vec![
        ItineraryDay::with_activities(vec![
            activity("breakfast-0", "Pastéis de Belém", "08:00"),
            activity("dinner-0", "Time Out Market", "19:00"),
        ]),
        ItineraryDay::with_activities(vec![]),
        ItineraryDay::with_activities(vec![activity("lunch-1", "Cervejaria Ramiro", "12:00")]),
    ]
}

// ============================================================================
// HELPERS
// ============================================================================

pub fn draft(value: Value) -> ProposalDraft {
    serde_json::from_value(value).expect("draft json")
}

/// A `new` proposal for `day` starting at `start`.
pub fn new_activity_draft(name: &str, day: i64, start: &str) -> ProposalDraft {
    draft(json!({
        "type": "new",
        "activityData": { "name": name, "start_time": start },
        "targetDay": day,
    }))
}

pub async fn propose(fx: &Fixture, proposer: i64, name: &str, day: i64, start: &str) -> Proposal {
    tripsync::consensus::lifecycle::propose(
        &fx.engine,
        fx.trip_id,
        proposer,
        &new_activity_draft(name, day, start),
    )
    .await
    .expect("propose")
}

/// Names of the activities on `day`, in itinerary order.
pub async fn day_names(fx: &Fixture, day: usize) -> Vec<String> {
    let itinerary = fx
        .engine
        .store
        .load_itinerary(fx.trip_id)
        .await
        .expect("load itinerary")
        .expect("trip exists");
    itinerary.days[day]
        .activities
        .iter()
        .map(|a| a.name.clone())
        .collect()
}
