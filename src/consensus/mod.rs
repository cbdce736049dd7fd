//! Group proposal engine: proposal lifecycle, voting, consensus and the
//! itinerary mutation that follows an approval.

pub mod calculator;
pub mod executor;
pub mod lifecycle;
pub mod notifier;
pub mod scheduler;
pub mod slots;
pub mod voter_pool;
pub mod votes;

pub use calculator::{ConsensusPolicy, ConsensusResult, Verdict};
pub use notifier::{EventKind, Notifier, ProposalEvent};
pub use voter_pool::{TripMembers, VoterPool};

use chrono::Duration;

use crate::config::Config;
use crate::models::proposal::ProposalStatus;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Voting window from creation to `expires_at`.
    pub expiry: Duration,
    pub policy: ConsensusPolicy,
    /// Attempts at the itinerary save before giving up on a version race.
    pub itinerary_retry_limit: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            expiry: Duration::days(7),
            policy: ConsensusPolicy::default(),
            itinerary_retry_limit: 5,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        EngineSettings {
            expiry: Duration::days(config.proposal_expiry_days),
            itinerary_retry_limit: config.itinerary_retry_limit.max(1),
            ..Default::default()
        }
    }
}

/// Everything an engine operation needs: the store, the realtime fan-out
/// and the tunables. Shared across workers behind `web::Data`.
pub struct Engine<S> {
    pub store: S,
    pub notifier: Notifier,
    pub settings: EngineSettings,
}

impl<S> Engine<S> {
    pub fn new(store: S, settings: EngineSettings) -> Self {
        Engine {
            store,
            notifier: Notifier::new(),
            settings,
        }
    }

    pub(crate) fn publish(
        &self,
        kind: EventKind,
        trip_id: i64,
        proposal_id: i64,
        status: Option<ProposalStatus>,
    ) {
        self.notifier.publish(&ProposalEvent {
            kind,
            trip_id,
            proposal_id,
            status,
        });
    }
}
