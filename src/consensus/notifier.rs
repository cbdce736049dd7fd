use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use crate::models::proposal::ProposalStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ProposalCreated,
    ProposalUpdated,
    ProposalDeleted,
    VoteChanged,
}

/// "Something changed on this trip, refetch." Clients must not treat the
/// payload as an authoritative delta.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposalEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub trip_id: i64,
    pub proposal_id: i64,
    pub status: Option<ProposalStatus>,
}

pub type ChannelMap = Arc<RwLock<HashMap<i64, Vec<mpsc::UnboundedSender<String>>>>>;

/// Per-trip fan-out of proposal events to websocket connections.
#[derive(Clone, Default)]
pub struct Notifier {
    channels: ChannelMap,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new listener on a trip.
    pub fn subscribe(&self, trip_id: i64) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let mut map = self.channels.write().unwrap_or_else(|e| e.into_inner());
        map.entry(trip_id).or_default().push(tx);
        rx
    }

    /// Drops closed senders for a trip.
    pub fn prune(&self, trip_id: i64) {
        if let Ok(mut map) = self.channels.write() {
            if let Some(senders) = map.get_mut(&trip_id) {
                senders.retain(|s| !s.is_closed());
                if senders.is_empty() {
                    map.remove(&trip_id);
                }
            }
        }
    }

    /// Best effort. Delivery failures are ignored.
    pub fn publish(&self, event: &ProposalEvent) {
        let msg = match serde_json::to_string(event) {
            Ok(m) => m,
            Err(_) => return,
        };
        let map = match self.channels.read() {
            Ok(m) => m,
            Err(_) => return,
        };
        if let Some(senders) = map.get(&event.trip_id) {
            for sender in senders {
                let _ = sender.send(msg.clone());
            }
        }
    }

    #[cfg(test)]
    fn listener_count(&self, trip_id: i64) -> usize {
        self.channels
            .read()
            .map(|m| m.get(&trip_id).map_or(0, |s| s.iter().filter(|tx| !tx.is_closed()).count()))
            .unwrap_or(0)
    }
}
