use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::models::trip::Activity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    New,
    Replacement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
}

/// Proposal lifecycle.
///
/// `pending` (no votes yet) -> `voting` -> one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Voting,
    Approved,
    Rejected,
    Withdrawn,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Consensus,
    OwnerOverride,
    Expired,
}

string_enum!(ProposalType, "proposal type", {
    ProposalType::New => "new",
    ProposalType::Replacement => "replacement",
});

string_enum!(TimeSlot, "time slot", {
    TimeSlot::Morning => "morning",
    TimeSlot::Afternoon => "afternoon",
    TimeSlot::Evening => "evening",
});

string_enum!(ProposalStatus, "proposal status", {
    ProposalStatus::Pending => "pending",
    ProposalStatus::Voting => "voting",
    ProposalStatus::Approved => "approved",
    ProposalStatus::Rejected => "rejected",
    ProposalStatus::Withdrawn => "withdrawn",
    ProposalStatus::Expired => "expired",
});

string_enum!(ResolutionMethod, "resolution method", {
    ResolutionMethod::Consensus => "consensus",
    ResolutionMethod::OwnerOverride => "owner_override",
    ResolutionMethod::Expired => "expired",
});

/// PATCH actions on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalAction {
    Withdraw,
    Approve,
    Reject,
}

string_enum!(ProposalAction, "action", {
    ProposalAction::Withdraw => "withdraw",
    ProposalAction::Approve => "approve",
    ProposalAction::Reject => "reject",
});

/// Raw PATCH body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalPatch {
    pub action: Option<String>,
    pub resolution_method: Option<String>,
}

impl ProposalPatch {
    pub fn validate(&self) -> Result<ProposalAction, String> {
        let action = self
            .action
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .parse::<ProposalAction>()
            .map_err(|_| "Invalid action. Must be 'withdraw', 'approve' or 'reject'".to_string())?;

        match (action, self.resolution_method.as_deref()) {
            (_, None) => Ok(action),
            (ProposalAction::Approve | ProposalAction::Reject, Some("owner_override")) => Ok(action),
            (ProposalAction::Withdraw, Some(_)) => {
                Err("resolutionMethod does not apply to withdrawal".to_string())
            }
            (_, Some(other)) => Err(format!(
                "Invalid resolutionMethod '{other}'. Only 'owner_override' is accepted"
            )),
        }
    }
}

impl ProposalStatus {
    /// States that still accept votes and transitions.
    pub const OPEN: [ProposalStatus; 2] = [ProposalStatus::Pending, ProposalStatus::Voting];

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

/// A proposal to add or replace an itinerary activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Proposal {
    pub id: i64,
    pub trip_id: i64,
    pub proposer_id: i64,
    #[serde(rename = "type")]
    pub proposal_type: ProposalType,
    #[serde(rename = "activity_data")]
    pub activity: Activity,
    pub target_day: i32,
    pub target_time_slot: Option<TimeSlot>,
    pub target_activity_id: Option<String>,
    pub note: Option<String>,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<i64>,
    pub resolution_method: Option<ResolutionMethod>,
    /// When the approved activity landed in the itinerary.
    pub applied_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Key shared by proposals competing for the same itinerary slot.
    pub fn slot_key(&self) -> String {
        let slot = self.target_time_slot.map(|s| s.as_str()).unwrap_or("any");
        format!("{}-{}", self.target_day, slot)
    }
}

/// Raw request body for a new proposal. `validate` turns it into a
/// `ProposalSpec` or explains what is wrong.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDraft {
    #[serde(rename = "type")]
    pub proposal_type: Option<String>,
    pub activity_data: Option<Value>,
    pub target_activity_id: Option<String>,
    pub target_day: Option<i64>,
    pub target_time_slot: Option<String>,
    pub note: Option<String>,
}

/// Validated proposal contents, before the system assigns ids and times.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalSpec {
    pub proposal_type: ProposalType,
    pub activity: Activity,
    pub target_day: i32,
    pub target_time_slot: Option<TimeSlot>,
    pub target_activity_id: Option<String>,
    pub note: Option<String>,
}

impl ProposalDraft {
    pub fn validate(&self) -> Result<ProposalSpec, String> {
        let proposal_type = match self.proposal_type.as_deref() {
            Some(raw) => raw
                .parse::<ProposalType>()
                .map_err(|_| "Invalid proposal type. Must be 'new' or 'replacement'".to_string())?,
            None => return Err("Invalid proposal type. Must be 'new' or 'replacement'".to_string()),
        };

        let activity = match &self.activity_data {
            Some(value @ Value::Object(_)) => serde_json::from_value::<Activity>(value.clone())
                .map_err(|e| format!("Activity data is malformed: {e}"))?,
            _ => return Err("Activity data with name is required".to_string()),
        };
        if activity.name.trim().is_empty() {
            return Err("Activity data with name is required".to_string());
        }

        let target_day = match self.target_day {
            Some(day) if (0..=i64::from(i32::MAX)).contains(&day) => day as i32,
            _ => return Err("Valid target day (0 or greater) is required".to_string()),
        };

        let target_time_slot = match self.target_time_slot.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<TimeSlot>().map_err(|_| {
                "Invalid time slot. Must be 'morning', 'afternoon' or 'evening'".to_string()
            })?),
        };

        let target_activity_id = self
            .target_activity_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        if proposal_type == ProposalType::Replacement && target_activity_id.is_none() {
            return Err("Target activity ID is required for replacement proposals".to_string());
        }

        let note = self
            .note
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        Ok(ProposalSpec {
            proposal_type,
            activity,
            target_day,
            target_time_slot,
            target_activity_id,
            note,
        })
    }
}

/// Row written when a proposal is created.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub trip_id: i64,
    pub proposer_id: i64,
    pub spec: ProposalSpec,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Bookkeeping written together with a status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub at: DateTime<Utc>,
    pub by: Option<i64>,
    pub method: Option<ResolutionMethod>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    /// pending + voting
    Active,
    Only(ProposalStatus),
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(StatusFilter::All),
            "active" => Ok(StatusFilter::Active),
            other => other.parse::<ProposalStatus>().map(StatusFilter::Only),
        }
    }
}

impl StatusFilter {
    pub fn matches(&self, status: ProposalStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => status.is_open(),
            StatusFilter::Only(s) => *s == status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProposalFilter {
    pub status: StatusFilter,
    pub day: Option<i32>,
    pub time_slot: Option<TimeSlot>,
}

impl ProposalFilter {
    pub fn matches(&self, proposal: &Proposal) -> bool {
        self.status.matches(proposal.status)
            && self.day.is_none_or(|d| d == proposal.target_day)
            && self.time_slot.is_none_or(|s| Some(s) == proposal.target_time_slot)
    }
}
