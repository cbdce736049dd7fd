use actix_session::Session;
use actix_web::{HttpResponse, web};
use serde::Deserialize;

use crate::auth::session::require_user;
use crate::consensus::{Engine, lifecycle};
use crate::errors::AppError;
use crate::models::proposal::{ProposalDraft, ProposalFilter, StatusFilter, TimeSlot};
use crate::store::Store;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    status: Option<String>,
    day: Option<String>,
    time_slot: Option<String>,
}

impl ListQuery {
    fn to_filter(&self) -> Result<ProposalFilter, AppError> {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        let status = match non_empty(&self.status) {
            Some(raw) => raw.parse::<StatusFilter>().map_err(AppError::Validation)?,
            None => StatusFilter::All,
        };
        let day = non_empty(&self.day)
            .map(|raw| {
                raw.parse::<i32>()
                    .ok()
                    .filter(|d| *d >= 0)
                    .ok_or_else(|| AppError::Validation(format!("Invalid day '{raw}'")))
            })
            .transpose()?;
        let time_slot = non_empty(&self.time_slot)
            .map(|raw| raw.parse::<TimeSlot>().map_err(AppError::Validation))
            .transpose()?;

        Ok(ProposalFilter {
            status,
            day,
            time_slot,
        })
    }
}

/// GET /trips/{trip_id}/proposals?status=&day=&timeSlot=
/// Proposals newest first, each with votes and consensus.
pub async fn list<S: Store + 'static>(
    engine: web::Data<Engine<S>>,
    session: Session,
    path: web::Path<i64>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let user_id = require_user(&session)?;
    let trip_id = path.into_inner();
    let filter = query.to_filter()?;

    let listing = lifecycle::list_proposals(&engine, trip_id, user_id, &filter).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "proposals": listing.proposals,
        "totalVoters": listing.total_voters,
        "slots": listing.slots,
    })))
}

/// GET /trips/{trip_id}/proposals/{proposal_id}
pub async fn detail<S: Store + 'static>(
    engine: web::Data<Engine<S>>,
    session: Session,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse, AppError> {
    let user_id = require_user(&session)?;
    let (trip_id, proposal_id) = path.into_inner();

    let view = lifecycle::get_proposal(&engine, trip_id, proposal_id, user_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "proposal": view,
    })))
}

/// POST /trips/{trip_id}/proposals
pub async fn create<S: Store + 'static>(
    engine: web::Data<Engine<S>>,
    session: Session,
    path: web::Path<i64>,
    body: web::Json<ProposalDraft>,
) -> Result<HttpResponse, AppError> {
    let user_id = require_user(&session)?;
    let trip_id = path.into_inner();

    let proposal = lifecycle::propose(&engine, trip_id, user_id, &body).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "proposal": proposal,
    })))
}

/// DELETE /trips/{trip_id}/proposals/{proposal_id}
/// Only the proposer, only while pending.
pub async fn delete<S: Store + 'static>(
    engine: web::Data<Engine<S>>,
    session: Session,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse, AppError> {
    let user_id = require_user(&session)?;
    let (trip_id, proposal_id) = path.into_inner();

    lifecycle::delete(&engine, trip_id, proposal_id, user_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Proposal deleted",
    })))
}
