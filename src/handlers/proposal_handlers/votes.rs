use actix_session::Session;
use actix_web::{HttpResponse, web};

use crate::auth::session::require_user;
use crate::consensus::{Engine, votes};
use crate::errors::AppError;
use crate::models::vote::Ballot;
use crate::store::Store;

/// GET /trips/{trip_id}/proposals/{proposal_id}/vote
pub async fn list<S: Store + 'static>(
    engine: web::Data<Engine<S>>,
    session: Session,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse, AppError> {
    let user_id = require_user(&session)?;
    let (trip_id, proposal_id) = path.into_inner();

    let list = votes::list_votes(&engine, trip_id, proposal_id, user_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "votes": list.votes,
        "currentUserVote": list.current_user_vote,
    })))
}

/// POST /trips/{trip_id}/proposals/{proposal_id}/vote
/// Body `{voteType, comment?}`; re-voting overwrites.
pub async fn cast<S: Store + 'static>(
    engine: web::Data<Engine<S>>,
    session: Session,
    path: web::Path<(i64, i64)>,
    body: web::Json<Ballot>,
) -> Result<HttpResponse, AppError> {
    let user_id = require_user(&session)?;
    let (trip_id, proposal_id) = path.into_inner();

    let outcome = votes::cast_vote(&engine, trip_id, proposal_id, user_id, &body).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "vote": outcome.vote,
        "isUpdate": outcome.is_update,
        "proposal": outcome.proposal,
    })))
}

/// DELETE /trips/{trip_id}/proposals/{proposal_id}/vote
/// A resolved proposal answers 400 here, not 409.
pub async fn remove<S: Store + 'static>(
    engine: web::Data<Engine<S>>,
    session: Session,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse, AppError> {
    let user_id = require_user(&session)?;
    let (trip_id, proposal_id) = path.into_inner();

    let proposal = votes::remove_vote(&engine, trip_id, proposal_id, user_id)
        .await
        .map_err(|e| match e {
            AppError::Conflict(msg) => AppError::Validation(msg),
            other => other,
        })?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Vote removed",
        "proposal": proposal,
    })))
}
