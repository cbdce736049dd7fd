use actix_session::Session;
use actix_web::{HttpResponse, web};

use crate::auth::session::require_user;
use crate::consensus::{Engine, lifecycle};
use crate::errors::AppError;
use crate::models::proposal::{ProposalAction, ProposalPatch};
use crate::store::Store;

/// PATCH /trips/{trip_id}/proposals/{proposal_id}
/// `withdraw` is the proposer's; `approve`/`reject` are owner overrides.
pub async fn update<S: Store + 'static>(
    engine: web::Data<Engine<S>>,
    session: Session,
    path: web::Path<(i64, i64)>,
    body: web::Json<ProposalPatch>,
) -> Result<HttpResponse, AppError> {
    let user_id = require_user(&session)?;
    let (trip_id, proposal_id) = path.into_inner();
    let action = body.validate().map_err(AppError::Validation)?;

    let proposal = match action {
        ProposalAction::Withdraw => lifecycle::withdraw(&engine, trip_id, proposal_id, user_id).await?,
        ProposalAction::Approve | ProposalAction::Reject => {
            lifecycle::force_resolve(&engine, trip_id, proposal_id, user_id, action).await?
        }
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "proposal": proposal,
    })))
}
