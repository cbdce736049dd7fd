pub mod proposal_handlers;

use actix_web::{
    Error, HttpRequest, HttpResponse,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    http::Method,
    middleware::{Next, from_fn},
    web,
};

use crate::auth::middleware::require_auth;
use crate::errors::{ApiErrorResponse, AppError};
use crate::store::Store;
use proposal_handlers::{crud, votes, workflow, ws};

/// CSRF protection for mutation endpoints.
///
/// Rejects POST/PUT/PATCH/DELETE requests that don't carry
/// `Content-Type: application/json`. Browsers cannot send cross-origin JSON
/// with cookies from a plain form, so the header check stands in for a token.
async fn require_json_content_type(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let method = req.method().clone();

    if method == Method::POST || method == Method::PUT || method == Method::PATCH || method == Method::DELETE {
        let content_type = req
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !content_type.starts_with("application/json") {
            let response = HttpResponse::BadRequest().json(ApiErrorResponse {
                error: "Content-Type must be application/json for mutation requests".to_string(),
                details: None,
            });
            return Ok(req.into_response(response).map_into_right_body());
        }
    }

    next.call(req).await.map(|res| res.map_into_left_body())
}

fn json_error(err: actix_web::error::JsonPayloadError, _req: &HttpRequest) -> Error {
    AppError::Validation(format!("Invalid request body: {err}")).into()
}

fn query_error(err: actix_web::error::QueryPayloadError, _req: &HttpRequest) -> Error {
    AppError::Validation(format!("Invalid query string: {err}")).into()
}

/// JSON 404 for anything outside the routed surface.
pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ApiErrorResponse {
        error: "Not found".to_string(),
        details: None,
    })
}

/// Registers the trip-scoped proposal API for a given store backend.
pub fn configure<S: Store + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/trips/{trip_id}/proposals")
            .app_data(web::JsonConfig::default().error_handler(json_error))
            .app_data(web::QueryConfig::default().error_handler(query_error))
            .wrap(from_fn(require_json_content_type))
            .wrap(from_fn(require_auth))
            .route("", web::get().to(crud::list::<S>))
            .route("", web::post().to(crud::create::<S>))
            .route("/ws", web::get().to(ws::connect::<S>))
            .route("/{proposal_id}", web::get().to(crud::detail::<S>))
            .route("/{proposal_id}", web::patch().to(workflow::update::<S>))
            .route("/{proposal_id}", web::delete().to(crud::delete::<S>))
            .route("/{proposal_id}/vote", web::get().to(votes::list::<S>))
            .route("/{proposal_id}/vote", web::post().to(votes::cast::<S>))
            .route("/{proposal_id}/vote", web::delete().to(votes::remove::<S>)),
    );
}
