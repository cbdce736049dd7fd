//! HTTP surface tests through `actix_web::test`, with a test-only login
//! route standing in for the real identity provider.

mod common;

use actix_session::{Session, SessionMiddleware, storage::CookieSessionStore};
use actix_web::cookie::{Cookie, Key};
use actix_web::http::StatusCode;
use actix_web::{App, HttpResponse, test, web};
use serde_json::{Value, json};

use common::*;
use tripsync::auth::session::set_user_id;
use tripsync::errors::AppError;
use tripsync::handlers;
use tripsync::store::MemoryStore;

async fn test_login(session: Session, path: web::Path<i64>) -> Result<HttpResponse, AppError> {
    set_user_id(&session, path.into_inner())?;
    Ok(HttpResponse::Ok().finish())
}

macro_rules! init_app {
    ($engine:expr) => {
        test::init_service(
            App::new()
                .wrap(
                    SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
                        .cookie_secure(false)
                        .build(),
                )
                .app_data($engine.clone())
                .route("/test/login/{user_id}", web::get().to(test_login))
                .configure(handlers::configure::<MemoryStore>)
                .default_service(web::to(handlers::not_found)),
        )
        .await
    };
}

macro_rules! login {
    ($app:expr, $user:expr) => {{
        let req = test::TestRequest::get()
            .uri(&format!("/test/login/{}", $user))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie: Cookie<'static> = resp
            .response()
            .cookies()
            .next()
            .expect("session cookie")
            .into_owned();
        cookie
    }};
}

fn engine_data() -> (web::Data<tripsync::consensus::Engine<MemoryStore>>, i64) {
    let fx = setup();
    (web::Data::new(fx.engine), fx.trip_id)
}

fn proposal_body(name: &str) -> Value {
    json!({
        "type": "new",
        "activityData": { "name": name, "start_time": "10:00" },
        "targetDay": 1
    })
}

// ---------------------------------------------------------------------------
// Authentication and request guards
// ---------------------------------------------------------------------------

#[actix_web::test]
async fn test_unauthenticated_requests_get_401() {
    let (engine, trip_id) = engine_data();
    let app = init_app!(engine);

    let req = test::TestRequest::get()
        .uri(&format!("/trips/{trip_id}/proposals"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Unauthorized");
}

#[actix_web::test]
async fn test_mutations_require_json_content_type() {
    let (engine, trip_id) = engine_data();
    let app = init_app!(engine);
    let cookie = login!(app, EDITOR);

    let req = test::TestRequest::post()
        .uri(&format!("/trips/{trip_id}/proposals"))
        .cookie(cookie)
        .insert_header(("content-type", "application/x-www-form-urlencoded"))
        .set_payload("type=new")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_unknown_route_is_json_404() {
    let (engine, _) = engine_data();
    let app = init_app!(engine);

    let req = test::TestRequest::get().uri("/nope").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Not found");
}

// ---------------------------------------------------------------------------
// Proposals
// ---------------------------------------------------------------------------

#[actix_web::test]
async fn test_create_list_and_detail() {
    let (engine, trip_id) = engine_data();
    let app = init_app!(engine);
    let cookie = login!(app, EDITOR);

    let req = test::TestRequest::post()
        .uri(&format!("/trips/{trip_id}/proposals"))
        .cookie(cookie.clone())
        .set_json(proposal_body("Tile museum"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["success"], true);
    assert_eq!(created["proposal"]["status"], "pending");
    assert_eq!(created["proposal"]["type"], "new");
    let proposal_id = created["proposal"]["id"].as_i64().expect("id");

    let req = test::TestRequest::get()
        .uri(&format!("/trips/{trip_id}/proposals?status=active&day=1"))
        .cookie(cookie.clone())
        .to_request();
    let listing: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listing["totalVoters"], 4);
    assert_eq!(listing["proposals"].as_array().map(Vec::len), Some(1));
    assert_eq!(listing["proposals"][0]["consensus"]["verdict"], "open");
    assert_eq!(listing["proposals"][0]["vote_summary"]["total"], 0);

    let req = test::TestRequest::get()
        .uri(&format!("/trips/{trip_id}/proposals/{proposal_id}"))
        .cookie(cookie)
        .to_request();
    let detail: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(detail["proposal"]["id"], proposal_id);
    assert_eq!(detail["proposal"]["activity_data"]["name"], "Tile museum");
    assert_eq!(detail["proposal"]["consensus"]["pending_voters"].as_array().map(Vec::len), Some(4));
}

#[actix_web::test]
async fn test_create_error_statuses() {
    let (engine, trip_id) = engine_data();
    let app = init_app!(engine);

    let viewer = login!(app, VIEWER);
    let req = test::TestRequest::post()
        .uri(&format!("/trips/{trip_id}/proposals"))
        .cookie(viewer)
        .set_json(proposal_body("Nope"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let editor = login!(app, EDITOR);
    let req = test::TestRequest::post()
        .uri(&format!("/trips/{trip_id}/proposals"))
        .cookie(editor.clone())
        .set_json(json!({ "type": "new", "activityData": {}, "targetDay": 0 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Validation failed");
    assert!(body["details"].as_str().is_some());

    let req = test::TestRequest::post()
        .uri(&format!("/trips/{}/proposals", trip_id + 10))
        .cookie(editor.clone())
        .set_json(proposal_body("Ghost trip"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri(&format!("/trips/{trip_id}/proposals?status=open"))
        .cookie(editor)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_patch_override_and_conflict() {
    let (engine, trip_id) = engine_data();
    let app = init_app!(engine);
    let editor = login!(app, EDITOR);
    let owner = login!(app, OWNER);

    let req = test::TestRequest::post()
        .uri(&format!("/trips/{trip_id}/proposals"))
        .cookie(editor.clone())
        .set_json(proposal_body("Feira da Ladra"))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let proposal_id = created["proposal"]["id"].as_i64().expect("id");
    let uri = format!("/trips/{trip_id}/proposals/{proposal_id}");

    let req = test::TestRequest::patch()
        .uri(&uri)
        .cookie(editor.clone())
        .set_json(json!({ "action": "approve" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::patch()
        .uri(&uri)
        .cookie(owner.clone())
        .set_json(json!({ "action": "approve", "resolutionMethod": "consensus" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::patch()
        .uri(&uri)
        .cookie(owner.clone())
        .set_json(json!({ "action": "approve", "resolutionMethod": "owner_override" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["proposal"]["status"], "approved");
    assert_eq!(body["proposal"]["resolution_method"], "owner_override");

    let req = test::TestRequest::patch()
        .uri(&uri)
        .cookie(editor)
        .set_json(json!({ "action": "withdraw" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::delete()
        .uri(&uri)
        .cookie(owner)
        .insert_header(("content-type", "application/json"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
}

// ---------------------------------------------------------------------------
// Votes
// ---------------------------------------------------------------------------

#[actix_web::test]
async fn test_vote_endpoints() {
    let (engine, trip_id) = engine_data();
    let app = init_app!(engine);
    let editor = login!(app, EDITOR);
    let voter = login!(app, VOTER);
    let owner = login!(app, OWNER);

    let req = test::TestRequest::post()
        .uri(&format!("/trips/{trip_id}/proposals"))
        .cookie(editor.clone())
        .set_json(proposal_body("Botanical garden"))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let proposal_id = created["proposal"]["id"].as_i64().expect("id");
    let vote_uri = format!("/trips/{trip_id}/proposals/{proposal_id}/vote");

    let req = test::TestRequest::post()
        .uri(&vote_uri)
        .cookie(voter.clone())
        .set_json(json!({ "voteType": "no" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&vote_uri)
        .cookie(voter.clone())
        .set_json(json!({ "voteType": "maybe" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&vote_uri)
        .cookie(voter.clone())
        .set_json(json!({ "voteType": "love" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cast: Value = test::read_body_json(resp).await;
    assert_eq!(cast["isUpdate"], false);
    assert_eq!(cast["vote"]["vote_type"], "love");

    let req = test::TestRequest::get()
        .uri(&vote_uri)
        .cookie(voter.clone())
        .to_request();
    let list: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list["votes"].as_array().map(Vec::len), Some(1));
    assert_eq!(list["currentUserVote"]["vote_type"], "love");

    // Owner's love makes 2 of 4: approved.
    let req = test::TestRequest::post()
        .uri(&vote_uri)
        .cookie(owner.clone())
        .set_json(json!({ "voteType": "love" }))
        .to_request();
    let cast: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(cast["proposal"]["status"], "approved");

    let req = test::TestRequest::post()
        .uri(&vote_uri)
        .cookie(editor)
        .set_json(json!({ "voteType": "flexible" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::delete()
        .uri(&vote_uri)
        .cookie(voter)
        .insert_header(("content-type", "application/json"))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST,
        "removing a vote from a resolved proposal is a 400"
    );
}
