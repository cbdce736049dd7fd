use actix_session::Session;
use actix_web::web::Bytes;
use actix_web::{HttpRequest, HttpResponse, web};
use actix_ws::{Message, ProtocolError};

use crate::auth::abac::{Capability, require_capability};
use crate::auth::session::require_user;
use crate::consensus::voter_pool::load_members;
use crate::consensus::Engine;
use crate::store::Store;

/// What the feed loop does with one item from the client stream.
#[derive(Debug, PartialEq)]
enum ClientAction {
    Pong(Bytes),
    Ignore,
    Close,
}

/// A finished stream or a protocol error ends the feed just like a close
/// frame does.
fn client_action(incoming: Option<Result<Message, ProtocolError>>) -> ClientAction {
    match incoming {
        Some(Ok(Message::Ping(bytes))) => ClientAction::Pong(bytes),
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => ClientAction::Close,
        Some(Ok(_)) => ClientAction::Ignore,
    }
}

/// GET /trips/{trip_id}/proposals/ws
/// WebSocket feed of proposal events for any trip member. Messages are
/// "refetch" hints; clients send nothing but pings.
pub async fn connect<S: Store + 'static>(
    req: HttpRequest,
    body: web::Payload,
    session: Session,
    path: web::Path<i64>,
    engine: web::Data<Engine<S>>,
) -> Result<HttpResponse, actix_web::Error> {
    let user_id = require_user(&session)?;
    let trip_id = path.into_inner();
    let members = load_members(&engine.store, trip_id).await?;
    require_capability(&members, user_id, Capability::View)?;

    let (response, mut ws_session, mut msg_stream) = actix_ws::handle(&req, body)?;
    let mut rx = engine.notifier.subscribe(trip_id);
    let notifier = engine.notifier.clone();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    if ws_session.text(msg).await.is_err() {
                        break;
                    }
                }
                incoming = msg_stream.recv() => {
                    match client_action(incoming) {
                        ClientAction::Pong(bytes) => {
                            if ws_session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        ClientAction::Ignore => {}
                        ClientAction::Close => break,
                    }
                }
            }
        }

        drop(rx);
        notifier.prune(trip_id);
        log::debug!("Proposal feed for trip {trip_id} closed (user {user_id})");
    });

    Ok(response)
}
