//! `GET /ws?token=`: authenticate, upgrade, then run one [`Session`].

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use voxline_api_types::ServerMessage;

use crate::application::error::{ErrorReport, HttpError};
use crate::domain::types::Identity;
use crate::realtime::{ChannelPolicy, ConnectionHub, Session};

use super::AppState;

const SOURCE: &str = "infra::http::ws";

#[derive(Debug, Deserialize)]
pub(super) struct WsQuery {
    token: Option<String>,
}

/// The credential is checked before the upgrade so a bad token surfaces as a
/// plain 401 to the client's handshake.
pub(super) async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let credential = query.token.unwrap_or_default();
    let identity = match state.sessions.verify(&credential).await {
        Ok(identity) => identity,
        Err(err) => {
            return HttpError::from_error(SOURCE, StatusCode::UNAUTHORIZED, "Unauthorized", &err)
                .into_response();
        }
    };

    match upgrade {
        Ok(upgrade) => {
            let hub = state.hub.clone();
            let policy = state.policy.clone();
            upgrade.on_upgrade(move |socket| serve(socket, hub, policy, identity))
        }
        Err(rejection) => {
            let status = rejection.status();
            let mut response = rejection.into_response();
            ErrorReport::from_message(
                SOURCE,
                status,
                "request is not a websocket upgrade",
            )
            .attach(&mut response);
            response
        }
    }
}

async fn serve(
    socket: WebSocket,
    hub: Arc<ConnectionHub>,
    policy: Arc<ChannelPolicy>,
    identity: Identity,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let session = Session::open(hub, policy, identity, tx.clone());
    let connection_id = session.id();
    info!(
        target = "voxline::http::ws",
        connection_id = %connection_id,
        identity = %session.identity(),
        "WebSocket session opened"
    );

    // Pushes from other requests and replies from this loop share one queue,
    // so this task is the only writer.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match message.encode() {
                Ok(text) => text,
                Err(err) => {
                    warn!(
                        target = "voxline::http::ws",
                        error = %err,
                        "Dropping unencodable message"
                    );
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let _ = tx.send(session.greeting());

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if tx.send(session.handle_text(text.as_str())).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(
                    target = "voxline::http::ws",
                    connection_id = %connection_id,
                    error = %err,
                    "WebSocket read failed"
                );
                break;
            }
        }
    }

    drop(session);
    drop(tx);
    if let Err(err) = writer.await {
        warn!(target = "voxline::http::ws", error = %err, "Writer task failed");
    }
    info!(
        target = "voxline::http::ws",
        connection_id = %connection_id,
        "WebSocket session closed"
    );
}
