use crate::{api::AppState, auth};
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use marketcore::{ConnectionGuard, LiveEvent};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Upgrade to a live channel for `user_id`.
///
/// The token travels in the query string. A token that does not verify or was
/// issued to another user gets the socket closed with a policy violation.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<Uuid>,
    Query(q): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let authorized = q
        .token
        .as_deref()
        .and_then(|t| auth::principal_from_token(state.secret(), t))
        .map(|p| p.id == user_id)
        .unwrap_or(false);
    ws.on_upgrade(move |socket| async move {
        if authorized {
            handle_socket(socket, state, user_id).await;
        } else {
            reject(socket, user_id).await;
        }
    })
}

async fn reject(mut socket: WebSocket, user_id: Uuid) {
    warn!(user = %user_id, "live channel refused");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "authentication failed".into(),
        })))
        .await;
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let guard = ConnectionGuard::register(state.registry.clone(), user_id, tx);
    info!(user = %user_id, conn = %guard.id(), "live channel open");
    let mut outbound = UnboundedReceiverStream::new(rx);

    loop {
        tokio::select! {
            Some(payload) = outbound.next() => {
                if sink.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<serde_json::Value>(&text) {
                        Ok(data) => {
                            state.registry.send_event(&user_id, &LiveEvent::ack(data));
                        }
                        Err(err) => debug!(user = %user_id, error = %err, "ignoring malformed frame"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    debug!(user = %user_id, error = %err, "live channel error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
    info!(user = %user_id, conn = %guard.id(), "live channel closed");
}
