//! Socket relay. Every connected client receives each relay event as one
//! JSON text frame:
//!
//! ```json
//! {"event": "newMessage", "data": {"messageId": "...", "waId": "...", ...}}
//! {"event": "statusUpdate", "data": {"messageId": "...", "status": "read"}}
//! ```
//!
//! Client frames are ignored apart from close.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::server::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut events = state.relay.subscribe();
    tracing::debug!(listeners = state.relay.listener_count(), "socket connected");

    let sender_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if ws_sender
                        .send(Message::Text(event.to_frame().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "socket listener lagged; dropping oldest events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    while let Some(Ok(message)) = ws_receiver.next().await {
        if let Message::Close(_) = message {
            break;
        }
    }

    sender_task.abort();
    tracing::debug!("socket disconnected");
}
