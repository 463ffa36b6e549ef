//! Agent WebSocket endpoint.
//!
//! Adapts an axum WebSocket to the text frame stream and sink the
//! [`SessionEngine`](crate::protocol::SessionEngine) runs on.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{future, SinkExt, StreamExt};
use tracing::debug;

use super::state::AppState;

/// Upgrade `/server/session` and hand the socket to the session engine
pub async fn agent_socket(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| serve_agent(state, socket))
}

async fn serve_agent(state: Arc<AppState>, socket: WebSocket) {
    let (sink, stream) = socket.split();

    let inbound = stream
        .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                // Ping/pong are answered by the WebSocket layer
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        });
    let outbound =
        sink.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text))));

    let cause = state.engine.run(inbound, outbound).await;
    debug!(?cause, "agent socket finished");
}
