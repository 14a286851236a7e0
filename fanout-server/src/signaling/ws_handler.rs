use crate::signaling::{SignalSink, SignalStream, SignalingService};
use axum::Router;
use axum::extract::ws::WebSocket;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt, TryStreamExt};
use tracing::debug;

/// `GET /ws` bound to `service`.
pub fn router(service: SignalingService) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(service)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(service): State<SignalingService>,
) -> impl IntoResponse {
    let limit = service.config().max_message_size;

    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, service))
}

async fn handle_socket(socket: WebSocket, service: SignalingService) {
    debug!("New WebSocket connection");

    let (sender, receiver) = socket.split();
    let sink: SignalSink = Box::pin(sender.sink_map_err(anyhow::Error::from));
    let stream: SignalStream = Box::pin(receiver.map_err(anyhow::Error::from));

    service.serve(sink, stream).await;
}
