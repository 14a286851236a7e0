use crate::peer::Peer;
use crate::signaling::SignalSink;
use axum::extract::ws::Message;
use bytes::Bytes;
use futures::SinkExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at, timeout};
use tracing::{debug, warn};

const PING_PAYLOAD: &[u8] = b"ping";

/// Sole writer of a peer's control channel.
///
/// Drains the outbound queue and interleaves keep-alive pings. Any write
/// failure or missed deadline closes the peer.
pub(crate) async fn run_writer(peer: Arc<Peer>, mut rx: mpsc::Receiver<String>, mut sink: SignalSink) {
    let config = Arc::clone(peer.config());
    let mut ping = interval_at(Instant::now() + config.ping_interval, config.ping_interval);

    loop {
        let frame = tokio::select! {
            biased;
            _ = peer.closed() => break,
            msg = rx.recv() => match msg {
                Some(text) => Message::Text(text.into()),
                None => break,
            },
            _ = ping.tick() => Message::Ping(Bytes::from_static(PING_PAYLOAD)),
        };

        match timeout(config.write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(peer_id = %peer.id(), "Write failed: {}", e);
                break;
            }
            Err(_) => {
                warn!(peer_id = %peer.id(), "Write deadline exceeded");
                break;
            }
        }
    }

    // Close first: a stalled sink must not delay eviction by another deadline.
    peer.close().await;
    if timeout(config.write_timeout, sink.close()).await.is_err() {
        debug!(peer_id = %peer.id(), "Timed out closing control channel");
    }
}
