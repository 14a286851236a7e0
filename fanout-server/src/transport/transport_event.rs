use crate::transport::{ConnectionRole, ConnectionState, IceCandidate, InboundStream};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events a transport engine reports back to the peer that owns the connection.
pub enum TransportEvent {
    /// A local ICE candidate was gathered and must be trickled to the client.
    CandidateGenerated(ConnectionRole, IceCandidate),

    /// The connection moved to a new state.
    StateChanged(ConnectionRole, ConnectionState),

    /// The client started sending a new media stream on its publish connection.
    InboundStream(Arc<dyn InboundStream>),
}

pub type TransportEventSender = mpsc::Sender<TransportEvent>;
pub type TransportEventReceiver = mpsc::Receiver<TransportEvent>;
