use axum::extract::ws::Message;
use futures::{Sink, Stream};
use std::pin::Pin;

/// Write half of a client's control channel.
pub type SignalSink = Pin<Box<dyn Sink<Message, Error = anyhow::Error> + Send>>;

/// Read half of a client's control channel.
pub type SignalStream = Pin<Box<dyn Stream<Item = anyhow::Result<Message>> + Send>>;
