mod forwarder;
mod published_stream;
mod stream_key;

pub use published_stream::*;
pub use stream_key::*;
