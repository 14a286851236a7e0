pub mod config;
pub mod error;
pub mod peer;
pub mod room;
pub mod signaling;
pub mod stream;
pub mod transport;

pub use config::*;
pub use error::*;
pub use peer::*;
pub use room::*;
pub use signaling::*;
pub use stream::*;
pub use transport::*;
