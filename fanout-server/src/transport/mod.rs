mod engine;
mod transport_config;
mod transport_event;
mod webrtc_engine;

pub use engine::*;
pub use transport_config::*;
pub use transport_event::*;
pub use webrtc_engine::*;
