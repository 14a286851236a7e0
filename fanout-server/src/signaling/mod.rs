mod authorizer;
mod signal_channel;
mod signaling_service;
mod ws_handler;

pub use authorizer::*;
pub use signal_channel::*;
pub use signaling_service::*;
pub use ws_handler::*;
