mod media_state;
mod negotiation;
mod outbound;
mod peer;

pub use media_state::*;
pub use negotiation::NegotiationState;
pub use peer::*;
