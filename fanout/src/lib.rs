pub use fanout_core::model::PeerId;

pub mod model {
    pub use fanout_core::model::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use fanout_server::*;
}
