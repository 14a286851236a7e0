//! Wire model shared by the fanout server and its clients.

pub mod model;

pub use model::*;
