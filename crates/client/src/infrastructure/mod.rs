//! Infrastructure: ports and the adapters that implement them.

pub mod auth;
pub mod clock;
pub mod messaging;
pub mod ports;
pub mod transport;
