//! Transport adapters for the session stream.

#[cfg(any(test, feature = "testing"))]
pub mod memory;
mod websocket;

pub use websocket::WebSocketTransport;
