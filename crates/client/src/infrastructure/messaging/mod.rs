//! Session status and event notification.

pub mod connection;
pub mod event_bus;

pub use connection::{set_status, SessionStatus, SessionStatusObserver};
pub use event_bus::{ClientEvent, EventBus};
