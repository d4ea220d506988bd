//! Session channel, lifecycle and reconnect policy.

pub mod backoff;
mod channel;
mod lifecycle;

pub use backoff::BackoffState;
pub use channel::{ChannelConfig, ChannelError, SessionChannel};
pub use lifecycle::{SessionError, SessionLifecycle};
