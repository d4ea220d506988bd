//! Inworld character session client.
//!
//! ## Structure
//!
//! - `infrastructure/` - Ports plus HTTP auth, WebSocket and in-memory transports
//! - `session/` - Session channel, lifecycle state machine and reconnect backoff
//! - `dispatch/` - Per-character facade and the inbound packet router
//! - `config` - Environment configuration

pub mod config;
pub mod dispatch;
pub mod infrastructure;
pub mod session;

pub use config::ClientConfig;
pub use dispatch::{CharacterSession, SessionRouter};
pub use infrastructure::messaging::{ClientEvent, EventBus, SessionStatus, SessionStatusObserver};
pub use session::{SessionChannel, SessionError, SessionLifecycle};
