//! Per-character conversation history.
//!
//! [`InteractionHistory`] turns the inbound text stream into an ordered,
//! bounded, cancellation-aware history. It is single-threaded: callers drive it
//! from one consumer context and it performs no locking of its own.

mod bounded;
mod engine;
mod item;

pub use bounded::BoundedMap;
pub use engine::{
    ChannelObserver, HistoryConfig, HistoryObserver, InteractionEvent, InteractionHistory,
    InteractionStatus,
};
pub use item::HistoryItem;
