//! Domain model for Inworld character sessions: packets, routing, interaction
//! aggregates and the conversation history engine.
//!
//! Nothing in this crate performs I/O or spawns tasks.

pub mod error;
pub mod history;
pub mod ids;
pub mod interaction;
pub mod packet;
pub mod routing;
pub mod status;
pub mod timestamp;

pub use error::DomainError;
pub use history::{
    ChannelObserver, HistoryConfig, HistoryItem, HistoryObserver, InteractionEvent,
    InteractionHistory, InteractionStatus,
};
pub use ids::{CorrelationId, InteractionId, PacketId, PacketUid, UtteranceId};
pub use interaction::{Interaction, InteractionTracker, Utterance};
pub use packet::{
    ActionEvent, AudioChunk, CancelResponses, ControlAction, ControlEvent, CustomEvent,
    EmotionEvent, EntityItem, GestureEvent, ItemOperation, ItemsInEntitiesKind, MutationEvent,
    Packet, PacketHeader, PacketPayload, PacketType, PhonemeInfo, TextEvent, TriggerParameter,
};
pub use routing::{Actor, ActorType, Routing};
pub use status::PacketStatus;
