use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Ids are opaque on the wire: the server usually sends UUIDs but nothing guarantees
// it, so they are carried as strings and only generated from UUID v4 locally.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid.to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self::from_uuid(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Packet identity
define_id!(PacketUid);
define_id!(UtteranceId);
define_id!(InteractionId);
define_id!(CorrelationId);

/// Full identity of a packet.
///
/// An utterance is one sentence-level unit (text, audio and emotion packets may
/// share it); an interaction groups the utterances produced for one stimulus.
/// Ids are assigned once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PacketId {
    pub packet_id: PacketUid,
    pub utterance_id: UtteranceId,
    pub interaction_id: InteractionId,
    pub correlation_id: Option<CorrelationId>,
}

impl PacketId {
    /// Fresh ids for a packet, utterance and interaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// A new packet belonging to an existing utterance.
    pub fn within(utterance_id: UtteranceId, interaction_id: InteractionId) -> Self {
        Self {
            packet_id: PacketUid::new(),
            utterance_id,
            interaction_id,
            correlation_id: None,
        }
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "I: {} U: {} P: {}",
            self.interaction_id, self.utterance_id, self.packet_id
        )
    }
}
