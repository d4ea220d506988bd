use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Playback state of a packet, utterance or interaction.
///
/// `Received` moves to either `Played` or `Cancelled`; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PacketStatus {
    #[default]
    Received,
    Played,
    Cancelled,
}

impl PacketStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PacketStatus::Received)
    }

    /// Validate a transition out of the current state.
    pub fn transition_to(self, next: PacketStatus) -> Result<PacketStatus, DomainError> {
        match (self, next) {
            (PacketStatus::Received, _) => Ok(next),
            (current, next) if current == next => Ok(current),
            (current, next) => Err(DomainError::invalid_state_transition(format!(
                "{:?} -> {:?}",
                current, next
            ))),
        }
    }
}
