//! Interaction and utterance aggregates, plus a bounded per-character tracker.

use std::collections::VecDeque;

use crate::ids::{InteractionId, PacketId, UtteranceId};
use crate::packet::{ControlAction, Packet};
use crate::status::PacketStatus;

/// Default number of interactions remembered per character.
pub const DEFAULT_TRACKED_INTERACTIONS: usize = 100;

/// One playable unit: the text, audio and emotion packets sharing an utterance id.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub utterance_id: UtteranceId,
    pub status: PacketStatus,
    pub packets: Vec<Packet>,
}

impl Utterance {
    pub fn new(utterance_id: UtteranceId) -> Self {
        Self {
            utterance_id,
            status: PacketStatus::Received,
            packets: Vec::new(),
        }
    }

    pub fn push(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    pub fn mark_played(&mut self) {
        if self.status.transition_to(PacketStatus::Played).is_ok() {
            self.status = PacketStatus::Played;
            for packet in &mut self.packets {
                packet.mark(PacketStatus::Played);
            }
        }
    }

    /// Cancel the utterance and any packets still waiting to play.
    pub fn cancel(&mut self) -> bool {
        if self.status != PacketStatus::Received {
            return false;
        }
        self.status = PacketStatus::Cancelled;
        for packet in &mut self.packets {
            packet.mark(PacketStatus::Cancelled);
        }
        true
    }
}

/// Utterances produced in response to one stimulus. The unit of cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub interaction_id: InteractionId,
    pub status: PacketStatus,
    pub utterances: Vec<Utterance>,
    /// Set once the server has sent INTERACTION_END
    pub received_end: bool,
}

impl Interaction {
    pub fn new(interaction_id: InteractionId) -> Self {
        Self {
            interaction_id,
            status: PacketStatus::Received,
            utterances: Vec::new(),
            received_end: false,
        }
    }

    /// Append a packet to its utterance, creating the utterance on first sight.
    pub fn add(&mut self, packet: Packet) {
        let utterance_id = packet.utterance_id().clone();
        match self
            .utterances
            .iter_mut()
            .find(|utterance| utterance.utterance_id == utterance_id)
        {
            Some(utterance) => utterance.push(packet),
            None => {
                let mut utterance = Utterance::new(utterance_id);
                utterance.push(packet);
                self.utterances.push(utterance);
            }
        }
    }

    pub fn utterance_mut(&mut self, utterance_id: &UtteranceId) -> Option<&mut Utterance> {
        self.utterances
            .iter_mut()
            .find(|utterance| &utterance.utterance_id == utterance_id)
    }

    /// PLAYED only once every utterance has left RECEIVED and the server closed
    /// the interaction.
    pub fn update_status(&mut self) -> PacketStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        let pending = self
            .utterances
            .iter()
            .any(|utterance| utterance.status == PacketStatus::Received);
        if !pending && self.received_end {
            self.status = PacketStatus::Played;
        }
        self.status
    }

    /// Cancel everything still pending and return the affected utterance ids.
    pub fn cancel(&mut self) -> Vec<UtteranceId> {
        let cancelled = self
            .utterances
            .iter_mut()
            .filter_map(|utterance| {
                utterance
                    .cancel()
                    .then(|| utterance.utterance_id.clone())
            })
            .collect();
        self.status = PacketStatus::Cancelled;
        cancelled
    }
}

/// Ordered interactions for one character, oldest first, bounded in count.
#[derive(Debug, Clone)]
pub struct InteractionTracker {
    interactions: VecDeque<Interaction>,
    capacity: usize,
}

impl Default for InteractionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TRACKED_INTERACTIONS)
    }
}

impl InteractionTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            interactions: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a packet. Control INTERACTION_END closes its interaction instead of
    /// being stored as content.
    pub fn add(&mut self, packet: Packet) {
        let interaction_id = packet.interaction_id().clone();
        let is_end = matches!(packet.control_action(), Some(ControlAction::InteractionEnd));

        let interaction = match self
            .interactions
            .iter()
            .position(|interaction| interaction.interaction_id == interaction_id)
        {
            Some(index) => &mut self.interactions[index],
            None => {
                if self.interactions.len() >= self.capacity {
                    self.interactions.pop_front();
                }
                self.interactions.push_back(Interaction::new(interaction_id));
                let last = self.interactions.len() - 1;
                &mut self.interactions[last]
            }
        };

        if is_end {
            interaction.received_end = true;
        } else if interaction.status == PacketStatus::Received {
            interaction.add(packet);
        } else {
            tracing::debug!(
                interaction_id = %interaction.interaction_id,
                status = ?interaction.status,
                "Dropping packet for settled interaction"
            );
        }
        interaction.update_status();
    }

    pub fn mark_played(&mut self, packet_id: &PacketId) {
        if let Some(interaction) = self.get_mut(&packet_id.interaction_id) {
            if let Some(utterance) = interaction.utterance_mut(&packet_id.utterance_id) {
                utterance.mark_played();
            }
            interaction.update_status();
        }
    }

    pub fn get(&self, interaction_id: &InteractionId) -> Option<&Interaction> {
        self.interactions
            .iter()
            .find(|interaction| &interaction.interaction_id == interaction_id)
    }

    fn get_mut(&mut self, interaction_id: &InteractionId) -> Option<&mut Interaction> {
        self.interactions
            .iter_mut()
            .find(|interaction| &interaction.interaction_id == interaction_id)
    }

    /// Most recent interaction still waiting to finish playing.
    pub fn latest_received(&self) -> Option<&Interaction> {
        self.interactions
            .iter()
            .rev()
            .find(|interaction| interaction.status == PacketStatus::Received)
    }

    /// Cancel the most recent RECEIVED interaction.
    pub fn cancel_latest(&mut self) -> Option<(InteractionId, Vec<UtteranceId>)> {
        let interaction = self
            .interactions
            .iter_mut()
            .rev()
            .find(|interaction| interaction.status == PacketStatus::Received)?;
        let utterances = interaction.cancel();
        Some((interaction.interaction_id.clone(), utterances))
    }

    /// Cancel one interaction if it is still RECEIVED. Returns the utterances
    /// that were pending.
    pub fn cancel(&mut self, interaction_id: &InteractionId) -> Option<Vec<UtteranceId>> {
        let interaction = self.get_mut(interaction_id)?;
        if interaction.status != PacketStatus::Received {
            return None;
        }
        Some(interaction.cancel())
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    pub fn clear(&mut self) {
        self.interactions.clear();
    }
}
