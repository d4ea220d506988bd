use crate::ids::{InteractionId, PacketId, UtteranceId};
use crate::packet::{Packet, PacketPayload};
use crate::routing::Routing;

/// One text-bearing utterance as shown in the conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItem {
    /// Latest packet received for this utterance
    pub packet: Packet,
    /// No further utterances will arrive for this item's interaction
    pub is_final: bool,
}

impl HistoryItem {
    pub fn new(packet: Packet) -> Self {
        Self {
            packet,
            is_final: false,
        }
    }

    pub fn packet_id(&self) -> &PacketId {
        &self.packet.packet_id
    }

    pub fn utterance_id(&self) -> &UtteranceId {
        &self.packet.packet_id.utterance_id
    }

    pub fn interaction_id(&self) -> &InteractionId {
        &self.packet.packet_id.interaction_id
    }

    pub fn routing(&self) -> &Routing {
        &self.packet.routing
    }

    pub fn is_agent(&self) -> bool {
        self.packet.routing.is_from_agent()
    }

    pub fn text(&self) -> Option<&str> {
        match &self.packet.payload {
            PacketPayload::Text(text) => Some(text.text.as_str()),
            _ => None,
        }
    }
}
