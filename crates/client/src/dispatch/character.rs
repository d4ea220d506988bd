//! Per-character view of a live session.

use std::sync::mpsc;
use std::sync::Arc;

use inworld_domain::{
    CancelResponses, ChannelObserver, ControlAction, HistoryConfig, InteractionEvent,
    InteractionHistory, InteractionTracker, InteractionId, Packet, PacketId, PacketPayload,
    Routing, TriggerParameter,
};
use inworld_shared::CharacterData;

use crate::infrastructure::messaging::{ClientEvent, EventBus};
use crate::session::SessionChannel;

/// Filters the shared packet stream down to one character, keeps its history
/// and sends on its behalf.
///
/// With auto-play on (the default) agent text counts as played the moment it
/// arrives, which suits text-only consumers. Audio consumers turn it off and
/// drive [`start_utterance`](Self::start_utterance) and
/// [`complete_utterance`](Self::complete_utterance) from their playback.
pub struct CharacterSession {
    character: CharacterData,
    history: InteractionHistory,
    history_events: mpsc::Receiver<InteractionEvent>,
    tracker: InteractionTracker,
    channel: Arc<SessionChannel>,
    bus: EventBus,
    auto_play: bool,
}

impl CharacterSession {
    pub fn new(
        character: CharacterData,
        config: HistoryConfig,
        channel: Arc<SessionChannel>,
        bus: EventBus,
    ) -> Self {
        let (tx, history_events) = mpsc::channel();
        let mut history = InteractionHistory::new(config);
        history.subscribe(ChannelObserver(tx));

        Self {
            character,
            history,
            history_events,
            tracker: InteractionTracker::default(),
            channel,
            bus,
            auto_play: true,
        }
    }

    /// Id the server routes this character's packets by.
    pub fn live_session_id(&self) -> &str {
        &self.character.agent_id
    }

    pub fn character(&self) -> &CharacterData {
        &self.character
    }

    pub fn set_auto_play(&mut self, auto_play: bool) {
        self.auto_play = auto_play;
    }

    pub fn history(&self) -> &InteractionHistory {
        &self.history
    }

    pub fn tracker(&self) -> &InteractionTracker {
        &self.tracker
    }

    pub fn is_related(&self, packet: &Packet) -> bool {
        packet.routing.is_related(self.live_session_id())
    }

    fn routing(&self) -> Routing {
        Routing::to_character(self.live_session_id())
    }

    /// Process one inbound packet. Returns false when it belongs to another
    /// character.
    pub async fn handle_packet(&mut self, packet: Packet) -> bool {
        if !self.is_related(&packet) {
            return false;
        }

        self.bus
            .dispatch(ClientEvent::PacketReceived {
                character: self.character.agent_id.clone(),
                packet: packet.clone(),
            })
            .await;

        let from_agent = packet.routing.is_from_agent();
        let cancelled = self.history.is_interaction_cancelled(packet.interaction_id());
        if from_agent && !cancelled {
            self.tracker.add(packet.clone());
        }

        let is_end = matches!(packet.control_action(), Some(ControlAction::InteractionEnd));
        if matches!(packet.payload, PacketPayload::Text(_)) {
            self.record_text(packet, from_agent);
        } else if is_end {
            self.end_interaction(packet.interaction_id().clone());
        }

        self.publish_history_events().await;
        true
    }

    fn end_interaction(&mut self, interaction_id: InteractionId) {
        self.history.add_interaction_end(&interaction_id);
        if !self.auto_play {
            return;
        }
        let playing = self
            .history
            .current_utterance()
            .filter(|current| current.interaction_id == interaction_id)
            .cloned();
        if let Some(current) = playing {
            self.history.complete_utterance(&current);
        }
    }

    fn record_text(&mut self, packet: Packet, from_agent: bool) {
        let packet_id = packet.packet_id.clone();
        let rejected = self.history.is_interaction_cancelled(&packet_id.interaction_id);

        if let Some(cancel) = self.history.add_text(packet) {
            self.interrupt(cancel);
        }
        if self.auto_play && from_agent && !rejected {
            self.history.start_utterance(&packet_id);
            self.tracker.mark_played(&packet_id);
        }
    }

    async fn publish_history_events(&mut self) {
        let events: Vec<InteractionEvent> = self.history_events.try_iter().collect();
        for event in events {
            self.bus
                .dispatch(ClientEvent::InteractionChanged {
                    character: self.character.agent_id.clone(),
                    event,
                })
                .await;
        }
    }

    /// The history cancelled an interaction; settle it in the tracker too so it
    /// is never picked by `cancel_response`.
    fn interrupt(&mut self, cancel: CancelResponses) {
        self.tracker.cancel(&cancel.interaction_id);
        self.send_cancel(cancel);
    }

    fn send_cancel(&self, cancel: CancelResponses) -> bool {
        tracing::debug!(
            character = %self.character.agent_id,
            interaction_id = %cancel.interaction_id,
            utterances = cancel.utterance_ids.len(),
            "Cancelling responses"
        );
        self.channel
            .enqueue(Packet::cancel_responses(self.routing(), cancel))
    }

    /// Send player text. The line enters the local history first, so a reply
    /// still in progress is interrupted before the text goes out.
    pub async fn send_text(&mut self, text: &str) -> bool {
        if !self.channel.is_connected() {
            tracing::debug!(character = %self.character.agent_id, "Not connected; text dropped");
            return false;
        }
        let packet = match Packet::text(self.routing(), text) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!(error = %e, "Text not sent");
                return false;
            }
        };

        if let Some(cancel) = self.history.add_text(packet.clone()) {
            self.interrupt(cancel);
        }
        let sent = self.channel.enqueue(packet);
        self.publish_history_events().await;
        sent
    }

    /// Fire a named trigger. An empty name is a no-op.
    pub fn send_trigger(&self, name: &str, parameters: Vec<TriggerParameter>) -> bool {
        match Packet::trigger(self.routing(), name, parameters) {
            Ok(packet) => self.channel.enqueue(packet),
            Err(e) => {
                tracing::debug!(error = %e, "Trigger not sent");
                false
            }
        }
    }

    pub fn start_audio(&self) -> bool {
        self.channel
            .enqueue(Packet::audio_session_start(self.routing()))
    }

    pub fn stop_audio(&self) -> bool {
        self.channel
            .enqueue(Packet::audio_session_end(self.routing()))
    }

    /// Send one base64 encoded audio chunk.
    pub fn send_audio(&self, chunk: &str) -> bool {
        self.channel
            .enqueue(Packet::audio_chunk(self.routing(), chunk))
    }

    /// Stop the reply in progress: the server is told to drop it and its text
    /// leaves the history.
    pub async fn cancel_response(&mut self) -> bool {
        let Some((interaction_id, mut utterance_ids)) = self.tracker.cancel_latest() else {
            tracing::debug!(character = %self.character.agent_id, "Nothing to cancel");
            return false;
        };

        if let Some(removed) = self.history.cancel_interaction(&interaction_id) {
            for utterance_id in removed.utterance_ids {
                if !utterance_ids.contains(&utterance_id) {
                    utterance_ids.push(utterance_id);
                }
            }
        }
        self.publish_history_events().await;

        self.send_cancel(CancelResponses {
            interaction_id,
            utterance_ids,
        })
    }

    /// Playback of `packet_id` began.
    pub async fn start_utterance(&mut self, packet_id: &PacketId) {
        self.history.start_utterance(packet_id);
        self.tracker.mark_played(packet_id);
        self.publish_history_events().await;
    }

    /// Playback of `packet_id` finished.
    pub async fn complete_utterance(&mut self, packet_id: &PacketId) {
        self.history.complete_utterance(packet_id);
        self.publish_history_events().await;
    }

    pub async fn clear_history(&mut self) {
        self.history.clear();
        self.tracker.clear();
        self.publish_history_events().await;
    }
}

impl std::fmt::Debug for CharacterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacterSession")
            .field("character", &self.character.agent_id)
            .field("history", &self.history.len())
            .field("auto_play", &self.auto_play)
            .finish_non_exhaustive()
    }
}
