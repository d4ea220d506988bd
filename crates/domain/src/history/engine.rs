use std::collections::VecDeque;
use std::sync::mpsc::Sender;

use crate::history::bounded::BoundedMap;
use crate::history::item::HistoryItem;
use crate::ids::{InteractionId, PacketId, UtteranceId};
use crate::packet::{CancelResponses, Packet};

/// Sizing of the history window and its backing stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Items exposed through [`InteractionHistory::history`]
    pub history_size: usize,
    /// Extra items kept in the ordered store beyond `history_size`
    pub history_slack: usize,
    /// Extra entries kept in the utterance/played/cancelled indexes
    pub index_slack: usize,
}

impl HistoryConfig {
    pub const DEFAULT_HISTORY_SIZE: usize = 20;
    pub const DEFAULT_HISTORY_SLACK: usize = 16;
    pub const DEFAULT_INDEX_SLACK: usize = 64;

    pub fn with_history_size(history_size: usize) -> Self {
        Self {
            history_size,
            ..Self::default()
        }
    }

    pub fn store_capacity(&self) -> usize {
        self.history_size + self.history_slack
    }

    pub fn index_capacity(&self) -> usize {
        self.history_size + self.index_slack
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            history_size: Self::DEFAULT_HISTORY_SIZE,
            history_slack: Self::DEFAULT_HISTORY_SLACK,
            index_slack: Self::DEFAULT_INDEX_SLACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionStatus {
    HistoryChanged,
    InteractionCompleted,
}

/// Notification carrying the status and the affected history items.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionEvent {
    pub status: InteractionStatus,
    pub items: Vec<HistoryItem>,
}

/// Receives history notifications synchronously, on the caller's thread.
pub trait HistoryObserver: Send {
    fn on_event(&mut self, event: &InteractionEvent);
}

impl<F> HistoryObserver for F
where
    F: FnMut(&InteractionEvent) + Send,
{
    fn on_event(&mut self, event: &InteractionEvent) {
        self(event)
    }
}

/// Forwards every notification into an mpsc channel.
pub struct ChannelObserver(pub Sender<InteractionEvent>);

impl HistoryObserver for ChannelObserver {
    fn on_event(&mut self, event: &InteractionEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.0.send(event.clone());
    }
}

/// Ordered, bounded, cancellation-aware history for one character.
pub struct InteractionHistory {
    config: HistoryConfig,
    /// Most recent first
    chat_history: VecDeque<UtteranceId>,
    by_utterance: BoundedMap<UtteranceId, HistoryItem>,
    played_utterances: BoundedMap<UtteranceId, ()>,
    cancelled_interactions: BoundedMap<InteractionId, ()>,
    current_utterance: Option<PacketId>,
    observers: Vec<Box<dyn HistoryObserver>>,
}

impl Default for InteractionHistory {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl InteractionHistory {
    pub fn new(config: HistoryConfig) -> Self {
        let index_capacity = config.index_capacity();
        Self {
            config,
            chat_history: VecDeque::new(),
            by_utterance: BoundedMap::new(index_capacity),
            played_utterances: BoundedMap::new(index_capacity),
            cancelled_interactions: BoundedMap::new(index_capacity),
            current_utterance: None,
            observers: Vec::new(),
        }
    }

    pub fn config(&self) -> HistoryConfig {
        self.config
    }

    pub fn subscribe(&mut self, observer: impl HistoryObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Record a text packet.
    ///
    /// Returns a cancel directive when the packet belongs to a cancelled
    /// interaction, or when a player packet interrupted the utterance in progress.
    pub fn add_text(&mut self, packet: Packet) -> Option<CancelResponses> {
        let interaction_id = packet.interaction_id().clone();
        let utterance_id = packet.utterance_id().clone();

        if self.is_interaction_cancelled(&interaction_id) {
            tracing::debug!(
                interaction_id = %interaction_id,
                utterance_id = %utterance_id,
                "Re-cancelling packet for cancelled interaction"
            );
            return Some(CancelResponses {
                interaction_id,
                utterance_ids: vec![utterance_id],
            });
        }

        let mut cancel = None;
        let interrupted = self.current_utterance.as_ref().is_some_and(|current| {
            packet.routing.is_from_player() && current.interaction_id != interaction_id
        });
        if interrupted {
            cancel = self.interrupt_current();
        }

        match self.by_utterance.get_mut(&utterance_id) {
            Some(existing) => existing.packet = packet,
            None => self.insert(HistoryItem::new(packet)),
        }
        self.notify_history_changed();

        cancel
    }

    /// Drop the agent output of the interaction being played and remember it
    /// as cancelled.
    fn interrupt_current(&mut self) -> Option<CancelResponses> {
        let current = self.current_utterance.take()?;
        tracing::info!(
            interaction_id = %current.interaction_id,
            "Player interrupted current interaction"
        );
        self.drop_interaction(current.interaction_id)
    }

    /// Cancel an interaction on the player's request: its agent items leave
    /// the history and later packets for it are rejected.
    pub fn cancel_interaction(&mut self, interaction_id: &InteractionId) -> Option<CancelResponses> {
        let playing = self
            .current_utterance
            .as_ref()
            .is_some_and(|current| &current.interaction_id == interaction_id);
        if playing {
            self.current_utterance = None;
        }
        let cancel = self.drop_interaction(interaction_id.clone());
        self.notify_history_changed();
        cancel
    }

    fn drop_interaction(&mut self, interaction_id: InteractionId) -> Option<CancelResponses> {
        let mut removed = Vec::new();

        // Oldest first so the directive lists utterances in playback order
        for utterance_id in self.chat_history.iter().rev() {
            let Some(item) = self.by_utterance.get(utterance_id) else {
                continue;
            };
            if item.is_agent() && item.interaction_id() == &interaction_id {
                removed.push(utterance_id.clone());
            }
        }
        self.chat_history
            .retain(|utterance_id| !removed.contains(utterance_id));
        for utterance_id in &removed {
            self.by_utterance.remove(utterance_id);
        }

        self.cancelled_interactions.insert(interaction_id.clone(), ());
        tracing::debug!(
            interaction_id = %interaction_id,
            cancelled = removed.len(),
            "Interaction cancelled"
        );

        if removed.is_empty() {
            None
        } else {
            Some(CancelResponses {
                interaction_id,
                utterance_ids: removed,
            })
        }
    }

    fn insert(&mut self, item: HistoryItem) {
        let utterance_id = item.utterance_id().clone();
        self.by_utterance.insert(utterance_id.clone(), item);
        self.chat_history.push_front(utterance_id);
        while self.chat_history.len() > self.config.store_capacity() {
            self.chat_history.pop_back();
        }
    }

    /// Mark an utterance as playing.
    pub fn start_utterance(&mut self, packet_id: &PacketId) {
        self.current_utterance = Some(packet_id.clone());
        self.played_utterances
            .insert(packet_id.utterance_id.clone(), ());
        self.notify_history_changed();
    }

    /// Playback of an utterance finished. Completes its interaction when the
    /// utterance was the final one.
    pub fn complete_utterance(&mut self, packet_id: &PacketId) {
        let is_final = self
            .by_utterance
            .get(&packet_id.utterance_id)
            .is_some_and(|item| item.is_final);
        if is_final {
            self.complete_interaction(&packet_id.interaction_id);
        }
        self.current_utterance = None;
    }

    /// The server will send no more utterances for `interaction_id`.
    pub fn add_interaction_end(&mut self, interaction_id: &InteractionId) {
        let last_agent = self.chat_history.iter().find(|utterance_id| {
            self.by_utterance
                .get(utterance_id)
                .is_some_and(|item| item.is_agent() && item.interaction_id() == interaction_id)
        });
        let Some(utterance_id) = last_agent.cloned() else {
            return;
        };
        if let Some(item) = self.by_utterance.get_mut(&utterance_id) {
            item.is_final = true;
        }

        let playing = self
            .current_utterance
            .as_ref()
            .is_some_and(|current| current.utterance_id == utterance_id);
        if self.played_utterances.contains_key(&utterance_id) && !playing {
            self.complete_interaction(interaction_id);
        }
    }

    fn complete_interaction(&mut self, interaction_id: &InteractionId) {
        let items = self
            .visible_items()
            .filter(|item| item.interaction_id() == interaction_id)
            .cloned()
            .collect();
        tracing::debug!(interaction_id = %interaction_id, "Interaction completed");
        self.emit(InteractionEvent {
            status: InteractionStatus::InteractionCompleted,
            items,
        });
    }

    /// Wipe all state, including the cancellation memory.
    pub fn clear(&mut self) {
        self.chat_history.clear();
        self.by_utterance.clear();
        self.played_utterances.clear();
        self.cancelled_interactions.clear();
        self.current_utterance = None;
        self.notify_history_changed();
    }

    pub fn is_interaction_cancelled(&self, interaction_id: &InteractionId) -> bool {
        self.cancelled_interactions.contains_key(interaction_id)
    }

    pub fn current_utterance(&self) -> Option<&PacketId> {
        self.current_utterance.as_ref()
    }

    /// Visible window: player/world items plus agent items that started playing,
    /// most recent first, at most `history_size`.
    pub fn history(&self) -> Vec<HistoryItem> {
        self.visible_items().cloned().collect()
    }

    /// Items held in the ordered store, visible or not.
    pub fn len(&self) -> usize {
        self.chat_history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chat_history.is_empty()
    }

    fn visible_items(&self) -> impl Iterator<Item = &HistoryItem> + '_ {
        self.chat_history
            .iter()
            .filter_map(|utterance_id| self.by_utterance.get(utterance_id))
            .filter(|item| {
                !item.is_agent() || self.played_utterances.contains_key(item.utterance_id())
            })
            .take(self.config.history_size)
    }

    fn notify_history_changed(&mut self) {
        let items = self.history();
        self.emit(InteractionEvent {
            status: InteractionStatus::HistoryChanged,
            items,
        });
    }

    fn emit(&mut self, event: InteractionEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }
}

impl std::fmt::Debug for InteractionHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionHistory")
            .field("config", &self.config)
            .field("stored", &self.chat_history.len())
            .field("current_utterance", &self.current_utterance)
            .field("observers", &self.observers.len())
            .finish()
    }
}
