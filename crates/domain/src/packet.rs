//! Packet model: one typed, routed, timestamped message.
//!
//! Every packet carries a [`PacketId`] and a [`Routing`] and exactly one
//! [`PacketPayload`]. Packets are immutable once built, apart from their
//! playback [`PacketStatus`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{InteractionId, PacketId, UtteranceId};
use crate::routing::Routing;
use crate::status::PacketStatus;
use crate::timestamp::now_timestamp;

const GOAL_COMPLETE_PATTERN: &str = r"^inworld\.goal\.complete\.(.+)$";

/// Discriminator carried in the envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Text,
    Audio,
    Control,
    Gesture,
    Custom,
    Mutation,
    Emotion,
    Action,
    ItemOperation,
    Unknown,
}

impl PacketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketType::Text => "TEXT",
            PacketType::Audio => "AUDIO",
            PacketType::Control => "CONTROL",
            PacketType::Gesture => "GESTURE",
            PacketType::Custom => "CUSTOM",
            PacketType::Mutation => "MUTATION",
            PacketType::Emotion => "EMOTION",
            PacketType::Action => "ACTION",
            PacketType::ItemOperation => "ITEM_OPERATION",
            PacketType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PacketType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TEXT" => Ok(Self::Text),
            "AUDIO" => Ok(Self::Audio),
            "CONTROL" => Ok(Self::Control),
            "GESTURE" => Ok(Self::Gesture),
            "CUSTOM" => Ok(Self::Custom),
            // Older servers still label cancellations this way
            "MUTATION" | "CANCEL_RESPONSE" => Ok(Self::Mutation),
            "EMOTION" => Ok(Self::Emotion),
            "ACTION" => Ok(Self::Action),
            "ITEM_OPERATION" => Ok(Self::ItemOperation),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(DomainError::parse(format!("Unknown packet type: {}", other))),
        }
    }
}

/// Session-level control actions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlAction {
    AudioSessionStart,
    AudioSessionEnd,
    InteractionEnd,
    TtsPlaybackStart,
    TtsPlaybackEnd,
    TtsPlaybackMute,
    TtsPlaybackUnmute,
    Warning,
    SessionEnd,
    /// Action string not known to this client, kept verbatim
    Unknown(String),
}

impl ControlAction {
    pub fn as_str(&self) -> &str {
        match self {
            ControlAction::AudioSessionStart => "AUDIO_SESSION_START",
            ControlAction::AudioSessionEnd => "AUDIO_SESSION_END",
            ControlAction::InteractionEnd => "INTERACTION_END",
            ControlAction::TtsPlaybackStart => "TTS_PLAYBACK_START",
            ControlAction::TtsPlaybackEnd => "TTS_PLAYBACK_END",
            ControlAction::TtsPlaybackMute => "TTS_PLAYBACK_MUTE",
            ControlAction::TtsPlaybackUnmute => "TTS_PLAYBACK_UNMUTE",
            ControlAction::Warning => "WARNING",
            ControlAction::SessionEnd => "SESSION_END",
            ControlAction::Unknown(raw) => raw,
        }
    }

    /// Never fails: unrecognised actions become [`ControlAction::Unknown`].
    pub fn parse(raw: &str) -> Self {
        match raw {
            "AUDIO_SESSION_START" => Self::AudioSessionStart,
            "AUDIO_SESSION_END" => Self::AudioSessionEnd,
            "INTERACTION_END" => Self::InteractionEnd,
            "TTS_PLAYBACK_START" => Self::TtsPlaybackStart,
            "TTS_PLAYBACK_END" => Self::TtsPlaybackEnd,
            "TTS_PLAYBACK_MUTE" => Self::TtsPlaybackMute,
            "TTS_PLAYBACK_UNMUTE" => Self::TtsPlaybackUnmute,
            "WARNING" => Self::Warning,
            "SESSION_END" => Self::SessionEnd,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextEvent {
    pub text: String,
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhonemeInfo {
    pub phoneme: String,
    /// Seconds from the start of the chunk
    pub start_offset: f32,
}

/// Base64 encoded audio plus optional lip-sync timing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioChunk {
    pub chunk: String,
    pub phonemes: Vec<PhonemeInfo>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmotionEvent {
    pub joy: f32,
    pub fear: f32,
    pub trust: f32,
    pub surprise: f32,
    pub behavior: String,
    pub strength: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GestureEvent {
    pub gesture_type: String,
    pub playback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionEvent {
    pub narrated_action: String,
    pub playback: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlEvent {
    pub action: ControlAction,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerParameter {
    pub name: String,
    pub value: String,
}

impl TriggerParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Trigger (sent) or custom event (received).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CustomEvent {
    pub name: String,
    pub parameters: Vec<TriggerParameter>,
}

impl CustomEvent {
    /// Name with the goal-completion prefix removed, if present.
    pub fn trigger_name(&self) -> &str {
        goal_regex()
            .captures(&self.name)
            .and_then(|captures| captures.get(1))
            .map_or(self.name.as_str(), |goal| goal.as_str())
    }

    pub fn is_goal_completion(&self) -> bool {
        goal_regex().is_match(&self.name)
    }
}

fn goal_regex() -> &'static Regex {
    static GOAL: OnceLock<Regex> = OnceLock::new();
    GOAL.get_or_init(|| Regex::new(GOAL_COMPLETE_PATTERN).expect("goal pattern is a valid regex"))
}

/// Directive asking the server to stop producing the given utterances.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CancelResponses {
    pub interaction_id: InteractionId,
    pub utterance_ids: Vec<UtteranceId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    CancelResponses(CancelResponses),
    RegenerateResponse { interaction_id: InteractionId },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityItem {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemsInEntitiesKind {
    #[default]
    Unspecified,
    Add,
    Remove,
    Replace,
}

impl ItemsInEntitiesKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemsInEntitiesKind::Unspecified => "UNSPECIFIED",
            ItemsInEntitiesKind::Add => "ADD",
            ItemsInEntitiesKind::Remove => "REMOVE",
            ItemsInEntitiesKind::Replace => "REPLACE",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "ADD" => Self::Add,
            "REMOVE" => Self::Remove,
            "REPLACE" => Self::Replace,
            _ => Self::Unspecified,
        }
    }
}

/// Entity item management sent to the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOperation {
    CreateOrUpdate {
        items: Vec<EntityItem>,
        add_to_entities: Vec<String>,
    },
    Remove {
        item_ids: Vec<String>,
    },
    ItemsInEntities {
        kind: ItemsInEntitiesKind,
        item_ids: Vec<String>,
        entity_names: Vec<String>,
    },
}

/// Exactly one populated sub-payload per packet.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketPayload {
    Text(TextEvent),
    Audio(AudioChunk),
    Emotion(EmotionEvent),
    Gesture(GestureEvent),
    Action(ActionEvent),
    Control(ControlEvent),
    Custom(CustomEvent),
    Mutation(MutationEvent),
    ItemOperation(ItemOperation),
    /// Discriminator or sub-payload this client cannot interpret
    Unknown { type_name: String },
}

impl PacketPayload {
    pub fn packet_type(&self) -> PacketType {
        match self {
            PacketPayload::Text(_) => PacketType::Text,
            PacketPayload::Audio(_) => PacketType::Audio,
            PacketPayload::Emotion(_) => PacketType::Emotion,
            PacketPayload::Gesture(_) => PacketType::Gesture,
            PacketPayload::Action(_) => PacketType::Action,
            PacketPayload::Control(_) => PacketType::Control,
            PacketPayload::Custom(_) => PacketType::Custom,
            PacketPayload::Mutation(_) => PacketType::Mutation,
            PacketPayload::ItemOperation(_) => PacketType::ItemOperation,
            PacketPayload::Unknown { .. } => PacketType::Unknown,
        }
    }
}

/// Envelope fields shared by every packet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PacketHeader {
    pub timestamp: String,
    pub packet_id: PacketId,
    pub routing: Routing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub timestamp: String,
    pub packet_id: PacketId,
    pub routing: Routing,
    pub payload: PacketPayload,
    status: PacketStatus,
}

impl Packet {
    /// Fresh ids and the current timestamp.
    pub fn new(routing: Routing, payload: PacketPayload) -> Self {
        Self::with_id(PacketId::new(), routing, payload)
    }

    pub fn with_id(packet_id: PacketId, routing: Routing, payload: PacketPayload) -> Self {
        Self {
            timestamp: now_timestamp(),
            packet_id,
            routing,
            payload,
            status: PacketStatus::Received,
        }
    }

    /// Rebuild a packet from a decoded envelope, keeping its ids, routing and timestamp.
    pub fn from_envelope(header: PacketHeader, payload: PacketPayload) -> Self {
        Self {
            timestamp: header.timestamp,
            packet_id: header.packet_id,
            routing: header.routing,
            payload,
            status: PacketStatus::Received,
        }
    }

    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            timestamp: self.timestamp.clone(),
            packet_id: self.packet_id.clone(),
            routing: self.routing.clone(),
        }
    }

    /// Player text to a character. Blank text is rejected.
    pub fn text(routing: Routing, text: impl Into<String>) -> Result<Self, DomainError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DomainError::validation("text must not be empty"));
        }
        Ok(Self::new(
            routing,
            PacketPayload::Text(TextEvent {
                text,
                is_final: true,
            }),
        ))
    }

    /// Named trigger with optional parameters. An empty name is rejected.
    pub fn trigger(
        routing: Routing,
        name: impl Into<String>,
        parameters: Vec<TriggerParameter>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("trigger name must not be empty"));
        }
        if parameters.iter().any(|param| param.name.trim().is_empty()) {
            return Err(DomainError::validation(
                "trigger parameter name must not be empty",
            ));
        }
        Ok(Self::new(
            routing,
            PacketPayload::Custom(CustomEvent { name, parameters }),
        ))
    }

    pub fn control(routing: Routing, action: ControlAction) -> Self {
        Self::new(
            routing,
            PacketPayload::Control(ControlEvent {
                action,
                description: None,
            }),
        )
    }

    pub fn audio_session_start(routing: Routing) -> Self {
        Self::control(routing, ControlAction::AudioSessionStart)
    }

    pub fn audio_session_end(routing: Routing) -> Self {
        Self::control(routing, ControlAction::AudioSessionEnd)
    }

    pub fn audio_chunk(routing: Routing, chunk: impl Into<String>) -> Self {
        Self::new(
            routing,
            PacketPayload::Audio(AudioChunk {
                chunk: chunk.into(),
                phonemes: Vec::new(),
            }),
        )
    }

    pub fn cancel_responses(routing: Routing, cancel: CancelResponses) -> Self {
        Self::new(
            routing,
            PacketPayload::Mutation(MutationEvent::CancelResponses(cancel)),
        )
    }

    pub fn item_operation(routing: Routing, operation: ItemOperation) -> Self {
        Self::new(routing, PacketPayload::ItemOperation(operation))
    }

    pub fn packet_type(&self) -> PacketType {
        self.payload.packet_type()
    }

    pub fn interaction_id(&self) -> &InteractionId {
        &self.packet_id.interaction_id
    }

    pub fn utterance_id(&self) -> &UtteranceId {
        &self.packet_id.utterance_id
    }

    pub fn status(&self) -> PacketStatus {
        self.status
    }

    /// Move to `next`; returns false when the current status is terminal.
    pub fn mark(&mut self, next: PacketStatus) -> bool {
        match self.status.transition_to(next) {
            Ok(status) => {
                self.status = status;
                true
            }
            Err(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&TextEvent> {
        match &self.payload {
            PacketPayload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn control_action(&self) -> Option<&ControlAction> {
        match &self.payload {
            PacketPayload::Control(control) => Some(&control.action),
            _ => None,
        }
    }

    /// Audio, text and emotion packets are what a character actually performs.
    pub fn is_playable(&self) -> bool {
        matches!(
            self.payload,
            PacketPayload::Text(_)
                | PacketPayload::Audio(_)
                | PacketPayload::Emotion(_)
                | PacketPayload::Gesture(_)
                | PacketPayload::Action(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Actor;

    #[test]
    fn new_packets_get_fresh_ids_and_timestamp() {
        let a = Packet::audio_session_start(Routing::to_character("s1"));
        let b = Packet::audio_session_end(Routing::to_character("s1"));
        assert_ne!(a.packet_id.packet_id, b.packet_id.packet_id);
        assert!(a.timestamp.ends_with('Z'));
        assert_eq!(a.status(), PacketStatus::Received);
        assert_eq!(a.packet_type(), PacketType::Control);
    }

    #[test]
    fn from_envelope_keeps_header() {
        let original = Packet::audio_chunk(Routing::to_character("s1"), "AAAA");
        let rebuilt = Packet::from_envelope(
            original.header(),
            PacketPayload::Text(TextEvent {
                text: "hi".to_string(),
                is_final: true,
            }),
        );
        assert_eq!(rebuilt.packet_id, original.packet_id);
        assert_eq!(rebuilt.routing, original.routing);
        assert_eq!(rebuilt.timestamp, original.timestamp);
        assert_eq!(rebuilt.packet_type(), PacketType::Text);
    }

    #[test]
    fn blank_text_and_trigger_names_are_rejected() {
        let routing = Routing::to_character("s1");
        assert!(Packet::text(routing.clone(), "   ").is_err());
        assert!(Packet::trigger(routing.clone(), "", Vec::new()).is_err());
        assert!(Packet::trigger(
            routing.clone(),
            "greet",
            vec![TriggerParameter::new("", "x")]
        )
        .is_err());
        assert!(Packet::trigger(routing, "greet", vec![TriggerParameter::new("mood", "happy")]).is_ok());
    }

    #[test]
    fn packet_type_accepts_legacy_cancel_alias() {
        assert_eq!("CANCEL_RESPONSE".parse::<PacketType>(), Ok(PacketType::Mutation));
        assert_eq!("item_operation".parse::<PacketType>(), Ok(PacketType::ItemOperation));
        assert!("HOLOGRAM".parse::<PacketType>().is_err());
    }

    #[test]
    fn control_action_keeps_unknown_verbatim() {
        assert_eq!(ControlAction::parse("INTERACTION_END"), ControlAction::InteractionEnd);
        let odd = ControlAction::parse("SOMETHING_NEW");
        assert_eq!(odd.as_str(), "SOMETHING_NEW");
    }

    #[test]
    fn goal_completion_prefix_is_stripped() {
        let goal = CustomEvent {
            name: "inworld.goal.complete.open_door".to_string(),
            parameters: Vec::new(),
        };
        assert!(goal.is_goal_completion());
        assert_eq!(goal.trigger_name(), "open_door");

        let plain = CustomEvent {
            name: "wave".to_string(),
            parameters: Vec::new(),
        };
        assert!(!plain.is_goal_completion());
        assert_eq!(plain.trigger_name(), "wave");
    }

    #[test]
    fn terminal_status_is_sticky() {
        let mut packet = Packet::new(
            Routing::new(Actor::agent("s1"), Some(Actor::player())),
            PacketPayload::Text(TextEvent::default()),
        );
        assert!(packet.mark(PacketStatus::Played));
        assert!(!packet.mark(PacketStatus::Cancelled));
        assert_eq!(packet.status(), PacketStatus::Played);
    }
}
