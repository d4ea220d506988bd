//! JSON codec between domain packets and wire frames.
//!
//! Decoding never fails on an unrecognised payload: such packets surface as
//! [`PacketPayload::Unknown`] and are logged. Only malformed JSON is an error.

use inworld_domain::{
    ActionEvent, Actor, ActorType, AudioChunk, CancelResponses, ControlAction, ControlEvent,
    CorrelationId, CustomEvent, EmotionEvent, EntityItem, GestureEvent, ItemOperation,
    ItemsInEntitiesKind, MutationEvent, Packet, PacketHeader, PacketId, PacketPayload, PhonemeInfo,
    Routing, TextEvent, TriggerParameter,
};
use thiserror::Error;

use crate::messages::{
    ActionData, ActorData, CancelResponsesData, ControlData, CreateOrUpdateItemsData, CustomData,
    DataChunkData, EmotionData, EntityItemData, GestureData, ItemOperationData,
    ItemsInEntitiesData, MutationData, NarratedActionData, PacketData, PacketIdData,
    ParameterData, PhonemeData, RegenerateResponseData, RemoveItemsData, ResponseFrame,
    RoutingData, TextData, DATA_CHUNK_AUDIO,
};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame carries neither a result nor an error")]
    EmptyFrame,
}

/// Error reported by the server inside a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub message: String,
    /// Session closed by the server after a period of inactivity
    pub inactivity: bool,
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Packet(Packet),
    Error(ServerError),
}

/// Encode a packet as the JSON text frame sent to the server.
pub fn encode(packet: &Packet) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&to_wire(packet))?)
}

/// Decode a bare packet (no `result` wrapper).
pub fn decode(raw: &str) -> Result<Packet, CodecError> {
    let data: PacketData = serde_json::from_str(raw)?;
    Ok(from_wire(data))
}

/// Decode an inbound stream frame: `{"result": packet}` or `{"error": ...}`.
pub fn decode_frame(raw: &str) -> Result<Frame, CodecError> {
    let frame: ResponseFrame = serde_json::from_str(raw)?;
    if let Some(error) = frame.error {
        return Ok(Frame::Error(server_error(&error)));
    }
    let data = frame.result.ok_or(CodecError::EmptyFrame)?;
    Ok(Frame::Packet(from_wire(data)))
}

fn server_error(error: &serde_json::Value) -> ServerError {
    let message = match error {
        serde_json::Value::String(message) => message.clone(),
        other => other
            .get("message")
            .and_then(|message| message.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    };
    let inactivity = error.to_string().to_ascii_lowercase().contains("inactivity");
    ServerError {
        message,
        inactivity,
    }
}

// =============================================================================
// Domain -> wire
// =============================================================================

pub fn to_wire(packet: &Packet) -> PacketData {
    let mut data = PacketData {
        timestamp: packet.timestamp.clone(),
        packet_type: Some(packet.packet_type().as_str().to_string()),
        packet_id: packet_id_to_wire(&packet.packet_id),
        routing: routing_to_wire(&packet.routing),
        ..PacketData::default()
    };

    match &packet.payload {
        PacketPayload::Text(text) => {
            data.text = Some(TextData {
                text: text.text.clone(),
                is_final: text.is_final,
            });
        }
        PacketPayload::Audio(audio) => {
            data.data_chunk = Some(DataChunkData {
                chunk: audio.chunk.clone(),
                chunk_type: DATA_CHUNK_AUDIO.to_string(),
                additional_phoneme_info: audio
                    .phonemes
                    .iter()
                    .map(|info| PhonemeData {
                        phoneme: info.phoneme.clone(),
                        start_offset: info.start_offset,
                    })
                    .collect(),
            });
        }
        PacketPayload::Emotion(emotion) => {
            data.emotion = Some(EmotionData {
                joy: emotion.joy,
                fear: emotion.fear,
                trust: emotion.trust,
                surprise: emotion.surprise,
                behavior: emotion.behavior.clone(),
                strength: emotion.strength.clone(),
            });
        }
        PacketPayload::Gesture(gesture) => {
            data.gesture = Some(GestureData {
                gesture_type: gesture.gesture_type.clone(),
                playback: gesture.playback.clone(),
            });
        }
        PacketPayload::Action(action) => {
            data.action = Some(ActionData {
                narrated_action: Some(NarratedActionData {
                    content: action.narrated_action.clone(),
                }),
                playback: action.playback.clone(),
            });
        }
        PacketPayload::Control(control) => {
            data.control = Some(ControlData {
                action: control.action.as_str().to_string(),
                description: control.description.clone(),
            });
        }
        PacketPayload::Custom(custom) => {
            data.custom = Some(CustomData {
                name: custom.name.clone(),
                parameters: custom
                    .parameters
                    .iter()
                    .map(|param| ParameterData {
                        name: param.name.clone(),
                        value: param.value.clone(),
                    })
                    .collect(),
            });
        }
        PacketPayload::Mutation(MutationEvent::CancelResponses(cancel)) => {
            data.mutation = Some(MutationData {
                cancel_responses: Some(CancelResponsesData {
                    interaction_id: cancel.interaction_id.to_string(),
                    utterance_ids: cancel
                        .utterance_ids
                        .iter()
                        .map(|id| id.to_string())
                        .collect(),
                }),
                regenerate_response: None,
            });
        }
        PacketPayload::Mutation(MutationEvent::RegenerateResponse { interaction_id }) => {
            data.mutation = Some(MutationData {
                cancel_responses: None,
                regenerate_response: Some(RegenerateResponseData {
                    interaction_id: interaction_id.to_string(),
                }),
            });
        }
        PacketPayload::ItemOperation(operation) => {
            data.entities_items_operation = Some(item_operation_to_wire(operation));
        }
        PacketPayload::Unknown { type_name } => {
            data.packet_type = Some(type_name.clone());
        }
    }
    data
}

fn packet_id_to_wire(id: &PacketId) -> PacketIdData {
    PacketIdData {
        packet_id: id.packet_id.to_string(),
        utterance_id: id.utterance_id.to_string(),
        interaction_id: id.interaction_id.to_string(),
        correlation_id: id.correlation_id.as_ref().map(|id| id.to_string()),
    }
}

fn routing_to_wire(routing: &Routing) -> RoutingData {
    RoutingData {
        source: actor_to_wire(&routing.source),
        target: routing.target.as_ref().map(actor_to_wire),
    }
}

fn actor_to_wire(actor: &Actor) -> ActorData {
    ActorData {
        actor_type: actor.actor_type.as_str().to_string(),
        name: actor.name.clone(),
        is_player: actor.is_player,
        is_character: actor.is_character,
    }
}

fn item_operation_to_wire(operation: &ItemOperation) -> ItemOperationData {
    match operation {
        ItemOperation::CreateOrUpdate {
            items,
            add_to_entities,
        } => ItemOperationData {
            create_or_update_items: Some(CreateOrUpdateItemsData {
                items: items
                    .iter()
                    .map(|item| EntityItemData {
                        id: item.id.clone(),
                        display_name: item.display_name.clone(),
                        description: item.description.clone(),
                        properties: item.properties.clone(),
                    })
                    .collect(),
                add_to_entities: add_to_entities.clone(),
            }),
            ..ItemOperationData::default()
        },
        ItemOperation::Remove { item_ids } => ItemOperationData {
            remove_items: Some(RemoveItemsData {
                item_ids: item_ids.clone(),
            }),
            ..ItemOperationData::default()
        },
        ItemOperation::ItemsInEntities {
            kind,
            item_ids,
            entity_names,
        } => ItemOperationData {
            items_in_entities: Some(ItemsInEntitiesData {
                operation: kind.as_str().to_string(),
                item_ids: item_ids.clone(),
                entity_names: entity_names.clone(),
            }),
            ..ItemOperationData::default()
        },
    }
}

// =============================================================================
// Wire -> domain
// =============================================================================

pub fn from_wire(data: PacketData) -> Packet {
    let header = PacketHeader {
        timestamp: data.timestamp.clone(),
        packet_id: packet_id_from_wire(&data.packet_id),
        routing: routing_from_wire(&data.routing),
    };
    let payload = payload_from_wire(data);
    if let PacketPayload::Unknown { type_name } = &payload {
        tracing::warn!(
            packet_type = %type_name,
            packet_id = %header.packet_id,
            "Received packet with unrecognised payload"
        );
    }
    Packet::from_envelope(header, payload)
}

/// Pick the sub-payload whose key is present. First match wins. Proto3 JSON
/// omits default values, so text and emotion bodies may arrive empty.
fn payload_from_wire(data: PacketData) -> PacketPayload {
    if let Some(chunk) = data
        .data_chunk
        .filter(|chunk| !chunk.chunk.is_empty() && chunk.chunk_type == DATA_CHUNK_AUDIO)
    {
        return PacketPayload::Audio(AudioChunk {
            chunk: chunk.chunk,
            phonemes: chunk
                .additional_phoneme_info
                .into_iter()
                .map(|info| PhonemeInfo {
                    phoneme: info.phoneme,
                    start_offset: info.start_offset,
                })
                .collect(),
        });
    }
    if let Some(text) = data.text {
        return PacketPayload::Text(TextEvent {
            text: text.text,
            is_final: text.is_final,
        });
    }
    if let Some(control) = data.control.filter(|control| !control.action.is_empty()) {
        return PacketPayload::Control(ControlEvent {
            action: ControlAction::parse(&control.action),
            description: control.description,
        });
    }
    if let Some(emotion) = data.emotion {
        return PacketPayload::Emotion(EmotionEvent {
            joy: emotion.joy,
            fear: emotion.fear,
            trust: emotion.trust,
            surprise: emotion.surprise,
            behavior: emotion.behavior,
            strength: emotion.strength,
        });
    }
    if let Some(action) = data.action {
        return PacketPayload::Action(ActionEvent {
            narrated_action: action
                .narrated_action
                .map(|narrated| narrated.content)
                .unwrap_or_default(),
            playback: action.playback,
        });
    }
    if let Some(custom) = data.custom.filter(|custom| !custom.name.is_empty()) {
        return PacketPayload::Custom(CustomEvent {
            name: custom.name,
            parameters: custom
                .parameters
                .into_iter()
                .map(|param| TriggerParameter::new(param.name, param.value))
                .collect(),
        });
    }
    if let Some(gesture) = data.gesture.filter(|gesture| !gesture.gesture_type.is_empty()) {
        return PacketPayload::Gesture(GestureEvent {
            gesture_type: gesture.gesture_type,
            playback: gesture.playback,
        });
    }
    if let Some(mutation) = data.mutation {
        if let Some(cancel) = mutation
            .cancel_responses
            .filter(|cancel| !cancel.interaction_id.is_empty())
        {
            return PacketPayload::Mutation(MutationEvent::CancelResponses(CancelResponses {
                interaction_id: cancel.interaction_id.into(),
                utterance_ids: cancel.utterance_ids.into_iter().map(Into::into).collect(),
            }));
        }
        if let Some(regenerate) = mutation
            .regenerate_response
            .filter(|regenerate| !regenerate.interaction_id.is_empty())
        {
            return PacketPayload::Mutation(MutationEvent::RegenerateResponse {
                interaction_id: regenerate.interaction_id.into(),
            });
        }
    }
    if let Some(operation) = data.entities_items_operation.and_then(item_operation_from_wire) {
        return PacketPayload::ItemOperation(operation);
    }

    PacketPayload::Unknown {
        type_name: data
            .packet_type
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "UNSPECIFIED".to_string()),
    }
}

fn item_operation_from_wire(data: ItemOperationData) -> Option<ItemOperation> {
    if let Some(create) = data.create_or_update_items {
        return Some(ItemOperation::CreateOrUpdate {
            items: create
                .items
                .into_iter()
                .map(|item| EntityItem {
                    id: item.id,
                    display_name: item.display_name,
                    description: item.description,
                    properties: item.properties,
                })
                .collect(),
            add_to_entities: create.add_to_entities,
        });
    }
    if let Some(remove) = data.remove_items {
        return Some(ItemOperation::Remove {
            item_ids: remove.item_ids,
        });
    }
    data.items_in_entities
        .map(|items| ItemOperation::ItemsInEntities {
            kind: ItemsInEntitiesKind::parse(&items.operation),
            item_ids: items.item_ids,
            entity_names: items.entity_names,
        })
}

fn packet_id_from_wire(data: &PacketIdData) -> PacketId {
    PacketId {
        packet_id: data.packet_id.as_str().into(),
        utterance_id: data.utterance_id.as_str().into(),
        interaction_id: data.interaction_id.as_str().into(),
        correlation_id: data
            .correlation_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(CorrelationId::from),
    }
}

fn routing_from_wire(data: &RoutingData) -> Routing {
    Routing {
        source: actor_from_wire(&data.source),
        target: data.target.as_ref().map(actor_from_wire),
    }
}

fn actor_from_wire(data: &ActorData) -> Actor {
    Actor {
        actor_type: data.actor_type.parse().unwrap_or(ActorType::Unknown),
        name: data.name.clone(),
        is_player: data.is_player,
        is_character: data.is_character,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inworld_domain::{Actor, PacketType, Routing};

    fn assert_round_trip(packet: Packet) {
        let encoded = encode(&packet).expect("encode");
        let decoded = decode(&encoded).expect("decode");
        assert_eq!(decoded.packet_id, packet.packet_id);
        assert_eq!(decoded.routing, packet.routing);
        assert_eq!(decoded.packet_type(), packet.packet_type());
        assert_eq!(decoded.payload, packet.payload);
        assert_eq!(decoded.timestamp, packet.timestamp);
    }

    #[test]
    fn outbound_packets_round_trip() {
        let routing = Routing::to_character("session-1");
        assert_round_trip(Packet::text(routing.clone(), "Hello there").expect("text"));
        assert_round_trip(
            Packet::trigger(
                routing.clone(),
                "greet",
                vec![TriggerParameter::new("mood", "happy")],
            )
            .expect("trigger"),
        );
        assert_round_trip(Packet::audio_session_start(routing.clone()));
        assert_round_trip(Packet::audio_chunk(routing.clone(), "UklGRg=="));
        assert_round_trip(Packet::cancel_responses(
            routing.clone(),
            CancelResponses {
                interaction_id: "i1".into(),
                utterance_ids: vec!["u1".into(), "u2".into()],
            },
        ));
        assert_round_trip(Packet::item_operation(
            Routing::to_world(),
            ItemOperation::ItemsInEntities {
                kind: ItemsInEntitiesKind::Replace,
                item_ids: vec!["sword".to_string()],
                entity_names: vec!["weapons".to_string()],
            },
        ));
    }

    #[test]
    fn character_output_round_trips() {
        let routing = Routing::new(Actor::agent("char-1"), Some(Actor::player()));
        let with = |payload| Packet::new(routing.clone(), payload);

        assert_round_trip(with(PacketPayload::Emotion(EmotionEvent::default())));
        assert_round_trip(with(PacketPayload::Emotion(EmotionEvent {
            joy: 0.5,
            behavior: "AFFECTION".to_string(),
            strength: "STRONG".to_string(),
            ..EmotionEvent::default()
        })));
        assert_round_trip(with(PacketPayload::Gesture(GestureEvent {
            gesture_type: "GREETING".to_string(),
            playback: Some("INTERACTION".to_string()),
        })));
        assert_round_trip(with(PacketPayload::Action(ActionEvent {
            narrated_action: "waves at you".to_string(),
            playback: None,
        })));
    }

    #[test]
    fn emotion_without_behavior_is_still_an_emotion() {
        let raw = r#"{"result":{
            "packetId":{"packetId":"p","utteranceId":"u","interactionId":"i"},
            "routing":{"source":{"type":"AGENT","name":"char-1"},"target":{"type":"PLAYER","name":"player"}},
            "emotion":{"joy":0.7,"strength":"NORMAL"}
        }}"#;
        let Frame::Packet(packet) = decode_frame(raw).expect("frame") else {
            panic!("expected a packet frame");
        };
        let PacketPayload::Emotion(emotion) = &packet.payload else {
            panic!("expected emotion, got {:?}", packet.payload);
        };
        assert!(emotion.behavior.is_empty());
        assert_eq!(emotion.strength, "NORMAL");
        assert!((emotion.joy - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn encodes_wire_field_names() {
        let packet = Packet::cancel_responses(
            Routing::to_character("session-1"),
            CancelResponses {
                interaction_id: "i1".into(),
                utterance_ids: vec!["u1".into()],
            },
        );
        let json: serde_json::Value =
            serde_json::from_str(&encode(&packet).expect("encode")).expect("json");
        assert_eq!(json["type"], "MUTATION");
        assert_eq!(json["mutation"]["cancelResponses"]["interactionId"], "i1");
        assert_eq!(json["mutation"]["cancelResponses"]["utteranceId"][0], "u1");
        assert_eq!(json["routing"]["source"]["type"], "PLAYER");
        assert_eq!(json["routing"]["target"]["name"], "session-1");
        assert!(json.get("text").is_none());
    }

    #[test]
    fn decodes_server_result_frame() {
        let raw = r#"{"result":{
            "timestamp":"2024-03-01T12:30:45.1234567Z",
            "packetId":{"packetId":"p","utteranceId":"u","interactionId":"i"},
            "routing":{"source":{"type":"agent","name":"char-1"},"target":{"type":"PLAYER","name":"player"}},
            "text":{"text":"Greetings, traveller.","final":true}
        }}"#;
        let Frame::Packet(packet) = decode_frame(raw).expect("frame") else {
            panic!("expected a packet frame");
        };
        assert_eq!(packet.packet_type(), PacketType::Text);
        assert!(packet.routing.is_from_agent());
        assert!(packet.routing.is_related("char-1"));
        assert_eq!(
            packet.as_text().map(|text| text.text.as_str()),
            Some("Greetings, traveller.")
        );
    }

    #[test]
    fn audio_wins_over_text_when_both_present() {
        let raw = r#"{"packetId":{"packetId":"p","utteranceId":"u","interactionId":"i"},
            "text":{"text":"hi"},
            "dataChunk":{"chunk":"AAAA","type":"AUDIO","additionalPhonemeInfo":[{"phoneme":"h","startOffset":0.1}]}}"#;
        let packet = decode(raw).expect("decode");
        assert_eq!(packet.packet_type(), PacketType::Audio);
        let PacketPayload::Audio(audio) = &packet.payload else {
            panic!("expected audio");
        };
        assert_eq!(audio.phonemes.len(), 1);
    }

    #[test]
    fn non_audio_data_chunk_falls_through() {
        let raw = r#"{"dataChunk":{"chunk":"AAAA","type":"ANIMATION"},"emotion":{"behavior":"JOY","strength":"STRONG"}}"#;
        assert_eq!(decode(raw).expect("decode").packet_type(), PacketType::Emotion);
    }

    #[test]
    fn unrecognised_payload_is_unknown_not_an_error() {
        let raw = r#"{"result":{"type":"HOLOGRAM","hologram":{"x":1}}}"#;
        let Frame::Packet(packet) = decode_frame(raw).expect("frame") else {
            panic!("expected a packet frame");
        };
        assert_eq!(
            packet.payload,
            PacketPayload::Unknown {
                type_name: "HOLOGRAM".to_string()
            }
        );
    }

    #[test]
    fn error_frames_flag_inactivity() {
        let raw = r#"{"error":{"code":10,"message":"Session closed due to inactivity"}}"#;
        assert_eq!(
            decode_frame(raw).expect("frame"),
            Frame::Error(ServerError {
                message: "Session closed due to inactivity".to_string(),
                inactivity: true,
            })
        );

        let raw = r#"{"error":{"message":"internal"}}"#;
        let Frame::Error(error) = decode_frame(raw).expect("frame") else {
            panic!("expected an error frame");
        };
        assert!(!error.inactivity);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(decode_frame("{not json"), Err(CodecError::Json(_))));
        assert!(matches!(decode_frame("{}"), Err(CodecError::EmptyFrame)));
    }
}
