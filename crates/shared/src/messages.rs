//! Wire-format packet DTOs exchanged over the session stream.
//!
//! Field names follow the service's JSON schema (camelCase). Every sub-payload
//! is optional on the envelope; exactly one is expected to be populated. The
//! codec decides which one wins.
//!
//! ## Compatibility
//!
//! - Unknown fields are ignored on decode
//! - Missing optional fields default instead of failing
//! - Outbound frames omit empty sub-payloads entirely

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Inbound frame: either a packet under `result` or a server error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PacketData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketData {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub packet_type: Option<String>,
    #[serde(default)]
    pub packet_id: PacketIdData,
    #[serde(default)]
    pub routing: RoutingData,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_chunk: Option<DataChunkData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<ControlData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<EmotionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gesture: Option<GestureData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation: Option<MutationData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities_items_operation: Option<ItemOperationData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketIdData {
    #[serde(default)]
    pub packet_id: String,
    #[serde(default)]
    pub utterance_id: String,
    #[serde(default)]
    pub interaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingData {
    #[serde(default)]
    pub source: ActorData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ActorData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorData {
    #[serde(default, rename = "type")]
    pub actor_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_player: bool,
    #[serde(default)]
    pub is_character: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextData {
    #[serde(default)]
    pub text: String,
    #[serde(default, rename = "final")]
    pub is_final: bool,
}

pub const DATA_CHUNK_AUDIO: &str = "AUDIO";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataChunkData {
    #[serde(default)]
    pub chunk: String,
    #[serde(default, rename = "type")]
    pub chunk_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_phoneme_info: Vec<PhonemeData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhonemeData {
    #[serde(default)]
    pub phoneme: String,
    #[serde(default)]
    pub start_offset: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlData {
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionData {
    #[serde(default)]
    pub joy: f32,
    #[serde(default)]
    pub fear: f32,
    #[serde(default)]
    pub trust: f32,
    #[serde(default)]
    pub surprise: f32,
    #[serde(default)]
    pub behavior: String,
    #[serde(default)]
    pub strength: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrated_action: Option<NarratedActionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarratedActionData {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomData {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GestureData {
    #[serde(default, rename = "type")]
    pub gesture_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_responses: Option<CancelResponsesData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regenerate_response: Option<RegenerateResponseData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponsesData {
    #[serde(default)]
    pub interaction_id: String,
    /// Singular on the wire even though it is a list
    #[serde(default, rename = "utteranceId", skip_serializing_if = "Vec::is_empty")]
    pub utterance_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateResponseData {
    #[serde(default)]
    pub interaction_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOperationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_or_update_items: Option<CreateOrUpdateItemsData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_items: Option<RemoveItemsData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_in_entities: Option<ItemsInEntitiesData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrUpdateItemsData {
    #[serde(default)]
    pub items: Vec<EntityItemData>,
    #[serde(default)]
    pub add_to_entities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityItemData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveItemsData {
    #[serde(default)]
    pub item_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsInEntitiesData {
    #[serde(default, rename = "type")]
    pub operation: String,
    #[serde(default)]
    pub item_ids: Vec<String>,
    #[serde(default)]
    pub entity_names: Vec<String>,
}
