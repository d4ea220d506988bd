//! Token and scene-load contracts for the HTTP side of a session.

use chrono::{DateTime, Utc};
use inworld_domain::timestamp::parse_timestamp;
use serde::{Deserialize, Serialize};

/// Access token returned by the token endpoint, or supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(default)]
    pub token: String,
    #[serde(default, rename = "type")]
    pub token_type: String,
    #[serde(default)]
    pub expiration_time: String,
    #[serde(default)]
    pub session_id: String,
}

impl Token {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.expiration_time)
    }

    /// Usable iff token and type are present and `now` is before expiry.
    /// An unparseable expiry counts as expired.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if self.token.is_empty() || self.token_type.is_empty() {
            return false;
        }
        self.expires_at().is_some_and(|expiry| now < expiry)
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRequest {
    pub api_key: String,
    /// Workspace the token is scoped to, e.g. `workspaces/demo`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
}

/// Features negotiated with the server at scene load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub audio: bool,
    pub emotions: bool,
    pub interruptions: bool,
    pub narrated_actions: bool,
    pub text: bool,
    pub triggers: bool,
    pub phoneme_info: bool,
    pub relations: bool,
    pub debug_info: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            audio: true,
            emotions: true,
            interruptions: true,
            narrated_actions: true,
            text: true,
            triggers: true,
            phoneme_info: true,
            relations: false,
            debug_info: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PreviousTalker {
    Unknown,
    Player,
    Character,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousDialogPhrase {
    pub talker: PreviousTalker,
    pub phrase: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousDialog {
    pub phrases: Vec<PreviousDialogPhrase>,
}

/// Resume a previous conversation, either from a dialog transcript or an
/// opaque state blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContinuation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_dialog: Option<PreviousDialog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSceneRequest {
    pub client: ClientInfo,
    pub user: UserRequest,
    pub capabilities: Capabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_continuation: Option<SessionContinuation>,
}

/// Character made available by a loaded scene.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterData {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub brain_name: String,
    #[serde(default)]
    pub given_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSceneResponse {
    #[serde(default)]
    pub agents: Vec<CharacterData>,
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<serde_json::Value>,
}

impl LoadSceneResponse {
    /// The streaming credential: the part of `key` after `workspace:`.
    pub fn session_key(&self) -> Option<&str> {
        let (_, session_key) = self.key.split_once(':')?;
        (!session_key.is_empty()).then_some(session_key)
    }
}
