//! Routing between actors: who sent a packet and who it is addressed to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Kind of actor on either end of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActorType {
    Player,
    Agent,
    World,
    /// Anything the server sends that we do not recognise yet
    #[default]
    Unknown,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Player => "PLAYER",
            ActorType::Agent => "AGENT",
            ActorType::World => "WORLD",
            ActorType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorType {
    type Err = DomainError;

    /// Case-insensitive: the server has been seen sending lower-case types.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAYER" => Ok(Self::Player),
            "AGENT" => Ok(Self::Agent),
            "WORLD" => Ok(Self::World),
            "UNKNOWN" | "" => Ok(Self::Unknown),
            other => Err(DomainError::parse(format!("Unknown actor type: {}", other))),
        }
    }
}

impl Serialize for ActorType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActorType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or(ActorType::Unknown))
    }
}

/// One end of a routed packet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Actor {
    pub actor_type: ActorType,
    pub name: String,
    pub is_player: bool,
    pub is_character: bool,
}

impl Actor {
    /// The local player. The server addresses the player as "player".
    pub fn player() -> Self {
        Self::player_named("player")
    }

    pub fn player_named(name: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Player,
            name: name.into(),
            is_player: true,
            is_character: false,
        }
    }

    pub fn agent(name: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Agent,
            name: name.into(),
            is_player: false,
            is_character: true,
        }
    }

    pub fn world() -> Self {
        Self {
            actor_type: ActorType::World,
            name: "WORLD".to_string(),
            is_player: false,
            is_character: false,
        }
    }

    pub fn is_player(&self) -> bool {
        self.actor_type == ActorType::Player || self.is_player
    }

    pub fn is_agent(&self) -> bool {
        self.actor_type == ActorType::Agent
    }
}

/// Source/target pair used to decide which live session a packet belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Routing {
    pub source: Actor,
    pub target: Option<Actor>,
}

impl Routing {
    pub fn new(source: Actor, target: Option<Actor>) -> Self {
        Self { source, target }
    }

    /// Player speaking to the character bound to `session_id`.
    pub fn to_character(session_id: impl Into<String>) -> Self {
        Self {
            source: Actor::player(),
            target: Some(Actor::agent(session_id)),
        }
    }

    /// Player addressing the world (e.g. world-level triggers).
    pub fn to_world() -> Self {
        Self {
            source: Actor::player(),
            target: Some(Actor::world()),
        }
    }

    /// True iff the source or target name matches the live session id.
    pub fn is_related(&self, session_id: &str) -> bool {
        if session_id.is_empty() {
            return false;
        }
        self.source.name == session_id
            || self
                .target
                .as_ref()
                .is_some_and(|target| target.name == session_id)
    }

    pub fn is_from_player(&self) -> bool {
        self.source.is_player()
    }

    pub fn is_from_agent(&self) -> bool {
        self.source.is_agent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_type_parses_case_insensitively() {
        assert_eq!("player".parse::<ActorType>(), Ok(ActorType::Player));
        assert_eq!("Agent".parse::<ActorType>(), Ok(ActorType::Agent));
        assert_eq!("WORLD".parse::<ActorType>(), Ok(ActorType::World));
        assert!("narrator".parse::<ActorType>().is_err());
    }

    #[test]
    fn actor_type_deserializes_unknown_to_fallback() {
        let parsed: ActorType = serde_json::from_str("\"narrator\"").expect("deserialize");
        assert_eq!(parsed, ActorType::Unknown);
        let encoded = serde_json::to_string(&ActorType::Agent).expect("serialize");
        assert_eq!(encoded, "\"AGENT\"");
    }

    #[test]
    fn routing_relevance_matches_source_or_target() {
        let routing = Routing::to_character("session-a");
        assert!(routing.is_related("session-a"));
        assert!(!routing.is_related("session-b"));
        assert!(!routing.is_related(""));

        let reply = Routing::new(Actor::agent("session-a"), Some(Actor::player()));
        assert!(reply.is_related("session-a"));
        assert!(reply.is_from_agent());
        assert!(!reply.is_from_player());
    }

    #[test]
    fn routing_without_target_only_checks_source() {
        let routing = Routing::new(Actor::agent("session-a"), None);
        assert!(routing.is_related("session-a"));
        assert!(!routing.is_related("player"));
    }
}
