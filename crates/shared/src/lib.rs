//! Inworld Shared - wire contracts between the client and the Inworld service
//!
//! This crate contains the types that cross the network boundary:
//! - Packet DTOs for the session stream (JSON, camelCase)
//! - The codec mapping those DTOs onto domain packets
//! - Token and scene-load request/response types
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - serde, serde_json, chrono and thiserror
//! 2. **No I/O** - pure data types and conversions
//! 3. **Tolerant decoding** - unknown payloads decode to `Unknown`, never an error

pub mod auth;
pub mod codec;
pub mod messages;

pub use inworld_domain::timestamp;

pub use auth::{
    AccessTokenRequest, Capabilities, CharacterData, ClientInfo, LoadSceneRequest, LoadSceneResponse,
    PreviousDialog, PreviousDialogPhrase, PreviousTalker, SessionContinuation, Token,
    UserRequest,
};
pub use codec::{decode, decode_frame, encode, CodecError, Frame, ServerError};
pub use messages::{PacketData, ResponseFrame};
