//! Port traits for infrastructure boundaries.
//!
//! Ports exist for:
//! - Token generation and scene loading (HTTP today)
//! - The duplex session stream (WebSocket today)
//! - Clock (for testing token expiry)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inworld_shared::{LoadSceneRequest, LoadSceneResponse, Token};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("API key and secret are required when no custom token is configured")]
    MissingCredentials,
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Server returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Stream closed")]
    Closed,
    #[error("Stream cancelled")]
    Cancelled,
    #[error("Transport error: {0}")]
    Io(String),
}

impl TransportError {
    /// Closed or cancelled streams end a session quietly.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransportError::Closed | TransportError::Cancelled)
    }
}

// =============================================================================
// Auth
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthPort: Send + Sync {
    /// Exchange API credentials for a session token.
    async fn generate_token(&self, workspace: &str) -> Result<Token, AuthError>;

    /// Load a scene and obtain the streaming session key.
    async fn load_scene(
        &self,
        token: &Token,
        scene: &str,
        request: &LoadSceneRequest,
    ) -> Result<LoadSceneResponse, AuthError>;
}

// =============================================================================
// Transport
// =============================================================================

/// Where and how to open the session stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub url: String,
    pub session_id: String,
    pub session_key: String,
    pub token_type: String,
    pub token: String,
}

/// Receiving half of an open stream.
#[async_trait]
pub trait FrameReader: Send {
    /// Next text frame, or `None` once the peer closed gracefully.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;
}

/// Sending half of an open stream.
#[async_trait]
pub trait FrameWriter: Send {
    async fn write_frame(&mut self, frame: String) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

pub struct SessionStream {
    pub reader: Box<dyn FrameReader>,
    pub writer: Box<dyn FrameWriter>,
}

impl std::fmt::Debug for SessionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStream").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait TransportPort: Send + Sync {
    async fn open(&self, target: &StreamTarget) -> Result<SessionStream, TransportError>;
}

// =============================================================================
// Clock
// =============================================================================

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
