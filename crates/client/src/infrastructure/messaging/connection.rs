//! Session status and lock-free status observation.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle status of a client session.
///
/// `LoadingScene` and `LoadingSceneCompleted` are sub-states of `Initialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No token, no stream
    Idle,
    /// Acquiring a token
    Initializing,
    /// Token held
    Initialized,
    LoadingScene,
    LoadingSceneCompleted,
    /// Opening the stream
    Connecting,
    /// Reader and writer pumps are live
    Connected,
    /// Server dropped the session for inactivity
    LostConnect,
    /// Unrecoverable failure; see the last error
    Error,
}

impl SessionStatus {
    /// Convert to u8 for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            SessionStatus::Idle => 0,
            SessionStatus::Initializing => 1,
            SessionStatus::Initialized => 2,
            SessionStatus::LoadingScene => 3,
            SessionStatus::LoadingSceneCompleted => 4,
            SessionStatus::Connecting => 5,
            SessionStatus::Connected => 6,
            SessionStatus::LostConnect => 7,
            SessionStatus::Error => 8,
        }
    }

    /// Convert from u8 (atomic storage).
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionStatus::Initializing,
            2 => SessionStatus::Initialized,
            3 => SessionStatus::LoadingScene,
            4 => SessionStatus::LoadingSceneCompleted,
            5 => SessionStatus::Connecting,
            6 => SessionStatus::Connected,
            7 => SessionStatus::LostConnect,
            8 => SessionStatus::Error,
            _ => SessionStatus::Idle,
        }
    }

    /// Holds a token, whether or not a scene has been loaded.
    pub fn is_initialized(self) -> bool {
        matches!(
            self,
            SessionStatus::Initialized
                | SessionStatus::LoadingScene
                | SessionStatus::LoadingSceneCompleted
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Observable session status. Cheap to clone; all clones share one cell.
#[derive(Debug, Clone)]
pub struct SessionStatusObserver {
    state: Arc<AtomicU8>,
}

impl SessionStatusObserver {
    pub fn new(state: Arc<AtomicU8>) -> Self {
        Self { state }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.status() == SessionStatus::Connected
    }
}

/// Store a new status, returning the previous one.
pub fn set_status(state_ref: &AtomicU8, new_status: SessionStatus) -> SessionStatus {
    SessionStatus::from_u8(state_ref.swap(new_status.to_u8(), Ordering::SeqCst))
}
