//! Session lifecycle: token, scene load, stream start and caller-driven
//! reconnect.
//!
//! ```text
//! Idle -> Initializing -> Initialized -> LoadingScene -> LoadingSceneCompleted
//!      -> Connecting -> Connected -> { LostConnect | Error } -> Idle
//! ```

use std::sync::atomic::AtomicU8;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use inworld_shared::{CharacterData, LoadSceneRequest, SessionContinuation, Token};
use tokio::task::JoinHandle;

use super::backoff::BackoffState;
use super::channel::{ChannelConfig, ChannelError, SessionChannel};
use crate::config::ClientConfig;
use crate::infrastructure::messaging::{
    set_status, ClientEvent, EventBus, SessionStatus, SessionStatusObserver,
};
use crate::infrastructure::ports::{
    AuthError, AuthPort, ClockPort, StreamTarget, TransportError, TransportPort,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("API key and secret are required when no custom token is configured")]
    MissingCredentials,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Authentication failed: {0}")]
    Auth(#[source] AuthError),
    #[error("Malformed session key: {0:?}")]
    MalformedSessionKey(String),
    #[error("No valid token and session key; load a scene first")]
    MissingSessionKey,
    #[error("Invalid session URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Could not open session stream: {0}")]
    Transport(#[from] TransportError),
    #[error("Reconnect gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl From<AuthError> for SessionError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::MissingCredentials => SessionError::MissingCredentials,
            other => SessionError::Auth(other),
        }
    }
}

/// Status cell shared with the supervisor task. Every change is published
/// on the event bus.
#[derive(Debug, Clone)]
struct StatusCell {
    state: Arc<AtomicU8>,
    last_error: Arc<Mutex<Option<String>>>,
    bus: EventBus,
}

impl StatusCell {
    fn new(bus: EventBus) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(SessionStatus::Idle.to_u8())),
            last_error: Arc::new(Mutex::new(None)),
            bus,
        }
    }

    async fn set(&self, status: SessionStatus) {
        let previous = set_status(&self.state, status);
        if previous != status {
            tracing::info!(from = %previous, to = %status, "Session status changed");
            self.bus.dispatch(ClientEvent::StatusChanged(status)).await;
        }
    }

    async fn fail(&self, message: String) {
        tracing::error!(error = %message, "Session failed");
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(message);
        self.set(SessionStatus::Error).await;
    }

    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub struct SessionLifecycle {
    config: ClientConfig,
    auth: Arc<dyn AuthPort>,
    transport: Arc<dyn TransportPort>,
    clock: Arc<dyn ClockPort>,
    channel: Arc<SessionChannel>,
    status: StatusCell,
    token: Option<Token>,
    session_key: Option<String>,
    characters: Vec<CharacterData>,
    continuation: Option<SessionContinuation>,
    supervisor: Option<JoinHandle<()>>,
}

impl SessionLifecycle {
    pub fn new(
        config: ClientConfig,
        auth: Arc<dyn AuthPort>,
        transport: Arc<dyn TransportPort>,
        clock: Arc<dyn ClockPort>,
        bus: EventBus,
    ) -> Self {
        let channel = Arc::new(SessionChannel::new(ChannelConfig::from(&config)));
        Self {
            config,
            auth,
            transport,
            clock,
            channel,
            status: StatusCell::new(bus),
            token: None,
            session_key: None,
            characters: Vec::new(),
            continuation: None,
            supervisor: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.observer().status()
    }

    pub fn observer(&self) -> SessionStatusObserver {
        SessionStatusObserver::new(Arc::clone(&self.status.state))
    }

    /// Message of the failure that last moved the session to `Error`.
    pub fn last_error(&self) -> Option<String> {
        self.status.last_error()
    }

    pub fn channel(&self) -> Arc<SessionChannel> {
        Arc::clone(&self.channel)
    }

    pub fn bus(&self) -> &EventBus {
        &self.status.bus
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Characters of the last loaded scene.
    pub fn characters(&self) -> &[CharacterData] {
        &self.characters
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref()
    }

    /// Carried into the next scene load, then forgotten.
    pub fn set_continuation(&mut self, continuation: SessionContinuation) {
        self.continuation = Some(continuation);
    }

    fn has_valid_token(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(|token| token.is_valid(self.clock.now()))
    }

    /// Obtain a session token, from configuration or the token endpoint.
    pub async fn initialize(&mut self) -> Result<(), SessionError> {
        self.status.set(SessionStatus::Initializing).await;

        let token = match self.acquire_token().await {
            Ok(token) => token,
            Err(e) => {
                self.token = None;
                self.status.fail(e.to_string()).await;
                return Err(e);
            }
        };

        tracing::info!(session_id = %token.session_id, "Session token acquired");
        self.token = Some(token);
        self.status.set(SessionStatus::Initialized).await;
        Ok(())
    }

    async fn acquire_token(&self) -> Result<Token, SessionError> {
        let token = match &self.config.custom_token {
            Some(raw) => serde_json::from_str::<Token>(raw)
                .map_err(|e| SessionError::InvalidToken(e.to_string()))?,
            None => {
                if self.config.api_key.is_none() || self.config.api_secret.is_none() {
                    return Err(SessionError::MissingCredentials);
                }
                self.auth.generate_token(&self.config.workspace).await?
            }
        };

        if !token.is_valid(self.clock.now()) {
            return Err(SessionError::InvalidToken(
                "token is empty or expired".to_string(),
            ));
        }
        Ok(token)
    }

    /// Load a scene and keep its session key. Re-authenticates first when the
    /// token is missing or expired.
    pub async fn load_scene(&mut self, scene: &str) -> Result<(), SessionError> {
        if !self.has_valid_token() {
            tracing::debug!("Token missing or expired; re-authenticating");
            self.initialize().await?;
        }
        let Some(token) = self.token.clone() else {
            return Err(SessionError::MissingSessionKey);
        };

        self.status.set(SessionStatus::LoadingScene).await;
        let request = LoadSceneRequest {
            client: self.config.client_info(),
            user: self.config.user(),
            capabilities: self.config.capabilities,
            session_continuation: self.continuation.take(),
        };

        let response = match self.auth.load_scene(&token, scene, &request).await {
            Ok(response) => response,
            Err(e) => {
                let error = SessionError::from(e);
                self.status.fail(error.to_string()).await;
                return Err(error);
            }
        };

        let Some(session_key) = response.session_key() else {
            let error = SessionError::MalformedSessionKey(response.key.clone());
            self.session_key = None;
            self.status.fail(error.to_string()).await;
            return Err(error);
        };

        tracing::info!(scene, characters = response.agents.len(), "Scene loaded");
        self.session_key = Some(session_key.to_string());
        self.characters = response.agents;
        self.status.set(SessionStatus::LoadingSceneCompleted).await;
        Ok(())
    }

    /// Open the stream and start both pumps. A supervisor task maps the way
    /// the pumps end onto the session status.
    pub async fn start_session(&mut self) -> Result<(), SessionError> {
        let (Some(token), Some(session_key)) = (self.token.clone(), self.session_key.clone())
        else {
            self.status.fail(SessionError::MissingSessionKey.to_string()).await;
            return Err(SessionError::MissingSessionKey);
        };
        if !token.is_valid(self.clock.now()) {
            self.status.fail(SessionError::MissingSessionKey.to_string()).await;
            return Err(SessionError::MissingSessionKey);
        }

        self.stop_supervisor();
        self.status.set(SessionStatus::Connecting).await;

        let target = StreamTarget {
            url: self.config.session_url(&token.session_id)?.to_string(),
            session_id: token.session_id.clone(),
            session_key,
            token_type: token.token_type.clone(),
            token: token.token.clone(),
        };
        let stream = match self.transport.open(&target).await {
            Ok(stream) => stream,
            Err(e) => {
                let error = SessionError::from(e);
                self.status.fail(error.to_string()).await;
                return Err(error);
            }
        };

        self.channel.start(stream).await;
        self.status.set(SessionStatus::Connected).await;

        let channel = Arc::clone(&self.channel);
        let status = self.status.clone();
        self.supervisor = Some(tokio::spawn(async move {
            match channel.wait().await {
                Ok(()) => status.set(SessionStatus::Idle).await,
                Err(ChannelError::Inactivity(message)) => {
                    tracing::warn!(reason = %message, "Session lost");
                    status.set(SessionStatus::LostConnect).await;
                }
                Err(e) => status.fail(e.to_string()).await,
            }
        }));
        Ok(())
    }

    fn stop_supervisor(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.abort();
        }
    }

    /// Close the stream. Safe to call in any state.
    pub async fn end_session(&mut self) {
        self.stop_supervisor();
        self.channel.end_session().await;
        self.status.set(SessionStatus::Idle).await;
    }

    /// Bring the session back up, waiting between failed attempts with
    /// exponential backoff. Resumes from `Initialized` while the token is
    /// still valid, otherwise from `Idle`.
    pub async fn reconnect(&mut self, scene: &str) -> Result<(), SessionError> {
        self.reconnect_with(scene, BackoffState::default()).await
    }

    pub async fn reconnect_with(
        &mut self,
        scene: &str,
        mut backoff: BackoffState,
    ) -> Result<(), SessionError> {
        self.end_session().await;

        loop {
            let Some(delay) = backoff.next_delay_and_advance() else {
                let error = SessionError::ReconnectExhausted {
                    attempts: backoff.attempts(),
                };
                self.status.fail(error.to_string()).await;
                return Err(error);
            };
            tracing::info!(
                attempt = backoff.attempts(),
                max_attempts = backoff.max_attempts(),
                delay_ms = delay,
                "Reconnecting"
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;

            match self.try_connect(scene).await {
                Ok(()) => return Ok(()),
                Err(e) => tracing::warn!(error = %e, "Reconnect attempt failed"),
            }
        }
    }

    async fn try_connect(&mut self, scene: &str) -> Result<(), SessionError> {
        if !self.has_valid_token() {
            self.initialize().await?;
        }
        self.load_scene(scene).await?;
        self.start_session().await
    }
}

impl std::fmt::Debug for SessionLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLifecycle")
            .field("status", &self.status())
            .field("characters", &self.characters.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{MockAuthPort, MockClockPort};
    use crate::infrastructure::transport::memory::{MemoryPeer, MemoryTransport};
    use chrono::{DateTime, TimeZone, Utc};
    use inworld_shared::LoadSceneResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn token() -> Token {
        Token {
            token: "secret-token".to_string(),
            token_type: "Bearer".to_string(),
            expiration_time: "2024-06-01T13:00:00.000Z".to_string(),
            session_id: "session-1".to_string(),
        }
    }

    fn scene_response(key: &str) -> LoadSceneResponse {
        LoadSceneResponse {
            agents: vec![CharacterData {
                agent_id: "agent-1".to_string(),
                brain_name: "workspaces/w/characters/ada".to_string(),
                given_name: "Ada".to_string(),
            }],
            key: key.to_string(),
            previous_state: None,
        }
    }

    fn credentials() -> ClientConfig {
        ClientConfig {
            api_key: Some("key".to_string()),
            api_secret: Some("secret".to_string()),
            workspace: "workspaces/w".to_string(),
            flush_interval: Duration::from_millis(5),
            shutdown_grace: Duration::from_millis(200),
            ..ClientConfig::default()
        }
    }

    fn clock() -> Arc<MockClockPort> {
        let mut clock = MockClockPort::new();
        clock.expect_now().return_const(now());
        Arc::new(clock)
    }

    fn working_auth() -> MockAuthPort {
        let mut auth = MockAuthPort::new();
        auth.expect_generate_token().returning(|_| Ok(token()));
        auth.expect_load_scene()
            .returning(|_, _, _| Ok(scene_response("workspaces/w:SESSION")));
        auth
    }

    /// Clock whose reading the test can move forward.
    fn adjustable_clock() -> (Arc<MockClockPort>, Arc<Mutex<DateTime<Utc>>>) {
        let current = Arc::new(Mutex::new(now()));
        let reading = Arc::clone(&current);
        let mut clock = MockClockPort::new();
        clock
            .expect_now()
            .returning(move || *reading.lock().unwrap());
        (Arc::new(clock), current)
    }

    fn lifecycle(
        config: ClientConfig,
        auth: MockAuthPort,
    ) -> (SessionLifecycle, Arc<MemoryTransport>, mpsc::UnboundedReceiver<MemoryPeer>) {
        lifecycle_with_clock(config, auth, clock())
    }

    fn lifecycle_with_clock(
        config: ClientConfig,
        auth: MockAuthPort,
        clock: Arc<MockClockPort>,
    ) -> (SessionLifecycle, Arc<MemoryTransport>, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (transport, peers) = MemoryTransport::pair();
        let transport = Arc::new(transport);
        let lifecycle = SessionLifecycle::new(
            config,
            Arc::new(auth),
            transport.clone(),
            clock,
            EventBus::new(),
        );
        (lifecycle, transport, peers)
    }

    async fn recorded_statuses(bus: &EventBus) -> Arc<Mutex<Vec<SessionStatus>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(move |event| {
            if let ClientEvent::StatusChanged(status) = event {
                sink.lock().unwrap().push(status);
            }
        })
        .await;
        seen
    }

    async fn wait_for_status(lifecycle: &SessionLifecycle, expected: SessionStatus) {
        let observer = lifecycle.observer();
        tokio::time::timeout(Duration::from_secs(2), async {
            while observer.status() != expected {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("status reached");
    }

    #[tokio::test]
    async fn full_start_walks_the_status_machine() {
        let (mut lifecycle, _transport, mut peers) = lifecycle(credentials(), working_auth());
        let seen = recorded_statuses(lifecycle.bus()).await;

        lifecycle.initialize().await.expect("initialize");
        lifecycle.load_scene("workspaces/w/scenes/s").await.expect("load");
        lifecycle.start_session().await.expect("start");

        let peer = peers.recv().await.expect("stream opened");
        assert_eq!(peer.target.session_key, "SESSION");
        assert_eq!(
            peer.target.url,
            "wss://api-engine.inworld.ai/v1/session/default?session_id=session-1"
        );
        assert_eq!(lifecycle.characters()[0].given_name, "Ada");
        assert!(lifecycle.channel().is_connected());

        lifecycle.end_session().await;
        lifecycle.end_session().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                SessionStatus::Initializing,
                SessionStatus::Initialized,
                SessionStatus::LoadingScene,
                SessionStatus::LoadingSceneCompleted,
                SessionStatus::Connecting,
                SessionStatus::Connected,
                SessionStatus::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn missing_credentials_fail_initialize() {
        let mut auth = MockAuthPort::new();
        auth.expect_generate_token().never();
        let (mut lifecycle, _, _) = lifecycle(ClientConfig::default(), auth);

        let result = lifecycle.initialize().await;

        assert!(matches!(result, Err(SessionError::MissingCredentials)));
        assert_eq!(lifecycle.status(), SessionStatus::Error);
        assert!(lifecycle.last_error().is_some());
    }

    #[tokio::test]
    async fn custom_token_skips_the_token_endpoint() {
        let mut auth = MockAuthPort::new();
        auth.expect_generate_token().never();
        let config = ClientConfig {
            custom_token: Some(serde_json::to_string(&token()).unwrap()),
            ..ClientConfig::default()
        };
        let (mut lifecycle, _, _) = lifecycle(config, auth);

        lifecycle.initialize().await.expect("custom token");

        assert_eq!(lifecycle.status(), SessionStatus::Initialized);
        assert_eq!(lifecycle.token().map(|t| t.session_id.as_str()), Some("session-1"));
    }

    #[tokio::test]
    async fn expired_or_garbled_custom_token_is_an_error() {
        let mut expired = token();
        expired.expiration_time = "2024-06-01T11:00:00.000Z".to_string();
        for raw in [serde_json::to_string(&expired).unwrap(), "{not json".to_string()] {
            let config = ClientConfig {
                custom_token: Some(raw),
                ..ClientConfig::default()
            };
            let (mut lifecycle, _, _) = lifecycle(config, MockAuthPort::new());

            let result = lifecycle.initialize().await;

            assert!(matches!(result, Err(SessionError::InvalidToken(_))));
            assert_eq!(lifecycle.status(), SessionStatus::Error);
        }
    }

    #[tokio::test]
    async fn start_without_session_key_is_a_hard_error() {
        let (mut lifecycle, transport, _) = lifecycle(credentials(), working_auth());
        lifecycle.initialize().await.expect("initialize");

        let result = lifecycle.start_session().await;

        assert!(matches!(result, Err(SessionError::MissingSessionKey)));
        assert_eq!(lifecycle.status(), SessionStatus::Error);
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test]
    async fn session_key_without_colon_is_rejected() {
        let mut auth = MockAuthPort::new();
        auth.expect_generate_token().returning(|_| Ok(token()));
        auth.expect_load_scene()
            .returning(|_, _, _| Ok(scene_response("no-separator")));
        let (mut lifecycle, _, _) = lifecycle(credentials(), auth);

        let result = lifecycle.load_scene("workspaces/w/scenes/s").await;

        assert!(matches!(result, Err(SessionError::MalformedSessionKey(_))));
        assert!(lifecycle.session_key().is_none());
        assert_eq!(lifecycle.status(), SessionStatus::Error);
    }

    #[tokio::test]
    async fn inactivity_moves_to_lost_connect() {
        let (mut lifecycle, _transport, mut peers) = lifecycle(credentials(), working_auth());
        lifecycle.load_scene("workspaces/w/scenes/s").await.expect("load");
        lifecycle.start_session().await.expect("start");
        let peer = peers.recv().await.expect("peer");

        peer.send(r#"{"error":{"message":"Session closed due to inactivity"}}"#);

        wait_for_status(&lifecycle, SessionStatus::LostConnect).await;
    }

    #[tokio::test]
    async fn transport_failure_moves_to_error() {
        let (mut lifecycle, _transport, mut peers) = lifecycle(credentials(), working_auth());
        lifecycle.load_scene("workspaces/w/scenes/s").await.expect("load");
        lifecycle.start_session().await.expect("start");
        let peer = peers.recv().await.expect("peer");

        peer.fail(TransportError::Io("reset".to_string()));

        wait_for_status(&lifecycle, SessionStatus::Error).await;
        assert!(lifecycle.last_error().is_some_and(|e| e.contains("reset")));
    }

    #[tokio::test]
    async fn server_close_returns_to_idle() {
        let (mut lifecycle, _transport, mut peers) = lifecycle(credentials(), working_auth());
        lifecycle.load_scene("workspaces/w/scenes/s").await.expect("load");
        lifecycle.start_session().await.expect("start");
        drop(peers.recv().await.expect("peer"));

        wait_for_status(&lifecycle, SessionStatus::Idle).await;
    }

    #[tokio::test]
    async fn expired_token_is_renewed_before_loading_a_scene() {
        let issued = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&issued);
        let mut auth = MockAuthPort::new();
        auth.expect_generate_token().times(2).returning(move |_| {
            let mut fresh = token();
            if counter.fetch_add(1, Ordering::SeqCst) > 0 {
                fresh.token = "renewed-token".to_string();
                fresh.expiration_time = "2024-06-01T16:00:00.000Z".to_string();
            }
            Ok(fresh)
        });
        auth.expect_load_scene()
            .times(1)
            .returning(|_, _, _| Ok(scene_response("workspaces/w:SESSION")));
        let (clock, current) = adjustable_clock();
        let (mut lifecycle, _, _) = lifecycle_with_clock(credentials(), auth, clock);

        lifecycle.initialize().await.expect("initialize");
        *current.lock().unwrap() = Utc.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap();
        lifecycle.load_scene("workspaces/w/scenes/s").await.expect("load");

        assert_eq!(issued.load(Ordering::SeqCst), 2);
        assert_eq!(lifecycle.token().map(|t| t.token.as_str()), Some("renewed-token"));
        assert_eq!(lifecycle.status(), SessionStatus::LoadingSceneCompleted);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_reuses_a_valid_token() {
        let mut auth = MockAuthPort::new();
        auth.expect_generate_token().times(1).returning(|_| Ok(token()));
        auth.expect_load_scene()
            .times(2)
            .returning(|_, _, _| Ok(scene_response("workspaces/w:SESSION")));
        let (mut lifecycle, transport, mut peers) = lifecycle(credentials(), auth);

        lifecycle.initialize().await.expect("initialize");
        lifecycle.load_scene("workspaces/w/scenes/s").await.expect("load");
        lifecycle.start_session().await.expect("start");
        drop(peers.recv().await.expect("first stream"));

        lifecycle
            .reconnect("workspaces/w/scenes/s")
            .await
            .expect("reconnected");

        assert_eq!(lifecycle.status(), SessionStatus::Connected);
        assert_eq!(transport.open_count(), 2);
        lifecycle.end_session().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_retries_until_the_stream_opens() {
        let (mut lifecycle, transport, mut peers) = lifecycle(credentials(), working_auth());
        transport.fail_next(2);

        lifecycle
            .reconnect("workspaces/w/scenes/s")
            .await
            .expect("reconnected");

        assert_eq!(lifecycle.status(), SessionStatus::Connected);
        assert_eq!(transport.open_count(), 1);
        assert!(peers.recv().await.is_some());
        lifecycle.end_session().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_gives_up_after_the_attempt_budget() {
        let (mut lifecycle, transport, _peers) = lifecycle(credentials(), working_auth());
        transport.fail_next(usize::MAX);

        let result = lifecycle
            .reconnect_with("workspaces/w/scenes/s", BackoffState::with_max_attempts(3))
            .await;

        assert!(matches!(
            result,
            Err(SessionError::ReconnectExhausted { attempts: 3 })
        ));
        assert_eq!(lifecycle.status(), SessionStatus::Error);
    }
}
