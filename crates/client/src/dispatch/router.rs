//! Single consumer of the inbound queue, fanning packets out to characters.

use std::sync::Arc;
use std::time::Duration;

use crate::session::{SessionChannel, SessionLifecycle};

use super::character::CharacterSession;

pub struct SessionRouter {
    channel: Arc<SessionChannel>,
    characters: Vec<CharacterSession>,
}

impl SessionRouter {
    pub fn new(channel: Arc<SessionChannel>) -> Self {
        Self {
            channel,
            characters: Vec::new(),
        }
    }

    /// One [`CharacterSession`] per character of the loaded scene.
    pub fn from_lifecycle(lifecycle: &SessionLifecycle) -> Self {
        let mut router = Self::new(lifecycle.channel());
        let history = lifecycle.config().history_config();
        for character in lifecycle.characters() {
            router.register(CharacterSession::new(
                character.clone(),
                history,
                lifecycle.channel(),
                lifecycle.bus().clone(),
            ));
        }
        router
    }

    /// Replaces any session already registered for the same character.
    pub fn register(&mut self, session: CharacterSession) {
        self.characters
            .retain(|existing| existing.live_session_id() != session.live_session_id());
        self.characters.push(session);
    }

    pub fn characters(&self) -> &[CharacterSession] {
        &self.characters
    }

    pub fn character_mut(&mut self, live_session_id: &str) -> Option<&mut CharacterSession> {
        self.characters
            .iter_mut()
            .find(|session| session.live_session_id() == live_session_id)
    }

    /// Look a character up by its display name, ignoring case.
    pub fn character_named(&mut self, given_name: &str) -> Option<&mut CharacterSession> {
        self.characters
            .iter_mut()
            .find(|session| session.character().given_name.eq_ignore_ascii_case(given_name))
    }

    /// Drain the inbound queue once, handing every packet to every character.
    /// Returns the number of packets drained.
    pub async fn tick(&mut self) -> usize {
        let mut drained = 0;
        while let Some(packet) = self.channel.try_dequeue_inbound() {
            drained += 1;
            let mut handled = false;
            for character in &mut self.characters {
                handled |= character.handle_packet(packet.clone()).await;
            }
            if !handled {
                tracing::trace!(packet_id = %packet.packet_id, "No character for packet");
            }
        }
        drained
    }

    /// Tick every `interval` until the channel disconnects.
    pub async fn run(&mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
            if !self.channel.is_connected() {
                tracing::debug!("Channel idle; router stopped");
                return;
            }
        }
    }
}

impl std::fmt::Debug for SessionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRouter")
            .field("characters", &self.characters)
            .finish_non_exhaustive()
    }
}
