//! Duplex session channel: one live stream, a reader pump feeding the inbound
//! queue and a writer pump flushing the outbound queue on a fixed interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use inworld_domain::{Packet, PacketPayload};
use inworld_shared::{decode_frame, encode, Frame};
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinError};

use crate::config::ClientConfig;
use crate::infrastructure::ports::{FrameReader, FrameWriter, SessionStream};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Session closed for inactivity: {0}")]
    Inactivity(String),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("Pump task failed: {0}")]
    Task(String),
}

type PumpResult = Result<(), ChannelError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub flush_interval: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for ChannelConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            flush_interval: config.flush_interval,
            shutdown_grace: config.shutdown_grace,
        }
    }
}

/// State of the stream currently attached to the channel.
struct Live {
    outbound: mpsc::UnboundedSender<Packet>,
    inbound: mpsc::UnboundedReceiver<Packet>,
    shutdown: Arc<watch::Sender<bool>>,
    /// True only while both pumps run
    connected: Arc<AtomicBool>,
    pumps: [AbortHandle; 2],
    done: watch::Receiver<Option<PumpResult>>,
}

pub struct SessionChannel {
    config: ChannelConfig,
    live: Mutex<Option<Live>>,
}

impl SessionChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            live: Mutex::new(None),
        }
    }

    fn lock_live(&self) -> MutexGuard<'_, Option<Live>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.lock_live()
            .as_ref()
            .is_some_and(|live| live.connected.load(Ordering::SeqCst))
    }

    /// Attach a freshly opened stream and spawn both pumps. Any previous
    /// stream is shut down first.
    pub async fn start(&self, stream: SessionStream) {
        self.end_session().await;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown = Arc::new(shutdown_tx);
        let (done_tx, done_rx) = watch::channel(None);
        let connected = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_pump(
            stream.reader,
            inbound_tx,
            shutdown_rx.clone(),
            PumpExit::new(&connected, &shutdown),
        ));
        let writer = tokio::spawn(write_pump(
            stream.writer,
            outbound_rx,
            shutdown_rx,
            self.config.flush_interval,
            PumpExit::new(&connected, &shutdown),
        ));
        let pumps = [reader.abort_handle(), writer.abort_handle()];

        let pumps_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            let (reader_result, writer_result) = tokio::join!(reader, writer);
            pumps_connected.store(false, Ordering::SeqCst);
            let result = settle(reader_result).and(settle(writer_result));
            match &result {
                Ok(()) => tracing::debug!("Session pumps finished"),
                Err(e) => tracing::warn!(error = %e, "Session pumps failed"),
            }
            done_tx.send_replace(Some(result));
        });

        *self.lock_live() = Some(Live {
            outbound: outbound_tx,
            inbound: inbound_rx,
            shutdown,
            connected,
            pumps,
            done: done_rx,
        });
        tracing::info!("Session channel started");
    }

    /// Stop both pumps. Waits up to the shutdown grace period, then aborts
    /// whatever is still running. Safe to call repeatedly.
    pub async fn end_session(&self) {
        let live = self.lock_live().take();
        let Some(live) = live else {
            return;
        };

        live.connected.store(false, Ordering::SeqCst);
        live.shutdown.send_replace(true);
        drop(live.outbound);

        let grace = self.config.shutdown_grace;
        if tokio::time::timeout(grace, wait_done(live.done))
            .await
            .is_err()
        {
            tracing::warn!(grace = ?grace, "Pumps did not stop in time; aborting");
            for pump in &live.pumps {
                pump.abort();
            }
        }
        tracing::info!("Session channel ended");
    }

    /// Queue a packet for the writer pump. Packets offered while no stream is
    /// connected are dropped, never buffered.
    pub fn enqueue(&self, packet: Packet) -> bool {
        let live = self.lock_live();
        match live.as_ref() {
            Some(live) if live.connected.load(Ordering::SeqCst) => {
                live.outbound.send(packet).is_ok()
            }
            _ => {
                tracing::debug!(packet_id = %packet.packet_id, "Not connected; dropping outbound packet");
                false
            }
        }
    }

    /// Next decoded inbound packet, without waiting.
    pub fn try_dequeue_inbound(&self) -> Option<Packet> {
        let mut live = self.lock_live();
        let live = live.as_mut()?;
        if !live.connected.load(Ordering::SeqCst) {
            return None;
        }
        live.inbound.try_recv().ok()
    }

    /// Resolves once both pumps of the current stream have finished.
    pub async fn wait(&self) -> PumpResult {
        let done = self.lock_live().as_ref().map(|live| live.done.clone());
        match done {
            Some(done) => wait_done(done).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SessionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionChannel")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn wait_done(mut done: watch::Receiver<Option<PumpResult>>) -> PumpResult {
    match done.wait_for(Option::is_some).await {
        Ok(result) => result.clone().unwrap_or(Ok(())),
        Err(_) => Ok(()),
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn settle(joined: Result<PumpResult, JoinError>) -> PumpResult {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(ChannelError::Task(e.to_string())),
    }
}

/// Runs when a pump exits: the session is no longer connected and the
/// other pump is told to stop.
struct PumpExit {
    connected: Arc<AtomicBool>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl PumpExit {
    fn new(connected: &Arc<AtomicBool>, shutdown: &Arc<watch::Sender<bool>>) -> Self {
        Self {
            connected: Arc::clone(connected),
            shutdown: Arc::clone(shutdown),
        }
    }
}

impl Drop for PumpExit {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.send_replace(true);
    }
}

async fn read_pump(
    mut reader: Box<dyn FrameReader>,
    inbound: mpsc::UnboundedSender<Packet>,
    mut shutdown: watch::Receiver<bool>,
    _exit: PumpExit,
) -> PumpResult {
    loop {
        let frame = tokio::select! {
            _ = stopped(&mut shutdown) => return Ok(()),
            frame = reader.next_frame() => frame,
        };

        let raw = match frame {
            None => {
                tracing::info!("Stream closed by server");
                return Ok(());
            }
            Some(Err(e)) if e.is_cancellation() => return Ok(()),
            Some(Err(e)) => return Err(ChannelError::Transport(e.to_string())),
            Some(Ok(raw)) => raw,
        };

        match decode_frame(&raw) {
            Ok(Frame::Packet(packet)) => {
                if let PacketPayload::Unknown { type_name } = &packet.payload {
                    tracing::debug!(packet_type = %type_name, "Dropping packet with unknown payload");
                    continue;
                }
                if inbound.send(packet).is_err() {
                    return Ok(());
                }
            }
            Ok(Frame::Error(error)) if error.inactivity => {
                return Err(ChannelError::Inactivity(error.message));
            }
            Ok(Frame::Error(error)) => return Err(ChannelError::Server(error.message)),
            Err(e) => tracing::warn!(error = %e, "Dropping undecodable frame"),
        }
    }
}

async fn write_pump(
    mut writer: Box<dyn FrameWriter>,
    mut outbound: mpsc::UnboundedReceiver<Packet>,
    mut shutdown: watch::Receiver<bool>,
    flush_interval: Duration,
    _exit: PumpExit,
) -> PumpResult {
    let result = loop {
        let stopping = tokio::select! {
            _ = stopped(&mut shutdown) => true,
            _ = tokio::time::sleep(flush_interval) => false,
        };

        match flush(writer.as_mut(), &mut outbound).await {
            Ok(closed) if closed || stopping => break Ok(()),
            Ok(_) => {}
            Err(e) => break Err(e),
        }
    };

    if let Err(e) = writer.close().await {
        tracing::debug!(error = %e, "Closing stream writer failed");
    }
    result
}

/// Write every queued packet in order. Returns true once the queue is closed.
async fn flush(
    writer: &mut dyn FrameWriter,
    outbound: &mut mpsc::UnboundedReceiver<Packet>,
) -> Result<bool, ChannelError> {
    loop {
        let packet = match outbound.try_recv() {
            Ok(packet) => packet,
            Err(mpsc::error::TryRecvError::Empty) => return Ok(false),
            Err(mpsc::error::TryRecvError::Disconnected) => return Ok(true),
        };

        let frame = match encode(&packet) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(packet_id = %packet.packet_id, error = %e, "Failed to encode packet");
                continue;
            }
        };

        match writer.write_frame(frame).await {
            Ok(()) => {}
            Err(e) if e.is_cancellation() => return Ok(true),
            Err(e) => return Err(ChannelError::Transport(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{StreamTarget, TransportError, TransportPort};
    use crate::infrastructure::transport::memory::{MemoryPeer, MemoryTransport};
    use inworld_domain::{Actor, Routing};

    const WAIT: Duration = Duration::from_secs(2);

    fn config() -> ChannelConfig {
        ChannelConfig {
            flush_interval: Duration::from_millis(5),
            shutdown_grace: Duration::from_millis(200),
        }
    }

    fn target() -> StreamTarget {
        StreamTarget {
            url: "memory://session".to_string(),
            session_id: "session-1".to_string(),
            session_key: "key".to_string(),
            token_type: "Bearer".to_string(),
            token: "token".to_string(),
        }
    }

    async fn connected_channel() -> (SessionChannel, MemoryPeer) {
        let (transport, mut peers) = MemoryTransport::pair();
        let stream = transport.open(&target()).await.expect("open");
        let peer = peers.recv().await.expect("peer");
        let channel = SessionChannel::new(config());
        channel.start(stream).await;
        (channel, peer)
    }

    fn agent_text(text: &str) -> Packet {
        let mut packet = Packet::text(Routing::to_character("c1"), text).expect("text");
        packet.routing = Routing::new(Actor::agent("c1"), Some(Actor::player()));
        packet
    }

    fn result_frame(packet: &Packet) -> String {
        format!(r#"{{"result":{}}}"#, encode(packet).expect("encode"))
    }

    async fn next_inbound(channel: &SessionChannel) -> Option<Packet> {
        tokio::time::timeout(WAIT, async {
            loop {
                if let Some(packet) = channel.try_dequeue_inbound() {
                    return packet;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .ok()
    }

    #[tokio::test]
    async fn end_session_is_idempotent() {
        let (channel, _peer) = connected_channel().await;
        assert!(channel.is_connected());

        channel.end_session().await;
        channel.end_session().await;

        assert!(!channel.is_connected());
        assert!(!channel.enqueue(agent_text("late")));
        assert!(channel.try_dequeue_inbound().is_none());
        assert_eq!(channel.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn sends_while_disconnected_are_dropped() {
        let channel = SessionChannel::new(config());
        for text in ["one", "two", "three"] {
            let packet = Packet::text(Routing::to_character("c1"), text).expect("text");
            assert!(!channel.enqueue(packet));
        }

        let (transport, mut peers) = MemoryTransport::pair();
        channel
            .start(transport.open(&target()).await.expect("open"))
            .await;
        let mut peer = peers.recv().await.expect("peer");

        let live = Packet::text(Routing::to_character("c1"), "four").expect("text");
        assert!(channel.enqueue(live.clone()));

        let frame = tokio::time::timeout(WAIT, peer.from_client.recv())
            .await
            .expect("frame in time")
            .expect("frame");
        let written = inworld_shared::decode(&frame).expect("decode");
        assert_eq!(written.packet_id, live.packet_id);
        assert!(peer.from_client.try_recv().is_err());
    }

    #[tokio::test]
    async fn writer_preserves_order() {
        let (channel, mut peer) = connected_channel().await;
        let packets: Vec<Packet> = ["a", "b", "c"]
            .into_iter()
            .map(|text| Packet::text(Routing::to_character("c1"), text).expect("text"))
            .collect();
        for packet in &packets {
            assert!(channel.enqueue(packet.clone()));
        }

        for expected in &packets {
            let frame = tokio::time::timeout(WAIT, peer.from_client.recv())
                .await
                .expect("frame in time")
                .expect("frame");
            let written = inworld_shared::decode(&frame).expect("decode");
            assert_eq!(written.packet_id, expected.packet_id);
        }
        channel.end_session().await;
    }

    #[tokio::test]
    async fn unknown_payload_is_dropped_without_stopping_the_reader() {
        let (channel, peer) = connected_channel().await;

        let unknown = Packet::new(
            Routing::to_character("c1"),
            PacketPayload::Unknown {
                type_name: "HOLOGRAM".to_string(),
            },
        );
        assert!(peer.send(result_frame(&unknown)));
        assert!(peer.send("not json at all"));
        let text = agent_text("hello");
        assert!(peer.send(result_frame(&text)));

        let received = next_inbound(&channel).await.expect("text packet");
        assert_eq!(received.packet_id, text.packet_id);
        assert!(channel.is_connected());
        assert!(channel.try_dequeue_inbound().is_none());
        channel.end_session().await;
    }

    #[tokio::test]
    async fn inactivity_error_frame_ends_the_session() {
        let (channel, peer) = connected_channel().await;
        assert!(peer.send(r#"{"error":{"code":10,"message":"Session closed due to inactivity"}}"#));

        let result = tokio::time::timeout(WAIT, channel.wait()).await.expect("done");
        assert!(matches!(result, Err(ChannelError::Inactivity(_))));
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn transport_error_is_a_hard_failure() {
        let (channel, peer) = connected_channel().await;
        assert!(peer.fail(TransportError::Io("reset by peer".to_string())));

        let result = tokio::time::timeout(WAIT, channel.wait()).await.expect("done");
        assert!(matches!(result, Err(ChannelError::Transport(_))));
    }

    #[tokio::test]
    async fn graceful_close_finishes_ok() {
        let (channel, peer) = connected_channel().await;
        let MemoryPeer { to_client, .. } = peer;
        drop(to_client);

        let result = tokio::time::timeout(WAIT, channel.wait()).await.expect("done");
        assert_eq!(result, Ok(()));
        assert!(!channel.is_connected());
    }
}
