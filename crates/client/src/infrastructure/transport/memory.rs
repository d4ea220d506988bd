//! In-process transport for tests: each `open` hands the far end of the
//! stream to the test as a [`MemoryPeer`].

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::infrastructure::ports::{
    FrameReader, FrameWriter, SessionStream, StreamTarget, TransportError, TransportPort,
};

/// Server side of an in-memory stream.
#[derive(Debug)]
pub struct MemoryPeer {
    pub target: StreamTarget,
    /// Frames delivered to the client reader; dropping it closes the stream.
    pub to_client: mpsc::UnboundedSender<Result<String, TransportError>>,
    /// Frames written by the client, in order; ends once the client closes.
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.to_client.send(Ok(frame.into())).is_ok()
    }

    pub fn fail(&self, error: TransportError) -> bool {
        self.to_client.send(Err(error)).is_ok()
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    failures_left: AtomicUsize,
    opened: AtomicUsize,
}

impl MemoryTransport {
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        (
            Self {
                peers,
                failures_left: AtomicUsize::new(0),
                opened: AtomicUsize::new(0),
            },
            peer_rx,
        )
    }

    /// Make the next `count` opens fail with a connect error.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportPort for MemoryTransport {
    async fn open(&self, target: &StreamTarget) -> Result<SessionStream, TransportError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Connect("refused".to_string()));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        self.peers
            .send(MemoryPeer {
                target: target.clone(),
                to_client,
                from_client,
            })
            .map_err(|_| TransportError::Connect("no peer listening".to_string()))?;
        self.opened.fetch_add(1, Ordering::SeqCst);

        Ok(SessionStream {
            reader: Box::new(MemoryReader { rx: client_rx }),
            writer: Box::new(MemoryWriter { tx: Some(client_tx) }),
        })
    }
}

struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Result<String, TransportError>>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await
    }
}

struct MemoryWriter {
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn write_frame(&mut self, frame: String) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}
