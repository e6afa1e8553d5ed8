use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::error::{RelayError, Result};
use crate::hub::media::MediaSession;
use crate::hub::message::Outbound;
use crate::packet::MediaPacket;
use crate::shutdown::Shutdown;

/// One connected viewer.
///
/// Holds two bounded queues: media packets waiting for the forwarder
/// thread, and encoded messages waiting for the viewer's transport. Both
/// are filled with `try_send`, so a stalled viewer loses its own packets
/// and messages without slowing anybody else down.
///
/// ## Lifecycle
///
/// ```text
/// new            -> registered, status/offer queued
/// attach_media   -> forwarder running
/// close          -> forwarder joined, media closed, outbound queue closed
/// ```
pub struct ViewerSession {
    id: String,
    connected_at: Instant,
    packet_tx: Sender<MediaPacket>,
    packet_rx: Mutex<Option<Receiver<MediaPacket>>>,
    outbound: Mutex<Option<Sender<String>>>,
    media: Mutex<Option<Arc<dyn MediaSession>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
    shutdown: Shutdown,
    closed: AtomicBool,
    packets_dropped: AtomicU64,
    messages_dropped: AtomicU64,
}

impl ViewerSession {
    /// Create a viewer with a random 16-hex-digit ID. Returns the receiving
    /// end of its outbound message queue.
    pub fn new(packet_queue: usize, outbound_queue: usize) -> (Arc<Self>, Receiver<String>) {
        let (packet_tx, packet_rx) = crossbeam_channel::bounded(packet_queue);
        let (outbound_tx, outbound_rx) = crossbeam_channel::bounded(outbound_queue);

        let viewer = Arc::new(Self {
            id: format!("{:016x}", rand::random::<u64>()),
            connected_at: Instant::now(),
            packet_tx,
            packet_rx: Mutex::new(Some(packet_rx)),
            outbound: Mutex::new(Some(outbound_tx)),
            media: Mutex::new(None),
            forwarder: Mutex::new(None),
            shutdown: Shutdown::new(),
            closed: AtomicBool::new(false),
            packets_dropped: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        });
        (viewer, outbound_rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue a message for the viewer. Returns `false` if it was dropped.
    pub fn send(&self, message: &Outbound) -> bool {
        match message.encode() {
            Ok(text) => self.send_encoded(text),
            Err(e) => {
                tracing::error!(viewer_id = %self.id, error = %e, "failed to encode message");
                false
            }
        }
    }

    /// Queue an already-encoded message.
    pub fn send_encoded(&self, text: String) -> bool {
        let outbound = self.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return false;
        };
        match tx.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.messages_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(viewer_id = %self.id, "outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Offer a media packet without blocking. Returns `false` if the
    /// packet queue was full or the viewer is closed.
    pub fn offer_packet(&self, packet: &MediaPacket) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.packet_tx.try_send(packet.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    pub fn media(&self) -> Option<Arc<dyn MediaSession>> {
        self.media.lock().clone()
    }

    /// Bind the media session and start forwarding queued packets to it.
    ///
    /// A closed viewer refuses the session and closes it.
    pub fn attach_media(&self, media: Arc<dyn MediaSession>) -> Result<()> {
        // Held until the forwarder is registered; `close` takes it after
        // setting `closed`, so it either sees the session or we see `closed`.
        let mut slot = self.media.lock();
        if self.is_closed() {
            drop(slot);
            media.close();
            return Err(RelayError::ShutDown);
        }
        let Some(packets) = self.packet_rx.lock().take() else {
            drop(slot);
            tracing::warn!(viewer_id = %self.id, "media session already attached");
            media.close();
            return Ok(());
        };
        *slot = Some(Arc::clone(&media));

        let id = self.id.clone();
        let shutdown = self.shutdown.clone();
        let handle = thread::Builder::new()
            .name(format!("viewer-{}", &self.id[..8]))
            .spawn(move || forward_packets(&id, packets, media, shutdown))?;
        *self.forwarder.lock() = Some(handle);
        Ok(())
    }

    /// Stop forwarding, close the media session and the outbound queue.
    ///
    /// Idempotent. Returns `true` for the call that actually closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.shutdown.trigger();
        let forwarder = self.forwarder.lock().take();
        if let Some(handle) = forwarder {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }

        let media = self.media.lock().take();
        if let Some(media) = media {
            media.close();
        }
        self.outbound.lock().take();

        tracing::debug!(
            viewer_id = %self.id,
            connected_secs = self.connected_for().as_secs(),
            packets_dropped = self.packets_dropped(),
            "viewer closed"
        );
        true
    }
}

fn forward_packets(
    viewer_id: &str,
    packets: Receiver<MediaPacket>,
    media: Arc<dyn MediaSession>,
    shutdown: Shutdown,
) {
    loop {
        crossbeam_channel::select! {
            recv(packets) -> packet => {
                let Ok(packet) = packet else { break };
                if let Err(e) = media.write_media_packet(packet.as_bytes()) {
                    tracing::debug!(viewer_id, error = %e, "media write failed, forwarding stopped");
                    break;
                }
            }
            recv(shutdown.receiver()) -> _ => break,
        }
    }
}
