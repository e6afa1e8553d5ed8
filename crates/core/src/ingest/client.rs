use std::io::BufReader;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::error::Result;
use crate::ingest::connection::{RequestWriter, RtspConnection};
use crate::ingest::{IngestConfig, IngestEvent};
use crate::packet::MediaPacket;
use crate::protocol::interleaved::{Frame, read_frame};
use crate::protocol::{RtspRequest, RtspUrl};
use crate::shutdown::Shutdown;

/// How often the reader re-checks for a new connection while disconnected.
const IDLE_POLL: Duration = Duration::from_millis(100);

const EVENT_QUEUE: usize = 16;

/// Upstream connection state, guarded by `Shared::state`.
///
/// `generation` increments on every successful (re)connect. Fault detectors
/// capture it when they observe the connection and pass it back when they
/// ask for a reconnect, so a fault seen on an old connection can never tear
/// down its replacement.
struct IngestionState {
    connected: bool,
    generation: u64,
    last_packet_at: Instant,
    rtp_channel: u8,
    /// Read half of the newest connection, waiting for the reader thread.
    reader: Option<BufReader<TcpStream>>,
}

struct Shared {
    url: RtspUrl,
    config: IngestConfig,
    state: Mutex<IngestionState>,
    /// Write half of the live connection: CSeq and session token live here.
    control: Mutex<Option<RequestWriter>>,
    /// Set while a reconnect thread owns recovery. Only changed under `state`.
    reconnecting: AtomicBool,
    reconnector: Mutex<Option<JoinHandle<()>>>,
    shutdown: Shutdown,
    events: Sender<IngestEvent>,
    forwarded: AtomicU64,
    dropped: AtomicU64,
    reconnect_attempts: AtomicU64,
}

/// Counters for operators and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub connected: bool,
    pub packets_forwarded: u64,
    pub packets_dropped: u64,
    pub reconnect_attempts: u64,
}

/// Live RTSP ingestion from a single camera.
///
/// Created with [`connect`](Self::connect), which fails only if the first
/// session cannot be negotiated. After that, faults are healed internally
/// and surface only as [`IngestEvent`]s. Media arrives on
/// [`packets`](Self::packets); packets from one connection are published
/// in arrival order and each reconnect starts a fresh sequence.
pub struct IngestClient {
    shared: Arc<Shared>,
    packets: Receiver<MediaPacket>,
    events: Receiver<IngestEvent>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl IngestClient {
    pub fn connect(url: &str, config: IngestConfig) -> Result<Self> {
        Self::connect_url(RtspUrl::parse(url)?, config)
    }

    /// Like [`connect`](Self::connect), for an already parsed address.
    pub fn connect_url(url: RtspUrl, config: IngestConfig) -> Result<Self> {
        let shutdown = Shutdown::new();
        let conn = RtspConnection::establish(&url, &config, &shutdown)?;

        let (packet_tx, packet_rx) = crossbeam_channel::bounded(config.packet_queue);
        let (event_tx, event_rx) = crossbeam_channel::bounded(EVENT_QUEUE);

        let shared = Arc::new(Shared::new(url, config, shutdown, event_tx));
        shared.install(conn);

        let client = IngestClient {
            shared,
            packets: packet_rx,
            events: event_rx,
            workers: Mutex::new(Vec::new()),
        };
        client.spawn_worker("rtsp-reader", move |shared| read_loop(shared, packet_tx))?;
        client.spawn_worker("rtsp-watchdog", watchdog_loop)?;

        tracing::info!(url = %client.shared.url, "RTSP ingest started");
        Ok(client)
    }

    fn spawn_worker<F>(&self, name: &str, body: F) -> Result<()>
    where
        F: FnOnce(Arc<Shared>) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(shared))?;
        self.workers.lock().push(handle);
        Ok(())
    }

    /// Queue of media packets. Clones share one queue.
    pub fn packets(&self) -> Receiver<MediaPacket> {
        self.packets.clone()
    }

    /// Queue of connectivity changes.
    pub fn events(&self) -> Receiver<IngestEvent> {
        self.events.clone()
    }

    pub fn url(&self) -> &RtspUrl {
        &self.shared.url
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            connected: self.is_connected(),
            packets_forwarded: self.shared.forwarded.load(Ordering::Relaxed),
            packets_dropped: self.shared.dropped.load(Ordering::Relaxed),
            reconnect_attempts: self.shared.reconnect_attempts.load(Ordering::Relaxed),
        }
    }

    /// Tear down the session and stop every internal thread.
    ///
    /// Sends a best-effort TEARDOWN bounded by
    /// [`IngestConfig::teardown_timeout`]. Idempotent; when it returns no
    /// ingest thread is running.
    pub fn close(&self) {
        let shared = &self.shared;
        if !shared.shutdown.trigger() {
            return;
        }
        tracing::info!(url = %shared.url, "RTSP ingest shutting down");

        if let Some(mut writer) = shared.control.lock().take() {
            writer.set_write_timeout(shared.config.teardown_timeout);
            if let Err(e) = writer.send(RtspRequest::teardown(shared.url.as_str())) {
                tracing::debug!(error = %e, "TEARDOWN not delivered");
            }
            writer.shutdown();
        }

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            let _ = handle.join();
        }
        // Fault detectors are joined, so nothing can start another reconnect.
        let reconnector = shared.reconnector.lock().take();
        if let Some(handle) = reconnector {
            let _ = handle.join();
        }

        // A reconnect that finished during shutdown may have installed a writer.
        if let Some(writer) = shared.control.lock().take() {
            writer.shutdown();
        }
        let mut state = shared.state.lock();
        state.connected = false;
        state.reader = None;
    }
}

impl Drop for IngestClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn new(url: RtspUrl, config: IngestConfig, shutdown: Shutdown, events: Sender<IngestEvent>) -> Self {
        Self {
            url,
            config,
            state: Mutex::new(IngestionState {
                connected: false,
                generation: 0,
                last_packet_at: Instant::now(),
                rtp_channel: 0,
                reader: None,
            }),
            control: Mutex::new(None),
            reconnecting: AtomicBool::new(false),
            reconnector: Mutex::new(None),
            shutdown,
            events,
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
        }
    }

    /// Make a negotiated connection the live one. Returns `false` (and
    /// discards the connection) once shutdown has been signalled.
    fn install(&self, conn: RtspConnection) -> bool {
        let (writer, reader, channels) = conn.into_parts();

        let mut state = self.state.lock();
        self.reconnecting.store(false, Ordering::SeqCst);
        if self.shutdown.is_triggered() {
            writer.shutdown();
            return false;
        }

        *self.control.lock() = Some(writer);
        state.generation += 1;
        state.connected = true;
        state.last_packet_at = Instant::now();
        state.rtp_channel = channels.rtp;
        state.reader = Some(reader);
        let generation = state.generation;
        drop(state);

        tracing::info!(url = %self.url, generation, rtp_channel = channels.rtp, "RTSP session playing");
        let _ = self.events.try_send(IngestEvent::Connected);
        true
    }

    /// Start a reconnect sequence for the connection of `generation`.
    ///
    /// A no-op when shutdown is signalled, when that connection is already
    /// gone, or when a reconnect sequence is already running. Read errors,
    /// watchdog timeouts and keepalive failures can all fire for the same
    /// fault; only the first one gets through.
    fn begin_reconnect(self: &Arc<Self>, generation: u64, reason: &'static str) {
        if self.shutdown.is_triggered() {
            return;
        }
        {
            let mut state = self.state.lock();
            if !state.connected || state.generation != generation {
                return;
            }
            if self
                .reconnecting
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }
            state.connected = false;
            state.reader = None;
        }

        if let Some(writer) = self.control.lock().take() {
            writer.shutdown();
        }
        let _ = self.events.try_send(IngestEvent::Disconnected { reason });
        tracing::warn!(url = %self.url, reason, "RTSP connection lost, reconnecting");
        self.spawn_reconnector();
    }

    /// Restart recovery when no session is live and no reconnect thread
    /// owns it, e.g. after a reconnect thread died.
    fn resume_reconnect(self: &Arc<Self>) {
        if self.shutdown.is_triggered() {
            return;
        }
        {
            let state = self.state.lock();
            if state.connected
                || self
                    .reconnecting
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                return;
            }
        }
        tracing::warn!(url = %self.url, "RTSP reconnect sequence ended without a session, restarting");
        self.spawn_reconnector();
    }

    /// Start the reconnect thread. The caller has set `reconnecting`.
    fn spawn_reconnector(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("rtsp-reconnect".to_string())
            .spawn(move || shared.reconnect_loop());

        match spawned {
            Ok(handle) => {
                let previous = self.reconnector.lock().replace(handle);
                if let Some(previous) = previous {
                    let _ = previous.join();
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn RTSP reconnect thread");
                self.reconnecting.store(false, Ordering::SeqCst);
            }
        }
    }

    fn reconnect_loop(self: Arc<Self>) {
        let mut guard = ReconnectGuard {
            flag: &self.reconnecting,
            armed: true,
        };
        for attempt in 1u32.. {
            let delay = self.config.backoff.delay(attempt);
            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "RTSP reconnect scheduled");
            if self.shutdown.wait(delay) {
                break;
            }

            self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
            match RtspConnection::establish(&self.url, &self.config, &self.shutdown) {
                Ok(conn) => {
                    // `install` clears the flag under the state lock.
                    guard.armed = false;
                    if self.install(conn) {
                        tracing::info!(attempt, url = %self.url, "RTSP reconnected");
                    }
                    return;
                }
                Err(_) if self.shutdown.is_triggered() => break,
                Err(e) => tracing::warn!(attempt, error = %e, "RTSP reconnect failed"),
            }
        }
    }

    /// Hand the newest connection's read half to the reader thread.
    fn take_reader(&self) -> Option<(u64, u8, BufReader<TcpStream>)> {
        let mut state = self.state.lock();
        if !state.connected {
            return None;
        }
        let generation = state.generation;
        let channel = state.rtp_channel;
        state.reader.take().map(|reader| (generation, channel, reader))
    }

    fn send_keepalive(&self) -> Result<()> {
        let mut control = self.control.lock();
        if let Some(writer) = control.as_mut() {
            writer.send(RtspRequest::keepalive(self.url.as_str()))?;
        }
        Ok(())
    }
}

/// Clears `reconnecting` when a reconnect thread exits without installing
/// a connection, including by unwinding.
struct ReconnectGuard<'a> {
    flag: &'a AtomicBool,
    armed: bool,
}

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(false, Ordering::SeqCst);
        }
    }
}

fn read_loop(shared: Arc<Shared>, packets: Sender<MediaPacket>) {
    let mut current: Option<(u64, u8, BufReader<TcpStream>)> = None;

    while !shared.shutdown.is_triggered() {
        let Some((generation, rtp_channel, reader)) = current.as_mut() else {
            current = shared.take_reader();
            if current.is_none() {
                shared.shutdown.wait(IDLE_POLL);
            }
            continue;
        };

        match read_frame(reader) {
            Ok(Frame::Data { channel, payload }) => {
                if channel != *rtp_channel {
                    continue;
                }
                shared.state.lock().last_packet_at = Instant::now();
                match packets.try_send(MediaPacket::new(payload)) {
                    Ok(()) => {
                        shared.forwarded.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Full(_)) => {
                        shared.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Disconnected(_)) => {}
                }
            }
            Ok(Frame::Text { status }) => {
                if status.is_some_and(|code| !(200..300).contains(&code)) {
                    tracing::debug!(?status, "camera answered keepalive with an error");
                }
            }
            Ok(Frame::Idle) => {}
            Err(e) => {
                if shared.shutdown.is_triggered() {
                    break;
                }
                let generation = *generation;
                current = None;
                tracing::warn!(error = %e, generation, "RTSP read error");
                shared.begin_reconnect(generation, "read error");
            }
        }
    }
    tracing::debug!("RTSP reader exited");
}

fn watchdog_loop(shared: Arc<Shared>) {
    let config = &shared.config;
    let mut last_keepalive = Instant::now();

    while !shared.shutdown.wait(config.watchdog_tick) {
        let (connected, generation, idle) = {
            let state = shared.state.lock();
            (state.connected, state.generation, state.last_packet_at.elapsed())
        };
        if !connected {
            last_keepalive = Instant::now();
            shared.resume_reconnect();
            continue;
        }

        if idle > config.watchdog_timeout {
            tracing::warn!(idle_ms = idle.as_millis() as u64, "no media from camera");
            shared.begin_reconnect(generation, "watchdog timeout");
            continue;
        }

        if last_keepalive.elapsed() >= config.keepalive_interval {
            last_keepalive = Instant::now();
            match shared.send_keepalive() {
                Ok(()) => tracing::trace!("RTSP keepalive sent"),
                Err(e) => {
                    tracing::warn!(error = %e, "RTSP keepalive failed");
                    shared.begin_reconnect(generation, "keepalive failed");
                }
            }
        }
    }
    tracing::debug!("RTSP watchdog exited");
}
