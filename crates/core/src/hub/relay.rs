use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::error::{RelayError, Result};
use crate::hub::HubConfig;
use crate::hub::media::{CandidateCallback, MediaSessionFactory};
use crate::hub::message::{ErrorCode, Inbound, Outbound, Pong, SessionDescription, Status};
use crate::hub::registry::ViewerRegistry;
use crate::hub::viewer::ViewerSession;
use crate::ingest::{IngestClient, IngestEvent};
use crate::packet::MediaPacket;
use crate::ptz::{PresetAction, PtzControl};
use crate::shutdown::Shutdown;

/// The viewer side of a connection accepted by [`RelayHub::connect`].
///
/// The transport drains `outbound` and delivers each string to the viewer
/// as one message, and feeds everything the viewer sends to
/// [`RelayHub::handle_message`].
pub struct ViewerHandle {
    pub id: String,
    pub outbound: Receiver<String>,
}

struct HubInner {
    config: HubConfig,
    registry: ViewerRegistry,
    ptz: Option<Arc<dyn PtzControl>>,
    media: Arc<dyn MediaSessionFactory>,
    camera_connected: AtomicBool,
    packets_relayed: AtomicU64,
    /// Why video ingest could not start; repeated to every new viewer.
    ingest_error: Mutex<Option<String>>,
    shutdown: Shutdown,
}

/// Fans camera media out to viewers and routes viewer input to the camera.
///
/// One broadcast thread reads the packet source and offers each packet to
/// every viewer's queue without blocking; each viewer has its own forwarder
/// thread draining that queue into its media session. Viewer messages are
/// handled on the caller's thread.
pub struct RelayHub {
    inner: Arc<HubInner>,
    broadcaster: Mutex<Option<JoinHandle<()>>>,
}

impl RelayHub {
    pub fn new(
        config: HubConfig,
        ptz: Option<Arc<dyn PtzControl>>,
        media: Arc<dyn MediaSessionFactory>,
    ) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                registry: ViewerRegistry::new(),
                ptz,
                media,
                camera_connected: AtomicBool::new(false),
                packets_relayed: AtomicU64::new(0),
                ingest_error: Mutex::new(None),
                shutdown: Shutdown::new(),
            }),
            broadcaster: Mutex::new(None),
        }
    }

    /// Start relaying from an ingestion client.
    pub fn attach_ingest(&self, client: &IngestClient) -> Result<()> {
        self.attach_source(client.packets(), client.events())?;
        self.inner
            .camera_connected
            .store(client.is_connected(), Ordering::SeqCst);
        Ok(())
    }

    /// Start the broadcast thread over an arbitrary packet source.
    ///
    /// Only one source may be attached. The thread ends when `packets`
    /// disconnects or the hub shuts down.
    pub fn attach_source(
        &self,
        packets: Receiver<MediaPacket>,
        events: Receiver<IngestEvent>,
    ) -> Result<()> {
        let mut slot = self.broadcaster.lock();
        if slot.is_some() {
            return Err(RelayError::AlreadyRunning);
        }
        if self.inner.shutdown.is_triggered() {
            return Err(RelayError::ShutDown);
        }

        self.inner.camera_connected.store(true, Ordering::SeqCst);
        self.inner.ingest_error.lock().take();
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("relay-broadcast".to_string())
            .spawn(move || inner.broadcast_loop(packets, events))?;
        *slot = Some(handle);
        Ok(())
    }

    /// Register a new viewer.
    ///
    /// Queues a `status` message, creates the viewer's media session and
    /// queues its `offer`. A media session failure is logged and the viewer
    /// stays connected without video.
    pub fn connect(&self) -> Result<ViewerHandle> {
        let inner = &self.inner;
        if inner.shutdown.is_triggered() {
            return Err(RelayError::ShutDown);
        }

        let (viewer, outbound) =
            ViewerSession::new(inner.config.packet_queue, inner.config.outbound_queue);
        inner.registry.insert(Arc::clone(&viewer));
        if inner.shutdown.is_triggered() {
            // Shutdown may have drained the registry before the insert.
            inner.registry.remove(viewer.id());
            viewer.close();
            return Err(RelayError::ShutDown);
        }
        tracing::info!(
            viewer_id = %viewer.id(),
            viewers = inner.registry.len(),
            "viewer connected"
        );

        viewer.send(&Outbound::Status(inner.status()));
        if let Some(message) = inner.ingest_error.lock().clone() {
            viewer.send(&Outbound::error(ErrorCode::RtspError, message));
        }

        if let Err(e) = inner.start_media(&viewer) {
            if viewer.is_closed() {
                return Err(RelayError::ShutDown);
            }
            tracing::warn!(viewer_id = %viewer.id(), error = %e, "media session unavailable");
        }

        Ok(ViewerHandle {
            id: viewer.id().to_string(),
            outbound,
        })
    }

    /// Handle one message received from viewer `id`.
    ///
    /// Malformed input never fails the call: unparseable JSON is answered
    /// with an `INVALID_MESSAGE` error to that viewer, a bad payload for a
    /// known type is dropped. Only an unknown viewer is an error.
    pub fn handle_message(&self, id: &str, data: &[u8]) -> Result<()> {
        let viewer = self
            .inner
            .registry
            .get(id)
            .ok_or_else(|| RelayError::ViewerNotFound(id.to_string()))?;

        match Inbound::decode(data) {
            Ok(message) => self.inner.route(&viewer, message),
            Err(e @ RelayError::InvalidEnvelope(_)) => {
                tracing::debug!(viewer_id = %id, error = %e, "unparseable message");
                viewer.send(&Outbound::error(
                    ErrorCode::InvalidMessage,
                    "Failed to parse message",
                ));
            }
            Err(e) => {
                tracing::debug!(viewer_id = %id, error = %e, "dropping malformed payload");
            }
        }
        Ok(())
    }

    /// Record that video ingest could not be started.
    ///
    /// Every current viewer gets an `RTSP_ERROR`, and so does every viewer
    /// that joins before a source is attached.
    pub fn report_ingest_failure(&self, error: &RelayError) {
        let message = format!("video ingest unavailable: {error}");
        self.inner.camera_connected.store(false, Ordering::SeqCst);
        *self.inner.ingest_error.lock() = Some(message.clone());
        self.inner
            .broadcast(&Outbound::error(ErrorCode::RtspError, message));
    }

    /// Release viewer `id`'s resources, then unregister it.
    ///
    /// A closed viewer still in the registry refuses packets and messages,
    /// so the broadcast thread never sees it half torn down.
    pub fn disconnect(&self, id: &str) -> Result<()> {
        let viewer = self
            .inner
            .registry
            .get(id)
            .ok_or_else(|| RelayError::ViewerNotFound(id.to_string()))?;
        viewer.close();
        self.inner.registry.remove(id);
        tracing::info!(
            viewer_id = %id,
            viewers = self.inner.registry.len(),
            "viewer disconnected"
        );
        Ok(())
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// IDs of the connected viewers, sorted.
    pub fn viewers(&self) -> Vec<String> {
        self.inner.registry.ids()
    }

    pub fn viewer(&self, id: &str) -> Option<Arc<ViewerSession>> {
        self.inner.registry.get(id)
    }

    pub fn camera_connected(&self) -> bool {
        self.inner.camera_connected.load(Ordering::SeqCst)
    }

    /// Packets taken from the source and offered to viewers.
    pub fn packets_relayed(&self) -> u64 {
        self.inner.packets_relayed.load(Ordering::Relaxed)
    }

    /// Current `status` payload.
    pub fn status(&self) -> Status {
        self.inner.status()
    }

    /// Stop the broadcast thread and close every viewer. Idempotent.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.trigger() {
            return;
        }
        tracing::info!("relay hub shutting down");

        let broadcaster = self.broadcaster.lock().take();
        if let Some(handle) = broadcaster {
            let _ = handle.join();
        }
        for viewer in self.inner.registry.drain() {
            viewer.close();
        }
    }
}

impl Drop for RelayHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl HubInner {
    fn status(&self) -> Status {
        Status {
            camera_connected: self.camera_connected.load(Ordering::SeqCst),
            rtsp_url: self.config.rtsp_url.clone(),
            control_protocol: self
                .ptz
                .as_ref()
                .map_or("none", |ptz| ptz.protocol().as_str())
                .to_string(),
            video_protocol: self.config.video_protocol.clone(),
        }
    }

    fn start_media(&self, viewer: &Arc<ViewerSession>) -> Result<()> {
        let weak = Arc::downgrade(viewer);
        let on_candidate: CandidateCallback = Arc::new(move |candidate| {
            if let Some(viewer) = weak.upgrade() {
                viewer.send(&Outbound::IceCandidate(candidate));
            }
        });

        let media = self.media.create(on_candidate)?;
        let offer = match media.create_offer() {
            Ok(sdp) => sdp,
            Err(e) => {
                media.close();
                return Err(e);
            }
        };
        viewer.send(&Outbound::Offer(SessionDescription { sdp: offer }));
        viewer.attach_media(media)
    }

    fn route(&self, viewer: &ViewerSession, message: Inbound) {
        let id = viewer.id();
        match message {
            Inbound::Ping(ping) => {
                viewer.send(&Outbound::Pong(Pong {
                    client_timestamp: ping.timestamp,
                    server_timestamp: unix_millis(),
                }));
            }
            Inbound::Answer(answer) => {
                if let Some(media) = viewer.media() {
                    report(id, "set_answer", media.set_answer(&answer.sdp));
                }
            }
            Inbound::IceCandidate(c) => {
                if let Some(media) = viewer.media() {
                    report(
                        id,
                        "add_remote_candidate",
                        media.add_remote_candidate(&c.candidate, &c.sdp_mid, c.sdp_mline_index),
                    );
                }
            }
            Inbound::PtzCommand(command) => {
                if let Some(ptz) = self.ptz_or_log(id) {
                    ptz.pan_tilt(command.pan, command.tilt);
                    ptz.zoom(command.zoom);
                }
            }
            Inbound::PtzStop => {
                if let Some(ptz) = self.ptz_or_log(id) {
                    ptz.stop();
                }
            }
            Inbound::PtzPreset(preset) => {
                let Some(ptz) = self.ptz_or_log(id) else {
                    return;
                };
                let result = match preset.action {
                    PresetAction::Recall => ptz.recall_preset(preset.preset_number),
                    PresetAction::Save => ptz.save_preset(preset.preset_number),
                };
                if let Err(e) = result {
                    tracing::warn!(viewer_id = %id, error = %e, "preset rejected");
                    viewer.send(&Outbound::error(
                        ErrorCode::for_protocol(ptz.protocol()),
                        e.to_string(),
                    ));
                }
            }
            Inbound::Unknown(kind) => {
                tracing::debug!(viewer_id = %id, %kind, "ignoring unknown message type");
            }
        }
    }

    fn ptz_or_log(&self, viewer_id: &str) -> Option<&Arc<dyn PtzControl>> {
        if self.ptz.is_none() {
            tracing::debug!(viewer_id, "PTZ control not configured, ignoring command");
        }
        self.ptz.as_ref()
    }

    fn broadcast_loop(&self, packets: Receiver<MediaPacket>, events: Receiver<IngestEvent>) {
        let never = crossbeam_channel::never();
        let mut events_open = true;

        loop {
            let events_rx = if events_open { &events } else { &never };
            crossbeam_channel::select! {
                recv(packets) -> packet => match packet {
                    Ok(packet) => self.fan_out(&packet),
                    Err(_) => {
                        tracing::info!("packet source closed");
                        break;
                    }
                },
                recv(events_rx) -> event => match event {
                    Ok(event) => self.on_ingest_event(event),
                    Err(_) => events_open = false,
                },
                recv(self.shutdown.receiver()) -> _ => break,
            }
        }
        tracing::debug!("broadcast loop exited");
    }

    fn fan_out(&self, packet: &MediaPacket) {
        self.packets_relayed.fetch_add(1, Ordering::Relaxed);
        self.registry.for_each(|viewer| {
            viewer.offer_packet(packet);
        });
    }

    fn on_ingest_event(&self, event: IngestEvent) {
        let message = match event {
            IngestEvent::Connected => {
                self.camera_connected.store(true, Ordering::SeqCst);
                Outbound::Status(self.status())
            }
            IngestEvent::Disconnected { reason } => {
                self.camera_connected.store(false, Ordering::SeqCst);
                Outbound::error(
                    ErrorCode::CameraDisconnected,
                    format!("camera connection lost: {reason}"),
                )
            }
        };
        self.broadcast(&message);
    }

    fn broadcast(&self, message: &Outbound) {
        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode broadcast");
                return;
            }
        };
        self.registry.for_each(|viewer| {
            viewer.send_encoded(text.clone());
        });
    }
}

fn report(viewer_id: &str, operation: &'static str, result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!(viewer_id, operation, error = %e, "media session call failed");
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}
