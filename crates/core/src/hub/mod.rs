//! Relay hub: one camera feed, many viewers.
//!
//! ```text
//! IngestClient ─packets─▶ broadcast thread ─try_send─▶ viewer queue ─▶ forwarder ─▶ MediaSession
//!              ─events──▶        │                          (one per viewer)
//!                                └─ status / CAMERA_DISCONNECTED to every viewer
//!
//! viewer transport ─JSON─▶ RelayHub::handle_message ─▶ PtzControl / MediaSession
//! ```
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`message`] | `{type, payload}` envelopes in both directions |
//! | [`media`] | Media-session collaborator traits |
//! | [`viewer`] | Per-viewer queues and packet forwarder |
//! | [`registry`] | Viewer set |
//! | [`relay`] | [`RelayHub`] |

pub mod media;
pub mod message;
pub mod registry;
pub mod relay;
pub mod viewer;

pub use media::{CandidateCallback, MediaSession, MediaSessionFactory};
pub use relay::{RelayHub, ViewerHandle};
pub use viewer::ViewerSession;

/// Hub tunables.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Per-viewer media packet queue capacity.
    pub packet_queue: usize,
    /// Per-viewer outbound message queue capacity.
    pub outbound_queue: usize,
    /// Reported in `status` as `video_protocol`.
    pub video_protocol: String,
    /// Reported in `status`. Must already be redacted.
    pub rtsp_url: Option<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            packet_queue: 500,
            outbound_queue: 256,
            video_protocol: "rtsp".to_string(),
            rtsp_url: None,
        }
    }
}
