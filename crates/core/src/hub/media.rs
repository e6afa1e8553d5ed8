use std::sync::Arc;

use crate::error::Result;
use crate::hub::message::IceCandidate;

/// Called with each locally gathered ICE candidate.
pub type CandidateCallback = Arc<dyn Fn(IceCandidate) + Send + Sync>;

/// Per-viewer media delivery endpoint (a WebRTC peer connection in
/// production).
///
/// SDP and candidate strings are opaque to the relay and passed through
/// unmodified. Implementations report failures as
/// [`RelayError::MediaSession`](crate::RelayError::MediaSession).
pub trait MediaSession: Send + Sync {
    fn create_offer(&self) -> Result<String>;

    fn set_answer(&self, sdp: &str) -> Result<()>;

    fn add_remote_candidate(&self, candidate: &str, sdp_mid: &str, sdp_mline_index: u16) -> Result<()>;

    /// Deliver one RTP packet. An error ends forwarding for this viewer.
    fn write_media_packet(&self, packet: &[u8]) -> Result<()>;

    fn close(&self);
}

/// Creates a [`MediaSession`] for each new viewer.
pub trait MediaSessionFactory: Send + Sync {
    /// `on_candidate` may be called from any thread, at any time until the
    /// session is closed.
    fn create(&self, on_candidate: CandidateCallback) -> Result<Arc<dyn MediaSession>>;
}
