//! RTSP ingestion: one upstream session, self-healing.
//!
//! [`IngestClient`] negotiates a session with the camera
//! ([`connection::RtspConnection`]), then runs three kinds of threads:
//!
//! - **reader**: demultiplexes the interleaved stream and publishes RTP
//!   packets from the negotiated media channel onto a bounded queue,
//!   dropping when the queue is full.
//! - **watchdog**: forces a reconnect when no media arrives for
//!   [`IngestConfig::watchdog_timeout`], and sends a `GET_PARAMETER`
//!   keepalive every [`IngestConfig::keepalive_interval`].
//! - **reconnect**: at most one at a time; retries with
//!   [`backoff::Backoff`] until it succeeds or shutdown is signalled.

pub mod backoff;
pub mod client;
pub mod connection;

use std::time::Duration;

pub use backoff::Backoff;
pub use client::{IngestClient, IngestStats};

/// Tunables for the ingestion client. Defaults suit a LAN camera.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// TCP connect deadline.
    pub connect_timeout: Duration,
    /// Deadline for each negotiation response.
    pub request_timeout: Duration,
    /// Deadline for every write on the control connection.
    pub write_timeout: Duration,
    /// Read deadline in the streaming loop; bounds shutdown latency.
    pub read_poll: Duration,
    /// Reconnect when no media packet arrives for this long.
    pub watchdog_timeout: Duration,
    /// How often the watchdog checks liveness.
    pub watchdog_tick: Duration,
    /// Interval between `GET_PARAMETER` keepalives.
    pub keepalive_interval: Duration,
    /// Write deadline for the best-effort TEARDOWN on close.
    pub teardown_timeout: Duration,
    /// Capacity of the published packet queue.
    pub packet_queue: usize,
    pub backoff: Backoff,
    pub user_agent: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            read_poll: Duration::from_secs(1),
            watchdog_timeout: Duration::from_secs(10),
            watchdog_tick: Duration::from_secs(1),
            keepalive_interval: Duration::from_secs(30),
            teardown_timeout: Duration::from_secs(1),
            packet_queue: 500,
            backoff: Backoff::default(),
            user_agent: crate::protocol::request::USER_AGENT.to_string(),
        }
    }
}

/// Upstream connectivity changes, published for the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    /// A (re)negotiated session is playing.
    Connected,
    /// The session was lost; a reconnect sequence has started.
    Disconnected { reason: &'static str },
}
