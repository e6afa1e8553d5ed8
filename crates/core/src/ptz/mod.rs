//! PTZ camera control: throttling, encoding and delivery.
//!
//! Viewer input arrives as normalized axis values in `[-1.0, 1.0]`. A
//! [`PtzSession`] coalesces bursts per actuator group through a
//! [`throttle::Throttle`], encodes the surviving values with a
//! [`ControlEncoder`] for the camera's protocol family, and writes them to
//! the camera through a [`link::ControlLink`].
//!
//! ## Supported protocol families
//!
//! | Family | Encoder | Link | Presets |
//! |--------|---------|------|---------|
//! | VISCA (binary) | [`visca::ViscaEncoder`] | UDP (VISCA over IP) or TCP (bare frames) | 0-255 |
//! | Panasonic (HTTP CGI) | [`panasonic::PanasonicEncoder`] | `GET /cgi-bin/aw_ptz` | 0-99 |

pub mod link;
pub mod panasonic;
pub mod session;
pub mod throttle;
pub mod visca;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RelayError, Result};

pub use session::PtzSession;

/// Command surface shared by every camera protocol family.
///
/// Movement commands are fire-and-forget: delivery failures are logged
/// and never returned. Preset commands validate their number and return
/// [`RelayError::PresetOutOfRange`] without touching the wire.
pub trait PtzControl: Send + Sync {
    /// Drive pan and tilt. `pan` is negative for left, `tilt` negative for down.
    fn pan_tilt(&self, pan: f64, tilt: f64);

    /// Drive zoom. Negative zooms wide, positive zooms tele.
    fn zoom(&self, zoom: f64);

    /// Halt all motion immediately, bypassing the throttle.
    fn stop(&self);

    fn recall_preset(&self, preset: i64) -> Result<()>;

    fn save_preset(&self, preset: i64) -> Result<()>;

    fn close(&self);

    fn protocol(&self) -> ControlProtocol;
}

/// Protocol-specific command encoder.
///
/// Each protocol family implements this trait, turning normalized values
/// into complete wire messages ready for a [`link::ControlLink`]. Inputs
/// are already clamped to `[-1.0, 1.0]` by the session.
pub trait ControlEncoder: Send {
    fn protocol(&self) -> ControlProtocol;

    /// Minimum spacing between two sends of the same actuator group.
    fn min_interval(&self) -> Duration;

    fn pan_tilt(&mut self, pan: f64, tilt: f64) -> Vec<u8>;

    fn zoom(&mut self, zoom: f64) -> Vec<u8>;

    /// Messages that halt every actuator, in send order.
    fn stop(&mut self) -> Vec<Vec<u8>>;

    fn recall_preset(&mut self, preset: i64) -> Result<Vec<u8>>;

    fn save_preset(&mut self, preset: i64) -> Result<Vec<u8>>;
}

/// Camera control protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlProtocol {
    Visca,
    Panasonic,
}

impl ControlProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visca => "visca",
            Self::Panasonic => "panasonic",
        }
    }
}

impl fmt::Display for ControlProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlProtocol {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "visca" => Ok(Self::Visca),
            "panasonic" => Ok(Self::Panasonic),
            _ => Err(RelayError::UnsupportedProtocol(s.to_string())),
        }
    }
}

/// Carrier for VISCA commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViscaTransport {
    /// VISCA over IP: each frame wrapped in an 8-byte header.
    #[default]
    Udp,
    /// Bare VISCA frames on a TCP stream.
    Tcp,
}

impl fmt::Display for ViscaTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        })
    }
}

impl FromStr for ViscaTransport {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            _ => Err(RelayError::UnsupportedProtocol(s.to_string())),
        }
    }
}

/// Configuration for [`PtzSession::open`].
#[derive(Debug, Clone)]
pub struct PtzConfig {
    pub protocol: ControlProtocol,
    /// `host:port` for VISCA, `host[:port]` for Panasonic.
    pub address: String,
    pub transport: ViscaTransport,
    /// VISCA camera address, 1-7.
    pub camera_address: u8,
    pub connect_timeout: Duration,
    /// Deadline for each VISCA socket write.
    pub write_timeout: Duration,
    /// Deadline for each Panasonic CGI request.
    pub http_timeout: Duration,
}

impl PtzConfig {
    pub fn new(protocol: ControlProtocol, address: impl Into<String>) -> Self {
        Self {
            protocol,
            address: address.into(),
            ..Self::default()
        }
    }
}

impl Default for PtzConfig {
    fn default() -> Self {
        Self {
            protocol: ControlProtocol::Visca,
            address: String::new(),
            transport: ViscaTransport::Udp,
            camera_address: 1,
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_millis(10),
            http_timeout: Duration::from_secs(2),
        }
    }
}

/// Preset action requested by a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetAction {
    Recall,
    Save,
}

/// Validate a preset number against the protocol's range.
pub(crate) fn check_preset(preset: i64, max: u8) -> Result<u8> {
    u8::try_from(preset)
        .ok()
        .filter(|p| *p <= max)
        .ok_or(RelayError::PresetOutOfRange { preset, max })
}
