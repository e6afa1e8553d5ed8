//! Viewer message envelopes.
//!
//! Every message in either direction is a JSON object
//! `{"type": <string>, "payload": <object>}`.
//!
//! | Direction | `type` | Payload |
//! |-----------|--------|---------|
//! | in | `ping` | `{timestamp}` |
//! | in | `answer` | `{sdp}` |
//! | in/out | `ice_candidate` | `{candidate, sdp_mid, sdp_mline_index}` |
//! | in | `ptz_command` | `{pan, tilt, zoom}` |
//! | in | `ptz_stop` | none |
//! | in | `ptz_preset` | `{action: recall\|save, preset_number}` |
//! | out | `pong` | `{client_timestamp, server_timestamp}` |
//! | out | `status` | `{camera_connected, rtsp_url?, control_protocol, video_protocol}` |
//! | out | `offer` | `{sdp}` |
//! | out | `error` | `{code, message}` |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};
use crate::ptz::{ControlProtocol, PresetAction};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Ping {
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
}

/// ICE candidate, passed through to or from the media session verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: String,
    #[serde(default)]
    pub sdp_mline_index: u16,
}

/// Normalized motion request. Missing axes mean no motion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct PtzCommand {
    #[serde(default)]
    pub pan: f64,
    #[serde(default)]
    pub tilt: f64,
    #[serde(default)]
    pub zoom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PtzPreset {
    pub action: PresetAction,
    pub preset_number: i64,
}

/// A decoded viewer message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Ping(Ping),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
    PtzCommand(PtzCommand),
    PtzStop,
    PtzPreset(PtzPreset),
    /// A well-formed envelope with a type the relay does not handle.
    Unknown(String),
}

impl Inbound {
    /// Decode one viewer message.
    ///
    /// Returns [`RelayError::InvalidEnvelope`] when `data` is not a
    /// `{type, payload}` object and [`RelayError::InvalidPayload`] when the
    /// payload of a known type does not match its shape.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(data).map_err(RelayError::InvalidEnvelope)?;
        let Envelope { kind, payload } = envelope;

        let message = match kind.as_str() {
            "ping" => Self::Ping(decode_payload(&kind, payload)?),
            "answer" => Self::Answer(decode_payload(&kind, payload)?),
            "ice_candidate" => Self::IceCandidate(decode_payload(&kind, payload)?),
            "ptz_command" => Self::PtzCommand(decode_payload(&kind, payload)?),
            "ptz_stop" => Self::PtzStop,
            "ptz_preset" => Self::PtzPreset(decode_payload(&kind, payload)?),
            _ => Self::Unknown(kind),
        };
        Ok(message)
    }
}

fn decode_payload<T: DeserializeOwned>(kind: &str, payload: Value) -> Result<T> {
    // An absent payload decodes like an empty object.
    let payload = if payload.is_null() {
        Value::Object(Default::default())
    } else {
        payload
    };
    serde_json::from_value(payload).map_err(|source| RelayError::InvalidPayload {
        kind: kind.to_string(),
        source,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pong {
    pub client_timestamp: i64,
    pub server_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub camera_connected: bool,
    /// Source address with the password redacted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtsp_url: Option<String>,
    pub control_protocol: String,
    pub video_protocol: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CameraDisconnected,
    RtspError,
    ViscaError,
    PanasonicError,
    InvalidMessage,
}

impl ErrorCode {
    /// Code for a failure reported by a camera control protocol.
    pub fn for_protocol(protocol: ControlProtocol) -> Self {
        match protocol {
            ControlProtocol::Visca => Self::ViscaError,
            ControlProtocol::Panasonic => Self::PanasonicError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub message: String,
}

/// A message for a viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Outbound {
    Pong(Pong),
    Status(Status),
    Offer(SessionDescription),
    IceCandidate(IceCandidate),
    Error(ErrorMessage),
}

impl Outbound {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorMessage {
            code,
            message: message.into(),
        })
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
