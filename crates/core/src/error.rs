//! Error types for the relay library.

use std::fmt;

/// Errors that can occur in the relay library.
///
/// Variants map to the failure categories of the relay:
///
/// - **Transport**: [`Io`](Self::Io), [`Http`](Self::Http): socket and
///   network failures. Retried or swallowed by long-running loops.
/// - **Negotiation**: [`Parse`](Self::Parse), [`Status`](Self::Status),
///   [`MissingSession`](Self::MissingSession): the camera answered, but not
///   the way an RTSP session needs. Aborts the current connect attempt.
/// - **Viewer input**: [`InvalidEnvelope`](Self::InvalidEnvelope),
///   [`InvalidPayload`](Self::InvalidPayload): dropped per message.
/// - **Validation**: [`PresetOutOfRange`](Self::PresetOutOfRange),
///   [`InvalidCameraAddress`](Self::InvalidCameraAddress),
///   [`UnsupportedProtocol`](Self::UnsupportedProtocol),
///   [`InvalidUrl`](Self::InvalidUrl): rejected at the call boundary.
/// - **Lifecycle**: [`ViewerNotFound`](Self::ViewerNotFound),
///   [`AlreadyRunning`](Self::AlreadyRunning), [`ShutDown`](Self::ShutDown).
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request to a CGI control endpoint failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to parse an RTSP response or session description.
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The camera answered an RTSP request with a non-success status.
    #[error("{method} failed with status {code}")]
    Status { method: &'static str, code: u16 },

    /// SETUP succeeded but the response carried no `Session` header.
    #[error("SETUP response carried no session token")]
    MissingSession,

    /// The source address is not a usable `rtsp://` URL.
    #[error("invalid RTSP URL: {0}")]
    InvalidUrl(String),

    /// A viewer message was not a `{type, payload}` JSON envelope.
    #[error("invalid message envelope: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),

    /// The payload of a known message type failed to decode.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// Preset number outside the range the camera protocol can address.
    #[error("preset must be 0-{max}, got {preset}")]
    PresetOutOfRange { preset: i64, max: u8 },

    /// VISCA camera address outside 1-7.
    #[error("VISCA camera address must be 1-7, got {0}")]
    InvalidCameraAddress(u8),

    /// Unknown control protocol or control transport name.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// The external media-session collaborator reported a failure.
    #[error("media session error: {0}")]
    MediaSession(String),

    /// No viewer with the given ID is registered with the hub.
    #[error("viewer not found: {0}")]
    ViewerNotFound(String),

    /// A packet source is already attached to the hub.
    #[error("hub already running")]
    AlreadyRunning,

    /// The component has been shut down.
    #[error("shut down")]
    ShutDown,
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Connection closed before a status line arrived.
    EmptyResponse,
    /// Status line did not have the expected `RTSP/1.0 Code Reason` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// DESCRIBE returned no session description body.
    MissingMediaDescription,
    /// `Content-Length` above [`MAX_BODY`](crate::protocol::response::MAX_BODY).
    BodyTooLarge,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyResponse => write!(f, "empty response"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::MissingMediaDescription => write!(f, "missing media description"),
            Self::BodyTooLarge => write!(f, "body too large"),
        }
    }
}

/// Convenience alias for `Result<T, RelayError>`.
pub type Result<T> = std::result::Result<T, RelayError>;
