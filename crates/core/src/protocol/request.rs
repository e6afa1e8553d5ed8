/// An outgoing RTSP request (RFC 2326 §6).
///
/// Serializes to the HTTP/1.1-style text format:
///
/// ```text
/// DESCRIBE rtsp://camera/stream RTSP/1.0\r\n
/// CSeq: 2\r\n
/// User-Agent: ptz-relay/0.1\r\n
/// Accept: application/sdp\r\n
/// \r\n
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header), then call
/// [`serialize`](Self::serialize). The connection fills in `CSeq`,
/// authentication and `Session` before sending.
#[must_use]
#[derive(Debug, Clone)]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, DESCRIBE, SETUP, PLAY, etc.).
    pub method: &'static str,
    /// Request-URI (e.g. `rtsp://host:port/stream/track1`).
    pub uri: String,
    /// Headers as ordered (name, value) pairs.
    pub headers: Vec<(String, String)>,
}

/// Client identification string sent in every request (RFC 2326 §12.41).
pub const USER_AGENT: &str = "ptz-relay/0.1";

impl RtspRequest {
    pub fn new(method: &'static str, uri: &str) -> Self {
        RtspRequest {
            method,
            uri: uri.to_string(),
            headers: Vec::new(),
        }
    }

    /// OPTIONS: capability discovery (RFC 2326 §10.1).
    pub fn options(uri: &str) -> Self {
        Self::new("OPTIONS", uri)
    }

    /// DESCRIBE: fetch the SDP session description (RFC 2326 §10.2).
    pub fn describe(uri: &str) -> Self {
        Self::new("DESCRIBE", uri).add_header("Accept", "application/sdp")
    }

    /// SETUP: request RTP interleaved on this TCP connection, RTP on
    /// channel 0 and RTCP on channel 1 (RFC 2326 §10.12).
    pub fn setup_interleaved(uri: &str) -> Self {
        Self::new("SETUP", uri).add_header("Transport", "RTP/AVP/TCP;unicast;interleaved=0-1")
    }

    /// PLAY: start delivery from the live edge (RFC 2326 §10.5).
    pub fn play(uri: &str) -> Self {
        Self::new("PLAY", uri).add_header("Range", "npt=0.000-")
    }

    /// GET_PARAMETER with no body; servers treat it as a keepalive (RFC 2326 §10.8).
    pub fn keepalive(uri: &str) -> Self {
        Self::new("GET_PARAMETER", uri)
    }

    /// TEARDOWN: release the session (RFC 2326 §10.7).
    pub fn teardown(uri: &str) -> Self {
        Self::new("TEARDOWN", uri)
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Serialize to the RTSP text wire format, terminated by a blank line.
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);
        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }
        request.push_str("\r\n");
        request
    }
}
