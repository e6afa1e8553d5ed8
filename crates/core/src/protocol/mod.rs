//! RTSP client protocol pieces (RFC 2326).
//!
//! The relay plays the client role against a single camera: it builds
//! requests, parses responses, picks the video track out of the SDP, and
//! demultiplexes the interleaved binary stream that follows PLAY.
//!
//! ## Session negotiation
//!
//! ```text
//! OPTIONS  rtsp://cam/live            → 200
//! DESCRIBE rtsp://cam/live            → 200 + SDP (video a=control)
//! SETUP    rtsp://cam/live/trackID=1  → 200 + Session, interleaved=0-1
//! PLAY     rtsp://cam/live            → 200, then $-framed RTP/RTCP
//! GET_PARAMETER (periodic keepalive)  → 200 (text, between frames)
//! TEARDOWN (on shutdown, best effort)
//! ```
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`address`] | Source address, credentials, Basic auth |
//! | [`request`] | Request builder and serializer |
//! | [`response`] | Response parser |
//! | [`sdp`] | Video control attribute lookup and resolution |
//! | [`transport`] | `Transport` header interleaved channel pair |
//! | [`interleaved`] | `$`-framed data reader |

pub mod address;
pub mod interleaved;
pub mod request;
pub mod response;
pub mod sdp;
pub mod transport;

pub use address::{Credentials, RtspUrl};
pub use request::RtspRequest;
pub use response::RtspResponse;
