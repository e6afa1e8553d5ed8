//! SDP (Session Description Protocol) inspection (RFC 4566 / RFC 8866).
//!
//! The relay never interprets media, so the only thing it needs from the
//! DESCRIBE body is where to send SETUP for the video stream:
//!
//! ```text
//! v=0
//! o=- 0 0 IN IP4 10.0.0.5
//! s=Stream
//! a=control:*                  ← session-level control
//! m=audio 0 RTP/AVP 97
//! a=control:trackID=2
//! m=video 0 RTP/AVP 96         ← video media section
//! a=rtpmap:96 H264/90000
//! a=control:trackID=1          ← what SETUP targets
//! ```

/// Locate the control attribute of the first video media section.
///
/// Falls back to the first `a=control:` anywhere that is not the `*`
/// wildcard when the video section has none. Returns the raw attribute
/// value; resolve it with [`resolve_control_url`].
pub fn find_video_control(sdp: &str) -> Option<String> {
    let mut in_video = false;

    for line in sdp.lines().map(str::trim) {
        if line.starts_with("m=") {
            in_video = line.starts_with("m=video");
            continue;
        }
        if in_video && let Some(control) = line.strip_prefix("a=control:") {
            return Some(control.trim().to_string());
        }
    }

    sdp.lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("a=control:"))
        .map(str::trim)
        .find(|control| *control != "*")
        .map(str::to_string)
}

/// Resolve a control attribute against the request base (RFC 2326 §C.1.1).
///
/// - absolute (`rtsp://…`) → used as-is
/// - `*` → the base itself
/// - relative → appended to the base, with a `/` only if the base lacks one
pub fn resolve_control_url(control: &str, base: &str) -> String {
    if control.starts_with("rtsp://") || control.starts_with("rtsps://") {
        control.to_string()
    } else if control == "*" {
        base.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, control)
    } else {
        format!("{}/{}", base, control)
    }
}

/// Target for SETUP given a DESCRIBE body, defaulting to the base.
pub fn video_setup_target(sdp: &str, base: &str) -> String {
    match find_video_control(sdp) {
        Some(control) => resolve_control_url(&control, base),
        None => base.to_string(),
    }
}
