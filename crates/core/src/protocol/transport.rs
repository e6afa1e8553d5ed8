/// Interleaved channel pair negotiated during SETUP (RFC 2326 §12.39).
///
/// ## Wire format example
///
/// ```text
/// Client → Camera:
///   Transport: RTP/AVP/TCP;unicast;interleaved=0-1
///
/// Camera → Client:
///   Transport: RTP/AVP/TCP;unicast;interleaved=0-1;ssrc=1A2B3C4D
/// ```
///
/// The first channel carries RTP (the media the relay forwards), the second
/// RTCP (discarded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterleavedChannels {
    pub rtp: u8,
    pub rtcp: u8,
}

impl Default for InterleavedChannels {
    fn default() -> Self {
        Self { rtp: 0, rtcp: 1 }
    }
}

impl InterleavedChannels {
    /// Parse the `interleaved=` parameter of a `Transport` header value.
    ///
    /// ## Examples
    ///
    /// ```
    /// use relay::protocol::transport::InterleavedChannels;
    ///
    /// let ch = InterleavedChannels::parse("RTP/AVP/TCP;unicast;interleaved=2-3").unwrap();
    /// assert_eq!(ch.rtp, 2);
    /// assert_eq!(ch.rtcp, 3);
    ///
    /// assert!(InterleavedChannels::parse("RTP/AVP;unicast;client_port=8000-8001").is_none());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        for part in header.split(';') {
            let part = part.trim();
            if let Some(channels) = part.strip_prefix("interleaved=") {
                let mut ids = channels.split('-');
                let rtp: u8 = ids.next()?.trim().parse().ok()?;
                let rtcp: u8 = match ids.next() {
                    Some(id) => id.trim().parse().ok()?,
                    None => rtp.wrapping_add(1),
                };
                return Some(InterleavedChannels { rtp, rtcp });
            }
        }
        None
    }
}
