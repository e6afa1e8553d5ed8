use bytes::Bytes;

/// One RTP packet lifted out of the interleaved RTSP stream.
///
/// The payload is never inspected. Cloning shares the underlying buffer, so
/// fanning a packet out to many viewers costs a reference count per viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket(Bytes);

impl MediaPacket {
    pub fn new(data: Bytes) -> Self {
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for MediaPacket {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<&'static [u8]> for MediaPacket {
    fn from(data: &'static [u8]) -> Self {
        Self(Bytes::from_static(data))
    }
}
