//! Interleaved binary data on the RTSP connection (RFC 2326 §10.12).
//!
//! Once PLAY succeeds with `RTP/AVP/TCP`, the camera writes RTP and RTCP
//! onto the same TCP connection, each chunk framed as:
//!
//! ```text
//! +------+---------+----------------+------------------+
//! | 0x24 | channel | length (u16 BE)| payload (length) |
//! +------+---------+----------------+------------------+
//!   '$'
//! ```
//!
//! Text RTSP responses (for example the answer to a keepalive) can appear
//! between frames. They start with anything other than `$` and are skipped
//! through their blank line and any `Content-Length` body.

use std::io::{self, BufRead, Read};

use bytes::Bytes;

use super::response::{content_length, parse_status_line};

/// First octet of every interleaved frame.
pub const FRAME_MARKER: u8 = b'$';

/// One unit read off the interleaved stream.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// Binary payload on an interleaved channel.
    Data { channel: u8, payload: Bytes },
    /// A text RTSP message that was consumed and discarded.
    Text { status: Option<u16> },
    /// The read deadline passed at a frame boundary with nothing to read.
    Idle,
}

/// Read the next frame.
///
/// A read deadline that expires before the first byte of a frame yields
/// [`Frame::Idle`] without consuming anything, so the caller can check for
/// shutdown and call again. Errors after the first byte desynchronize the
/// stream and are returned as-is.
pub fn read_frame<R: BufRead>(reader: &mut R) -> io::Result<Frame> {
    let first = match reader.fill_buf() {
        Ok([]) => {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "RTSP connection closed",
            ));
        }
        Ok([first, ..]) => *first,
        Err(e) if is_timeout(&e) => return Ok(Frame::Idle),
        Err(e) => return Err(e),
    };

    if first != FRAME_MARKER {
        let status = skip_text_message(reader)?;
        return Ok(Frame::Text { status });
    }

    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    let channel = header[1];
    let length = u16::from_be_bytes([header[2], header[3]]) as usize;

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;

    Ok(Frame::Data {
        channel,
        payload: Bytes::from(payload),
    })
}

/// Consume a text message through its blank line and body.
///
/// Lines that are not headers are tolerated: this only has to get the
/// reader back to a frame boundary.
fn skip_text_message<R: BufRead>(reader: &mut R) -> io::Result<Option<u16>> {
    let mut first_line = String::new();
    reader.read_line(&mut first_line)?;
    let status = parse_status_line(&first_line).ok().map(|(code, _)| code);

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "RTSP connection closed inside text message",
            ));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let body = content_length(&headers);
    if body > 0 {
        io::copy(&mut reader.by_ref().take(body as u64), &mut io::sink())?;
    }

    tracing::trace!(?status, body, "skipped text message in interleaved stream");
    Ok(status)
}

pub fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(channel: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![FRAME_MARKER, channel];
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn reads_data_frame() {
        let mut cursor = Cursor::new(frame(0, b"\x80\x60rtp"));
        let f = read_frame(&mut cursor).unwrap();
        assert_eq!(
            f,
            Frame::Data {
                channel: 0,
                payload: Bytes::from_static(b"\x80\x60rtp")
            }
        );
    }

    #[test]
    fn reads_consecutive_frames_on_different_channels() {
        let mut bytes = frame(0, b"video");
        bytes.extend(frame(1, b"rtcp"));
        let mut cursor = Cursor::new(bytes);

        match read_frame(&mut cursor).unwrap() {
            Frame::Data { channel, payload } => {
                assert_eq!(channel, 0);
                assert_eq!(&payload[..], b"video");
            }
            other => panic!("unexpected {other:?}"),
        }
        match read_frame(&mut cursor).unwrap() {
            Frame::Data { channel, payload } => {
                assert_eq!(channel, 1);
                assert_eq!(&payload[..], b"rtcp");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn skips_keepalive_response_between_frames() {
        let mut bytes = b"RTSP/1.0 200 OK\r\nCSeq: 7\r\nContent-Length: 4\r\n\r\nbody".to_vec();
        bytes.extend(frame(0, b"after"));
        let mut cursor = Cursor::new(bytes);

        assert_eq!(
            read_frame(&mut cursor).unwrap(),
            Frame::Text { status: Some(200) }
        );
        match read_frame(&mut cursor).unwrap() {
            Frame::Data { channel, payload } => {
                assert_eq!(channel, 0);
                assert_eq!(&payload[..], b"after");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn eof_is_an_error() {
        let mut cursor = Cursor::new(Vec::new());
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut bytes = frame(0, b"full payload");
        bytes.truncate(8);
        assert!(read_frame(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn empty_payload_is_allowed() {
        let mut cursor = Cursor::new(frame(0, b""));
        assert_eq!(
            read_frame(&mut cursor).unwrap(),
            Frame::Data {
                channel: 0,
                payload: Bytes::new()
            }
        );
    }
}
