use std::io::{BufRead, Read};

use crate::error::{ParseErrorKind, RelayError, Result};

/// Largest response body accepted. A session description is a few KiB.
pub const MAX_BODY: usize = 64 * 1024;

/// A parsed RTSP response (RFC 2326 §7).
///
/// RTSP responses follow HTTP/1.1 syntax:
///
/// ```text
/// RTSP-Version SP Status-Code SP Reason-Phrase CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body of Content-Length bytes]
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2.
#[derive(Debug)]
pub struct RtspResponse {
    pub status_code: u16,
    pub reason: String,
    /// Headers as ordered (name, value) pairs. Names are stored as-received;
    /// lookups via [`get_header`](Self::get_header) are case-insensitive.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RtspResponse {
    /// Read one complete response (status line, headers, body) from `reader`.
    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Self> {
        let mut status_line = String::new();
        if reader.read_line(&mut status_line)? == 0 {
            return Err(RelayError::Parse {
                kind: ParseErrorKind::EmptyResponse,
            });
        }
        let (status_code, reason) = parse_status_line(&status_line)?;

        let headers = read_headers(reader)?;

        let mut response = RtspResponse {
            status_code,
            reason,
            headers,
            body: String::new(),
        };

        let length = response.content_length();
        if length > MAX_BODY {
            return Err(RelayError::Parse {
                kind: ParseErrorKind::BodyTooLarge,
            });
        }
        if length > 0 {
            let mut body = Vec::with_capacity(length);
            reader.by_ref().take(length as u64).read_to_end(&mut body)?;
            if body.len() < length {
                return Err(RelayError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed inside RTSP body",
                )));
            }
            response.body = String::from_utf8_lossy(&body).into_owned();
        }

        Ok(response)
    }

    /// Whether the status code is in the 2xx success class.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// `Content-Length` header, 0 when absent or malformed (RFC 2326 §12.14).
    pub fn content_length(&self) -> usize {
        content_length(&self.headers)
    }

    /// Session identifier without its `;timeout=` suffix (RFC 2326 §12.37).
    ///
    /// `"47112344;timeout=60"` -> `"47112344"`
    pub fn session_id(&self) -> Option<&str> {
        self.get_header("Session")
            .map(|s| s.split(';').next().unwrap_or(s).trim())
            .filter(|s| !s.is_empty())
    }
}

/// Parse `RTSP/1.0 200 OK` into its code and reason phrase.
pub fn parse_status_line(line: &str) -> Result<(u16, String)> {
    let mut parts = line.trim().splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("RTSP/") {
        return Err(RelayError::Parse {
            kind: ParseErrorKind::InvalidStatusLine,
        });
    }
    let code = parts
        .next()
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or(RelayError::Parse {
            kind: ParseErrorKind::InvalidStatusLine,
        })?;
    let reason = parts.next().unwrap_or("").to_string();
    Ok((code, reason))
}

/// Read header lines up to and including the terminating blank line.
pub fn read_headers<R: BufRead>(reader: &mut R) -> Result<Vec<(String, String)>> {
    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(RelayError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed inside RTSP headers",
            )));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }

        let colon_pos = line.find(':').ok_or(RelayError::Parse {
            kind: ParseErrorKind::InvalidHeader,
        })?;

        let name = line[..colon_pos].trim().to_string();
        let value = line[colon_pos + 1..].trim().to_string();
        headers.push((name, value));
    }
    Ok(headers)
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

pub(crate) fn content_length(headers: &[(String, String)]) -> usize {
    find_header(headers, "Content-Length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_response_without_body() {
        let raw = "RTSP/1.0 200 OK\r\nCSeq: 1\r\nPublic: OPTIONS, DESCRIBE\r\n\r\n";
        let resp = RtspResponse::read_from(&mut Cursor::new(raw)).unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.reason, "OK");
        assert!(resp.is_success());
        assert_eq!(resp.get_header("cseq"), Some("1"));
        assert!(resp.body.is_empty());
    }

    #[test]
    fn read_response_with_body() {
        let raw = "RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Length: 5\r\n\r\nv=0\r\nTRAILING";
        let mut cursor = Cursor::new(raw);
        let resp = RtspResponse::read_from(&mut cursor).unwrap();
        assert_eq!(resp.body, "v=0\r\n");

        // The reader is left positioned right after the body.
        let mut rest = String::new();
        cursor.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "TRAILING");
    }

    #[test]
    fn session_id_strips_timeout() {
        let raw = "RTSP/1.0 200 OK\r\nSession: 47112344;timeout=60\r\n\r\n";
        let resp = RtspResponse::read_from(&mut Cursor::new(raw)).unwrap();
        assert_eq!(resp.session_id(), Some("47112344"));
    }

    #[test]
    fn non_success_status() {
        let raw = "RTSP/1.0 401 Unauthorized\r\nCSeq: 3\r\n\r\n";
        let resp = RtspResponse::read_from(&mut Cursor::new(raw)).unwrap();
        assert_eq!(resp.status_code, 401);
        assert!(!resp.is_success());
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(RtspResponse::read_from(&mut Cursor::new("")).is_err());
    }

    #[test]
    fn garbage_status_line_is_an_error() {
        assert!(parse_status_line("HELLO WORLD").is_err());
        assert!(parse_status_line("RTSP/1.0 abc OK").is_err());
    }

    #[test]
    fn oversized_body_is_rejected_before_reading() {
        let raw = "RTSP/1.0 200 OK\r\nContent-Length: 4294967295\r\n\r\nv=0";
        assert!(matches!(
            RtspResponse::read_from(&mut Cursor::new(raw)),
            Err(RelayError::Parse {
                kind: ParseErrorKind::BodyTooLarge
            })
        ));

        let raw = format!("RTSP/1.0 200 OK\r\nContent-Length: {}\r\n\r\n", MAX_BODY + 1);
        assert!(matches!(
            RtspResponse::read_from(&mut Cursor::new(raw)),
            Err(RelayError::Parse {
                kind: ParseErrorKind::BodyTooLarge
            })
        ));
    }

    #[test]
    fn truncated_body_is_an_error() {
        let raw = "RTSP/1.0 200 OK\r\nContent-Length: 50\r\n\r\nv=0\r\n";
        assert!(matches!(
            RtspResponse::read_from(&mut Cursor::new(raw)),
            Err(RelayError::Io(_))
        ));
    }

    #[test]
    fn header_without_colon_is_an_error() {
        let raw = "RTSP/1.0 200 OK\r\nNotAHeader\r\n\r\n";
        assert!(RtspResponse::read_from(&mut Cursor::new(raw)).is_err());
    }
}
