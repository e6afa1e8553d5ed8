use std::io::{BufReader, Write};
use std::net::{Shutdown as NetShutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{ParseErrorKind, RelayError, Result};
use crate::ingest::IngestConfig;
use crate::protocol::sdp;
use crate::protocol::transport::InterleavedChannels;
use crate::protocol::{RtspRequest, RtspResponse, RtspUrl};
use crate::shutdown::Shutdown;

/// Read buffer for the interleaved stream; holds several full-size frames.
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Write half of an RTSP connection.
///
/// Owns the per-connection request state: the `CSeq` counter, the session
/// token once SETUP assigns one, and the Basic auth header. Every request
/// leaves through [`send`](Self::send), so each carries a strictly
/// increasing `CSeq` (RFC 2326 §12.17).
pub struct RequestWriter {
    stream: TcpStream,
    cseq: u32,
    session: Option<String>,
    authorization: Option<String>,
    user_agent: String,
}

impl RequestWriter {
    pub(crate) fn new(stream: TcpStream, url: &RtspUrl, user_agent: &str) -> Self {
        Self {
            stream,
            cseq: 0,
            session: None,
            authorization: url.credentials().map(|c| c.basic_auth()),
            user_agent: user_agent.to_string(),
        }
    }

    /// Write `request` with CSeq, User-Agent, Authorization and Session
    /// filled in. Returns the CSeq used.
    pub fn send(&mut self, request: RtspRequest) -> Result<u32> {
        self.cseq = self.cseq.wrapping_add(1);

        let mut headers = vec![
            ("CSeq".to_string(), self.cseq.to_string()),
            ("User-Agent".to_string(), self.user_agent.clone()),
        ];
        if let Some(auth) = &self.authorization {
            headers.push(("Authorization".to_string(), auth.clone()));
        }
        if let Some(session) = &self.session {
            headers.push(("Session".to_string(), session.clone()));
        }
        headers.extend(request.headers);

        let request = RtspRequest {
            method: request.method,
            uri: request.uri,
            headers,
        };

        tracing::trace!(method = request.method, uri = %request.uri, cseq = self.cseq, "request");
        self.stream.write_all(request.serialize().as_bytes())?;
        Ok(self.cseq)
    }

    pub fn set_write_timeout(&self, timeout: Duration) {
        let _ = self.stream.set_write_timeout(Some(timeout));
    }

    /// Close both directions of the socket, waking any blocked reader.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(NetShutdown::Both);
    }
}

/// A freshly negotiated RTSP connection, playing and ready to be read.
pub struct RtspConnection {
    writer: RequestWriter,
    reader: BufReader<TcpStream>,
    base: String,
    channels: InterleavedChannels,
}

impl RtspConnection {
    /// Connect and run OPTIONS → DESCRIBE → SETUP → PLAY.
    ///
    /// Any I/O fault or non-success status aborts the attempt. The shutdown
    /// signal is checked between steps so a pending shutdown never waits on
    /// more than one request.
    pub fn establish(url: &RtspUrl, config: &IngestConfig, shutdown: &Shutdown) -> Result<Self> {
        let addr = url.authority().to_socket_addrs()?.next().ok_or_else(|| {
            RelayError::InvalidUrl(format!("{}: host did not resolve", url.redacted()))
        })?;

        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(config.write_timeout))?;
        stream.set_read_timeout(Some(config.request_timeout))?;

        let reader = BufReader::with_capacity(READ_BUFFER_SIZE, stream.try_clone()?);

        let mut conn = RtspConnection {
            writer: RequestWriter::new(stream, url, &config.user_agent),
            reader,
            base: url.as_str().to_string(),
            channels: InterleavedChannels::default(),
        };

        tracing::debug!(url = %url, %addr, "RTSP connected, negotiating");
        conn.negotiate(shutdown)?;

        conn.reader.get_ref().set_read_timeout(Some(config.read_poll))?;
        Ok(conn)
    }

    fn negotiate(&mut self, shutdown: &Shutdown) -> Result<()> {
        let base = self.base.clone();

        check_shutdown(shutdown)?;
        self.expect_success(RtspRequest::options(&base))?;

        check_shutdown(shutdown)?;
        let describe = self.expect_success(RtspRequest::describe(&base))?;
        if describe.body.trim().is_empty() {
            return Err(RelayError::Parse {
                kind: ParseErrorKind::MissingMediaDescription,
            });
        }
        let target = sdp::video_setup_target(&describe.body, &base);

        check_shutdown(shutdown)?;
        let setup = self.expect_success(RtspRequest::setup_interleaved(&target))?;
        let session = setup.session_id().ok_or(RelayError::MissingSession)?;
        self.writer.session = Some(session.to_string());
        if let Some(channels) = setup
            .get_header("Transport")
            .and_then(InterleavedChannels::parse)
        {
            self.channels = channels;
        }

        check_shutdown(shutdown)?;
        self.expect_success(RtspRequest::play(&base))?;

        tracing::debug!(
            setup_target = %target,
            session = %session,
            rtp_channel = self.channels.rtp,
            "RTSP session playing"
        );
        Ok(())
    }

    fn expect_success(&mut self, request: RtspRequest) -> Result<RtspResponse> {
        let method = request.method;
        let cseq = self.writer.send(request)?;
        let response = RtspResponse::read_from(&mut self.reader)?;

        tracing::debug!(method, cseq, status = response.status_code, "response");

        if !response.is_success() {
            return Err(RelayError::Status {
                method,
                code: response.status_code,
            });
        }
        Ok(response)
    }

    pub fn into_parts(self) -> (RequestWriter, BufReader<TcpStream>, InterleavedChannels) {
        (self.writer, self.reader, self.channels)
    }
}

fn check_shutdown(shutdown: &Shutdown) -> Result<()> {
    if shutdown.is_triggered() {
        Err(RelayError::ShutDown)
    } else {
        Ok(())
    }
}
