use std::io::{self, Write};
use std::net::{Shutdown as NetShutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{RelayError, Result};

/// Outbound path to a camera's control endpoint.
///
/// This layer is message-only: it does not know about axes, throttling or
/// protocol framing. Each [`send`](Self::send) delivers one complete
/// message produced by a [`ControlEncoder`](super::ControlEncoder).
pub trait ControlLink: Send + Sync {
    fn send(&self, message: &[u8]) -> Result<()>;

    /// Release the underlying connection. Later sends fail.
    fn close(&self) {}
}

fn resolve(address: &str) -> Result<SocketAddr> {
    address
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| RelayError::InvalidUrl(format!("{address}: host did not resolve")))
}

fn link_closed() -> RelayError {
    io::Error::new(io::ErrorKind::NotConnected, "control link closed").into()
}

/// Datagram link for VISCA over IP.
pub struct UdpLink {
    socket: Mutex<Option<UdpSocket>>,
}

impl UdpLink {
    /// Bind an ephemeral socket and fix its peer to `address`.
    pub fn connect(address: &str, write_timeout: Duration) -> Result<Self> {
        let peer = resolve(address)?;
        let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local)?;
        socket.connect(peer)?;
        socket.set_write_timeout(Some(write_timeout))?;
        tracing::debug!(%peer, "VISCA UDP link ready");
        Ok(Self {
            socket: Mutex::new(Some(socket)),
        })
    }
}

impl ControlLink for UdpLink {
    fn send(&self, message: &[u8]) -> Result<()> {
        let socket = self.socket.lock();
        socket.as_ref().ok_or_else(link_closed)?.send(message)?;
        Ok(())
    }

    fn close(&self) {
        self.socket.lock().take();
    }
}

/// Stream link for bare VISCA frames.
pub struct TcpLink {
    stream: Mutex<TcpStream>,
}

impl TcpLink {
    pub fn connect(address: &str, connect_timeout: Duration, write_timeout: Duration) -> Result<Self> {
        let peer = resolve(address)?;
        let stream = TcpStream::connect_timeout(&peer, connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(write_timeout))?;
        tracing::debug!(%peer, "VISCA TCP link ready");
        Ok(Self {
            stream: Mutex::new(stream),
        })
    }
}

impl ControlLink for TcpLink {
    fn send(&self, message: &[u8]) -> Result<()> {
        self.stream.lock().write_all(message)?;
        Ok(())
    }

    fn close(&self) {
        let _ = self.stream.lock().shutdown(NetShutdown::Both);
    }
}

/// Panasonic `aw_ptz` CGI endpoint.
///
/// Each message becomes `GET http://<address>/cgi-bin/aw_ptz?cmd=<message>&res=1`
/// with the command percent-encoded (`#` travels as `%23`).
pub struct HttpCgiLink {
    client: reqwest::blocking::Client,
    endpoint: String,
    closed: AtomicBool,
}

impl HttpCgiLink {
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(RelayError::InvalidUrl("camera address is required".to_string()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("http://{address}/cgi-bin/aw_ptz"),
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ControlLink for HttpCgiLink {
    fn send(&self, message: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(link_closed());
        }
        let command = String::from_utf8_lossy(message);
        self.client
            .get(&self.endpoint)
            .query(&[("cmd", command.as_ref()), ("res", "1")])
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
