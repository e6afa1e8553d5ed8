//! Scripted loopback RTSP camera shared by the integration tests.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const SESSION_ID: &str = "FAKE1234";

pub const VIDEO_SDP: &str = "v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=Fake Camera\r\n\
t=0 0\r\n\
m=audio 0 RTP/AVP 0\r\n\
a=control:trackID=0\r\n\
m=video 0 RTP/AVP 96\r\n\
a=rtpmap:96 H264/90000\r\n\
a=control:trackID=1\r\n";

/// Something the camera writes after PLAY.
#[derive(Clone)]
pub enum Chunk {
    /// `$`-framed data on a channel.
    Frame(u8, Vec<u8>),
    /// Raw bytes, e.g. a stray text response.
    Raw(Vec<u8>),
    Pause(Duration),
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum After {
    /// Keep answering requests until the client hangs up.
    Hold,
    /// Drop the connection.
    Close,
}

/// Behaviour of one accepted connection.
#[derive(Clone)]
pub struct Script {
    pub sdp: String,
    pub transport: String,
    pub setup_status: u16,
    pub chunks: Vec<Chunk>,
    pub after: After,
    /// Written verbatim in place of the DESCRIBE answer, then the
    /// connection is dropped.
    pub describe_raw: Option<String>,
    /// Hang up as soon as the connection is accepted.
    pub refuse: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            sdp: VIDEO_SDP.to_string(),
            transport: "RTP/AVP/TCP;unicast;interleaved=0-1".to_string(),
            setup_status: 200,
            chunks: Vec::new(),
            after: After::Hold,
            describe_raw: None,
            refuse: false,
        }
    }
}

impl Script {
    pub fn with_chunks(chunks: Vec<Chunk>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub connection: usize,
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Loopback RTSP server that plays one [`Script`] per accepted connection.
/// The last script repeats for any further connections.
pub struct FakeCamera {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
    connections: Arc<AtomicUsize>,
}

impl FakeCamera {
    pub fn start(scripts: Vec<Script>) -> Self {
        assert!(!scripts.is_empty());
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        {
            let requests = Arc::clone(&requests);
            let connections = Arc::clone(&connections);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    let index = connections.fetch_add(1, Ordering::SeqCst);
                    let script = scripts[index.min(scripts.len() - 1)].clone();
                    let requests = Arc::clone(&requests);
                    thread::spawn(move || serve(stream, index, script, requests));
                }
            });
        }

        Self {
            addr,
            requests,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("rtsp://{}/live", self.addr)
    }

    pub fn url_with_credentials(&self, user: &str, password: &str) -> String {
        format!("rtsp://{user}:{password}@{}/live", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }

    pub fn methods(&self, connection: usize) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.connection == connection)
            .map(|r| r.method)
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn serve(stream: TcpStream, connection: usize, script: Script, log: Arc<Mutex<Vec<Recorded>>>) {
    if script.refuse {
        return;
    }
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    while let Some(request) = read_request(&mut reader, connection) {
        let cseq = request.header("CSeq").unwrap_or("0").to_string();
        let method = request.method.clone();
        log.lock().push(request);

        let ok = match method.as_str() {
            "OPTIONS" => respond(
                &mut writer,
                200,
                &cseq,
                &[("Public", "OPTIONS, DESCRIBE, SETUP, PLAY, GET_PARAMETER, TEARDOWN")],
                "",
            ),
            "DESCRIBE" if script.describe_raw.is_some() => {
                let raw = script.describe_raw.as_deref().unwrap_or_default();
                let _ = writer.write_all(raw.replace("{cseq}", &cseq).as_bytes());
                return;
            }
            "DESCRIBE" => respond(
                &mut writer,
                200,
                &cseq,
                &[("Content-Type", "application/sdp")],
                &script.sdp,
            ),
            "SETUP" if script.setup_status == 200 => {
                let session = format!("{SESSION_ID};timeout=60");
                respond(
                    &mut writer,
                    200,
                    &cseq,
                    &[
                        ("Session", session.as_str()),
                        ("Transport", script.transport.as_str()),
                    ],
                    "",
                )
            }
            "SETUP" => respond(&mut writer, script.setup_status, &cseq, &[], ""),
            "PLAY" => {
                let ok = respond(&mut writer, 200, &cseq, &[("Session", SESSION_ID)], "");
                let ok = ok && play(&mut writer, &script.chunks);
                if script.after == After::Close {
                    return;
                }
                ok
            }
            "GET_PARAMETER" => respond(&mut writer, 200, &cseq, &[("Session", SESSION_ID)], ""),
            "TEARDOWN" => {
                let _ = respond(&mut writer, 200, &cseq, &[], "");
                return;
            }
            _ => respond(&mut writer, 501, &cseq, &[], ""),
        };
        if !ok {
            return;
        }
    }
}

fn read_request(reader: &mut impl BufRead, connection: usize) -> Option<Recorded> {
    let mut line = String::new();
    if reader.read_line(&mut line).ok()? == 0 {
        return None;
    }
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let uri = parts.next()?.to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Some(Recorded {
        connection,
        method,
        uri,
        headers,
    })
}

fn respond(
    writer: &mut TcpStream,
    status: u16,
    cseq: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> bool {
    let reason = match status {
        200 => "OK",
        454 => "Session Not Found",
        _ => "Error",
    };
    let mut response = format!("RTSP/1.0 {status} {reason}\r\nCSeq: {cseq}\r\n");
    for (name, value) in headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    if !body.is_empty() {
        response.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    response.push_str("\r\n");
    response.push_str(body);
    writer.write_all(response.as_bytes()).is_ok()
}

fn play(writer: &mut TcpStream, chunks: &[Chunk]) -> bool {
    for chunk in chunks {
        let ok = match chunk {
            Chunk::Frame(channel, payload) => {
                let mut frame = vec![b'$', *channel];
                frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
                frame.extend_from_slice(payload);
                writer.write_all(&frame).is_ok()
            }
            Chunk::Raw(bytes) => writer.write_all(bytes).is_ok(),
            Chunk::Pause(duration) => {
                thread::sleep(*duration);
                true
            }
        };
        if !ok {
            return false;
        }
    }
    true
}

/// RTP-looking payload tagged with `n` so ordering can be checked.
pub fn rtp(n: u8) -> Vec<u8> {
    let mut packet = vec![0x80, 0x60, 0x00, n, 0, 0, 0, 0, 0xAA, 0xBB, 0xCC, 0xDD];
    packet.extend_from_slice(&[n; 20]);
    packet
}

pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}
