//! Integration tests: camera feed through the hub to viewers, and viewer
//! control input through the hub to the camera.

mod common;

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{Chunk, FakeCamera, Script, rtp, wait_for};
use parking_lot::Mutex;
use relay::hub::{CandidateCallback, MediaSession, MediaSessionFactory};
use relay::ptz::link::ControlLink;
use relay::ptz::visca::ViscaEncoder;
use relay::{
    ControlProtocol, HubConfig, IngestClient, IngestConfig, PtzConfig, PtzControl, PtzSession,
    RelayHub, ViscaTransport,
};
use serde_json::{Value, json};

#[derive(Default)]
struct RecordingMedia {
    written: Mutex<Vec<Vec<u8>>>,
}

impl MediaSession for RecordingMedia {
    fn create_offer(&self) -> relay::Result<String> {
        Ok("v=0\r\n".to_string())
    }

    fn set_answer(&self, _sdp: &str) -> relay::Result<()> {
        Ok(())
    }

    fn add_remote_candidate(&self, _candidate: &str, _mid: &str, _index: u16) -> relay::Result<()> {
        Ok(())
    }

    fn write_media_packet(&self, packet: &[u8]) -> relay::Result<()> {
        self.written.lock().push(packet.to_vec());
        Ok(())
    }

    fn close(&self) {}
}

#[derive(Default)]
struct RecordingFactory {
    sessions: Mutex<Vec<Arc<RecordingMedia>>>,
}

impl MediaSessionFactory for RecordingFactory {
    fn create(&self, _on_candidate: CandidateCallback) -> relay::Result<Arc<dyn MediaSession>> {
        let media = Arc::new(RecordingMedia::default());
        self.sessions.lock().push(Arc::clone(&media));
        Ok(media)
    }
}

#[derive(Default)]
struct RecordingLink {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl ControlLink for RecordingLink {
    fn send(&self, message: &[u8]) -> relay::Result<()> {
        self.sent.lock().push(message.to_vec());
        Ok(())
    }
}

fn envelope(kind: &str, payload: Value) -> Vec<u8> {
    json!({ "type": kind, "payload": payload }).to_string().into_bytes()
}

fn next_message(outbound: &crossbeam_channel::Receiver<String>) -> Value {
    let text = outbound
        .recv_timeout(Duration::from_secs(2))
        .expect("outbound message");
    serde_json::from_str(&text).unwrap()
}

#[test]
fn camera_packets_reach_the_viewer_in_order() {
    let rtcp = vec![0x81, 0xC8, 0x00, 0x06];
    let camera = FakeCamera::start(vec![Script::with_chunks(
        (1..=5)
            .flat_map(|n| [Chunk::Frame(0, rtp(n)), Chunk::Frame(1, rtcp.clone())])
            .collect(),
    )]);
    let factory = Arc::new(RecordingFactory::default());
    let hub = RelayHub::new(
        HubConfig {
            rtsp_url: Some(camera.url()),
            ..HubConfig::default()
        },
        None,
        factory.clone(),
    );

    let viewer = hub.connect().unwrap();
    let status = next_message(&viewer.outbound);
    assert_eq!(status["type"], "status");
    assert_eq!(status["payload"]["camera_connected"], false);
    assert_eq!(next_message(&viewer.outbound)["type"], "offer");

    let client = IngestClient::connect(&camera.url(), IngestConfig::default()).unwrap();
    hub.attach_ingest(&client).unwrap();
    assert!(hub.camera_connected());

    let media = Arc::clone(&factory.sessions.lock()[0]);
    assert!(wait_for(Duration::from_secs(3), || media.written.lock().len() >= 5));
    thread::sleep(Duration::from_millis(100));

    let expected: Vec<Vec<u8>> = (1..=5).map(rtp).collect();
    assert_eq!(*media.written.lock(), expected);
    assert!(!media.written.lock().contains(&rtcp));
    assert_eq!(hub.packets_relayed(), 5);

    hub.shutdown();
    client.close();
}

#[test]
fn viewer_command_then_stop_drives_the_camera() {
    let link = Arc::new(RecordingLink::default());
    let ptz = Arc::new(PtzSession::with_link(
        Box::new(ViscaEncoder::new(1, ViscaTransport::Tcp)),
        link.clone(),
    ));
    let hub = RelayHub::new(
        HubConfig::default(),
        Some(ptz.clone() as Arc<dyn PtzControl>),
        Arc::new(RecordingFactory::default()),
    );
    let viewer = hub.connect().unwrap();
    let status = next_message(&viewer.outbound);
    assert_eq!(status["payload"]["control_protocol"], "visca");

    hub.handle_message(
        &viewer.id,
        &envelope("ptz_command", json!({ "pan": 0.5, "tilt": 0.0 })),
    )
    .unwrap();
    hub.handle_message(&viewer.id, &envelope("ptz_stop", json!({})))
        .unwrap();
    thread::sleep(Duration::from_millis(150));

    assert_eq!(
        *link.sent.lock(),
        vec![
            vec![0x81, 0x01, 0x06, 0x01, 0x0C, 0x01, 0x02, 0x03, 0xFF],
            vec![0x81, 0x01, 0x06, 0x01, 0x01, 0x01, 0x03, 0x03, 0xFF],
            vec![0x81, 0x01, 0x04, 0x07, 0x00, 0xFF],
        ]
    );

    hub.shutdown();
    ptz.close();
}

#[test]
fn out_of_range_preset_only_reaches_the_sender() {
    let link = Arc::new(RecordingLink::default());
    let ptz = Arc::new(PtzSession::with_link(
        Box::new(ViscaEncoder::new(1, ViscaTransport::Tcp)),
        link.clone(),
    ));
    let hub = RelayHub::new(
        HubConfig::default(),
        Some(ptz as Arc<dyn PtzControl>),
        Arc::new(RecordingFactory::default()),
    );
    let sender = hub.connect().unwrap();
    let other = hub.connect().unwrap();
    for handle in [&sender, &other] {
        next_message(&handle.outbound);
        next_message(&handle.outbound);
    }

    hub.handle_message(
        &sender.id,
        &envelope("ptz_preset", json!({ "action": "recall", "preset_number": 300 })),
    )
    .unwrap();

    let error = next_message(&sender.outbound);
    assert_eq!(error["type"], "error");
    assert_eq!(error["payload"]["code"], "VISCA_ERROR");
    assert!(other.outbound.try_recv().is_err());
    assert!(link.sent.lock().is_empty());
}

#[test]
fn panasonic_preset_recall_hits_the_cgi_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (line_tx, line_rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else { return };
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        loop {
            let mut header = String::new();
            if reader.read_line(&mut header).unwrap() == 0 || header.trim().is_empty() {
                break;
            }
        }
        let _ = line_tx.send(request_line.trim_end().to_string());
        let _ = writer.write_all(
            b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
    });

    let ptz = Arc::new(
        PtzSession::open(&PtzConfig::new(ControlProtocol::Panasonic, addr.to_string())).unwrap(),
    );
    let hub = RelayHub::new(
        HubConfig::default(),
        Some(ptz.clone() as Arc<dyn PtzControl>),
        Arc::new(RecordingFactory::default()),
    );
    let viewer = hub.connect().unwrap();
    assert_eq!(
        next_message(&viewer.outbound)["payload"]["control_protocol"],
        "panasonic"
    );

    hub.handle_message(
        &viewer.id,
        &envelope("ptz_preset", json!({ "action": "recall", "preset_number": 7 })),
    )
    .unwrap();

    let request_line = line_rx.recv_timeout(Duration::from_secs(3)).unwrap();
    assert_eq!(request_line, "GET /cgi-bin/aw_ptz?cmd=%23R07&res=1 HTTP/1.1");

    hub.shutdown();
    ptz.close();
}

#[test]
fn visca_udp_datagrams_carry_the_ip_header() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let config = PtzConfig {
        transport: ViscaTransport::Udp,
        ..PtzConfig::new(ControlProtocol::Visca, receiver.local_addr().unwrap().to_string())
    };
    let ptz = PtzSession::open(&config).unwrap();

    ptz.recall_preset(3).unwrap();
    ptz.save_preset(4).unwrap();

    let mut buf = [0u8; 64];
    let n = receiver.recv(&mut buf).unwrap();
    assert_eq!(
        &buf[..n],
        &[0x01, 0x00, 0x00, 0x07, 0, 0, 0, 0, 0x81, 0x01, 0x04, 0x3F, 0x02, 0x03, 0xFF]
    );
    let n = receiver.recv(&mut buf).unwrap();
    assert_eq!(
        &buf[..n],
        &[0x01, 0x00, 0x00, 0x07, 0, 0, 0, 1, 0x81, 0x01, 0x04, 0x3F, 0x01, 0x04, 0xFF]
    );

    ptz.close();
}

#[test]
fn closed_visca_udp_session_sends_no_preset() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();
    let config = PtzConfig {
        transport: ViscaTransport::Udp,
        ..PtzConfig::new(ControlProtocol::Visca, receiver.local_addr().unwrap().to_string())
    };
    let ptz = PtzSession::open(&config).unwrap();
    ptz.close();

    assert!(matches!(ptz.recall_preset(3), Err(relay::RelayError::ShutDown)));
    let mut buf = [0u8; 64];
    assert!(receiver.recv(&mut buf).is_err());
}
