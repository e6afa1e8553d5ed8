use std::time::Duration;

use crate::error::Result;
use crate::ptz::{ControlEncoder, ControlProtocol, ViscaTransport, check_preset};

/// Minimum spacing between sends of one actuator group (20 commands/s).
pub const MIN_INTERVAL: Duration = Duration::from_millis(50);

/// Highest addressable memory preset.
pub const MAX_PRESET: u8 = 255;

const DEADZONE: f64 = 0.05;
const MAX_PAN_SPEED: i64 = 0x18;
const MAX_TILT_SPEED: i64 = 0x14;
const MAX_ZOOM_SPEED: i64 = 7;
const TERMINATOR: u8 = 0xFF;

const DIR_LEFT: u8 = 0x01;
const DIR_RIGHT: u8 = 0x02;
const DIR_UP: u8 = 0x01;
const DIR_DOWN: u8 = 0x02;
const DIR_STOP: u8 = 0x03;

const ZOOM_STOP: u8 = 0x00;
const ZOOM_TELE: u8 = 0x20;
const ZOOM_WIDE: u8 = 0x30;

/// VISCA-over-IP message type for a command.
const COMMAND_TYPE: [u8; 2] = [0x01, 0x00];

/// VISCA command encoder.
///
/// A VISCA frame is `[0x80 | address] payload.. 0xFF`. Over UDP each frame
/// is prefixed with the VISCA-over-IP header:
///
/// ```text
///  0       1       2       3       4       5       6       7
/// +-------+-------+-------+-------+-------+-------+-------+-------+
/// | 0x01  | 0x00  | payload len   |        sequence number        |
/// +-------+-------+-------+-------+-------+-------+-------+-------+
/// ```
///
/// The sequence number starts at 0 and increments per message. Over TCP
/// the bare frame is sent.
#[derive(Debug)]
pub struct ViscaEncoder {
    address: u8,
    transport: ViscaTransport,
    sequence: u32,
}

impl ViscaEncoder {
    /// `camera_address` is clamped to the daisy-chain range 1-7 so the
    /// header byte stays valid. [`PtzSession::open`](crate::PtzSession::open)
    /// rejects out-of-range addresses before building an encoder.
    pub fn new(camera_address: u8, transport: ViscaTransport) -> Self {
        Self {
            address: camera_address.clamp(1, 7),
            transport,
            sequence: 0,
        }
    }

    /// Sequence number the next UDP message will carry.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    fn frame(&mut self, payload: &[u8]) -> Vec<u8> {
        let frame_len = payload.len() + 2;
        let mut message = Vec::with_capacity(frame_len + 8);

        if self.transport == ViscaTransport::Udp {
            message.extend_from_slice(&COMMAND_TYPE);
            message.extend_from_slice(&(frame_len as u16).to_be_bytes());
            message.extend_from_slice(&self.sequence.to_be_bytes());
            self.sequence = self.sequence.wrapping_add(1);
        }

        message.push(0x80 | self.address);
        message.extend_from_slice(payload);
        message.push(TERMINATOR);
        message
    }
}

impl ControlEncoder for ViscaEncoder {
    fn protocol(&self) -> ControlProtocol {
        ControlProtocol::Visca
    }

    fn min_interval(&self) -> Duration {
        MIN_INTERVAL
    }

    fn pan_tilt(&mut self, pan: f64, tilt: f64) -> Vec<u8> {
        self.frame(&pan_tilt_payload(pan, tilt))
    }

    fn zoom(&mut self, zoom: f64) -> Vec<u8> {
        self.frame(&zoom_payload(zoom))
    }

    fn stop(&mut self) -> Vec<Vec<u8>> {
        vec![
            self.frame(&pan_tilt_payload(0.0, 0.0)),
            self.frame(&zoom_payload(0.0)),
        ]
    }

    fn recall_preset(&mut self, preset: i64) -> Result<Vec<u8>> {
        let preset = check_preset(preset, MAX_PRESET)?;
        Ok(self.frame(&[0x01, 0x04, 0x3F, 0x02, preset]))
    }

    fn save_preset(&mut self, preset: i64) -> Result<Vec<u8>> {
        let preset = check_preset(preset, MAX_PRESET)?;
        Ok(self.frame(&[0x01, 0x04, 0x3F, 0x01, preset]))
    }
}

/// Pan-tilt drive: `01 06 01 VV WW XX YY`.
///
/// `VV`/`WW` are the pan (1-24) and tilt (1-20) speeds, `XX`/`YY` the
/// directions. Inside the deadzone an axis gets the stop direction and
/// speed 1.
pub fn pan_tilt_payload(pan: f64, tilt: f64) -> [u8; 7] {
    let (pan_speed, pan_dir) = if pan < -DEADZONE {
        (axis_speed(pan, MAX_PAN_SPEED), DIR_LEFT)
    } else if pan > DEADZONE {
        (axis_speed(pan, MAX_PAN_SPEED), DIR_RIGHT)
    } else {
        (0x01, DIR_STOP)
    };

    let (tilt_speed, tilt_dir) = if tilt > DEADZONE {
        (axis_speed(tilt, MAX_TILT_SPEED), DIR_UP)
    } else if tilt < -DEADZONE {
        (axis_speed(tilt, MAX_TILT_SPEED), DIR_DOWN)
    } else {
        (0x01, DIR_STOP)
    };

    [0x01, 0x06, 0x01, pan_speed, tilt_speed, pan_dir, tilt_dir]
}

/// Variable zoom: `01 04 07 XY`, `X` = 2 tele / 3 wide, `Y` = speed 0-7.
pub fn zoom_payload(zoom: f64) -> [u8; 4] {
    let command = if zoom > DEADZONE {
        ZOOM_TELE | zoom_speed(zoom)
    } else if zoom < -DEADZONE {
        ZOOM_WIDE | zoom_speed(zoom)
    } else {
        ZOOM_STOP
    };
    [0x01, 0x04, 0x07, command]
}

fn axis_speed(value: f64, max: i64) -> u8 {
    ((value.abs() * max as f64) as i64).clamp(1, max) as u8
}

fn zoom_speed(value: f64) -> u8 {
    ((value.abs() * MAX_ZOOM_SPEED as f64) as i64).clamp(0, MAX_ZOOM_SPEED) as u8
}
