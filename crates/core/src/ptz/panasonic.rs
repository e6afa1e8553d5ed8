use std::time::Duration;

use crate::error::Result;
use crate::ptz::{ControlEncoder, ControlProtocol, check_preset};

pub const MIN_INTERVAL: Duration = Duration::from_millis(50);

pub const MAX_PRESET: u8 = 99;

/// Two-digit speed value meaning "no motion".
pub const STOP_VALUE: u8 = 50;

const DEADZONE: f64 = 0.05;

/// Panasonic AW-series CGI command encoder.
///
/// Messages are the ASCII `cmd` parameter of
/// `GET /cgi-bin/aw_ptz?cmd=<cmd>&res=1`:
///
/// | Command | Meaning |
/// |---------|---------|
/// | `#PTSxxyy` | pan speed `xx`, tilt speed `yy` |
/// | `#Zxx` | zoom speed `xx` |
/// | `#Rnn` | recall preset `nn` |
/// | `#Mnn` | save preset `nn` |
///
/// Speeds run from `01` (full negative) through `50` (stop) to `99`
/// (full positive).
#[derive(Debug, Default)]
pub struct PanasonicEncoder;

impl PanasonicEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl ControlEncoder for PanasonicEncoder {
    fn protocol(&self) -> ControlProtocol {
        ControlProtocol::Panasonic
    }

    fn min_interval(&self) -> Duration {
        MIN_INTERVAL
    }

    fn pan_tilt(&mut self, pan: f64, tilt: f64) -> Vec<u8> {
        format!("#PTS{:02}{:02}", speed_to_value(pan), speed_to_value(tilt)).into_bytes()
    }

    fn zoom(&mut self, zoom: f64) -> Vec<u8> {
        format!("#Z{:02}", speed_to_value(zoom)).into_bytes()
    }

    fn stop(&mut self) -> Vec<Vec<u8>> {
        vec![self.pan_tilt(0.0, 0.0), self.zoom(0.0)]
    }

    fn recall_preset(&mut self, preset: i64) -> Result<Vec<u8>> {
        let preset = check_preset(preset, MAX_PRESET)?;
        Ok(format!("#R{preset:02}").into_bytes())
    }

    fn save_preset(&mut self, preset: i64) -> Result<Vec<u8>> {
        let preset = check_preset(preset, MAX_PRESET)?;
        Ok(format!("#M{preset:02}").into_bytes())
    }
}

/// Map a normalized speed onto the `01..=99` scale.
pub fn speed_to_value(value: f64) -> u8 {
    let value = value.clamp(-1.0, 1.0);
    if value > -DEADZONE && value < DEADZONE {
        return STOP_VALUE;
    }
    (f64::from(STOP_VALUE) + value * 49.0) as u8
}
