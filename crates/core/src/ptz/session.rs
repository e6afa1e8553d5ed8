use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{RelayError, Result};
use crate::ptz::link::{ControlLink, HttpCgiLink, TcpLink, UdpLink};
use crate::ptz::panasonic::PanasonicEncoder;
use crate::ptz::throttle::Throttle;
use crate::ptz::visca::ViscaEncoder;
use crate::ptz::{ControlEncoder, ControlProtocol, PtzConfig, PtzControl, ViscaTransport};

type SharedEncoder = Arc<Mutex<Box<dyn ControlEncoder>>>;

/// One camera's control channel.
///
/// Pan/tilt and zoom are throttled independently; stop and presets go
/// straight to the wire. Every send is fire-and-forget: a failed delivery
/// is logged and the session carries on.
pub struct PtzSession {
    protocol: ControlProtocol,
    encoder: SharedEncoder,
    link: Arc<dyn ControlLink>,
    pan_tilt: Throttle<(f64, f64)>,
    zoom: Throttle<f64>,
    closed: AtomicBool,
}

impl PtzSession {
    /// Open the control connection described by `config`.
    ///
    /// Fails when the VISCA camera address is outside 1-7 or the endpoint
    /// cannot be resolved or opened.
    pub fn open(config: &PtzConfig) -> Result<Self> {
        if config.protocol == ControlProtocol::Visca && !(1..=7).contains(&config.camera_address) {
            return Err(RelayError::InvalidCameraAddress(config.camera_address));
        }
        let (encoder, link): (Box<dyn ControlEncoder>, Arc<dyn ControlLink>) = match config.protocol {
            ControlProtocol::Visca => {
                let link: Arc<dyn ControlLink> = match config.transport {
                    ViscaTransport::Udp => Arc::new(UdpLink::connect(&config.address, config.write_timeout)?),
                    ViscaTransport::Tcp => Arc::new(TcpLink::connect(
                        &config.address,
                        config.connect_timeout,
                        config.write_timeout,
                    )?),
                };
                (
                    Box::new(ViscaEncoder::new(config.camera_address, config.transport)),
                    link,
                )
            }
            ControlProtocol::Panasonic => (
                Box::new(PanasonicEncoder::new()),
                Arc::new(HttpCgiLink::new(&config.address, config.http_timeout)?),
            ),
        };

        tracing::info!(
            protocol = %config.protocol,
            address = %config.address,
            transport = %config.transport,
            "PTZ control ready"
        );
        Ok(Self::with_link(encoder, link))
    }

    /// Build a session over an existing link.
    pub fn with_link(encoder: Box<dyn ControlEncoder>, link: Arc<dyn ControlLink>) -> Self {
        let protocol = encoder.protocol();
        let interval = encoder.min_interval();
        let encoder: SharedEncoder = Arc::new(Mutex::new(encoder));

        let pan_tilt = {
            let encoder = Arc::clone(&encoder);
            let link = Arc::clone(&link);
            Throttle::new("pan-tilt", (0.0, 0.0), interval, move |(pan, tilt)| {
                let message = encoder.lock().pan_tilt(pan, tilt);
                deliver(link.as_ref(), &message, "pan_tilt");
            })
        };
        let zoom = {
            let encoder = Arc::clone(&encoder);
            let link = Arc::clone(&link);
            Throttle::new("zoom", 0.0, interval, move |zoom| {
                let message = encoder.lock().zoom(zoom);
                deliver(link.as_ref(), &message, "zoom");
            })
        };

        Self {
            protocol,
            encoder,
            link,
            pan_tilt,
            zoom,
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl PtzControl for PtzSession {
    fn pan_tilt(&self, pan: f64, tilt: f64) {
        if !self.is_closed() {
            self.pan_tilt.submit((sanitize(pan), sanitize(tilt)));
        }
    }

    fn zoom(&self, zoom: f64) {
        if !self.is_closed() {
            self.zoom.submit(sanitize(zoom));
        }
    }

    fn stop(&self) {
        if self.is_closed() {
            return;
        }
        self.pan_tilt.reset_with((0.0, 0.0), || {
            self.zoom.reset_with(0.0, || {
                let messages = self.encoder.lock().stop();
                for message in &messages {
                    deliver(self.link.as_ref(), message, "stop");
                }
            })
        });
        tracing::debug!("PTZ stop sent");
    }

    fn recall_preset(&self, preset: i64) -> Result<()> {
        if self.is_closed() {
            return Err(RelayError::ShutDown);
        }
        let message = self.encoder.lock().recall_preset(preset)?;
        deliver(self.link.as_ref(), &message, "recall_preset");
        tracing::info!(preset, "PTZ preset recalled");
        Ok(())
    }

    fn save_preset(&self, preset: i64) -> Result<()> {
        if self.is_closed() {
            return Err(RelayError::ShutDown);
        }
        let message = self.encoder.lock().save_preset(preset)?;
        deliver(self.link.as_ref(), &message, "save_preset");
        tracing::info!(preset, "PTZ preset saved");
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pan_tilt.close();
        self.zoom.close();
        self.link.close();
        tracing::info!(protocol = %self.protocol, "PTZ control closed");
    }

    fn protocol(&self) -> ControlProtocol {
        self.protocol
    }
}

impl Drop for PtzSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn deliver(link: &dyn ControlLink, message: &[u8], command: &'static str) {
    if let Err(e) = link.send(message) {
        tracing::debug!(command, error = %e, "PTZ send failed");
    }
}

/// Clamp to `[-1.0, 1.0]`; NaN means no motion.
fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}
