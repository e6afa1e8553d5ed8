pub mod error;
pub mod hub;
pub mod ingest;
pub mod packet;
pub mod protocol;
pub mod ptz;
pub mod shutdown;

pub use error::{RelayError, Result};
pub use hub::{HubConfig, MediaSession, MediaSessionFactory, RelayHub, ViewerHandle};
pub use ingest::{IngestClient, IngestConfig, IngestEvent};
pub use packet::MediaPacket;
pub use ptz::{ControlProtocol, PtzConfig, PtzControl, PtzSession, ViscaTransport};
pub use shutdown::Shutdown;
