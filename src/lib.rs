//! SBN Client - Software Bus Network binding for external processes
//!
//! Architecture:
//! - Protocol: CCSDS primary/secondary headers, big endian, fixed size
//! - Bus: the native client library, loaded at runtime
//! - Session: explicit open/close context owning the bus and command pipe

pub mod bus;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;

pub use bus::{PipeId, SoftwareBus, Status, Timeout};
pub use config::{init_logging, ClientConfig, LoggingConfig};
pub use error::{BusError, Result};
pub use protocol::{BusHeader, MsgId, Packet, PacketType, PrimaryHeader, SecondaryHeader};
pub use session::Session;

#[cfg(unix)]
pub use bus::NativeBus;
