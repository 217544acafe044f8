//! Bus boundary: the native software bus client seen from Rust
//!
//! Pipe management, subscription matching and transport all live inside
//! the native library. This layer only hands it well-formed packet buffers
//! and passes its status codes back untouched.

use std::fmt;
use std::time::Duration;

use crate::error::Result;
use crate::protocol::MsgId;

#[cfg(unix)]
mod native;

#[cfg(unix)]
pub use native::NativeBus;

/// Status word returned by every native entry point. Zero is success.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const SUCCESS: Status = Status(0);
    /// Receive timed out before a message arrived.
    pub const TIME_OUT: Status = Status(0xCA00_0001_u32 as i32);
    /// Poll found the pipe empty.
    pub const NO_MESSAGE: Status = Status(0xCA00_0002_u32 as i32);

    #[inline(always)]
    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Receive came back empty-handed, either by timeout or empty poll.
    #[inline(always)]
    pub fn is_timeout(self) -> bool {
        self == Self::TIME_OUT || self == Self::NO_MESSAGE
    }

    /// The status as an unsigned 32-bit word, the way cFS prints it.
    #[inline(always)]
    pub fn as_unsigned(self) -> u32 {
        self.0 as u32
    }

    /// `Ok(())` on success, otherwise the status as an error.
    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self.into())
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.as_unsigned())
    }
}

/// Pipe handle allocated by the bus library.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PipeId(pub u32);

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipe#{}", self.0)
    }
}

/// How long a receive may block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Return immediately if the pipe is empty.
    Poll,
    Millis(u32),
    PendForever,
}

impl Timeout {
    pub const RAW_POLL: i32 = 0;
    pub const RAW_PEND_FOREVER: i32 = -1;

    /// Value passed to the native receive call.
    #[inline(always)]
    pub fn as_raw(self) -> i32 {
        match self {
            Self::Poll => Self::RAW_POLL,
            Self::Millis(ms) => ms.min(i32::MAX as u32) as i32,
            Self::PendForever => Self::RAW_PEND_FOREVER,
        }
    }

    /// Millisecond timeout, saturating at the largest value the library accepts.
    pub fn from_duration(duration: Duration) -> Self {
        let ms = duration.as_millis().min(i32::MAX as u128) as u32;
        Self::Millis(ms)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Self::PendForever, Self::from_duration)
    }
}

/// The five entry points of the native bus client.
///
/// `receive` hands back a buffer owned by the bus; it stays valid until the
/// next call that takes `&mut self`.
pub trait SoftwareBus: Send {
    fn initialize(&mut self) -> Result<()>;

    fn create_pipe(&mut self, depth: u16, name: &str) -> Result<PipeId>;

    /// `packet` must hold a complete packet: header plus the payload its
    /// length word declares.
    fn transmit(&mut self, packet: &[u8], increment_sequence: bool) -> Result<()>;

    fn receive(&mut self, pipe: PipeId, timeout: Timeout) -> Result<&[u8]>;

    fn subscribe(&mut self, msg_id: MsgId, pipe: PipeId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;

    #[test]
    fn test_status_display_wraps_negative() {
        assert_eq!(Status(-1).to_string(), "0xFFFFFFFF");
        assert_eq!(Status(0).to_string(), "0x00000000");
        assert_eq!(Status::TIME_OUT.to_string(), "0xCA000001");
    }

    #[test]
    fn test_status_passthrough() {
        assert!(Status::SUCCESS.into_result().is_ok());

        let err = Status(-42).into_result().unwrap_err();
        assert!(matches!(err, BusError::Status(Status(-42))));
        assert_eq!(err.status(), Some(Status(-42)));
    }

    #[test]
    fn test_timeout_raw() {
        assert_eq!(Timeout::Poll.as_raw(), 0);
        assert_eq!(Timeout::PendForever.as_raw(), -1);
        assert_eq!(Timeout::Millis(250).as_raw(), 250);
        assert_eq!(Timeout::Millis(u32::MAX).as_raw(), i32::MAX);
        assert_eq!(Timeout::from(None), Timeout::PendForever);
        assert_eq!(
            Timeout::from(Some(Duration::from_secs(2))),
            Timeout::Millis(2000)
        );
    }
}
