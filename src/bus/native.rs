//! Native bus client loaded at runtime with `dlopen`
//!
//! Symbols wrapped:
//!
//! ```text
//! int32 SBN_Client_Init(void)
//! int32 __wrap_CFE_SB_CreatePipe(CFE_SB_PipeId_t *PipeIdPtr, uint16 Depth, const char *PipeName)
//! int32 __wrap_CFE_SB_TransmitMsg(const CFE_MSG_Message_t *MsgPtr, bool IncrementSequenceCount)
//! int32 __wrap_CFE_SB_ReceiveBuffer(CFE_SB_Buffer_t **BufPtr, CFE_SB_PipeId_t PipeId, int32 TimeOut)
//! int32 __wrap_CFE_SB_Subscribe(CFE_SB_MsgId_t MsgId, CFE_SB_PipeId_t PipeId)
//! ```
//!
//! Every symbol is resolved up front so a half-usable library never makes it
//! past `load`.

use std::ffi::{c_char, c_void, CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::slice;

use tracing::{debug, info, warn};

use super::{PipeId, SoftwareBus, Status, Timeout};
use crate::error::{BusError, Result};
use crate::protocol::{decode_primary, MsgId, PRIMARY_HEADER_SIZE};

const SYM_INIT: &str = "SBN_Client_Init";
const SYM_CREATE_PIPE: &str = "__wrap_CFE_SB_CreatePipe";
const SYM_TRANSMIT: &str = "__wrap_CFE_SB_TransmitMsg";
const SYM_RECEIVE: &str = "__wrap_CFE_SB_ReceiveBuffer";
const SYM_SUBSCRIBE: &str = "__wrap_CFE_SB_Subscribe";

type InitFn = unsafe extern "C" fn() -> i32;
type CreatePipeFn = unsafe extern "C" fn(*mut u32, u16, *const c_char) -> i32;
type TransmitFn = unsafe extern "C" fn(*const c_void, bool) -> i32;
type ReceiveFn = unsafe extern "C" fn(*mut *mut c_void, u32, i32) -> i32;
type SubscribeFn = unsafe extern "C" fn(u32, u32) -> i32;

/// Last `dlerror` message, if any.
fn dl_error() -> String {
    // SAFETY: dlerror returns NULL or a NUL-terminated thread-local string.
    unsafe {
        let msg = libc::dlerror();
        if msg.is_null() {
            "unknown dynamic loader error".to_string()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

/// Owned `dlopen` handle, closed on drop.
struct Library {
    handle: NonNull<c_void>,
    path: PathBuf,
}

impl Library {
    fn open(path: &Path) -> Result<Self> {
        let c_path =
            CString::new(path.as_os_str().as_bytes()).map_err(|_| BusError::LibraryLoad {
                path: path.to_path_buf(),
                reason: "path contains an interior NUL byte".to_string(),
            })?;

        // SAFETY: c_path is a valid NUL-terminated string.
        let raw = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };

        let handle = NonNull::new(raw).ok_or_else(|| BusError::LibraryLoad {
            path: path.to_path_buf(),
            reason: dl_error(),
        })?;

        Ok(Self {
            handle,
            path: path.to_path_buf(),
        })
    }

    /// Resolve `name` as a function pointer of type `F`.
    ///
    /// # Safety
    /// `F` must be an `extern "C"` fn pointer type matching the symbol's real
    /// signature.
    unsafe fn symbol<F: Copy>(&self, name: &'static str) -> Result<F> {
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*mut c_void>());

        let c_name = CString::new(name).map_err(|_| BusError::MissingSymbol(name))?;
        let sym = libc::dlsym(self.handle.as_ptr(), c_name.as_ptr());
        if sym.is_null() {
            return Err(BusError::MissingSymbol(name));
        }
        Ok(std::mem::transmute_copy::<*mut c_void, F>(&sym))
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        // SAFETY: handle came from a successful dlopen and is closed once.
        if unsafe { libc::dlclose(self.handle.as_ptr()) } != 0 {
            warn!(path = %self.path.display(), error = %dl_error(), "dlclose failed");
        }
    }
}

/// Log non-success statuses, then pass them through unchanged.
fn check(op: &'static str, raw: i32) -> Result<()> {
    let status = Status(raw);
    if !status.is_success() && !status.is_timeout() {
        warn!(op, %status, "bus library call failed");
    }
    status.into_result()
}

/// Bus client backed by the native shared library.
///
/// Symbols are plain function pointers into the loaded library; the
/// library stays mapped for as long as this value lives.
pub struct NativeBus {
    init: InitFn,
    create_pipe: CreatePipeFn,
    transmit: TransmitFn,
    receive: ReceiveFn,
    subscribe: SubscribeFn,
    // Dropped last: the fn pointers above dangle once it closes.
    lib: Library,
}

// SAFETY: the handle and fn pointers are plain addresses. Calls go through
// `&mut self`, so one thread at a time drives the library through this value.
unsafe impl Send for NativeBus {}

impl NativeBus {
    /// Load the client library at `path` and resolve its entry points.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let lib = Library::open(path.as_ref())?;

        // SAFETY: the fn types mirror the C prototypes in the module docs.
        let bus = unsafe {
            Self {
                init: lib.symbol(SYM_INIT)?,
                create_pipe: lib.symbol(SYM_CREATE_PIPE)?,
                transmit: lib.symbol(SYM_TRANSMIT)?,
                receive: lib.symbol(SYM_RECEIVE)?,
                subscribe: lib.symbol(SYM_SUBSCRIBE)?,
                lib,
            }
        };

        info!(path = %bus.lib.path.display(), "bus library loaded");
        Ok(bus)
    }

    pub fn path(&self) -> &Path {
        &self.lib.path
    }
}

impl SoftwareBus for NativeBus {
    fn initialize(&mut self) -> Result<()> {
        // SAFETY: resolved from the library, takes no arguments.
        let raw = unsafe { (self.init)() };
        debug!(status = %Status(raw), "SBN_Client_Init");
        check(SYM_INIT, raw)
    }

    fn create_pipe(&mut self, depth: u16, name: &str) -> Result<PipeId> {
        let c_name = CString::new(name).map_err(|_| BusError::InvalidPipeName(name.to_string()))?;
        let mut pipe = 0u32;

        // SAFETY: `pipe` outlives the call and `c_name` is NUL-terminated.
        let raw = unsafe { (self.create_pipe)(&mut pipe, depth, c_name.as_ptr()) };
        check(SYM_CREATE_PIPE, raw)?;
        Ok(PipeId(pipe))
    }

    fn transmit(&mut self, packet: &[u8], increment_sequence: bool) -> Result<()> {
        // The library trusts the length word, so it must not point past `packet`.
        let primary = decode_primary(packet)?;
        let total = primary.total_len();
        if total > packet.len() {
            return Err(BusError::MalformedHeader {
                expected: total,
                actual: packet.len(),
            });
        }

        // SAFETY: `packet` holds at least `total` readable bytes.
        let raw = unsafe { (self.transmit)(packet.as_ptr() as *const c_void, increment_sequence) };
        check(SYM_TRANSMIT, raw)
    }

    fn receive(&mut self, pipe: PipeId, timeout: Timeout) -> Result<&[u8]> {
        let mut buf: *mut c_void = ptr::null_mut();

        // SAFETY: `buf` is a valid out-pointer for the duration of the call.
        let raw = unsafe { (self.receive)(&mut buf, pipe.0, timeout.as_raw()) };
        check(SYM_RECEIVE, raw)?;

        if buf.is_null() {
            return Err(BusError::MalformedHeader {
                expected: PRIMARY_HEADER_SIZE,
                actual: 0,
            });
        }

        // SAFETY: on success the library hands back a buffer starting with a
        // primary header, owned by the pipe until the next receive.
        let head = unsafe { slice::from_raw_parts(buf as *const u8, PRIMARY_HEADER_SIZE) };
        // At most MAX_PACKET_SIZE: the length word is 16 bits.
        let total = decode_primary(head)?.total_len();

        // SAFETY: the length word covers the whole packet in the same buffer.
        Ok(unsafe { slice::from_raw_parts(buf as *const u8, total) })
    }

    fn subscribe(&mut self, msg_id: MsgId, pipe: PipeId) -> Result<()> {
        // SAFETY: both arguments are passed by value.
        let raw = unsafe { (self.subscribe)(msg_id.raw(), pipe.0) };
        check(SYM_SUBSCRIBE, raw)
    }
}
