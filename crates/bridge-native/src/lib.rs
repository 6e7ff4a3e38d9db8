//! C ABI entry points for running the bridge inside a simulator process.
//!
//! The embedding glue builds an [`Agent`] or [`CfuAgent`] over
//! [`NativeHost::channel`], installs it with [`NativeSession`], and the
//! emulator then drives it through the `cosim_*` exports. Separately, the
//! `cosim_dpi_*` exports give testbench code raw access to a socket session.

use std::cell::{Cell, RefCell};
use std::ffi::{c_char, CStr, CString};
use std::ptr::NonNull;

use bridge_core::{
    Action, Agent, CfuAgent, CfuStatus, Channel, ChannelError, DirectChannel, DirectHost, Frame,
    LogLevel, ProtocolVersion, SessionConfig, Signal, SocketChannel,
};

/// Frame as laid out for the emulator, packed and little-endian on the
/// supported targets.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFrame {
    pub action: i32,
    pub address: u64,
    pub value: u64,
}

impl From<Frame> for RawFrame {
    fn from(frame: Frame) -> Self {
        Self {
            action: frame.action.as_i32(),
            address: frame.address,
            value: frame.value,
        }
    }
}

impl From<RawFrame> for Frame {
    fn from(raw: RawFrame) -> Self {
        let RawFrame {
            action,
            address,
            value,
        } = raw;
        Self::new(Action::from_i32(action), address, value)
    }
}

/// Request frame carrying the peripheral index, for hosts that attach
/// several target buses. Replies still reach the host as [`RawFrame`]s.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawIndexedFrame {
    pub action: i32,
    pub address: u64,
    pub value: u64,
    pub peripheral_index: i32,
}

impl From<RawIndexedFrame> for Frame {
    fn from(raw: RawIndexedFrame) -> Self {
        let RawIndexedFrame {
            action,
            address,
            value,
            peripheral_index,
        } = raw;
        Self::new(Action::from_i32(action), address, value).with_peripheral_index(peripheral_index)
    }
}

pub type HostFrameFn = unsafe extern "C" fn(*const RawFrame);
pub type HostReceiveFn = unsafe extern "C" fn(*mut RawFrame);

#[derive(Debug, Clone, Copy)]
struct HostCallbacks {
    main: HostFrameFn,
    sender: HostFrameFn,
    receive: HostReceiveFn,
}

enum Installed {
    Bus(Agent<DirectChannel<NativeHost>>),
    Cfu(CfuAgent<DirectChannel<NativeHost>>),
}

thread_local! {
    static HOST: Cell<Option<HostCallbacks>> = const { Cell::new(None) };
    static SESSION: RefCell<Option<Installed>> = const { RefCell::new(None) };
    static DPI: RefCell<Option<SocketChannel>> = const { RefCell::new(None) };
}

/// Failure to install a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    #[error("a session is already installed")]
    AlreadyInstalled,
    #[error("the session is in use by an outer call")]
    Busy,
}

/// [`DirectHost`] calling the emulator's registered callbacks.
///
/// Frames sent before [`cosim_register_host`] are dropped with a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeHost;

impl NativeHost {
    /// Channel for an agent that will be installed with [`NativeSession`].
    #[must_use]
    pub const fn channel() -> DirectChannel<Self> {
        DirectChannel::new(Self, ProtocolVersion::V1)
    }

    fn deliver(pick: fn(&HostCallbacks) -> HostFrameFn, frame: Frame) {
        let Some(host) = HOST.with(Cell::get) else {
            tracing::warn!(action = ?frame.action, "no host registered, frame dropped");
            return;
        };
        let raw = RawFrame::from(frame);
        // SAFETY: registration promised callbacks that accept a frame pointer
        // valid for the duration of the call.
        unsafe { pick(&host)(&raw) };
    }
}

impl DirectHost for NativeHost {
    fn main_message(&mut self, frame: Frame) {
        Self::deliver(|host| host.main, frame);
    }

    fn sender_message(&mut self, frame: Frame) {
        Self::deliver(|host| host.sender, frame);
    }

    fn receive(&mut self) -> Option<Frame> {
        let host = HOST.with(Cell::get)?;
        let mut raw = RawFrame::default();
        // SAFETY: `raw` is a live, writable frame for the whole call.
        unsafe { (host.receive)(&mut raw) };
        Some(raw.into())
    }

    fn log(&mut self, level: LogLevel, message: &str) {
        let text = CString::new(message.replace('\0', " ")).unwrap_or_default();
        let len = u64::try_from(text.as_bytes_with_nul().len()).unwrap_or(u64::MAX);
        // The pointer is only valid while the callback runs.
        self.sender_message(Frame::new(Action::LogMessage, len, text.as_ptr() as u64));
        self.sender_message(Frame::new(Action::LogMessage, 0, level.as_wire()));
    }
}

/// Process-wide session handle owned by the embedding glue.
///
/// The session lives on the thread that installed it; simulator callbacks
/// arrive on that thread.
#[derive(Debug)]
pub struct NativeSession;

impl NativeSession {
    /// Installs a bus agent.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::AlreadyInstalled`] when a session exists and
    /// [`NativeError::Busy`] when called from inside a session callback.
    pub fn install(agent: Agent<DirectChannel<NativeHost>>) -> Result<(), NativeError> {
        Self::put(Installed::Bus(agent))
    }

    /// Installs a CFU agent.
    ///
    /// # Errors
    ///
    /// Same as [`NativeSession::install`].
    pub fn install_cfu(agent: CfuAgent<DirectChannel<NativeHost>>) -> Result<(), NativeError> {
        Self::put(Installed::Cfu(agent))
    }

    /// Drops the installed session; returns whether there was one.
    #[must_use]
    pub fn teardown() -> bool {
        SESSION.with(|slot| {
            slot.try_borrow_mut()
                .map(|mut slot| slot.take().is_some())
                .unwrap_or(false)
        })
    }

    /// Whether a session is installed.
    #[must_use]
    pub fn is_installed() -> bool {
        SESSION.with(|slot| slot.try_borrow().map(|s| s.is_some()).unwrap_or(true))
    }

    fn put(session: Installed) -> Result<(), NativeError> {
        SESSION.with(|slot| {
            let mut slot = slot.try_borrow_mut().map_err(|_| NativeError::Busy)?;
            if slot.is_some() {
                return Err(NativeError::AlreadyInstalled);
            }
            *slot = Some(session);
            tracing::debug!("native session installed");
            Ok(())
        })
    }

    fn with<R>(op: impl FnOnce(&mut Installed) -> R) -> Option<R> {
        SESSION.with(|slot| {
            let Ok(mut slot) = slot.try_borrow_mut() else {
                tracing::error!("reentrant call into the native session ignored");
                return None;
            };
            let Some(session) = slot.as_mut() else {
                tracing::warn!("no native session installed");
                return None;
            };
            Some(op(session))
        })
    }
}

/// Foreign model line of `T` bits, read and written in place.
#[derive(Debug, Clone, Copy)]
pub struct ForeignSignal<T> {
    cell: NonNull<T>,
}

impl<T> ForeignSignal<T> {
    /// Wraps the model's storage for one line; `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `cell` must be aligned and valid for reads and writes for as long as
    /// the signal or any copy of it is in use, and the model must not access
    /// it concurrently with the bridge.
    pub unsafe fn new(cell: *mut T) -> Option<Self> {
        NonNull::new(cell).map(|cell| Self { cell })
    }
}

impl<T> ForeignSignal<T>
where
    T: Copy + Default + Into<u64> + TryFrom<u64> + 'static,
{
    /// Boxes the signal for buses whose lines have mixed widths.
    #[must_use]
    pub fn boxed(self) -> Box<dyn Signal> {
        Box::new(self)
    }
}

impl<T> Signal for ForeignSignal<T>
where
    T: Copy + Default + Into<u64> + TryFrom<u64>,
{
    fn get(&self) -> u64 {
        // SAFETY: validity is a precondition of `ForeignSignal::new`.
        unsafe { self.cell.as_ptr().read_volatile() }.into()
    }

    fn set(&self, value: u64) {
        let bits = std::mem::size_of::<T>() * 8;
        let mask = if bits >= 64 { u64::MAX } else { (1 << bits) - 1 };
        let value = T::try_from(value & mask).unwrap_or_default();
        // SAFETY: validity is a precondition of `ForeignSignal::new`.
        unsafe { self.cell.as_ptr().write_volatile(value) };
    }
}

/// Registers the emulator's frame callbacks.
///
/// # Safety
///
/// Each callback must be safe to call with a frame pointer that is valid only
/// for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn cosim_register_host(
    main: Option<HostFrameFn>,
    sender: Option<HostFrameFn>,
    receive: Option<HostReceiveFn>,
) -> bool {
    let (Some(main), Some(sender), Some(receive)) = (main, sender, receive) else {
        tracing::error!("host registration with a null callback");
        return false;
    };
    HOST.with(|host| {
        host.set(Some(HostCallbacks {
            main,
            sender,
            receive,
        }));
    });
    true
}

/// Dispatches one frame from the emulator into the installed session.
///
/// # Safety
///
/// `frame` must be null or point to a readable [`RawFrame`].
#[no_mangle]
pub unsafe extern "C" fn cosim_handle_request(frame: *const RawFrame) -> bool {
    if frame.is_null() {
        return false;
    }
    dispatch(Frame::from(frame.read_unaligned()))
}

/// Dispatches one frame addressed to a specific target bus.
///
/// # Safety
///
/// `frame` must be null or point to a readable [`RawIndexedFrame`].
#[no_mangle]
pub unsafe extern "C" fn cosim_handle_indexed_request(frame: *const RawIndexedFrame) -> bool {
    if frame.is_null() {
        return false;
    }
    dispatch(Frame::from(frame.read_unaligned()))
}

fn dispatch(frame: Frame) -> bool {
    let result = NativeSession::with(|session| match session {
        Installed::Bus(agent) => agent.handle_request(frame),
        Installed::Cfu(agent) => agent.handle_request(frame),
    });
    match result {
        Some(Ok(())) => true,
        Some(Err(ChannelError::SessionEnded)) => {
            tracing::info!("emulator ended the session during a nested request");
            true
        }
        Some(Err(err)) => {
            tracing::error!(%err, "request failed");
            false
        }
        None => false,
    }
}

/// Runs the reset sequence of the installed session.
#[no_mangle]
pub extern "C" fn cosim_reset_peripheral() -> bool {
    let result = NativeSession::with(|session| match session {
        Installed::Bus(agent) => agent.reset(),
        Installed::Cfu(agent) => {
            agent.reset();
            Ok(())
        }
    });
    matches!(result, Some(Ok(())))
}

/// Runs one CFU instruction; `status` receives the outcome code.
///
/// # Safety
///
/// `status` must be null or point to a writable `i32`.
#[no_mangle]
pub unsafe extern "C" fn cosim_cfu_execute(
    function_id: u32,
    data0: u32,
    data1: u32,
    status: *mut i32,
) -> u64 {
    let outcome = NativeSession::with(|session| match session {
        Installed::Cfu(agent) => Some(agent.execute(function_id, data0, data1)),
        Installed::Bus(_) => None,
    })
    .flatten();
    let (value, code) = outcome.map_or((0, CfuStatus::Fail.code()), |r| (r.value, r.status.code()));
    if !status.is_null() {
        status.write(code);
    }
    value
}

fn with_dpi<R>(op: impl FnOnce(&mut SocketChannel) -> Result<R, ChannelError>) -> Option<R> {
    DPI.with(|slot| {
        let mut slot = slot.try_borrow_mut().ok()?;
        let channel = slot.as_mut().filter(|channel| channel.is_connected())?;
        op(channel)
            .map_err(|err| tracing::warn!(%err, "dpi socket call failed"))
            .ok()
    })
}

/// Connects a raw socket session and completes the handshake.
///
/// # Safety
///
/// `address` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cosim_dpi_connect(
    main_port: u16,
    async_port: u16,
    address: *const c_char,
) -> bool {
    if address.is_null() {
        return false;
    }
    let Ok(address) = CStr::from_ptr(address).to_str() else {
        tracing::error!("dpi address is not UTF-8");
        return false;
    };
    let session = SessionConfig {
        main_port,
        async_port,
        address: address.to_owned(),
        version: ProtocolVersion::V1,
        write_timeout_ms: None,
    };
    match SocketChannel::connect(&session) {
        Ok(channel) => DPI.with(|slot| {
            slot.try_borrow_mut()
                .map(|mut slot| *slot = Some(channel))
                .is_ok()
        }),
        Err(err) => {
            tracing::error!(%err, "dpi connect failed");
            false
        }
    }
}

/// Closes the raw socket session.
#[no_mangle]
pub extern "C" fn cosim_dpi_disconnect() -> bool {
    DPI.with(|slot| {
        slot.try_borrow_mut()
            .ok()
            .and_then(|mut slot| slot.take())
            .is_some_and(|mut channel| {
                let was_connected = channel.is_connected();
                channel.disconnect();
                was_connected
            })
    })
}

/// Whether a raw socket session is connected.
#[no_mangle]
#[must_use]
pub extern "C" fn cosim_dpi_is_connected() -> bool {
    with_dpi(|_| Ok(())).is_some()
}

/// Blocks for the next frame on the main leg.
///
/// # Safety
///
/// Each out-pointer must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn cosim_dpi_receive(
    action: *mut i32,
    address: *mut u64,
    value: *mut u64,
) -> bool {
    let Some(frame) = with_dpi(Channel::receive) else {
        return false;
    };
    if !action.is_null() {
        action.write(frame.action.as_i32());
    }
    if !address.is_null() {
        address.write(frame.address);
    }
    if !value.is_null() {
        value.write(frame.value);
    }
    true
}

/// Sends a frame on the main leg.
#[no_mangle]
pub extern "C" fn cosim_dpi_send(action: i32, address: u64, value: u64) -> bool {
    let frame = Frame::new(Action::from_i32(action), address, value);
    with_dpi(|channel| channel.send_main(frame)).is_some()
}

/// Sends a frame on the asynchronous leg.
#[no_mangle]
pub extern "C" fn cosim_dpi_send_to_async(action: i32, address: u64, value: u64) -> bool {
    let frame = Frame::new(Action::from_i32(action), address, value);
    with_dpi(|channel| channel.send_async(frame)).is_some()
}

/// Forwards a log record to the driver.
///
/// # Safety
///
/// `message` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cosim_dpi_log(level: i32, message: *const c_char) -> bool {
    if message.is_null() {
        return false;
    }
    let text = CStr::from_ptr(message).to_string_lossy();
    let level = LogLevel::from_i32(level).unwrap_or(LogLevel::Info);
    with_dpi(|channel| channel.log(level, &text)).is_some()
}
