use super::Channel;
use crate::error::ChannelError;
use crate::protocol::{Frame, LogLevel, ProtocolVersion};

/// Callbacks of a driver living in the same process.
pub trait DirectHost {
    /// Delivers a reply meant for the main leg.
    fn main_message(&mut self, frame: Frame);

    /// Delivers a frame meant for the asynchronous leg.
    fn sender_message(&mut self, frame: Frame);

    /// Blocks until the driver has a frame for the agent; `None` once the
    /// driver is gone.
    fn receive(&mut self) -> Option<Frame>;

    /// Delivers one log record.
    fn log(&mut self, level: LogLevel, message: &str);
}

/// In-process transport calling straight into a [`DirectHost`].
///
/// The host is live from construction, so there is no handshake.
#[derive(Debug)]
pub struct DirectChannel<H> {
    host: H,
    version: ProtocolVersion,
    connected: bool,
}

impl<H: DirectHost> DirectChannel<H> {
    /// Wraps `host`.
    pub const fn new(host: H, version: ProtocolVersion) -> Self {
        Self {
            host,
            version,
            connected: true,
        }
    }

    /// The wrapped host.
    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// The wrapped host, mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Unwraps the host.
    pub fn into_host(self) -> H {
        self.host
    }

    const fn check_connected(&self) -> Result<(), ChannelError> {
        if self.connected {
            Ok(())
        } else {
            Err(ChannelError::NotConnected)
        }
    }
}

impl<H: DirectHost> Channel for DirectChannel<H> {
    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_main(&mut self, frame: Frame) -> Result<(), ChannelError> {
        self.check_connected()?;
        self.host.main_message(frame);
        Ok(())
    }

    fn send_async(&mut self, frame: Frame) -> Result<(), ChannelError> {
        self.check_connected()?;
        self.host.sender_message(frame);
        Ok(())
    }

    fn receive(&mut self) -> Result<Frame, ChannelError> {
        self.check_connected()?;
        self.host.receive().ok_or_else(|| {
            self.connected = false;
            ChannelError::Closed
        })
    }

    fn log(&mut self, level: LogLevel, message: &str) -> Result<(), ChannelError> {
        self.check_connected()?;
        self.host.log(level, message);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}
