//! Transports carrying frames between the agent and the driver.
//!
//! Every transport has two legs: the main leg carries request/response
//! traffic, the asynchronous leg carries log records, interrupts, tick
//! acknowledgements and the agent's own memory requests.

mod direct;
mod socket;

pub use direct::{DirectChannel, DirectHost};
pub use socket::SocketChannel;

use crate::error::ChannelError;
use crate::protocol::{Frame, LogLevel, ProtocolVersion};

/// Duplex frame transport to the driver.
pub trait Channel {
    /// Frame revision of the session.
    fn version(&self) -> ProtocolVersion;

    /// Whether the session is live.
    fn is_connected(&self) -> bool;

    /// Sends a reply on the main leg.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotConnected`] before the handshake and a
    /// transport error when the peer cannot be reached.
    fn send_main(&mut self, frame: Frame) -> Result<(), ChannelError>;

    /// Sends a frame on the asynchronous leg.
    ///
    /// # Errors
    ///
    /// Same as [`Channel::send_main`].
    fn send_async(&mut self, frame: Frame) -> Result<(), ChannelError>;

    /// Blocks until the next frame arrives on the main leg.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the driver goes away instead of
    /// sending a whole frame.
    fn receive(&mut self) -> Result<Frame, ChannelError>;

    /// Forwards one log record to the driver.
    ///
    /// # Errors
    ///
    /// Same as [`Channel::send_main`].
    fn log(&mut self, level: LogLevel, message: &str) -> Result<(), ChannelError>;

    /// Marks the session finished.
    fn disconnect(&mut self);
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn version(&self) -> ProtocolVersion {
        (**self).version()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn send_main(&mut self, frame: Frame) -> Result<(), ChannelError> {
        (**self).send_main(frame)
    }

    fn send_async(&mut self, frame: Frame) -> Result<(), ChannelError> {
        (**self).send_async(frame)
    }

    fn receive(&mut self) -> Result<Frame, ChannelError> {
        (**self).receive()
    }

    fn log(&mut self, level: LogLevel, message: &str) -> Result<(), ChannelError> {
        (**self).log(level, message)
    }

    fn disconnect(&mut self) {
        (**self).disconnect();
    }
}
