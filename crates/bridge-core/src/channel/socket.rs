use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use super::Channel;
use crate::config::SessionConfig;
use crate::error::ChannelError;
use crate::protocol::{closed_or_io, Action, Frame, LogLevel, ProtocolVersion, VersionTable};

/// Two-socket transport: requests and replies on `main`, everything else on
/// `sender`.
#[derive(Debug)]
pub struct SocketChannel<M = TcpStream, A = TcpStream> {
    main: M,
    sender: A,
    version: ProtocolVersion,
    versions: Option<VersionTable>,
    connected: bool,
}

impl SocketChannel {
    /// Connects both legs to the driver and performs the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Io`] when either leg cannot connect and any
    /// error of [`SocketChannel::handshake`].
    pub fn connect(session: &SessionConfig) -> Result<Self, ChannelError> {
        let address = session.address.as_str();
        let main = TcpStream::connect((address, session.main_port))?;
        let sender = TcpStream::connect((address, session.async_port))?;
        let timeout = session.write_timeout_ms.map(Duration::from_millis);
        for stream in [&main, &sender] {
            stream.set_nodelay(true)?;
            stream.set_write_timeout(timeout)?;
        }
        tracing::info!(
            address,
            main_port = session.main_port,
            async_port = session.async_port,
            "connected to driver"
        );

        let mut channel = Self::from_streams(main, sender, session.version);
        channel.handshake()?;
        Ok(channel)
    }
}

impl<M: Read + Write, A: Write> SocketChannel<M, A> {
    /// Wraps two already-connected streams; the session starts disconnected.
    pub const fn from_streams(main: M, sender: A, version: ProtocolVersion) -> Self {
        Self {
            main,
            sender,
            version,
            versions: None,
            connected: false,
        }
    }

    /// Requires the driver to announce a matching command version table.
    #[must_use]
    pub fn with_versions(mut self, table: VersionTable) -> Self {
        self.versions = Some(table);
        self
    }

    /// Main and asynchronous streams.
    #[must_use]
    pub const fn streams(&self) -> (&M, &A) {
        (&self.main, &self.sender)
    }

    /// Waits for the driver's handshake and answers it.
    ///
    /// Any other first frame leaves the channel disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::HandshakeExpected`] for any other first frame,
    /// [`ChannelError::VersionMismatch`] or [`ChannelError::UnknownCommand`]
    /// when the announced version table disagrees, and a transport error when
    /// the driver goes away.
    pub fn handshake(&mut self) -> Result<(), ChannelError> {
        let frame = Frame::read_from(&mut self.main, self.version)?;
        if frame.action != Action::Handshake {
            tracing::warn!(action = ?frame.action, "driver opened the session without a handshake");
            return Err(ChannelError::HandshakeExpected {
                found: frame.action,
            });
        }

        if let Some(table) = &self.versions {
            let announced = VersionTable::read_pairs(&mut self.main, frame.value)?;
            if let Err(err) = table.verify(&announced) {
                tracing::error!(%err, "driver protocol versions differ");
                Frame::error().write_to(&mut self.main, self.version)?;
                return Err(err);
            }
        }

        Frame::new(Action::Handshake, 0, 0).write_to(&mut self.main, self.version)?;
        self.connected = true;
        tracing::debug!(version = ?self.version, "handshake complete");
        Ok(())
    }

    const fn check_connected(&self) -> Result<(), ChannelError> {
        if self.connected {
            Ok(())
        } else {
            Err(ChannelError::NotConnected)
        }
    }

    fn track<T>(&mut self, result: Result<T, ChannelError>) -> Result<T, ChannelError> {
        if result.is_err() {
            self.connected = false;
        }
        result
    }
}

impl<M: Read + Write, A: Write> Channel for SocketChannel<M, A> {
    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_main(&mut self, frame: Frame) -> Result<(), ChannelError> {
        self.check_connected()?;
        let result = frame.write_to(&mut self.main, self.version);
        self.track(result)
    }

    fn send_async(&mut self, frame: Frame) -> Result<(), ChannelError> {
        self.check_connected()?;
        let result = frame.write_to(&mut self.sender, self.version);
        self.track(result)
    }

    fn receive(&mut self) -> Result<Frame, ChannelError> {
        self.check_connected()?;
        let result = Frame::read_from(&mut self.main, self.version);
        self.track(result)
    }

    fn log(&mut self, level: LogLevel, message: &str) -> Result<(), ChannelError> {
        let bytes = message.as_bytes();
        self.send_async(Frame::new(
            Action::LogMessage,
            u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            level.as_wire(),
        ))?;
        let result = self
            .sender
            .write_all(bytes)
            .and_then(|()| self.sender.flush())
            .map_err(closed_or_io);
        self.track(result)
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}
