use std::io::{self, Read, Write};

use super::action::Action;
use crate::error::{ChannelError, FrameError};

/// Size of a first-revision frame: action, address, value.
pub const V1_FRAME_BYTES: usize = 20;
/// Size of a second-revision frame: adds the peripheral index.
pub const V2_FRAME_BYTES: usize = 24;
/// Peripheral index meaning "first target bus".
pub const NO_PERIPHERAL_INDEX: i32 = -1;

/// Wire protocol revision, fixing the frame size for a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ProtocolVersion {
    /// Frames without a peripheral index.
    #[default]
    V1,
    /// Frames with a trailing peripheral index.
    V2,
}

impl ProtocolVersion {
    /// Encoded size of every frame of this revision.
    #[must_use]
    pub const fn frame_len(self) -> usize {
        match self {
            Self::V1 => V1_FRAME_BYTES,
            Self::V2 => V2_FRAME_BYTES,
        }
    }
}

/// One fixed-size protocol record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Frame {
    /// Verb of the frame.
    pub action: Action,
    /// Address operand.
    pub address: u64,
    /// Value operand.
    pub value: u64,
    /// Target bus selector, only carried by [`ProtocolVersion::V2`].
    pub peripheral_index: i32,
}

impl Frame {
    /// Creates a frame addressed at the first target bus.
    #[must_use]
    pub const fn new(action: Action, address: u64, value: u64) -> Self {
        Self {
            action,
            address,
            value,
            peripheral_index: NO_PERIPHERAL_INDEX,
        }
    }

    /// Bare `ok` acknowledgement.
    #[must_use]
    pub const fn ok() -> Self {
        Self::new(Action::Ok, 0, 0)
    }

    /// Bare `error` reply.
    #[must_use]
    pub const fn error() -> Self {
        Self::new(Action::Error, 0, 0)
    }

    /// Returns the frame retargeted at another peripheral.
    #[must_use]
    pub const fn with_peripheral_index(mut self, index: i32) -> Self {
        self.peripheral_index = index;
        self
    }

    /// Serializes the frame, little-endian and packed.
    #[must_use]
    pub fn encode(&self, version: ProtocolVersion) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(version.frame_len());
        bytes.extend_from_slice(&self.action.as_i32().to_le_bytes());
        bytes.extend_from_slice(&self.address.to_le_bytes());
        bytes.extend_from_slice(&self.value.to_le_bytes());
        if version == ProtocolVersion::V2 {
            bytes.extend_from_slice(&self.peripheral_index.to_le_bytes());
        }
        bytes
    }

    /// Parses exactly one frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Length`] when `bytes` is not exactly one frame
    /// of the given revision.
    pub fn decode(bytes: &[u8], version: ProtocolVersion) -> Result<Self, FrameError> {
        let expected = version.frame_len();
        if bytes.len() != expected {
            return Err(FrameError::Length {
                expected,
                found: bytes.len(),
            });
        }

        let peripheral_index = match version {
            ProtocolVersion::V1 => NO_PERIPHERAL_INDEX,
            ProtocolVersion::V2 => i32::from_le_bytes(array_at(bytes, 20)),
        };
        Ok(Self {
            action: Action::from_i32(i32::from_le_bytes(array_at(bytes, 0))),
            address: u64::from_le_bytes(array_at(bytes, 4)),
            value: u64::from_le_bytes(array_at(bytes, 12)),
            peripheral_index,
        })
    }

    /// Blocks until one whole frame has been read.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the stream ends before a full
    /// frame arrives, and [`ChannelError::Io`] for any other read failure.
    pub fn read_from<R: Read + ?Sized>(
        reader: &mut R,
        version: ProtocolVersion,
    ) -> Result<Self, ChannelError> {
        let mut buffer = [0u8; V2_FRAME_BYTES];
        let bytes = &mut buffer[..version.frame_len()];
        reader.read_exact(bytes).map_err(closed_or_io)?;
        Ok(Self::decode(bytes, version)?)
    }

    /// Writes the whole frame.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the peer has gone away, and
    /// [`ChannelError::Io`] for any other write failure.
    pub fn write_to<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
    ) -> Result<(), ChannelError> {
        writer.write_all(&self.encode(version)).map_err(closed_or_io)?;
        writer.flush().map_err(closed_or_io)
    }
}

fn array_at<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

pub(crate) fn closed_or_io(err: io::Error) -> ChannelError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => ChannelError::Closed,
        _ => ChannelError::Io(err),
    }
}
