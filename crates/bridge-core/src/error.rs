use std::io;

use thiserror::Error;

use crate::protocol::Action;

/// Error classes used to pick the reply policy at the dispatch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ErrorClass {
    /// The in-flight operation broke a bus rule or asked for something the bus cannot do.
    Protocol,
    /// A bounded wait for a handshake signal ran out of cycles.
    Timeout,
    /// The transport to the remote driver failed; the session cannot continue.
    Transport,
}

/// A frame could not be decoded from the bytes provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum FrameError {
    /// Buffer length does not match the frame size of the protocol version.
    #[error("frame must be {expected} bytes, got {found}")]
    Length {
        /// Frame size of the negotiated protocol version.
        expected: usize,
        /// Number of bytes actually supplied.
        found: usize,
    },
}

/// Failures of the communication channel between the bridge and the driver.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer closed the connection or a read hit end of stream mid-frame.
    #[error("connection closed by peer")]
    Closed,
    /// An operation that needs a live session ran before the handshake completed.
    #[error("channel is not connected")]
    NotConnected,
    /// Underlying socket failure.
    #[error("transport i/o failure: {0}")]
    Io(#[from] io::Error),
    /// The first frame of a session was something other than a handshake.
    #[error("expected handshake as first frame, got {found:?}")]
    HandshakeExpected {
        /// Action carried by the offending first frame.
        found: Action,
    },
    /// The driver announced a command version the bridge does not speak.
    #[error("command {command} version mismatch: bridge has {expected}, driver has {found}")]
    VersionMismatch {
        /// Command code from the version table.
        command: u8,
        /// Version implemented by the bridge.
        expected: u8,
        /// Version announced by the driver.
        found: u8,
    },
    /// The driver announced a command the bridge does not implement at all.
    #[error("driver announced unknown command {command}")]
    UnknownCommand {
        /// Command code from the version table.
        command: u8,
    },
    /// Bytes on the wire did not form a valid frame.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The driver ended the session while a nested request was waiting for
    /// its reply.
    #[error("driver ended the session during a nested request")]
    SessionEnded,
}

/// Bus rules broken by a requested or observed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Violation {
    /// Address is not a multiple of the required alignment.
    #[error("address {address:#x} is not aligned to {alignment} bytes")]
    Unaligned {
        /// Requested address.
        address: u64,
        /// Alignment in bytes the address had to honor.
        alignment: u64,
    },
    /// Burst type other than INCR.
    #[error("burst type {burst} is not supported, only INCR bursts are accepted")]
    BurstType {
        /// Raw two-bit burst encoding seen on the bus.
        burst: u64,
    },
    /// Beat size smaller than the data bus.
    #[error("narrow burst of {beat_bytes} bytes per beat on a {bus_bytes}-byte bus")]
    NarrowBurst {
        /// Bytes per beat requested by the transaction.
        beat_bytes: u64,
        /// Data bus width in bytes.
        bus_bytes: u64,
    },
    /// Access narrower than the smallest addressable unit of the bus.
    #[error("access of {width} bytes is below the bus granularity of {granularity} bytes")]
    BelowGranularity {
        /// Requested access width in bytes.
        width: u8,
        /// Configured bus granularity in bytes.
        granularity: u8,
    },
    /// Access does not fit in the data lanes starting at its offset.
    #[error("access of {width} bytes at lane offset {offset} crosses the data bus")]
    LaneOverflow {
        /// Byte offset of the access within the bus word.
        offset: u64,
        /// Requested access width in bytes.
        width: u8,
    },
    /// Write strobe with holes between the enabled byte lanes.
    #[error("write strobe {strobe:#x} does not select contiguous byte lanes")]
    SparseStrobe {
        /// Raw strobe seen on the bus.
        strobe: u64,
    },
    /// Request addressed a target bus that was never attached.
    #[error("no target bus at peripheral index {index}")]
    UnknownPeripheral {
        /// Peripheral index carried by the frame.
        index: i32,
    },
    /// Access alignment request that is not a power of two up to eight bytes.
    #[error("access alignment of {alignment} bytes is not valid")]
    InvalidAlignment {
        /// Requested alignment in bytes.
        alignment: u64,
    },
}

/// Capabilities a bus implementation does not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Unsupported {
    /// Access width outside 1, 2, 4 and 8 bytes, or one the bus cannot carry.
    #[error("access width of {0} bytes is not supported")]
    AccessWidth(u64),
    /// Data bus width the adapter cannot drive.
    #[error("data bus width of {0} bits is not supported")]
    DataWidth(u32),
    /// Address bus width the adapter cannot drive.
    #[error("address bus width of {0} bits is not supported")]
    AddressWidth(u32),
    /// Operation the bus role does not implement.
    #[error("{0} is not supported by this bus")]
    Operation(&'static str),
}

/// Failure of one bus operation.
#[derive(Debug, Error)]
pub enum BusError {
    /// A handshake signal never reached its expected value.
    #[error("operation timed out after {cycles} cycles")]
    Timeout {
        /// Clock cycles spent waiting before giving up.
        cycles: u64,
    },
    /// The transaction broke a bus rule.
    #[error("protocol violation: {0}")]
    Protocol(#[from] Violation),
    /// The bus cannot perform the request.
    #[error("unsupported: {0}")]
    Unsupported(#[from] Unsupported),
    /// A nested memory request to the driver failed.
    #[error("transport failure: {0}")]
    Transport(#[from] ChannelError),
}

impl BusError {
    /// Returns the reply-policy class for this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::Protocol(_) | Self::Unsupported(_) => ErrorClass::Protocol,
            Self::Transport(_) => ErrorClass::Transport,
        }
    }

    /// Errors after which the session cannot be served any further.
    #[must_use]
    pub const fn ends_session(&self) -> bool {
        matches!(self.class(), ErrorClass::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::{BusError, ChannelError, ErrorClass, Unsupported, Violation};

    #[test]
    fn only_transport_failures_end_the_session() {
        assert!(!BusError::Timeout { cycles: 2000 }.ends_session());
        assert!(!BusError::from(Violation::SparseStrobe { strobe: 0b101 }).ends_session());
        assert!(!BusError::from(Unsupported::AccessWidth(3)).ends_session());
        assert!(BusError::from(ChannelError::Closed).ends_session());
        assert!(BusError::from(ChannelError::SessionEnded).ends_session());
    }

    #[test]
    fn unsupported_requests_are_protocol_class() {
        assert_eq!(
            BusError::from(Unsupported::DataWidth(128)).class(),
            ErrorClass::Protocol
        );
        assert_eq!(BusError::Timeout { cycles: 1 }.class(), ErrorClass::Timeout);
    }

    #[test]
    fn messages_name_the_offending_values() {
        let err = BusError::from(Violation::NarrowBurst {
            beat_bytes: 2,
            bus_bytes: 4,
        });
        assert_eq!(
            err.to_string(),
            "protocol violation: narrow burst of 2 bytes per beat on a 4-byte bus"
        );
    }
}
