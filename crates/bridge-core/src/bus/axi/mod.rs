//! AXI4 channel rules shared by both bus roles.

mod initiator;
mod target;

pub use initiator::AxiInitiator;
pub use target::AxiTarget;

use crate::error::Violation;
use crate::signal::Wire;

/// Two-bit AXI burst encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum BurstType {
    /// Same address every beat.
    Fixed = 0,
    /// Address advances by the beat size.
    Incr = 1,
    /// Address wraps at the burst boundary.
    Wrap = 2,
    /// Reserved encoding.
    Reserved = 3,
}

impl BurstType {
    /// Decodes the low two bits of a burst field.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0 => Self::Fixed,
            1 => Self::Incr,
            2 => Self::Wrap,
            _ => Self::Reserved,
        }
    }

    /// Raw encoding.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self as u64
    }
}

/// Checks one burst against the rules both roles enforce.
///
/// A burst is legal iff it is INCR, its beat size equals the data bus width
/// and its address is aligned to the beat size.
///
/// # Errors
///
/// Returns the first [`Violation`] found.
pub const fn check_burst(burst: u64, address: u64, size: u64, bus_bytes: u64) -> Result<(), Violation> {
    if !matches!(BurstType::from_bits(burst), BurstType::Incr) || burst > 0b11 {
        return Err(Violation::BurstType { burst });
    }
    let beat_bytes = if size < 64 { 1 << size } else { 0 };
    if beat_bytes != bus_bytes {
        return Err(Violation::NarrowBurst {
            beat_bytes,
            bus_bytes,
        });
    }
    if address % beat_bytes != 0 {
        return Err(Violation::Unaligned {
            address,
            alignment: beat_bytes,
        });
    }
    Ok(())
}

/// Size field encoding `bytes` per beat.
#[must_use]
pub fn size_of_beat(bytes: u64) -> u64 {
    u64::from(bytes.trailing_zeros())
}

/// Length field encoding a burst of `beats` beats.
#[must_use]
pub fn burst_len(beats: usize) -> u64 {
    u64::try_from(beats.saturating_sub(1)).unwrap_or(u64::MAX)
}

/// Lines of all five AXI4 channels.
///
/// The target drives the address, write data and ready-for-response lines;
/// the initiator drives the other half.
#[derive(Debug, Clone, Default)]
pub struct AxiSignals<S = Wire> {
    /// Reset line.
    pub reset: S,
    /// Write address.
    pub awaddr: S,
    /// Write burst length minus one.
    pub awlen: S,
    /// Write beat size, log2 of bytes.
    pub awsize: S,
    /// Write burst type.
    pub awburst: S,
    /// Write address valid.
    pub awvalid: S,
    /// Write address ready.
    pub awready: S,
    /// Write data.
    pub wdata: S,
    /// Write byte strobes.
    pub wstrb: S,
    /// Final write beat.
    pub wlast: S,
    /// Write data valid.
    pub wvalid: S,
    /// Write data ready.
    pub wready: S,
    /// Write response code.
    pub bresp: S,
    /// Write response valid.
    pub bvalid: S,
    /// Write response ready.
    pub bready: S,
    /// Read address.
    pub araddr: S,
    /// Read burst length minus one.
    pub arlen: S,
    /// Read beat size, log2 of bytes.
    pub arsize: S,
    /// Read burst type.
    pub arburst: S,
    /// Read address valid.
    pub arvalid: S,
    /// Read address ready.
    pub arready: S,
    /// Read data.
    pub rdata: S,
    /// Read response code.
    pub rresp: S,
    /// Final read beat.
    pub rlast: S,
    /// Read data valid.
    pub rvalid: S,
    /// Read data ready.
    pub rready: S,
}
