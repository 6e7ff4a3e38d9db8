//! Bus adapters and the capabilities the agent drives them through.
//!
//! Target buses are driven by the remote side: the driver asks for a read or
//! a write and the adapter walks the model through the handshake. Initiator
//! buses answer transactions the model starts, relaying every beat to the
//! driver's memory through [`MemoryAccess`].

/// AMBA APB3 target.
pub mod apb3;
/// AXI4 target and initiator.
pub mod axi;
/// AXI4-Lite target and initiator.
pub mod axilite;
/// Custom function unit request/response port.
pub mod cfu;
/// Wishbone classic target and initiator.
pub mod wishbone;

mod lanes;
#[cfg(test)]
pub(crate) mod testing;

pub use lanes::{byte_mask, contiguous_run, fetch_lanes, lane_strobe, push_lanes};

use crate::clock::TickCounter;
use crate::error::BusError;
use crate::protocol::AccessWidth;

/// AXI response code for a completed access.
pub const RESP_OKAY: u64 = 0b00;
/// AXI response code for a transaction the subordinate refused.
pub const RESP_SLVERR: u64 = 0b10;

/// Adapter the driver reads and writes through.
pub trait TargetBus {
    /// Short protocol name for log records.
    fn name(&self) -> &'static str;

    /// Shares the agent's tick counter with this bus.
    fn attach_counter(&mut self, counter: TickCounter);

    /// Applies `steps` clock edges, counting them when `count` is set.
    fn tick(&mut self, count: bool, steps: u64);

    /// Runs the reset sequence.
    fn reset(&mut self);

    /// Performs one read of `width` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Protocol`] or [`BusError::Unsupported`] when the
    /// request breaks a bus rule, and [`BusError::Timeout`] when the model
    /// stops answering. Lines driven by the request are released either way.
    fn read(&mut self, width: AccessWidth, address: u64) -> Result<u64, BusError>;

    /// Performs one write of `width` bytes.
    ///
    /// # Errors
    ///
    /// Same as [`TargetBus::read`].
    fn write(&mut self, width: AccessWidth, address: u64, value: u64) -> Result<(), BusError>;
}

/// The driver's memory as seen by initiator buses.
pub trait MemoryAccess {
    /// Writes `value` to the driver's memory.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Transport`] when the driver cannot be reached.
    fn push(&mut self, width: AccessWidth, address: u64, value: u64) -> Result<(), BusError>;

    /// Reads from the driver's memory.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Transport`] when the driver cannot be reached.
    fn request(&mut self, width: AccessWidth, address: u64) -> Result<u64, BusError>;
}

/// Adapter that answers transactions started by the model.
pub trait InitiatorBus {
    /// Short protocol name for log records.
    fn name(&self) -> &'static str;

    /// Shares the agent's tick counter with this bus.
    fn attach_counter(&mut self, counter: TickCounter);

    /// Data bus width in bytes.
    fn bus_bytes(&self) -> u8;

    /// Applies `steps` clock edges, serving beats through `memory`.
    ///
    /// Handshake-ready lines are dropped before returning so a transaction
    /// cut short by the budget stalls until the next call.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Protocol`] for an illegal transaction and
    /// [`BusError::Transport`] when a relayed beat cannot reach the driver.
    fn tick(
        &mut self,
        memory: &mut dyn MemoryAccess,
        count: bool,
        steps: u64,
    ) -> Result<(), BusError>;

    /// Runs the reset sequence and returns the state machines to idle.
    ///
    /// # Errors
    ///
    /// Same as [`InitiatorBus::tick`].
    fn reset(&mut self, memory: &mut dyn MemoryAccess) -> Result<(), BusError>;

    /// Reads one bus word, keeping only the lanes selected by `strobe`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Transport`] when the driver cannot be reached.
    fn read_word(
        &mut self,
        memory: &mut dyn MemoryAccess,
        address: u64,
        strobe: u64,
    ) -> Result<u64, BusError> {
        fetch_lanes(memory, address, self.bus_bytes(), strobe)
    }

    /// Writes the lanes of one bus word selected by `strobe`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Transport`] when the driver cannot be reached.
    fn write_word(
        &mut self,
        memory: &mut dyn MemoryAccess,
        address: u64,
        value: u64,
        strobe: u64,
    ) -> Result<(), BusError> {
        push_lanes(memory, address, self.bus_bytes(), value, strobe)
    }

    /// Whether the model is presenting an address right now.
    fn has_address(&self) -> bool;

    /// Address the model is presenting.
    fn address(&self) -> u64;
}
