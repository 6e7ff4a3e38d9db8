//! AXI4-Lite: single-beat AXI without bursts.

mod initiator;
mod target;

pub use initiator::AxiLiteInitiator;
pub use target::AxiLiteTarget;

use crate::signal::Wire;

/// Lines of the five AXI4-Lite channels.
#[derive(Debug, Clone, Default)]
pub struct AxiLiteSignals<S = Wire> {
    /// Reset line.
    pub reset: S,
    /// Write address.
    pub awaddr: S,
    /// Write address valid.
    pub awvalid: S,
    /// Write address ready.
    pub awready: S,
    /// Write data.
    pub wdata: S,
    /// Write byte strobes.
    pub wstrb: S,
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
    /// Read address valid.
    pub arvalid: S,
    /// Read address ready.
    pub arready: S,
    /// Read data.
    pub rdata: S,
    /// Read response code.
    pub rresp: S,
    /// Read data valid.
    pub rvalid: S,
    /// Read data ready.
    pub rready: S,
}
