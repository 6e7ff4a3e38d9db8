//! Co-simulation bridge between a remote system emulator and a cycle-level
//! hardware model.
//!
//! The emulator (the driver) speaks a small fixed-size frame protocol; an
//! [`Agent`] answers it by walking the model's bus signals through APB3, AXI4,
//! AXI4-Lite, Wishbone or CFU handshakes and relays transactions the model
//! starts back to the driver's memory.

/// Request dispatch, tick scheduling and nested driver requests.
pub mod agent;
pub use agent::{Agent, AgentExtension, CfuAgent};

/// Bus adapters for the supported protocols.
pub mod bus;
pub use bus::apb3::{Apb3, Apb3Signals};
pub use bus::axi::{AxiInitiator, AxiSignals, AxiTarget, BurstType};
pub use bus::axilite::{AxiLiteInitiator, AxiLiteSignals, AxiLiteTarget};
pub use bus::cfu::{Cfu, CfuResult, CfuSignals, CfuStatus};
pub use bus::wishbone::{WishboneInitiator, WishboneSignals, WishboneTarget};
pub use bus::{InitiatorBus, MemoryAccess, TargetBus};

/// Socket and in-process transports to the driver.
pub mod channel;
pub use channel::{Channel, DirectChannel, DirectHost, SocketChannel};

/// Clock stepping, handshake waits and the shared tick counter.
pub mod clock;
pub use clock::{Clock, Evaluator, TickCounter};

/// Bus, agent and session settings.
pub mod config;
pub use config::{
    ActiveLevel, AddressingConfig, AgentConfig, AxiConfig, AxiLiteConfig, BusConfig,
    ConfigError, ResetConfig, SessionConfig, WishboneConfig, DEFAULT_TIMEOUT_CYCLES,
};

/// Error taxonomy shared by buses and channels.
pub mod error;
pub use error::{BusError, ChannelError, ErrorClass, FrameError, Unsupported, Violation};

/// Frame format and action vocabulary.
pub mod protocol;
pub use protocol::{AccessWidth, Action, Frame, LogLevel, ProtocolVersion, VersionTable};

/// Handles on the model's wires.
pub mod signal;
pub use signal::{Signal, Wire};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
