use thiserror::Error;

use crate::error::{BusError, Unsupported};
use crate::protocol::{LogLevel, ProtocolVersion};

/// Default bound on every handshake wait, in clock cycles.
pub const DEFAULT_TIMEOUT_CYCLES: u64 = 2000;

/// Level at which a control line is considered asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ActiveLevel {
    /// Asserted when driven to 1.
    High,
    /// Asserted when driven to 0.
    Low,
}

impl ActiveLevel {
    /// Value that asserts the line.
    #[must_use]
    pub const fn asserted(self) -> u64 {
        match self {
            Self::High => 1,
            Self::Low => 0,
        }
    }

    /// Value that releases the line.
    #[must_use]
    pub const fn released(self) -> u64 {
        match self {
            Self::High => 0,
            Self::Low => 1,
        }
    }
}

/// Reset sequence: assert, hold, release, settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ResetConfig {
    /// Asserted level of the reset line.
    pub active: ActiveLevel,
    /// Cycles the reset stays asserted.
    pub assert_cycles: u64,
    /// Cycles ticked after release.
    pub release_cycles: u64,
}

impl ResetConfig {
    /// One cycle of active-high reset, one cycle of settle.
    pub const ACTIVE_HIGH: Self = Self {
        active: ActiveLevel::High,
        assert_cycles: 1,
        release_cycles: 1,
    };

    /// Two cycles of active-low reset, one cycle of settle.
    pub const ACTIVE_LOW: Self = Self {
        active: ActiveLevel::Low,
        assert_cycles: 2,
        release_cycles: 1,
    };
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self::ACTIVE_HIGH
    }
}

/// Settings shared by every bus adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BusConfig {
    /// Bound on each handshake wait, in cycles.
    pub timeout_cycles: u64,
    /// Reset sequence.
    pub reset: ResetConfig,
}

impl BusConfig {
    /// Returns the config with a different reset sequence.
    #[must_use]
    pub const fn with_reset(mut self, reset: ResetConfig) -> Self {
        self.reset = reset;
        self
    }

    /// Returns the config with a different handshake bound.
    #[must_use]
    pub const fn with_timeout(mut self, timeout_cycles: u64) -> Self {
        self.timeout_cycles = timeout_cycles;
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            timeout_cycles: DEFAULT_TIMEOUT_CYCLES,
            reset: ResetConfig::default(),
        }
    }
}

/// How byte addresses map onto a bus with fewer decoded address lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AddressingConfig {
    /// Decoded address lines; the driven address is `addr >> (32 - addr_lines)`.
    pub addr_lines: u32,
    /// Smallest access the bus accepts, in bytes.
    pub granularity: u8,
}

impl AddressingConfig {
    /// Byte addressing: 32 lines, single-byte granularity.
    pub const BYTE: Self = Self {
        addr_lines: 32,
        granularity: 1,
    };

    /// Word addressing for a bus of `granularity` bytes per line.
    #[must_use]
    pub const fn lines(addr_lines: u32, granularity: u8) -> Self {
        Self {
            addr_lines,
            granularity,
        }
    }

    /// Right shift applied to byte addresses.
    #[must_use]
    pub const fn shift(self) -> u32 {
        32 - self.addr_lines
    }

    /// Checks the line count and granularity.
    ///
    /// # Errors
    ///
    /// Returns [`Unsupported::AddressWidth`] when `addr_lines` is not in
    /// `1..=32`, and [`Unsupported::AccessWidth`] for a granularity other than
    /// 1, 2, 4 or 8 bytes.
    pub fn validate(self) -> Result<(), Unsupported> {
        if self.addr_lines == 0 || self.addr_lines > 32 {
            return Err(Unsupported::AddressWidth(self.addr_lines));
        }
        match self.granularity {
            1 | 2 | 4 | 8 => Ok(()),
            other => Err(Unsupported::AccessWidth(u64::from(other))),
        }
    }
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self::BYTE
    }
}

/// Wishbone adapter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct WishboneConfig {
    /// Shared bus settings.
    pub bus: BusConfig,
    /// Address decoding.
    pub addressing: AddressingConfig,
    /// Tick once more after `ack` falls, for decoders that need to settle.
    pub extra_wait_tick: bool,
}

/// AXI adapter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AxiConfig {
    /// Shared bus settings.
    pub bus: BusConfig,
    /// Data bus width in bits: 32 or 64.
    pub data_width: u32,
    /// Address bus width in bits: 32 or 64.
    pub addr_width: u32,
}

impl AxiConfig {
    /// Bytes carried per beat.
    #[must_use]
    pub fn bus_bytes(&self) -> u64 {
        u64::from(self.data_width) / 8
    }

    /// Checks the data and address widths.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unsupported`] for widths other than 32 or 64 bits.
    pub const fn validate(&self) -> Result<(), BusError> {
        if !matches!(self.data_width, 32 | 64) {
            return Err(BusError::Unsupported(Unsupported::DataWidth(
                self.data_width,
            )));
        }
        if !matches!(self.addr_width, 32 | 64) {
            return Err(BusError::Unsupported(Unsupported::AddressWidth(
                self.addr_width,
            )));
        }
        Ok(())
    }
}

impl Default for AxiConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            data_width: 32,
            addr_width: 32,
        }
    }
}

/// AXI-Lite adapter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AxiLiteConfig {
    /// Shared bus settings; reset defaults to active low.
    pub bus: BusConfig,
    /// Data bus width in bytes: 4 or 8.
    pub bus_bytes: u8,
}

impl AxiLiteConfig {
    /// Checks the data bus width.
    ///
    /// # Errors
    ///
    /// Returns [`Unsupported::DataWidth`] for anything but 4 or 8 bytes.
    pub fn validate(&self) -> Result<(), Unsupported> {
        match self.bus_bytes {
            4 | 8 => Ok(()),
            other => Err(Unsupported::DataWidth(u32::from(other) * 8)),
        }
    }
}

impl Default for AxiLiteConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default().with_reset(ResetConfig::ACTIVE_LOW),
            bus_bytes: 4,
        }
    }
}

/// Agent-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AgentConfig {
    /// Least severe level forwarded to the driver.
    pub remote_log_level: LogLevel,
    /// Alignment enforced on target accesses, in bytes.
    pub access_alignment: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            remote_log_level: LogLevel::Info,
            access_alignment: 1,
        }
    }
}

/// Invalid session parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A positional argument was absent.
    #[error("missing {0}")]
    Missing(&'static str),
    /// A port argument was not a number in range.
    #[error("invalid {field}: {value:?}")]
    InvalidPort {
        /// Which port argument.
        field: &'static str,
        /// Text that failed to parse.
        value: String,
    },
    /// Trailing text after the address.
    #[error("unexpected argument {0:?}")]
    Unexpected(String),
}

/// Where and how to reach the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SessionConfig {
    /// Port of the request/response leg.
    pub main_port: u16,
    /// Port of the asynchronous leg.
    pub async_port: u16,
    /// Driver host name or address.
    pub address: String,
    /// Frame revision spoken during the session.
    pub version: ProtocolVersion,
    /// Bound on each socket write; `None` blocks until the peer drains.
    pub write_timeout_ms: Option<u64>,
}

impl SessionConfig {
    /// Parses the `"<main port> <async port> <address>"` context handed over
    /// by the driver.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a field is missing, a port does not parse
    /// or extra arguments follow the address.
    pub fn parse_context(context: &str) -> Result<Self, ConfigError> {
        let mut fields = context.split_whitespace();
        let main_port = parse_port(fields.next(), "main port")?;
        let async_port = parse_port(fields.next(), "async port")?;
        let address = fields.next().ok_or(ConfigError::Missing("address"))?;
        if let Some(extra) = fields.next() {
            return Err(ConfigError::Unexpected(extra.to_owned()));
        }
        Ok(Self {
            main_port,
            async_port,
            address: address.to_owned(),
            version: ProtocolVersion::V1,
            write_timeout_ms: None,
        })
    }
}

fn parse_port(field: Option<&str>, name: &'static str) -> Result<u16, ConfigError> {
    let text = field.ok_or(ConfigError::Missing(name))?;
    text.parse().map_err(|_| ConfigError::InvalidPort {
        field: name,
        value: text.to_owned(),
    })
}
