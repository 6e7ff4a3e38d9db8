/// Severity of a log record forwarded to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(i32)]
pub enum LogLevel {
    /// Per-cycle chatter.
    Noisy = -1,
    /// Debugging detail.
    Debug = 0,
    /// Informational.
    #[default]
    Info = 1,
    /// Recoverable problem.
    Warning = 2,
    /// Failed operation.
    Error = 3,
}

impl LogLevel {
    /// Stable wire code.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Parses a wire code.
    #[must_use]
    pub const fn from_i32(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::Noisy),
            0 => Some(Self::Debug),
            1 => Some(Self::Info),
            2 => Some(Self::Warning),
            3 => Some(Self::Error),
            _ => None,
        }
    }

    /// Level as carried in a frame's `value` field, sign-extended.
    #[must_use]
    pub const fn as_wire(self) -> u64 {
        (self.as_i32() as i64).cast_unsigned()
    }

    /// Parses the `value` field of a log frame.
    #[must_use]
    pub fn from_wire(value: u64) -> Option<Self> {
        i32::try_from(value.cast_signed())
            .ok()
            .and_then(Self::from_i32)
    }

    /// Matching `tracing` level for local output.
    #[must_use]
    pub const fn tracing_level(self) -> tracing::Level {
        match self {
            Self::Noisy => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warning => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}
