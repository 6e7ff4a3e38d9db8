use super::width::AccessWidth;

/// Wire-level verbs exchanged with the driver.
///
/// Codes are append-only and shared with the driver; a code the bridge does
/// not know survives a decode/encode cycle as [`Action::Custom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Action {
    /// No-op frame.
    InvalidAction,
    /// Advance the model to a target cycle count.
    TickClock,
    /// Legacy double-word write; also the reply carrying data for nested gets.
    WriteRequest,
    /// Legacy double-word read; also the reply carrying data for target reads.
    ReadRequest,
    /// Run the reset sequence on every bus.
    ResetPeripheral,
    /// Log record sent to the driver.
    LogMessage,
    /// Interrupt line change.
    Interrupt,
    /// End of session.
    Disconnect,
    /// Failed request.
    Error,
    /// Successful request.
    Ok,
    /// Session handshake.
    Handshake,
    /// Initiator write of four bytes to the driver's memory.
    PushDoubleWord,
    /// Initiator read of four bytes from the driver's memory.
    GetDoubleWord,
    /// Initiator write of two bytes to the driver's memory.
    PushWord,
    /// Initiator read of two bytes from the driver's memory.
    GetWord,
    /// Initiator write of one byte to the driver's memory.
    PushByte,
    /// Initiator read of one byte from the driver's memory.
    GetByte,
    /// CPU debug: query halt state.
    IsHalted,
    /// CPU debug: read a register.
    RegisterGet,
    /// CPU debug: write a register.
    RegisterSet,
    /// CPU debug: toggle single stepping.
    SingleStepMode,
    /// One-byte target read.
    ReadRequestByte,
    /// Two-byte target read.
    ReadRequestWord,
    /// Four-byte target read.
    ReadRequestDoubleWord,
    /// Eight-byte target read.
    ReadRequestQuadWord,
    /// One-byte target write.
    WriteRequestByte,
    /// Two-byte target write.
    WriteRequestWord,
    /// Four-byte target write.
    WriteRequestDoubleWord,
    /// Eight-byte target write.
    WriteRequestQuadWord,
    /// Initiator write of eight bytes to the driver's memory.
    PushQuadWord,
    /// Initiator read of eight bytes from the driver's memory.
    GetQuadWord,
    /// Driver acknowledgement of a push.
    PushConfirmation,
    /// Configure the alignment enforced on target accesses.
    SetAccessAlignment,
    /// CPU debug: execute a number of steps.
    Step,
    /// Code outside the known vocabulary, left to agent extensions.
    Custom(i32),
}

impl Action {
    /// Converts the action to its stable wire code.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::InvalidAction => 0,
            Self::TickClock => 1,
            Self::WriteRequest => 2,
            Self::ReadRequest => 3,
            Self::ResetPeripheral => 4,
            Self::LogMessage => 5,
            Self::Interrupt => 6,
            Self::Disconnect => 7,
            Self::Error => 8,
            Self::Ok => 9,
            Self::Handshake => 10,
            Self::PushDoubleWord => 11,
            Self::GetDoubleWord => 12,
            Self::PushWord => 13,
            Self::GetWord => 14,
            Self::PushByte => 15,
            Self::GetByte => 16,
            Self::IsHalted => 17,
            Self::RegisterGet => 18,
            Self::RegisterSet => 19,
            Self::SingleStepMode => 20,
            Self::ReadRequestByte => 21,
            Self::ReadRequestWord => 22,
            Self::ReadRequestDoubleWord => 23,
            Self::ReadRequestQuadWord => 24,
            Self::WriteRequestByte => 25,
            Self::WriteRequestWord => 26,
            Self::WriteRequestDoubleWord => 27,
            Self::WriteRequestQuadWord => 28,
            Self::PushQuadWord => 29,
            Self::GetQuadWord => 30,
            Self::PushConfirmation => 31,
            Self::SetAccessAlignment => 32,
            Self::Step => 100,
            Self::Custom(code) => code,
        }
    }

    /// Converts a wire code back into an action. Unknown codes become [`Action::Custom`].
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        match code {
            0 => Self::InvalidAction,
            1 => Self::TickClock,
            2 => Self::WriteRequest,
            3 => Self::ReadRequest,
            4 => Self::ResetPeripheral,
            5 => Self::LogMessage,
            6 => Self::Interrupt,
            7 => Self::Disconnect,
            8 => Self::Error,
            9 => Self::Ok,
            10 => Self::Handshake,
            11 => Self::PushDoubleWord,
            12 => Self::GetDoubleWord,
            13 => Self::PushWord,
            14 => Self::GetWord,
            15 => Self::PushByte,
            16 => Self::GetByte,
            17 => Self::IsHalted,
            18 => Self::RegisterGet,
            19 => Self::RegisterSet,
            20 => Self::SingleStepMode,
            21 => Self::ReadRequestByte,
            22 => Self::ReadRequestWord,
            23 => Self::ReadRequestDoubleWord,
            24 => Self::ReadRequestQuadWord,
            25 => Self::WriteRequestByte,
            26 => Self::WriteRequestWord,
            27 => Self::WriteRequestDoubleWord,
            28 => Self::WriteRequestQuadWord,
            29 => Self::PushQuadWord,
            30 => Self::GetQuadWord,
            31 => Self::PushConfirmation,
            32 => Self::SetAccessAlignment,
            100 => Self::Step,
            other => Self::Custom(other),
        }
    }

    /// Access width of a target read request, with the legacy bare read as a double word.
    #[must_use]
    pub fn read_width(self) -> Option<AccessWidth> {
        if self == Self::ReadRequest {
            return Some(AccessWidth::DoubleWord);
        }
        AccessWidth::ALL
            .into_iter()
            .find(|width| width.read_action() == self)
    }

    /// Access width of a target write request, with the legacy bare write as a double word.
    #[must_use]
    pub fn write_width(self) -> Option<AccessWidth> {
        if self == Self::WriteRequest {
            return Some(AccessWidth::DoubleWord);
        }
        AccessWidth::ALL
            .into_iter()
            .find(|width| width.write_action() == self)
    }
}
