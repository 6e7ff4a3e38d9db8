use super::action::Action;
use crate::error::Unsupported;

/// Byte width of one bus access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum AccessWidth {
    /// One byte.
    Byte = 1,
    /// Two bytes.
    Word = 2,
    /// Four bytes.
    DoubleWord = 4,
    /// Eight bytes.
    QuadWord = 8,
}

/// Wire actions bound to one access width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidthActions {
    /// Width the row describes.
    pub width: AccessWidth,
    /// Initiator write to the driver's memory.
    pub push: Action,
    /// Initiator read from the driver's memory.
    pub get: Action,
    /// Driver read on a target bus.
    pub read: Action,
    /// Driver write on a target bus.
    pub write: Action,
}

/// Width to action table, one row per supported width.
pub const WIDTH_ACTIONS: [WidthActions; 4] = [
    WidthActions {
        width: AccessWidth::Byte,
        push: Action::PushByte,
        get: Action::GetByte,
        read: Action::ReadRequestByte,
        write: Action::WriteRequestByte,
    },
    WidthActions {
        width: AccessWidth::Word,
        push: Action::PushWord,
        get: Action::GetWord,
        read: Action::ReadRequestWord,
        write: Action::WriteRequestWord,
    },
    WidthActions {
        width: AccessWidth::DoubleWord,
        push: Action::PushDoubleWord,
        get: Action::GetDoubleWord,
        read: Action::ReadRequestDoubleWord,
        write: Action::WriteRequestDoubleWord,
    },
    WidthActions {
        width: AccessWidth::QuadWord,
        push: Action::PushQuadWord,
        get: Action::GetQuadWord,
        read: Action::ReadRequestQuadWord,
        write: Action::WriteRequestQuadWord,
    },
];

impl AccessWidth {
    /// Every supported width, narrowest first.
    pub const ALL: [Self; 4] = [Self::Byte, Self::Word, Self::DoubleWord, Self::QuadWord];

    /// Parses a byte count, rejecting anything but 1, 2, 4 and 8.
    ///
    /// # Errors
    ///
    /// Returns [`Unsupported::AccessWidth`] for any other byte count.
    pub const fn from_bytes(bytes: u64) -> Result<Self, Unsupported> {
        match bytes {
            1 => Ok(Self::Byte),
            2 => Ok(Self::Word),
            4 => Ok(Self::DoubleWord),
            8 => Ok(Self::QuadWord),
            other => Err(Unsupported::AccessWidth(other)),
        }
    }

    /// Number of bytes moved by one access.
    #[must_use]
    pub const fn bytes(self) -> u8 {
        self as u8
    }

    /// Number of bits moved by one access.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Byte => 8,
            Self::Word => 16,
            Self::DoubleWord => 32,
            Self::QuadWord => 64,
        }
    }

    /// Mask selecting the low `bits()` bits of a value.
    #[must_use]
    pub const fn mask(self) -> u64 {
        match self {
            Self::QuadWord => u64::MAX,
            _ => (1 << self.bits()) - 1,
        }
    }

    /// Byte-lane strobe for this width starting at lane zero.
    #[must_use]
    pub const fn strobe(self) -> u64 {
        (1 << self.bytes()) - 1
    }

    /// Table row for this width.
    #[must_use]
    pub const fn actions(self) -> WidthActions {
        match self {
            Self::Byte => WIDTH_ACTIONS[0],
            Self::Word => WIDTH_ACTIONS[1],
            Self::DoubleWord => WIDTH_ACTIONS[2],
            Self::QuadWord => WIDTH_ACTIONS[3],
        }
    }

    /// Action pushing a value of this width to the driver's memory.
    #[must_use]
    pub const fn push_action(self) -> Action {
        self.actions().push
    }

    /// Action fetching a value of this width from the driver's memory.
    #[must_use]
    pub const fn get_action(self) -> Action {
        self.actions().get
    }

    /// Driver read request of this width.
    #[must_use]
    pub const fn read_action(self) -> Action {
        self.actions().read
    }

    /// Driver write request of this width.
    #[must_use]
    pub const fn write_action(self) -> Action {
        self.actions().write
    }
}
