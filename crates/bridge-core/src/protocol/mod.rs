//! Frame format and action vocabulary shared by every channel.

mod action;
mod frame;
mod level;
mod version;
mod width;

pub use action::Action;
pub use frame::{
    Frame, ProtocolVersion, NO_PERIPHERAL_INDEX, V1_FRAME_BYTES, V2_FRAME_BYTES,
};
pub(crate) use frame::closed_or_io;
pub use level::LogLevel;
pub use version::VersionTable;
pub use width::{AccessWidth, WidthActions, WIDTH_ACTIONS};
