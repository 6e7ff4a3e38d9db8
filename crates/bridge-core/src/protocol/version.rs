use std::io::Read;

use super::frame::closed_or_io;
use crate::error::ChannelError;

/// Ordered `(command, version)` pairs agreed on during a versioned handshake.
///
/// On the wire the driver's handshake frame carries the entry count in its
/// `value`, followed on the main leg by one two-byte pair per entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct VersionTable {
    entries: Vec<(u8, u8)>,
}

impl VersionTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds or replaces the version of one command.
    #[must_use]
    pub fn with(mut self, command: u8, version: u8) -> Self {
        match self.entries.iter_mut().find(|(known, _)| *known == command) {
            Some(entry) => entry.1 = version,
            None => self.entries.push((command, version)),
        }
        self
    }

    /// Version implemented for `command`, if any.
    #[must_use]
    pub fn version_of(&self, command: u8) -> Option<u8> {
        self.entries
            .iter()
            .find(|(known, _)| *known == command)
            .map(|(_, version)| *version)
    }

    /// Number of commands in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table lists no commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encodes the pairs as sent after the handshake frame.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.entries
            .iter()
            .flat_map(|&(command, version)| [command, version])
            .collect()
    }

    /// Reads `count` pairs announced by a handshake frame.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the stream ends early.
    pub fn read_pairs<R: Read + ?Sized>(
        reader: &mut R,
        count: u64,
    ) -> Result<Vec<(u8, u8)>, ChannelError> {
        let mut pairs = Vec::new();
        for _ in 0..count {
            let mut pair = [0u8; 2];
            reader.read_exact(&mut pair).map_err(closed_or_io)?;
            pairs.push((pair[0], pair[1]));
        }
        Ok(pairs)
    }

    /// Checks every announced pair against this table.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UnknownCommand`] for a command missing from
    /// the table and [`ChannelError::VersionMismatch`] for a differing version.
    pub fn verify(&self, announced: &[(u8, u8)]) -> Result<(), ChannelError> {
        for &(command, found) in announced {
            match self.version_of(command) {
                None => return Err(ChannelError::UnknownCommand { command }),
                Some(expected) if expected != found => {
                    return Err(ChannelError::VersionMismatch {
                        command,
                        expected,
                        found,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
