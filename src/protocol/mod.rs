//! PMD serial wire protocol.
//!
//! The device streams fixed-length frames with no length prefix and no
//! checksum:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────────────────────┐
//! │ Header (2B)  │ Sequence     │ Rail readings                         │
//! │ 0xCA 0xAC    │ (2B BE)      │ 13 x (voltage 2B BE + current 3B BE)  │
//! └──────────────┴──────────────┴──────────────────────────────────────┘
//!                 ^ payload offset
//! ```
//!
//! The same two header bytes prefix the host-to-device commands in
//! [`PmdCommand`].

pub mod decoder;
pub mod framer;

pub use decoder::{PacketDecoder, SequenceTracker};
pub use framer::{FrameBuffer, Framer};

/// Frame header sentinel bytes.
pub const HEADER: [u8; 2] = [0xCA, 0xAC];

/// Total frame length on the wire, header included.
pub const FRAME_LENGTH: usize = 69;

/// Bytes following the header.
pub const PAYLOAD_LENGTH: usize = FRAME_LENGTH - HEADER.len();

/// Host-to-device commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmdCommand {
    /// Acknowledge the stored calibration; must precede [`PmdCommand::StreamMode`]
    CalibrationOk,
    ClearCalibration,
    /// Switch the device into continuous frame streaming
    StreamMode,
}

impl PmdCommand {
    pub const fn as_bytes(self) -> &'static [u8; 4] {
        match self {
            PmdCommand::CalibrationOk => &[0xCA, 0xAC, 0xBD, 0x01],
            PmdCommand::ClearCalibration => &[0xCA, 0xAC, 0xBD, 0x00],
            PmdCommand::StreamMode => &[0xCA, 0xAC, 0xBD, 0x90],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout_constants() {
        assert_eq!(PAYLOAD_LENGTH, 67);
        // last field is the PCIe #1 current at payload offset 64..67
        assert_eq!(64 + 3, PAYLOAD_LENGTH);
    }

    #[test]
    fn commands_are_header_prefixed() {
        for command in
            [PmdCommand::CalibrationOk, PmdCommand::ClearCalibration, PmdCommand::StreamMode]
        {
            assert_eq!(&command.as_bytes()[..2], &HEADER);
            assert_eq!(command.as_bytes()[2], 0xBD);
        }
        assert_eq!(PmdCommand::StreamMode.as_bytes()[3], 0x90);
    }
}
