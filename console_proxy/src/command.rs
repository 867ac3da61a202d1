use std::str;

use thiserror::Error;

/// Port shared by the proxy's builtin config and the sender tool.
pub const DEFAULT_COMMAND_PORT: u16 = 41900;

/// Bytes taken by the little-endian target frame at the start of a datagram.
pub const FRAME_HEADER_LEN: usize = 4;

/// One console command addressed to a logic frame.
///
/// Wire layout: `[i32 LE target_frame][UTF-8 command]`, one datagram per
/// command. A target frame of zero or less runs on the next drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandData {
    pub target_frame: i32,
    pub command: String,
}

impl CommandData {
    pub fn new(target_frame: i32, command: impl Into<String>) -> Self {
        Self {
            target_frame,
            command: command.into(),
        }
    }

    pub fn is_due(&self, current_frame: i32) -> bool {
        self.target_frame <= 0 || self.target_frame <= current_frame
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let Some((header, body)) = bytes.split_first_chunk::<FRAME_HEADER_LEN>() else {
            return Err(DecodeError::TooShort { len: bytes.len() });
        };
        let command = str::from_utf8(body)?.trim();
        if command.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(Self::new(i32::from_le_bytes(*header), command))
    }

    /// Like [`CommandData::decode`], but refuses datagrams over `max_len`
    /// bytes. Receivers read into a buffer one byte larger than the limit so
    /// that a truncated datagram shows up here as too long.
    pub fn decode_bounded(bytes: &[u8], max_len: usize) -> Result<Self, DecodeError> {
        if bytes.len() > max_len {
            return Err(DecodeError::TooLong {
                len: bytes.len(),
                max: max_len,
            });
        }
        Self::decode(bytes)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(FRAME_HEADER_LEN + self.command.len());
        buffer.extend_from_slice(&self.target_frame.to_le_bytes());
        buffer.extend_from_slice(self.command.as_bytes());
        buffer
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram of {len} bytes is shorter than the frame header")]
    TooShort { len: usize },
    #[error("datagram of at least {len} bytes exceeds the {max}-byte limit")]
    TooLong { len: usize, max: usize },
    #[error("command text is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] str::Utf8Error),
    #[error("command text is empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_frame_and_text() {
        let mut bytes = 120i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"  hero.Health = 5 ");
        let command = CommandData::decode(&bytes).unwrap();
        assert_eq!(command, CommandData::new(120, "hero.Health = 5"));
        assert_eq!(CommandData::decode(&command.encode()).unwrap(), command);
    }

    #[test]
    fn negative_frames_survive_the_wire() {
        let command = CommandData::new(-3, "x");
        let bytes = command.encode();
        assert_eq!(&bytes[..4], &[0xfd, 0xff, 0xff, 0xff]);
        assert_eq!(CommandData::decode(&bytes).unwrap().target_frame, -3);
    }

    #[test]
    fn rejects_malformed_datagrams() {
        assert_eq!(
            CommandData::decode(&[1, 0, 0]),
            Err(DecodeError::TooShort { len: 3 })
        );
        assert_eq!(CommandData::decode(&[0, 0, 0, 0]), Err(DecodeError::Empty));
        assert_eq!(
            CommandData::decode(&[0, 0, 0, 0, b' ', b'\t']),
            Err(DecodeError::Empty)
        );
        assert!(matches!(
            CommandData::decode(&[0, 0, 0, 0, 0xff, 0xfe]),
            Err(DecodeError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn oversized_datagrams_are_refused() {
        let bytes = CommandData::new(0, "x = 123456789").encode();
        assert_eq!(
            CommandData::decode_bounded(&bytes[..13], 12),
            Err(DecodeError::TooLong { len: 13, max: 12 })
        );
        assert_eq!(
            CommandData::decode_bounded(&bytes[..12], 12).unwrap(),
            CommandData::new(0, "x = 1234")
        );
        assert_eq!(
            CommandData::decode_bounded(&bytes, bytes.len()).unwrap().command,
            "x = 123456789"
        );
    }

    #[test]
    fn due_frames() {
        assert!(CommandData::new(0, "x").is_due(0));
        assert!(CommandData::new(-1, "x").is_due(0));
        assert!(CommandData::new(5, "x").is_due(5));
        assert!(CommandData::new(5, "x").is_due(9));
        assert!(!CommandData::new(5, "x").is_due(4));
    }
}
