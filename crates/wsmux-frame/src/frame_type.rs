//! Frame types.
//!
//! Values are bit flags on the wire so that a future revision can combine
//! them; this revision only ever sends one at a time.

use crate::error::FrameError;

/// Kind of a frame, carried in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Open a new stream.
    Initial = 0x01,
    /// Deliver payload to an open stream.
    Data = 0x02,
    /// Terminate a stream.
    Close = 0x04,
}

impl FrameType {
    /// Wire value of this type.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            FrameType::Initial => "INITIAL",
            FrameType::Data => "DATA",
            FrameType::Close => "CLOSE",
        }
    }
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameType::Initial),
            0x02 => Ok(FrameType::Data),
            0x04 => Ok(FrameType::Close),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values() {
        assert_eq!(FrameType::Initial.as_u8(), 1);
        assert_eq!(FrameType::Data.as_u8(), 2);
        assert_eq!(FrameType::Close.as_u8(), 4);
    }

    #[test]
    fn parse_known_and_unknown() {
        for ty in [FrameType::Initial, FrameType::Data, FrameType::Close] {
            assert_eq!(FrameType::try_from(ty.as_u8()).unwrap(), ty);
        }
        for bad in [0u8, 3, 5, 8, 0xFF] {
            assert!(matches!(
                FrameType::try_from(bad),
                Err(FrameError::UnknownType(v)) if v == bad
            ));
        }
    }

    #[test]
    fn names() {
        assert_eq!(FrameType::Data.to_string(), "DATA");
        assert_eq!(FrameType::Close.name(), "CLOSE");
    }
}
