//! Payload element types and scalar decoding.

use std::fmt;

/// Payload type flag: element is signed.
pub const SIGNED_FLAG: u8 = 0x80;
/// Payload type flag: element is a floating point number.
pub const FLOAT_FLAG: u8 = 0x40;
/// Payload type flag: a 6-byte timestamp precedes the payload.
pub const TIMESTAMP_FLAG: u8 = 0x10;
/// Low nibble holds the element size in bytes.
pub const SIZE_MASK: u8 = 0x0F;

/// Element type of a Harp payload, with the timestamp flag stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    U64,
    S64,
    Float,
}

impl PayloadType {
    /// Decode a raw payload type byte, ignoring the timestamp flag.
    ///
    /// Returns `None` for combinations that name no known element type.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw & !TIMESTAMP_FLAG {
            0x01 => Some(Self::U8),
            0x81 => Some(Self::S8),
            0x02 => Some(Self::U16),
            0x82 => Some(Self::S16),
            0x04 => Some(Self::U32),
            0x84 => Some(Self::S32),
            0x08 => Some(Self::U64),
            0x88 => Some(Self::S64),
            0x44 => Some(Self::Float),
            _ => None,
        }
    }

    /// The wire encoding of this type, without the timestamp flag.
    pub fn raw(self) -> u8 {
        match self {
            Self::U8 => 0x01,
            Self::S8 => 0x81,
            Self::U16 => 0x02,
            Self::S16 => 0x82,
            Self::U32 => 0x04,
            Self::S32 => 0x84,
            Self::U64 => 0x08,
            Self::S64 => 0x88,
            Self::Float => 0x44,
        }
    }

    /// Element size in bytes.
    pub fn size(self) -> usize {
        (self.raw() & SIZE_MASK) as usize
    }

    pub fn is_signed(self) -> bool {
        self.raw() & SIGNED_FLAG != 0
    }

    pub fn is_float(self) -> bool {
        self.raw() & FLOAT_FLAG != 0
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::U8 => "U8",
            Self::S8 => "S8",
            Self::U16 => "U16",
            Self::S16 => "S16",
            Self::U32 => "U32",
            Self::S32 => "S32",
            Self::U64 => "U64",
            Self::S64 => "S64",
            Self::Float => "Float",
        }
    }

    /// Decode the first element of `payload` as this type.
    ///
    /// Returns `None` when the payload is shorter than one element.
    pub fn first_scalar(self, payload: &[u8]) -> Option<Scalar> {
        let scalar = match self {
            Self::U8 => Scalar::U8(*payload.first()?),
            Self::S8 => Scalar::S8(i8::from_le_bytes(take(payload)?)),
            Self::U16 => Scalar::U16(u16::from_le_bytes(take(payload)?)),
            Self::S16 => Scalar::S16(i16::from_le_bytes(take(payload)?)),
            Self::U32 => Scalar::U32(u32::from_le_bytes(take(payload)?)),
            Self::S32 => Scalar::S32(i32::from_le_bytes(take(payload)?)),
            Self::U64 => Scalar::U64(u64::from_le_bytes(take(payload)?)),
            Self::S64 => Scalar::S64(i64::from_le_bytes(take(payload)?)),
            Self::Float => Scalar::Float(f32::from_le_bytes(take(payload)?)),
        };
        Some(scalar)
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn take<const N: usize>(payload: &[u8]) -> Option<[u8; N]> {
    payload.get(..N)?.try_into().ok()
}

/// A single decoded payload element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    U8(u8),
    S8(i8),
    U16(u16),
    S16(i16),
    U32(u32),
    S32(i32),
    U64(u64),
    S64(i64),
    Float(f32),
}

impl Scalar {
    /// The element type this value was decoded as.
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Scalar::U8(_) => PayloadType::U8,
            Scalar::S8(_) => PayloadType::S8,
            Scalar::U16(_) => PayloadType::U16,
            Scalar::S16(_) => PayloadType::S16,
            Scalar::U32(_) => PayloadType::U32,
            Scalar::S32(_) => PayloadType::S32,
            Scalar::U64(_) => PayloadType::U64,
            Scalar::S64(_) => PayloadType::S64,
            Scalar::Float(_) => PayloadType::Float,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::U8(v) => write!(f, "{v}"),
            Scalar::S8(v) => write!(f, "{v}"),
            Scalar::U16(v) => write!(f, "{v}"),
            Scalar::S16(v) => write!(f, "{v}"),
            Scalar::U32(v) => write!(f, "{v}"),
            Scalar::S32(v) => write!(f, "{v}"),
            Scalar::U64(v) => write!(f, "{v}"),
            Scalar::S64(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
        }
    }
}
