use std::fmt;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::{checksum, validate};
use crate::error::{FrameError, Result};
use crate::payload::{PayloadType, TIMESTAMP_FLAG};

/// Frame header: id (1) + length (1) + address (1) + port (1) + payload type (1).
pub const HEADER_SIZE: usize = 5;

/// Timestamp: seconds (4B LE) + ticks of 32 µs (2B LE).
pub const TIMESTAMP_SIZE: usize = 6;

/// Id bits 0-1: message category.
pub const CATEGORY_MASK: u8 = 0x03;

/// Id bit 3: the device rejected the command this frame answers.
pub const ERROR_FLAG: u8 = 0x08;

/// Largest value of the one-byte length field.
pub const MAX_LENGTH: usize = u8::MAX as usize;

/// Port value addressing the device itself.
pub const DEVICE_PORT: u8 = 0xFF;

/// Default staging buffer capacity: 1 MiB.
pub const DEFAULT_STAGING_CAPACITY: usize = 1024 * 1024;

/// Default size of a single read from a byte source: 8 KiB.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8 * 1024;

/// Duration of one timestamp tick in microseconds.
pub const TICK_MICROS: u32 = 32;

/// Returns true if `id` can start a frame: only category and error bits may be set.
pub fn is_valid_id(id: u8) -> bool {
    id & !(CATEGORY_MASK | ERROR_FLAG) == 0
}

/// Message category carried in the low bits of the id byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Read,
    Write,
    Event,
}

impl MessageType {
    /// Category of an id byte, or `None` when the category bits are zero.
    pub fn from_id(id: u8) -> Option<Self> {
        match id & CATEGORY_MASK {
            1 => Some(Self::Read),
            2 => Some(Self::Write),
            3 => Some(Self::Event),
            _ => None,
        }
    }

    /// Id bits for this category, without the error flag.
    pub fn id_bits(self) -> u8 {
        match self {
            Self::Read => 1,
            Self::Write => 2,
            Self::Event => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Read => "Read",
            Self::Write => "Write",
            Self::Event => "Event",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Device time at which a frame was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Whole seconds.
    pub seconds: u32,
    /// Sub-second count in units of 32 µs.
    pub ticks: u16,
}

impl Timestamp {
    pub fn new(seconds: u32, ticks: u16) -> Self {
        Self { seconds, ticks }
    }

    /// Seconds as a float: `seconds + ticks * 32e-6`.
    pub fn as_secs_f64(&self) -> f64 {
        f64::from(self.seconds) + f64::from(self.sub_second_micros()) / 1_000_000.0
    }

    pub fn as_millis_f64(&self) -> f64 {
        f64::from(self.seconds) * 1000.0 + f64::from(self.sub_second_micros()) / 1000.0
    }

    fn sub_second_micros(&self) -> u32 {
        u32::from(self.ticks) * TICK_MICROS
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.seconds))
            + Duration::from_micros(u64::from(self.sub_second_micros()))
    }

    fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        let seconds = u32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?);
        let ticks = u16::from_le_bytes(bytes.get(4..6)?.try_into().ok()?);
        Some(Self { seconds, ticks })
    }
}

/// Fields that precede the payload of an outgoing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub message_type: MessageType,
    pub error: bool,
    pub address: u8,
    pub port: u8,
    pub payload_type: PayloadType,
    pub timestamp: Option<Timestamp>,
}

impl Header {
    /// Header addressed at the device port with no timestamp and no error flag.
    pub fn new(message_type: MessageType, address: u8, payload_type: PayloadType) -> Self {
        Self {
            message_type,
            error: false,
            address,
            port: DEVICE_PORT,
            payload_type,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_error(mut self) -> Self {
        self.error = true;
        self
    }
}

/// A complete, checksum-valid Harp message.
///
/// Frames are immutable once sealed and cheap to clone.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Build a frame from a header and payload.
    pub fn new(header: &Header, payload: &[u8]) -> Result<Self> {
        let mut buf = BytesMut::new();
        encode_frame(header, payload, &mut buf)?;
        Ok(Self { bytes: buf.freeze() })
    }

    /// Parse a complete frame, checking id, length and checksum.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() < 3 {
            return Err(FrameError::Malformed("frame shorter than 3 bytes"));
        }
        if !is_valid_id(bytes[0]) {
            return Err(FrameError::Malformed("id has reserved bits set"));
        }
        if bytes[1] == 0 || bytes[1] as usize + 2 != bytes.len() {
            return Err(FrameError::Malformed("length field does not match frame size"));
        }
        if !validate(&bytes) {
            let last = bytes.len() - 1;
            return Err(FrameError::ChecksumMismatch {
                expected: checksum(&bytes[..last]),
                found: bytes[last],
            });
        }
        Ok(Self { bytes })
    }

    /// Wrap bytes the decoder has already validated.
    pub(crate) fn from_sealed(bytes: Bytes) -> Self {
        debug_assert!(validate(&bytes));
        Self { bytes }
    }

    /// The raw wire bytes, checksum included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Total wire size (length field + 2).
    pub fn wire_size(&self) -> usize {
        self.bytes.len()
    }

    pub fn id(&self) -> u8 {
        self.bytes[0]
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_id(self.id())
    }

    /// True if the device flagged this frame as an error reply.
    pub fn is_error(&self) -> bool {
        self.id() & ERROR_FLAG != 0
    }

    pub fn address(&self) -> Option<u8> {
        self.header_byte(2)
    }

    pub fn port(&self) -> Option<u8> {
        self.header_byte(3)
    }

    /// The payload type byte as sent, timestamp flag included.
    pub fn raw_payload_type(&self) -> Option<u8> {
        self.header_byte(4)
    }

    pub fn payload_type(&self) -> Option<PayloadType> {
        self.raw_payload_type().and_then(PayloadType::from_raw)
    }

    pub fn has_timestamp(&self) -> bool {
        self.raw_payload_type()
            .is_some_and(|raw| raw & TIMESTAMP_FLAG != 0)
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        if !self.has_timestamp() {
            return None;
        }
        Timestamp::from_le_bytes(self.body().get(HEADER_SIZE..)?)
    }

    /// Offset of the first payload byte.
    pub fn payload_offset(&self) -> usize {
        if self.has_timestamp() {
            HEADER_SIZE + TIMESTAMP_SIZE
        } else {
            HEADER_SIZE
        }
    }

    /// Payload bytes, excluding header, timestamp and checksum.
    ///
    /// Empty for frames too short to carry a payload.
    pub fn payload(&self) -> &[u8] {
        self.body().get(self.payload_offset()..).unwrap_or(&[])
    }

    pub fn checksum(&self) -> u8 {
        self.bytes[self.bytes.len() - 1]
    }

    fn body(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 1]
    }

    fn header_byte(&self, offset: usize) -> Option<u8> {
        self.body().get(offset).copied()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Frame");
        dbg.field("message_type", &self.message_type())
            .field("error", &self.is_error())
            .field("address", &self.address())
            .field("payload_type", &self.raw_payload_type())
            .field("timestamp", &self.timestamp())
            .field("len", &self.bytes.len());
        dbg.finish()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────┬────────┬─────────┬──────┬──────┬─────────────┬─────────┬──────────┐
/// │ Id │ Length │ Address │ Port │ Type │ [Timestamp] │ Payload │ Checksum │
/// │ 1B │ 1B     │ 1B      │ 1B   │ 1B   │ 6B LE       │ N bytes │ 1B       │
/// └────┴────────┴─────────┴──────┴──────┴─────────────┴─────────┴──────────┘
/// ```
pub fn encode_frame(header: &Header, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let ts_len = if header.timestamp.is_some() {
        TIMESTAMP_SIZE
    } else {
        0
    };
    // address + port + type + timestamp + payload + checksum
    let length = 3 + ts_len + payload.len() + 1;
    if length > MAX_LENGTH {
        return Err(FrameError::TooLarge {
            size: length,
            max: MAX_LENGTH,
        });
    }

    let mut id = header.message_type.id_bits();
    if header.error {
        id |= ERROR_FLAG;
    }
    let mut payload_type = header.payload_type.raw();
    if header.timestamp.is_some() {
        payload_type |= TIMESTAMP_FLAG;
    }

    let start = dst.len();
    dst.reserve(length + 2);
    dst.put_u8(id);
    dst.put_u8(length as u8);
    dst.put_u8(header.address);
    dst.put_u8(header.port);
    dst.put_u8(payload_type);
    if let Some(ts) = header.timestamp {
        dst.put_u32_le(ts.seconds);
        dst.put_u16_le(ts.ticks);
    }
    dst.put_slice(payload);
    let sum = checksum(&dst[start..]);
    dst.put_u8(sum);
    Ok(())
}

/// Configuration for blocking frame readers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Initial capacity of the staging buffer. Default: 1 MiB.
    pub staging_capacity: usize,
    /// Maximum bytes requested from the source per read. Default: 8 KiB.
    pub read_chunk_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            staging_capacity: DEFAULT_STAGING_CAPACITY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}
