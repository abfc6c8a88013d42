//! Human-readable reports for frames the device flagged as errors.

use std::fmt;

use crate::codec::{Frame, MessageType};
use crate::payload::{PayloadType, TIMESTAMP_FLAG};

/// A device reply with the error flag set, with its interpreted diagnostic.
///
/// This is a recoverable condition: the session keeps decoding after reporting it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProtocolError {
    frame: Frame,
    message: String,
}

impl ProtocolError {
    /// Interpret an error-flagged frame.
    pub fn from_frame(frame: Frame) -> Self {
        let message = interpret_error(&frame);
        Self { frame, message }
    }

    /// The frame that carried the error.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }
}

/// Build the diagnostic for an error-flagged frame.
///
/// Decodes the first payload element as the declared type. An unknown type or
/// a payload shorter than one element degrades to "type not correct"; this
/// function never fails.
pub fn interpret_error(frame: &Frame) -> String {
    let raw_type = frame.raw_payload_type().map(|raw| raw & !TIMESTAMP_FLAG);
    let declared = raw_type.and_then(PayloadType::from_raw);

    let value = declared
        .and_then(|ty| ty.first_scalar(frame.payload()))
        .map(|scalar| scalar.to_string())
        .unwrap_or_else(|| "type not correct".to_string());

    let command = match frame.message_type() {
        Some(MessageType::Write) => "write",
        _ => "read",
    };

    format!(
        "The device reported an erroneous {command} command. Payload: {value}, Address: {address}, Type: {declared}. \
         Note: if the payload is an array, only the first value is shown here.",
        address = DisplayOpt(frame.address()),
        declared = TypeName(declared, raw_type),
    )
}

struct DisplayOpt(Option<u8>);

impl fmt::Display for DisplayOpt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("unknown"),
        }
    }
}

struct TypeName(Option<PayloadType>, Option<u8>);

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.0, self.1) {
            (Some(ty), _) => write!(f, "{ty}"),
            (None, Some(raw)) => write!(f, "{raw:#04x}"),
            (None, None) => f.write_str("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum;
    use crate::codec::{Header, Timestamp};

    fn raw_frame(body: &[u8]) -> Frame {
        let mut bytes = body.to_vec();
        bytes.push(checksum(body));
        Frame::from_bytes(bytes).unwrap()
    }

    #[test]
    fn write_error_with_u16_payload() {
        let header = Header::new(MessageType::Write, 42, PayloadType::U16).with_error();
        let frame = Frame::new(&header, &1234u16.to_le_bytes()).unwrap();

        let message = interpret_error(&frame);
        assert!(message.contains("erroneous write command"));
        assert!(message.contains("Payload: 1234"));
        assert!(message.contains("Address: 42"));
        assert!(message.contains("Type: U16"));
        assert!(message.contains("only the first value"));
    }

    #[test]
    fn read_error_decodes_after_timestamp() {
        let header = Header::new(MessageType::Read, 7, PayloadType::S32)
            .with_error()
            .with_timestamp(Timestamp::new(99, 1));
        let mut payload = (-5i32).to_le_bytes().to_vec();
        payload.extend_from_slice(&8i32.to_le_bytes());
        let frame = Frame::new(&header, &payload).unwrap();

        let message = interpret_error(&frame);
        assert!(message.contains("erroneous read command"));
        assert!(message.contains("Payload: -5,"));
        assert!(message.contains("Type: S32"));
    }

    #[test]
    fn float_payload() {
        let header = Header::new(MessageType::Write, 3, PayloadType::Float).with_error();
        let frame = Frame::new(&header, &0.5f32.to_le_bytes()).unwrap();
        assert!(interpret_error(&frame).contains("Payload: 0.5"));
    }

    #[test]
    fn unknown_type_degrades() {
        let frame = raw_frame(&[0x0A, 0x06, 0x10, 0xFF, 0x03, 0x01, 0x02]);
        let message = interpret_error(&frame);
        assert!(message.contains("type not correct"));
        assert!(message.contains("Address: 16"));
        assert!(message.contains("Type: 0x03"));
    }

    #[test]
    fn short_payload_degrades() {
        let frame = raw_frame(&[0x0A, 0x05, 0x10, 0xFF, 0x04, 0x01]);
        let message = interpret_error(&frame);
        assert!(message.contains("type not correct"));
        assert!(message.contains("Type: U32"));
    }

    #[test]
    fn header_less_frame_never_panics() {
        let frame = raw_frame(&[0x09, 0x01]);
        let message = interpret_error(&frame);
        assert!(message.contains("type not correct"));
        assert!(message.contains("Address: unknown"));
        assert!(message.contains("Type: unknown"));
    }

    #[test]
    fn protocol_error_keeps_frame() {
        let header = Header::new(MessageType::Write, 1, PayloadType::U8).with_error();
        let frame = Frame::new(&header, &[9]).unwrap();
        let err = ProtocolError::from_frame(frame.clone());

        assert_eq!(err.frame(), &frame);
        assert_eq!(err.to_string(), err.message());
        assert!(err.message().contains("Payload: 9"));
        assert_eq!(err.into_frame(), frame);
    }
}
