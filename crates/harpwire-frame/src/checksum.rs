//! Modulo-256 frame checksum.

/// Sum of `bytes` modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Returns true if the last byte of `frame` equals the checksum of every byte before it.
///
/// An empty buffer is never valid.
pub fn validate(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((last, body)) => checksum(body) == *last,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_wraps() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x01, 0x02, 0x03]), 0x06);
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(checksum(&[0x80; 4]), 0x00);
    }

    #[test]
    fn validate_matches_trailing_byte() {
        assert!(validate(&[0x02, 0x04, 0x20, 0xFF, 0x01, 0x26]));
        assert!(!validate(&[0x02, 0x04, 0x20, 0xFF, 0x01, 0x27]));
    }

    #[test]
    fn validate_edge_lengths() {
        assert!(!validate(&[]));
        // A lone zero byte sums the empty prefix to zero.
        assert!(validate(&[0x00]));
        assert!(!validate(&[0x01]));
    }
}
