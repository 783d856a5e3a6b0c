/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! FIX checksum (tag 10).
//!
//! Sum of every byte preceding the `10=` field, modulo 256, written as three
//! zero-padded digits.

/// Length of the trailer `10=NNN<SOH>`.
pub const TRAILER_LEN: usize = 7;

/// Calculates the FIX checksum for the given data.
///
/// # Arguments
/// * `data` - The message bytes to checksum (excluding the 10=XXX| field)
///
/// # Example
/// ```
/// use fixgate_tagvalue::calculate_checksum;
///
/// assert_eq!(calculate_checksum(b"ABC"), 198);
/// ```
#[inline]
#[must_use]
pub fn calculate_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Formats a checksum value as a 3-digit zero-padded string.
#[inline]
#[must_use]
pub fn format_checksum(checksum: u8) -> [u8; 3] {
    [
        b'0' + checksum / 100,
        b'0' + (checksum / 10) % 10,
        b'0' + checksum % 10,
    ]
}

/// Parses a 3-digit checksum string.
///
/// # Returns
/// `Some(checksum)` if the input is exactly three digits not exceeding 255.
#[must_use]
pub fn parse_checksum(bytes: &[u8]) -> Option<u8> {
    if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value = bytes
        .iter()
        .fold(0u16, |acc, &b| acc * 10 + u16::from(b - b'0'));
    u8::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_checksum_empty() {
        assert_eq!(calculate_checksum(b""), 0);
    }

    #[test]
    fn test_calculate_checksum_wraps() {
        let data = vec![255u8; 1000];
        let expected = ((255u32 * 1000) % 256) as u8;
        assert_eq!(calculate_checksum(&data), expected);
    }

    #[test]
    fn test_format_checksum() {
        assert_eq!(format_checksum(0), *b"000");
        assert_eq!(format_checksum(42), *b"042");
        assert_eq!(format_checksum(255), *b"255");
    }

    #[test]
    fn test_parse_checksum() {
        assert_eq!(parse_checksum(b"042"), Some(42));
        assert_eq!(parse_checksum(b"255"), Some(255));
        assert_eq!(parse_checksum(b"256"), None);
        assert_eq!(parse_checksum(b"999"), None);
        assert_eq!(parse_checksum(b"12X"), None);
        assert_eq!(parse_checksum(b"00"), None);
    }
}
