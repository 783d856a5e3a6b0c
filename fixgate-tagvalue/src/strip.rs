/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Removal of fields that legitimately differ between two sends of the same
//! message.

use crate::decoder::{EQUALS, SOH, parse_tag};
use fixgate_core::field::tags;
use memchr::memchr;

/// Fields that change with wall-clock time: SendingTime, OrigSendingTime and CheckSum.
pub const VOLATILE_TAGS: [u32; 3] = [tags::SENDING_TIME, tags::ORIG_SENDING_TIME, tags::CHECK_SUM];

/// Returns a copy of `frame` with every field whose tag is in `tags` removed.
///
/// Fields are removed together with their trailing SOH. Anything that does not
/// parse as `tag=value` is kept verbatim.
#[must_use]
pub fn strip_fields(frame: &[u8], tags: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame.len());
    let mut offset = 0;

    while offset < frame.len() {
        let end = memchr(SOH, &frame[offset..]).map_or(frame.len(), |pos| offset + pos + 1);
        let field = &frame[offset..end];
        let tag = memchr(EQUALS, field).and_then(|eq| parse_tag(&field[..eq]));
        if !tag.is_some_and(|tag| tags.contains(&tag)) {
            out.extend_from_slice(field);
        }
        offset = end;
    }

    out
}

/// Strips [`VOLATILE_TAGS`] from a tag=value frame.
#[inline]
#[must_use]
pub fn strip_volatile(frame: &[u8]) -> Vec<u8> {
    strip_fields(frame, &VOLATILE_TAGS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_volatile() {
        let a = b"8=FIX.4.4\x019=20\x0135=0\x0152=20260101-10:00:00.000\x0134=2\x0110=111\x01";
        let b = b"8=FIX.4.4\x019=20\x0135=0\x0152=20261016-12:30:45.123\x0134=2\x0110=222\x01";
        assert_eq!(strip_volatile(a), strip_volatile(b));
        assert_eq!(strip_volatile(a), b"8=FIX.4.4\x019=20\x0135=0\x0134=2\x01".to_vec());
    }

    #[test]
    fn test_strip_keeps_similar_tags() {
        let frame = b"8=FIX.4.4\x01152=5\x01110=1\x0152=X\x01";
        assert_eq!(
            strip_volatile(frame),
            b"8=FIX.4.4\x01152=5\x01110=1\x01".to_vec()
        );
    }

    #[test]
    fn test_strip_custom_tags() {
        let frame = b"35=D\x0111=ORD1\x0155=ABC\x01";
        assert_eq!(strip_fields(frame, &[11]), b"35=D\x0155=ABC\x01".to_vec());
    }
}
