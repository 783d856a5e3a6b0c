/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Password masking for archived logon messages.
//!
//! Password (554) and NewPassword (925) values are replaced with `***` before
//! a logon reaches the durable log. BodyLength is rewritten at its original
//! digit width; the checksum is left as received.

use crate::decoder::find_field;
use fixgate_core::field::tags;
use smallvec::SmallVec;
use std::ops::Range;

const MASK: &[u8] = b"***";

const PASSWORD_TAGS: [u32; 2] = [tags::PASSWORD, tags::NEW_PASSWORD];

/// Rewrites logon frames with masked credentials.
///
/// Owns one output buffer that is reused across calls.
#[derive(Debug, Default)]
pub struct PasswordCleaner {
    buffer: Vec<u8>,
}

impl PasswordCleaner {
    /// Creates a new cleaner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Masks any password fields in `frame`.
    ///
    /// # Returns
    /// The cleaned frame, or `frame` itself when there is nothing to mask or
    /// the header cannot be interpreted.
    pub fn clean<'a>(&'a mut self, frame: &'a [u8]) -> &'a [u8] {
        let mut passwords: SmallVec<[Range<usize>; 2]> = PASSWORD_TAGS
            .iter()
            .filter_map(|&tag| find_field(frame, tag))
            .collect();
        if passwords.is_empty() {
            return frame;
        }
        passwords.sort_by_key(|range| range.start);

        let Some(body_length) = find_field(frame, tags::BODY_LENGTH) else {
            return frame;
        };
        let Some(old_length) = std::str::from_utf8(&frame[body_length.clone()])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        else {
            return frame;
        };

        let removed: usize = passwords.iter().map(Range::len).sum();
        let added = MASK.len() * passwords.len();
        let Some(new_length) = (old_length + added).checked_sub(removed) else {
            return frame;
        };

        self.buffer.clear();
        self.buffer.extend_from_slice(&frame[..body_length.start]);

        let mut digits = itoa::Buffer::new();
        let digits = digits.format(new_length).as_bytes();
        let padding = body_length.len().saturating_sub(digits.len());
        self.buffer.extend(std::iter::repeat_n(b'0', padding));
        self.buffer.extend_from_slice(digits);

        let mut cursor = body_length.end;
        for password in passwords {
            self.buffer.extend_from_slice(&frame[cursor..password.start]);
            self.buffer.extend_from_slice(MASK);
            cursor = password.end;
        }
        self.buffer.extend_from_slice(&frame[cursor..]);

        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "35=A\x0134=1\x0149=initiator\x0152=20261016-10:00:00.000\x0156=acceptor\x0198=0\x01108=10\x01553=bob\x01554=password\x01";

    fn logon(body: &str, width: usize) -> Vec<u8> {
        format!(
            "8=FIX.4.4\x019={:0width$}\x01{}10=062\x01",
            body.len(),
            body,
            width = width
        )
        .into_bytes()
    }

    #[test]
    fn test_masks_password_and_keeps_width() {
        let original = logon(BODY, 3);
        let masked_body = BODY.replace("554=password", "554=***");
        let expected = logon(&masked_body, 3);

        let mut cleaner = PasswordCleaner::new();
        assert_eq!(cleaner.clean(&original), expected.as_slice());
    }

    #[test]
    fn test_zero_padded_body_length() {
        let original = logon(BODY, 4);
        let cleaned = PasswordCleaner::new().clean(&original).to_vec();
        let expected_length = format!("9={:04}\x01", BODY.len() - 5);
        assert!(
            String::from_utf8_lossy(&cleaned).contains(&expected_length),
            "{}",
            String::from_utf8_lossy(&cleaned)
        );
    }

    #[test]
    fn test_checksum_untouched() {
        let original = logon(BODY, 3);
        let mut cleaner = PasswordCleaner::new();
        assert!(cleaner.clean(&original).ends_with(b"10=062\x01"));
    }

    #[test]
    fn test_clean_at_offset() {
        let mut buffer = vec![b'x'; 100];
        buffer.extend_from_slice(&logon(BODY, 3));
        let mut cleaner = PasswordCleaner::new();
        let cleaned = cleaner.clean(&buffer[100..]);
        assert!(cleaned.starts_with(b"8=FIX.4.4\x01"));
        assert!(String::from_utf8_lossy(cleaned).contains("554=***\x01"));
    }

    #[test]
    fn test_without_password_is_unchanged() {
        let body = "35=0\x0134=2\x01";
        let original = logon(body, 2);
        let mut cleaner = PasswordCleaner::new();
        assert_eq!(cleaner.clean(&original), original.as_slice());
    }

    #[test]
    fn test_masks_new_password() {
        let body = format!("{BODY}925=secret2\x01");
        let original = logon(&body, 3);
        let cleaned = PasswordCleaner::new().clean(&original).to_vec();
        let text = String::from_utf8_lossy(&cleaned);
        assert!(text.contains("554=***\x01925=***\x01"));
        assert!(text.contains(&format!("9={:03}\x01", body.len() - 5 - 4)));
    }
}
