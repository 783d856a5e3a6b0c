/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Field positions inside tag=value frames.

use crate::protocol::MessageOffsets;
use fixgate_core::field::tags;
use fixgate_core::message::MsgType;
use fixgate_tagvalue::{PasswordCleaner, find_field, strip_volatile};
use std::ops::Range;

/// Locates header fields in tag=value frames without decoding them.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixOffsets;

impl MessageOffsets for FixOffsets {
    fn seq_num(&self, frame: &[u8]) -> Option<u64> {
        let range = find_field(frame, tags::MSG_SEQ_NUM)?;
        std::str::from_utf8(&frame[range]).ok()?.parse().ok()
    }

    fn seq_num_range(&self, frame: &[u8]) -> Option<Range<usize>> {
        find_field(frame, tags::MSG_SEQ_NUM)
    }

    fn poss_dup_range(&self, frame: &[u8]) -> Option<Range<usize>> {
        find_field(frame, tags::POSS_DUP_FLAG)
    }

    fn msg_type(&self, frame: &[u8]) -> Option<MsgType> {
        let range = find_field(frame, tags::MSG_TYPE)?;
        match std::str::from_utf8(&frame[range]).ok()?.parse() {
            Ok(msg_type) => Some(msg_type),
            Err(never) => match never {},
        }
    }

    fn strip_volatile(&self, frame: &[u8]) -> Vec<u8> {
        strip_volatile(frame)
    }

    /// The checksum is not recomputed.
    fn patch_seq_num(&self, frame: &mut [u8], seq_num: u64) -> bool {
        let Some(range) = find_field(frame, tags::MSG_SEQ_NUM) else {
            return false;
        };
        let mut buf = itoa::Buffer::new();
        let digits = buf.format(seq_num).as_bytes();
        let width = range.len();
        if digits.len() > width {
            return false;
        }

        let target = &mut frame[range];
        let pad = width - digits.len();
        target[..pad].fill(b'0');
        target[pad..].copy_from_slice(digits);
        true
    }

    fn mask_credentials(&self, frame: &[u8]) -> Option<Vec<u8>> {
        let mut cleaner = PasswordCleaner::new();
        let cleaned = cleaner.clean(frame);
        (cleaned != frame).then(|| cleaned.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: &[u8] =
        b"8=FIX.4.4\x019=40\x0135=8\x0149=GW\x0156=CLIENT\x0134=12\x0152=20261016-10:00:00.000\x0110=000\x01";

    #[test]
    fn test_reads_header_fields() {
        assert_eq!(FixOffsets.seq_num(FRAME), Some(12));
        assert_eq!(FixOffsets.msg_type(FRAME), Some(MsgType::ExecutionReport));
        assert!(FixOffsets.poss_dup_range(FRAME).is_none());
        let range = FixOffsets.seq_num_range(FRAME).unwrap();
        assert_eq!(&FRAME[range], b"12");
    }

    #[test]
    fn test_patch_seq_num_keeps_width() {
        let mut frame = FRAME.to_vec();
        assert!(FixOffsets.patch_seq_num(&mut frame, 7));
        assert_eq!(FixOffsets.seq_num(&frame), Some(7));
        assert_eq!(frame.len(), FRAME.len());

        assert!(!FixOffsets.patch_seq_num(&mut frame, 123));
    }

    #[test]
    fn test_strip_volatile_drops_time_and_checksum() {
        let stripped = FixOffsets.strip_volatile(FRAME);
        assert!(find_field(&stripped, 52).is_none());
        assert!(find_field(&stripped, 10).is_none());
        assert!(find_field(&stripped, 34).is_some());
    }

    #[test]
    fn test_mask_credentials() {
        let logon = b"8=FIX.4.4\x019=30\x0135=A\x0134=1\x01553=trader\x01554=secret\x0110=000\x01";
        let masked = FixOffsets.mask_credentials(logon).unwrap();
        let range = find_field(&masked, tags::PASSWORD).unwrap();
        assert_eq!(&masked[range], b"***");
        assert_eq!(FixOffsets.mask_credentials(FRAME), None);
    }
}
