/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Fixed field positions inside binary frames.

use crate::codec::BinaryFrame;
use crate::layout::{FIXED_OFFSET, POSS_DUP_OFFSET, SENDING_TIME_OFFSET, SEQ_NUM_OFFSET, read_u64};
use crate::parser::frame_msg_type;
use fixgate_core::field::tags;
use fixgate_core::message::MsgType;
use fixgate_session::protocol::MessageOffsets;
use std::ops::Range;

const PASSWORD_TAGS: [u16; 2] = [tags::PASSWORD as u16, tags::NEW_PASSWORD as u16];

/// Locates header fields in binary frames.
///
/// Every template shares the same common block, so positions are constant.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryOffsets;

impl MessageOffsets for BinaryOffsets {
    fn seq_num(&self, frame: &[u8]) -> Option<u64> {
        read_u64(frame, SEQ_NUM_OFFSET)
    }

    fn seq_num_range(&self, frame: &[u8]) -> Option<Range<usize>> {
        (frame.len() >= SENDING_TIME_OFFSET).then_some(SEQ_NUM_OFFSET..SENDING_TIME_OFFSET)
    }

    fn poss_dup_range(&self, frame: &[u8]) -> Option<Range<usize>> {
        (frame.len() >= FIXED_OFFSET).then_some(POSS_DUP_OFFSET..FIXED_OFFSET)
    }

    fn msg_type(&self, frame: &[u8]) -> Option<MsgType> {
        let view = BinaryFrame::parse(frame).ok()?;
        frame_msg_type(&view).ok()
    }

    /// Zeroes SendingTime; binary frames carry no checksum.
    fn strip_volatile(&self, frame: &[u8]) -> Vec<u8> {
        let mut stripped = frame.to_vec();
        if let Some(sending_time) = stripped.get_mut(SENDING_TIME_OFFSET..SENDING_TIME_OFFSET + 8) {
            sending_time.fill(0);
        }
        stripped
    }

    /// Overwrites Password TLV values with `*`, keeping every length intact.
    fn mask_credentials(&self, frame: &[u8]) -> Option<Vec<u8>> {
        let view = BinaryFrame::parse(frame).ok()?;
        let ranges: Vec<_> = view
            .tlvs()
            .filter_map(Result::ok)
            .filter(|tlv| PASSWORD_TAGS.contains(&tlv.tag) && !tlv.value.is_empty())
            .map(|tlv| tlv.range())
            .collect();
        if ranges.is_empty() {
            return None;
        }
        let mut masked = frame.to_vec();
        for range in ranges {
            masked[range].fill(b'*');
        }
        Some(masked)
    }

    fn patch_seq_num(&self, frame: &mut [u8], seq_num: u64) -> bool {
        match frame.get_mut(SEQ_NUM_OFFSET..SENDING_TIME_OFFSET) {
            Some(target) => {
                target.copy_from_slice(&seq_num.to_le_bytes());
                true
            }
            None => false,
        }
    }
}
