/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Pluggable wire protocols.
//!
//! A [`SessionProtocol`] bundles the three capabilities a wire format has to
//! provide: a parser into [`SessionMessage`], a [`SessionProxy`] honouring the
//! composition contract, and [`MessageOffsets`] describing where the
//! sequence number and PossDup live for in-place patching.

use crate::identity::SessionIdStrategy;
use crate::message::SessionMessage;
use crate::proxy::SessionProxy;
use crate::publication::Publication;
use fixgate_core::clock::EpochNanoClock;
use fixgate_core::error::DecodeError;
use fixgate_core::message::MsgType;
use fixgate_core::types::SessionId;
use std::ops::Range;
use std::sync::Arc;

/// Decodes complete frames into session messages.
pub trait SessionParser: Send {
    /// Parses one frame.
    ///
    /// # Errors
    /// Returns `DecodeError` if the frame is malformed.
    fn parse(&mut self, frame: &[u8]) -> Result<SessionMessage, DecodeError>;
}

/// Byte-level knowledge of a protocol's frames.
pub trait MessageOffsets: Send + Sync {
    /// Reads the sequence number without a full decode.
    fn seq_num(&self, frame: &[u8]) -> Option<u64>;

    /// Returns the byte range of the sequence number value.
    fn seq_num_range(&self, frame: &[u8]) -> Option<Range<usize>>;

    /// Returns the byte range of the PossDup flag value.
    fn poss_dup_range(&self, frame: &[u8]) -> Option<Range<usize>>;

    /// Reads the message type without a full decode.
    fn msg_type(&self, frame: &[u8]) -> Option<MsgType>;

    /// Returns the frame with every field that legitimately differs between
    /// two sends of the same message removed or zeroed.
    fn strip_volatile(&self, frame: &[u8]) -> Vec<u8>;

    /// Overwrites the sequence number in place.
    ///
    /// Returns false if the frame has no sequence number or the new value
    /// does not fit in the existing field.
    fn patch_seq_num(&self, frame: &mut [u8], seq_num: u64) -> bool;

    /// Returns a copy of `frame` with passwords masked, or `None` if it
    /// carries none.
    fn mask_credentials(&self, _frame: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

/// A wire protocol the session layer can run over.
pub trait SessionProtocol: Send + Sync + 'static {
    /// Parser type.
    type Parser: SessionParser + 'static;
    /// Proxy type.
    type Proxy: SessionProxy + 'static;
    /// Offsets type.
    type Offsets: MessageOffsets + 'static;

    /// Protocol name for logs.
    fn name(&self) -> &'static str;

    /// Creates a parser for one session.
    fn make_parser(&self, session_id: SessionId) -> Self::Parser;

    /// Creates a proxy publishing to `publication` and stamping time from `clock`.
    fn make_proxy(
        &self,
        publication: Arc<dyn Publication>,
        clock: Arc<dyn EpochNanoClock>,
    ) -> Self::Proxy;

    /// Creates the offsets helper.
    fn make_offsets(&self) -> Self::Offsets;

    /// Returns the identity strategy the proxies stamp headers with.
    fn identity(&self) -> Arc<dyn SessionIdStrategy>;

    /// Returns a copy for replaying archived frames.
    ///
    /// Archived logons have their passwords masked, so integrity checks over
    /// the original bytes are skipped.
    fn for_replay(&self) -> Self
    where
        Self: Sized;
}
