/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Errors raised while reading binary frames.

use fixgate_core::error::DecodeError;
use thiserror::Error;

/// A binary frame does not follow the expected layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BinaryError {
    /// Fewer bytes than the layout requires.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// SOFH length disagrees with the frame size.
    #[error("frame length mismatch: header declares {declared}, frame has {actual}")]
    LengthMismatch {
        /// Length declared in the SOFH.
        declared: usize,
        /// Actual frame length.
        actual: usize,
    },

    /// SOFH encoding type is not the little endian SBE marker.
    #[error("unsupported encoding type {0:#06x}")]
    EncodingType(u16),

    /// Schema id or version not understood.
    #[error("unsupported schema {schema_id} version {version}")]
    Schema {
        /// Schema id.
        schema_id: u16,
        /// Schema version.
        version: u16,
    },

    /// Template id is neither a session template nor a business one.
    #[error("unknown template id {0}")]
    UnknownTemplate(u16),

    /// Root block shorter than the common block plus the template's fields.
    #[error("block length {block_length} too short for template {template_id}")]
    BlockLength {
        /// Declared block length.
        block_length: u16,
        /// Template id.
        template_id: u16,
    },

    /// A TLV runs past the end of the frame.
    #[error("malformed tlv at offset {offset}")]
    Tlv {
        /// Offset of the TLV header.
        offset: usize,
    },

    /// A required TLV is absent.
    #[error("missing required field: tag {0}")]
    MissingField(u16),

    /// A TLV value is not valid for its field.
    #[error("invalid value for tag {tag}: {reason}")]
    InvalidValue {
        /// TLV tag.
        tag: u16,
        /// Why the value is invalid.
        reason: String,
    },
}

impl From<BinaryError> for DecodeError {
    fn from(err: BinaryError) -> Self {
        match err {
            BinaryError::Truncated { .. } => DecodeError::Incomplete,
            BinaryError::MissingField(tag) => DecodeError::MissingRequiredField {
                tag: u32::from(tag),
            },
            BinaryError::InvalidValue { tag, reason } => DecodeError::InvalidFieldValue {
                tag: u32::from(tag),
                reason,
            },
            other => DecodeError::Malformed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_to_decode_error() {
        assert_eq!(
            DecodeError::from(BinaryError::MissingField(49)),
            DecodeError::MissingRequiredField { tag: 49 }
        );
        assert!(matches!(
            DecodeError::from(BinaryError::UnknownTemplate(42)),
            DecodeError::Malformed(_)
        ));
        assert_eq!(
            BinaryError::EncodingType(0x5000).to_string(),
            "unsupported encoding type 0x5000"
        );
    }
}
