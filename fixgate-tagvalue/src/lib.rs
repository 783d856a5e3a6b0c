/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # FixGate Tag-Value
//!
//! FIX tag=value codec used by the text session protocol.
//!
//! ## Features
//!
//! - **Zero-copy parsing**: Field values reference the original buffer
//! - **Scratch-buffer encoding**: Frames are built in place inside one reusable buffer
//! - **Checksum calculation**: Sum of bytes modulo 256
//! - **Log hygiene**: Volatile-field stripping for comparisons and password masking for archives

pub mod checksum;
pub mod decoder;
pub mod encoder;
pub mod password;
pub mod strip;

pub use checksum::calculate_checksum;
pub use decoder::{Decoder, SOH, find_field};
pub use encoder::{Encoder, HEADER_RESERVE};
pub use fixgate_core::message::RawMessage;
pub use password::PasswordCleaner;
pub use strip::{VOLATILE_TAGS, strip_fields, strip_volatile};
