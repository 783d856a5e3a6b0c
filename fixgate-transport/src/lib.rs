/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # FixGate Transport
//!
//! Byte stream framing for the FixGate engine.
//!
//! This crate provides:
//! - **Tag=value codec**: splits a stream on BeginString/BodyLength/CheckSum
//! - **SOFH codec**: splits a stream on the Simple Open Framing Header
//!
//! Codecs only delimit frames. Content validation, checksums included, is
//! left to the session parser so a bad frame can be rejected instead of
//! tearing the connection down.

pub mod codec;
pub mod sofh;

pub use codec::{CodecError, FixCodec};
pub use sofh::SofhCodec;
