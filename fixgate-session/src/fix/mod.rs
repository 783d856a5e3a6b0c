/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Classic tag=value FIX as a [`SessionProtocol`].

mod offsets;
mod parser;
mod proxy;

pub use offsets::FixOffsets;
pub use parser::FixParser;
pub use proxy::FixProxy;

use crate::config::SessionConfig;
use crate::identity::{SenderAndTargetCompIdStrategy, SessionIdStrategy};
use crate::protocol::SessionProtocol;
use crate::publication::Publication;
use fixgate_core::clock::EpochNanoClock;
use fixgate_core::types::SessionId;
use std::sync::Arc;

/// Tag=value FIX protocol factory.
#[derive(Debug, Clone)]
pub struct FixProtocol {
    begin_string: String,
    validate_checksum: bool,
    identity: Arc<dyn SessionIdStrategy>,
}

impl FixProtocol {
    /// Creates a protocol for `begin_string` with checksum validation on.
    #[must_use]
    pub fn new(begin_string: impl Into<String>) -> Self {
        Self {
            begin_string: begin_string.into(),
            validate_checksum: true,
            identity: Arc::new(SenderAndTargetCompIdStrategy),
        }
    }

    /// Creates a protocol matching a session configuration.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.begin_string.clone()).with_checksum_validation(config.validate_checksum)
    }

    /// Sets checksum validation for parsers created from now on.
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Replaces the identity strategy.
    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn SessionIdStrategy>) -> Self {
        self.identity = identity;
        self
    }

    /// Returns the BeginString.
    #[must_use]
    pub fn begin_string(&self) -> &str {
        &self.begin_string
    }
}

impl SessionProtocol for FixProtocol {
    type Parser = FixParser;
    type Proxy = FixProxy;
    type Offsets = FixOffsets;

    fn name(&self) -> &'static str {
        "fix"
    }

    fn make_parser(&self, session_id: SessionId) -> FixParser {
        FixParser::new(session_id, self.validate_checksum)
    }

    fn make_proxy(
        &self,
        publication: Arc<dyn Publication>,
        clock: Arc<dyn EpochNanoClock>,
    ) -> FixProxy {
        FixProxy::new(
            self.begin_string.clone(),
            publication,
            clock,
            Arc::clone(&self.identity),
        )
    }

    fn make_offsets(&self) -> FixOffsets {
        FixOffsets
    }

    fn identity(&self) -> Arc<dyn SessionIdStrategy> {
        Arc::clone(&self.identity)
    }

    fn for_replay(&self) -> Self {
        self.clone().with_checksum_validation(false)
    }
}
