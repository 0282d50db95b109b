//! Read-only configuration shared by every association.

use std::{sync::Arc, time::Duration};

use crate::{
    backend::BackendFactory,
    protocol,
    query::{QueryTranslator, Translators},
};

/// Engine configuration, handed to each association as `Arc<EngineConfig>`.
#[derive(Clone)]
pub struct EngineConfig {
    /// Creates per-session backend handles.
    pub backend: Arc<dyn BackendFactory>,
    /// Translators for non-prefix queries.
    pub translators: Translators,
    /// Server limit for the preferred message size.
    pub preferred_message_size: u32,
    /// Server limit for the exceptional record size.
    pub maximum_record_size: u32,
    /// Largest inbound message accepted.
    pub max_request_size: usize,
    /// Idle period before an association is closed.
    pub idle_timeout: Duration,
    /// How long to wait for the peer's `Close` acknowledgement.
    pub close_timeout: Duration,
    /// Implementation name reported in Init responses.
    pub implementation_name: String,
}

impl EngineConfig {
    /// Configuration with default limits around `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn BackendFactory>) -> Self {
        Self {
            backend,
            translators: Translators::default(),
            preferred_message_size: protocol::DEFAULT_PREFERRED_MESSAGE_SIZE,
            maximum_record_size: protocol::DEFAULT_MAXIMUM_RECORD_SIZE,
            max_request_size: protocol::DEFAULT_MAX_REQUEST_SIZE,
            idle_timeout: protocol::DEFAULT_IDLE_TIMEOUT,
            close_timeout: protocol::DEFAULT_CLOSE_TIMEOUT,
            implementation_name: env!("CARGO_PKG_NAME").to_owned(),
        }
    }

    /// Use `translator` for keyword queries.
    #[must_use]
    pub fn with_keyword_translator(mut self, translator: Arc<dyn QueryTranslator>) -> Self {
        self.translators.keyword = Some(translator);
        self
    }

    /// Use `translator` for contextual queries.
    #[must_use]
    pub fn with_contextual_translator(mut self, translator: Arc<dyn QueryTranslator>) -> Self {
        self.translators.contextual = Some(translator);
        self
    }

    /// Override the negotiated size limits.
    #[must_use]
    pub fn with_sizes(mut self, preferred_message_size: u32, maximum_record_size: u32) -> Self {
        self.preferred_message_size = preferred_message_size;
        self.maximum_record_size = maximum_record_size;
        self
    }

    /// Override the largest inbound message.
    #[must_use]
    pub fn with_max_request_size(mut self, max_request_size: usize) -> Self {
        self.max_request_size = max_request_size;
        self
    }

    /// Override the idle and close timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, idle_timeout: Duration, close_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self.close_timeout = close_timeout;
        self
    }

    /// Override the implementation name.
    #[must_use]
    pub fn with_implementation_name(mut self, name: impl Into<String>) -> Self {
        self.implementation_name = name.into();
        self
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("translators", &self.translators)
            .field("preferred_message_size", &self.preferred_message_size)
            .field("maximum_record_size", &self.maximum_record_size)
            .field("max_request_size", &self.max_request_size)
            .field("idle_timeout", &self.idle_timeout)
            .field("close_timeout", &self.close_timeout)
            .field("implementation_name", &self.implementation_name)
            .finish_non_exhaustive()
    }
}
