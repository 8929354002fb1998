use async_trait::async_trait;

use crate::domain::entities::message_envelope::MessageEnvelope;

/// The stream a processor consumes and the consumer group it consumes it as
///
/// Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerBinding {
    stream_name: String,
    group_id: String,
}

impl ConsumerBinding {
    pub fn new(stream_name: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            group_id: group_id.into(),
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

/// A unit of work run on every message of one stream
///
/// The consumer runtime only knows processors through this trait.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    fn binding(&self) -> &ConsumerBinding;

    fn stream_name(&self) -> &str {
        self.binding().stream_name()
    }

    fn group_id(&self) -> &str {
        self.binding().group_id()
    }

    /// Handles one message, returning whether it was processed successfully.
    ///
    /// Expected failures (undecodable payload, unavailable collaborator...) are logged
    /// and reported as `false`, never raised.
    async fn handle_message(&self, message: &MessageEnvelope) -> bool;
}
