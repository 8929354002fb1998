use common::helper::error_chain_fmt;
use rdkafka::Message;
use serde_json::Value as JsonValue;

use super::job_record::JobRecord;

/// A message as delivered by the broker: raw payload and its position in the stream
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    pub stream: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

impl MessageEnvelope {
    pub fn from_message<M: Message>(message: &M) -> Self {
        Self {
            stream: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec),
        }
    }

    /// Decodes the payload as a UTF-8 JSON object.
    ///
    /// The `null` literal and a missing payload both decode to `None`.
    pub fn try_decoding(&self) -> Result<Option<JobRecord>, MessageDecodeError> {
        let Some(payload) = &self.payload else {
            return Ok(None);
        };

        let data = std::str::from_utf8(payload)?;
        let value: JsonValue = serde_json::from_str(data)
            .map_err(|e| MessageDecodeError::InvalidJsonData(e, data.to_string()))?;

        match value {
            JsonValue::Null => Ok(None),
            JsonValue::Object(record) => Ok(Some(record)),
            other => Err(MessageDecodeError::NotAnObject(other.to_string())),
        }
    }
}

#[derive(thiserror::Error)]
pub enum MessageDecodeError {
    #[error("Payload could not be converted from utf8 u8 vector to string")]
    InvalidStringData(#[from] std::str::Utf8Error),

    #[error("Payload did not represent valid JSON: {0}. Data: {1}")]
    InvalidJsonData(serde_json::Error, String),

    #[error("Payload is valid JSON but not an object: {0}")]
    NotAnObject(String),
}

impl std::fmt::Debug for MessageDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
