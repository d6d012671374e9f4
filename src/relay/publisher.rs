use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::relay::message_builder::CiCheckedMessage;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Somewhere raw message bodies can be sent to, e.g. a NATS connection.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, topic: &str, body: Vec<u8>) -> Result<(), BoxError>;
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("couldn't serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("couldn't send message to `{topic}`: {source}")]
    Transport {
        topic: String,
        #[source]
        source: BoxError,
    },
}

/// Serializes [`CiCheckedMessage`]s and emits them to a single topic.
///
/// No key and no retry: redelivery is up to the bus client.
pub struct Publisher<S> {
    sink: S,
    topic: String,
}

impl<S: MessageSink> Publisher<S> {
    pub fn new(sink: S, topic: String) -> Self {
        Self { sink, topic }
    }

    pub async fn publish(&self, message: &CiCheckedMessage) -> Result<(), PublishError> {
        let body = serde_json::to_vec(message)?;
        let printable = String::from_utf8_lossy(&body).into_owned();

        self.sink
            .send(&self.topic, body)
            .await
            .map_err(|source| PublishError::Transport {
                topic: self.topic.clone(),
                source,
            })?;

        info!("send success to {} {}", self.topic, printable);

        Ok(())
    }
}
