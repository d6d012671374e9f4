use std::{collections::HashMap, time::Duration};

use anyhow::Context;
use async_nats::{HeaderMap, Message, Subscriber};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::{
    config::NatsConfig,
    relay::{BoxError, MessageSink},
    webhooks::{EnvelopeSender, InboundEnvelope},
};

pub async fn connect(config: &NatsConfig) -> anyhow::Result<async_nats::Client> {
    let timeout = Duration::from_secs(config.connect_timeout_secs);
    info!("connecting to NATS at {} (timeout={:?})", config.url, timeout);

    let client = async_nats::ConnectOptions::new()
        .connection_timeout(timeout)
        .connect(config.url.as_str())
        .await
        .context("failed to connect to NATS")?;

    info!("connected to NATS");
    Ok(client)
}

/// Publishes raw bodies on core NATS subjects.
pub struct NatsSink(pub async_nats::Client);

#[async_trait]
impl MessageSink for NatsSink {
    async fn send(&self, topic: &str, body: Vec<u8>) -> Result<(), BoxError> {
        self.0.publish(topic.to_owned(), body.into()).await?;
        self.0.flush().await?;

        Ok(())
    }
}

/// Queue-subscribes to `subject` so hooks are shared between relay replicas.
pub async fn subscribe_hooks(
    client: &async_nats::Client,
    subject: String,
    group: String,
) -> anyhow::Result<Subscriber> {
    let subscriber = client
        .queue_subscribe(subject.clone(), group.clone())
        .await
        .with_context(|| format!("subscribe topic {} failed", subject))?;
    info!("subscribed to `{}` as `{}`", subject, group);

    Ok(subscriber)
}

/// Forwards every delivery to the relay loop.
///
/// Returns once the subscription ends or the relay loop is gone.
pub async fn forward_hooks<M>(mut messages: M, sender: EnvelopeSender)
where
    M: Stream<Item = Message> + Unpin,
{
    while let Some(message) = messages.next().await {
        debug!(subject = %message.subject, "received hook from bus");

        if sender.0.send(envelope_from_message(message)).is_err() {
            warn!("relay loop is gone, stopping subscription");
            return;
        }
    }

    warn!("hook subscription ended");
}

fn envelope_from_message(message: Message) -> InboundEnvelope {
    InboundEnvelope {
        headers: message.headers.as_ref().map(header_map),
        payload: message.payload.to_vec(),
    }
}

/// Flattens NATS headers, keeping the first value of repeated ones. Names keep their case.
fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, values)| {
            values
                .first()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    fn message(payload: &str) -> Message {
        let mut headers = HeaderMap::new();
        headers.insert("X-Gitee-Event", "Merge Request Hook");

        Message {
            subject: "gitee_pr_hook".into(),
            reply: None,
            payload: payload.as_bytes().to_vec().into(),
            headers: Some(headers),
            status: None,
            description: None,
            length: payload.len(),
        }
    }

    #[tokio::test]
    async fn forwarding_returns_when_the_subscription_ends() {
        let (sender, mut receiver) = unbounded_channel();
        let messages = stream::iter(vec![message("one"), message("two")]);

        forward_hooks(messages, EnvelopeSender(sender)).await;

        let first = receiver.try_recv().unwrap();
        assert_eq!(first.payload, b"one");
        assert_eq!(first.headers.unwrap()["X-Gitee-Event"], "Merge Request Hook");
        assert_eq!(receiver.try_recv().unwrap().payload, b"two");
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn forwarding_stops_once_the_relay_is_gone() {
        let (sender, receiver) = unbounded_channel();
        drop(receiver);
        // Never ends on its own
        let messages = stream::iter(vec![message("one")]).chain(stream::pending());

        forward_hooks(messages, EnvelopeSender(sender)).await;
    }

    #[test]
    fn keeps_header_case_and_first_value() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Gitee-Event", "Merge Request Hook");
        headers.append("X-Gitee-Timestamp", "1");
        headers.append("X-Gitee-Timestamp", "2");

        let map = header_map(&headers);

        assert_eq!(map.len(), 2);
        assert_eq!(map["X-Gitee-Event"], "Merge Request Hook");
        assert_eq!(map["X-Gitee-Timestamp"], "1");
        assert!(!map.contains_key("x-gitee-event"));
    }
}
