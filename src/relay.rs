use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, trace, warn};

use crate::{
    config::RelayConfig,
    webhooks::{
        gitee::{route_event, validate_envelope, DecodeError, EnvelopeError, GiteeEvent},
        InboundEnvelope,
    },
};

mod comments;
pub use comments::{CommentScanner, CommentSource};

mod filter;
pub use filter::PullRequestFilter;

mod message_builder;
pub use message_builder::{build_ci_checked, CiCheckedMessage};

mod publisher;
pub use publisher::{BoxError, MessageSink, PublishError, Publisher};

#[derive(Debug, Error)]
pub enum HandleError {
    #[error("invalid msg: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// What happened to an envelope that was handled without error.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// Not a CI completion: other event type, or a pull request event that didn't pass the
    /// filter.
    Ignored,
    Published(CiCheckedMessage),
}

/// Turns Gitee pull request hooks into `ci checked` messages.
///
/// Only holds read-only configuration besides the comment source and the sink, so
/// [`Relay::handle`] can be called concurrently.
pub struct Relay<C, S> {
    user_agent: String,
    filter: PullRequestFilter,
    scanner: CommentScanner<C>,
    publisher: Publisher<S>,
}

impl<C: CommentSource, S: MessageSink> Relay<C, S> {
    pub fn new(config: &RelayConfig, comments: C, sink: S) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            filter: PullRequestFilter::new(&config.repository),
            scanner: CommentScanner::new(comments, config.ci_robot_name.clone()),
            publisher: Publisher::new(sink, config.topics.software_pkg_ci_checked.clone()),
        }
    }

    /// Handles envelopes until every sender is dropped.
    pub async fn run(&self, mut envelopes: UnboundedReceiver<InboundEnvelope>) {
        debug!("running...");

        loop {
            let envelope = match envelopes.recv().await {
                Some(envelope) => envelope,
                None => {
                    info!("all channel senders were dropped, exiting receive loop");
                    break;
                }
            };
            debug!("received envelope of {} bytes", envelope.payload.len());

            match self.handle(&envelope).await {
                Ok(Outcome::Ignored) => trace!("envelope didn't need a message"),
                Ok(Outcome::Published(message)) => {
                    debug!("published ci checked message for PR {}", message.number)
                }
                Err(e) => warn!("encountered error while handling envelope: {}", e),
            }
        }
    }

    pub async fn handle(&self, envelope: &InboundEnvelope) -> Result<Outcome, HandleError> {
        let event_type = validate_envelope(envelope.headers.as_ref(), &self.user_agent)?;

        let event = match route_event(event_type, &envelope.payload)? {
            GiteeEvent::PullRequest(event) => event,
            GiteeEvent::Other(event_type) => {
                trace!("ignoring `{}` event", event_type);
                return Ok(Outcome::Ignored);
            }
        };

        let label = match self.filter.check(&event) {
            Some(label) => label,
            None => return Ok(Outcome::Ignored),
        };
        debug!("{} is labelled {}", event, label);

        let (org, repo) = event.org_repo();
        let report = self.scanner.latest_report(org, repo, event.number()).await;

        let message = build_ci_checked(&event, label, &report);
        self.publisher.publish(&message).await?;

        Ok(Outcome::Published(message))
    }
}
