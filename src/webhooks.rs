use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;

pub mod gitee;
pub use gitee::{gitee_webhook, GiteeSecret};

pub struct EnvelopeSender(pub UnboundedSender<InboundEnvelope>);

/// A single hook delivery, either read from the bus or posted to the webhook endpoint.
///
/// `headers` is `None` when the transport carried no header map at all, which is rejected
/// during validation.
#[derive(Clone, Debug, Default)]
pub struct InboundEnvelope {
    pub headers: Option<HashMap<String, String>>,
    pub payload: Vec<u8>,
}
