use std::collections::HashMap;

use thiserror::Error;
use tracing::trace;

use crate::webhooks::gitee::{USER_AGENT, X_GITEE_EVENT, X_GITEE_TIMESTAMP};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("no header")]
    NoHeader,
    #[error("unknown {}", USER_AGENT)]
    UnknownUserAgent,
    #[error("missing {}", X_GITEE_EVENT)]
    MissingEventType,
    #[error("missing {}", X_GITEE_TIMESTAMP)]
    MissingTimestamp,
}

/// Checks the transport headers of a hook and returns its event type.
///
/// Requirements are checked in a fixed order and the first failing one is reported. The
/// timestamp header only has to be present: its value is never parsed, so replayed hooks are
/// not detected here.
pub fn validate_envelope<'h>(
    headers: Option<&'h HashMap<String, String>>,
    user_agent: &str,
) -> Result<&'h str, EnvelopeError> {
    let headers = headers.ok_or(EnvelopeError::NoHeader)?;

    if headers.get(USER_AGENT).map(String::as_str) != Some(user_agent) {
        trace!(
            "got user agent {:?}, expected `{}`",
            headers.get(USER_AGENT),
            user_agent
        );
        return Err(EnvelopeError::UnknownUserAgent);
    }

    let event_type = match headers.get(X_GITEE_EVENT) {
        Some(event_type) if !event_type.is_empty() => event_type.as_str(),
        _ => return Err(EnvelopeError::MissingEventType),
    };

    if headers.get(X_GITEE_TIMESTAMP).map_or(true, String::is_empty) {
        return Err(EnvelopeError::MissingTimestamp);
    }

    Ok(event_type)
}
