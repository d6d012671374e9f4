use std::{collections::HashMap, convert::Infallible, io};

use anyhow::anyhow;
use rocket::{
    data::{ByteUnit, FromData, Outcome as DataOutcome},
    http::Status,
    request::{FromRequest, Outcome},
    Data, Request, State,
};
use tracing::{error, info, trace};

use crate::webhooks::{EnvelopeSender, InboundEnvelope};

mod envelope;
pub use envelope::{validate_envelope, EnvelopeError};

pub(crate) mod events;
pub use events::*;

mod signing;
use signing::validate_token;

pub const USER_AGENT: &str = "User-Agent";
pub const X_GITEE_EVENT: &str = "X-Gitee-Event";
pub const X_GITEE_TIMESTAMP: &str = "X-Gitee-Timestamp";
pub const X_GITEE_TOKEN: &str = "X-Gitee-Token";

/// Headers copied from an HTTP request into the envelope, under these exact names.
const FORWARDED_HEADERS: [&str; 3] = [USER_AGENT, X_GITEE_EVENT, X_GITEE_TIMESTAMP];

#[rocket::post("/api/webhooks/gitee", data = "<payload>")]
pub fn gitee_webhook(
    headers: GiteeHeaders,
    payload: GiteePayload,
    sender: &State<EnvelopeSender>,
) -> Result<&'static str, Status> {
    info!(
        "received hook {:?} ({} bytes)",
        headers.0.get(X_GITEE_EVENT),
        payload.0.len()
    );

    let envelope = InboundEnvelope {
        headers: Some(headers.0),
        payload: payload.0,
    };

    sender.0.send(envelope).map_err(|_| {
        error!("relay loop is gone, can't queue hook");
        Status::ServiceUnavailable
    })?;

    Ok("OK")
}

/// The recognized Gitee headers of a request.
///
/// HTTP header names are case-insensitive, while envelopes coming from the bus are matched
/// case-sensitively, so the values are stored under their canonical names.
pub struct GiteeHeaders(pub HashMap<String, String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for GiteeHeaders {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let headers = FORWARDED_HEADERS
            .iter()
            .filter_map(|name| {
                request
                    .headers()
                    .get_one(name)
                    .map(|value| (name.to_string(), value.to_owned()))
            })
            .collect();

        Outcome::Success(GiteeHeaders(headers))
    }
}

/// Secret shared with Gitee, managed by rocket when the HTTP intake is enabled.
pub struct GiteeSecret(pub String);

/// A hook body whose `X-Gitee-Token` matched the configured secret.
pub struct GiteePayload(pub Vec<u8>);

const LIMIT: ByteUnit = ByteUnit::Mebibyte(1);

#[rocket::async_trait]
impl<'r> FromData<'r> for GiteePayload {
    type Error = anyhow::Error;

    async fn from_data(request: &'r Request<'_>, data: Data<'r>) -> DataOutcome<'r, Self> {
        let secret = match request.rocket().state::<GiteeSecret>() {
            Some(secret) => secret,
            None => {
                error!("no webhook secret is managed, refusing hook");
                return DataOutcome::Error((
                    Status::InternalServerError,
                    anyhow!("webhook secret isn't configured"),
                ));
            }
        };

        let headers = request.headers();
        let (token, timestamp) = match (
            headers.get_one(X_GITEE_TOKEN),
            headers.get_one(X_GITEE_TIMESTAMP),
        ) {
            (Some(token), Some(timestamp)) => (token, timestamp),
            _ => {
                trace!("missing {} or {} header", X_GITEE_TOKEN, X_GITEE_TIMESTAMP);
                return DataOutcome::Error((Status::Unauthorized, anyhow!("unsigned hook")));
            }
        };

        if !validate_token(&secret.0, timestamp, token) {
            trace!("token validation failed, stopping here...");
            return DataOutcome::Error((Status::Unauthorized, anyhow!("couldn't verify token")));
        }

        let size_limit = request.limits().get("json").unwrap_or(LIMIT);
        let content = match data.open(size_limit).into_bytes().await {
            Ok(bytes) if bytes.is_complete() => bytes.into_inner(),
            Ok(_) => {
                let eof = io::ErrorKind::UnexpectedEof;
                trace!("payload was too big");
                return DataOutcome::Error((
                    Status::PayloadTooLarge,
                    io::Error::new(eof, "data limit exceeded").into(),
                ));
            }
            Err(e) => return DataOutcome::Error((Status::BadRequest, anyhow!(e))),
        };

        trace!("read {} bytes of signed hook payload", content.len());
        DataOutcome::Success(GiteePayload(content))
    }
}
