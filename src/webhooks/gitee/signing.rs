use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::trace;

type HmacSha256 = Hmac<Sha256>;

fn token_mac(secret: &str, timestamp: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;

    // Gitee signs the timestamp and the secret itself, not the body
    mac.update(timestamp.as_bytes());
    mac.update(b"\n");
    mac.update(secret.as_bytes());

    Some(mac)
}

/// Checks `token` (the `X-Gitee-Token` header) against the signature of `timestamp`.
pub(crate) fn validate_token(secret: &str, timestamp: &str, token: &str) -> bool {
    trace!("validating token...");

    let bytes = match STANDARD.decode(token) {
        Ok(bytes) => bytes,
        Err(_) => {
            trace!("couldn't decode base64-encoded token {}", token);
            return false;
        }
    };

    token_mac(secret, timestamp).is_some_and(|mac| mac.verify_slice(&bytes).is_ok())
}

/// Computes the `X-Gitee-Token` Gitee sends for `timestamp`.
#[cfg(test)]
pub(crate) fn sign(secret: &str, timestamp: &str) -> String {
    let mac = token_mac(secret, timestamp).unwrap();
    STANDARD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_own_signature() {
        let token = sign("s3cr3t", "1697000000000");

        assert!(validate_token("s3cr3t", "1697000000000", &token));
    }

    #[test]
    fn matches_gitee_signature_layout() {
        let mut mac = HmacSha256::new_from_slice(b"s3cr3t").unwrap();
        mac.update(b"1697000000000\ns3cr3t");
        let expected = STANDARD.encode(mac.finalize().into_bytes());

        assert_eq!(sign("s3cr3t", "1697000000000"), expected);
    }

    #[test]
    fn rejects_other_secret_or_timestamp() {
        let token = sign("s3cr3t", "1697000000000");

        assert!(!validate_token("other", "1697000000000", &token));
        assert!(!validate_token("s3cr3t", "1697000000001", &token));
    }

    #[test]
    fn rejects_garbage_token() {
        assert!(!validate_token("s3cr3t", "1697000000000", "not base64!"));
        assert!(!validate_token("s3cr3t", "1697000000000", ""));
    }
}
