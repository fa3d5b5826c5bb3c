use std::fmt;

use hmac::{Hmac, Mac, NewMac};
use sha1::Sha1;
use sha2::Sha256;
use tracing::trace;

use crate::webhooks::InboundEvent;

pub(crate) const X_HUB_SIGNATURE: &str = "X-Hub-Signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureVerdict {
    Valid,
    MalformedHeader,
    Invalid,
}

impl fmt::Display for SignatureVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignatureVerdict::Valid => "Valid",
            SignatureVerdict::MalformedHeader => "Bad Request",
            SignatureVerdict::Invalid => "Not Authorized",
        })
    }
}

/// Checks the `X-Hub-Signature` header of `event` against an HMAC of its raw body.
///
/// The body is authenticated exactly as received, before any base64 decoding.
pub fn verify_signature(event: &InboundEvent, secret: &str) -> SignatureVerdict {
    match event.header(X_HUB_SIGNATURE) {
        Some(signature) => validate_signature(secret, signature, event.body.as_bytes()),
        None => {
            trace!("couldn't locate {} header", X_HUB_SIGNATURE);
            SignatureVerdict::MalformedHeader
        }
    }
}

fn validate_signature(secret: &str, signature: &str, data: &[u8]) -> SignatureVerdict {
    trace!("validating signature...");

    // GitHub puts the algorithm name in front of the hex digest
    let (algorithm, digest) = match signature.split_once('=') {
        Some((algorithm, digest)) if !digest.contains('=') => (algorithm, digest),
        _ => {
            trace!("couldn't split signature `{}`", signature);
            return SignatureVerdict::MalformedHeader;
        }
    };

    let digest = match hex::decode(digest) {
        Ok(bytes) => bytes,
        Err(_) => {
            trace!("couldn't decode hex-encoded signature {}", digest);
            return SignatureVerdict::Invalid;
        }
    };

    // The label doesn't select the MAC: GitHub's `X-Hub-Signature` is always HMAC-SHA1. A
    // `sha256` label may also carry an HMAC-SHA256 digest.
    let verified = verify_mac::<Hmac<Sha1>>(secret, data, &digest)
        || (algorithm == "sha256" && verify_mac::<Hmac<Sha256>>(secret, data, &digest));

    if verified {
        SignatureVerdict::Valid
    } else {
        SignatureVerdict::Invalid
    }
}

// `Mac::verify` compares in constant time.
fn verify_mac<M: Mac + NewMac>(secret: &str, data: &[u8], digest: &[u8]) -> bool {
    let mut mac = match M::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(data);
    mac.verify(digest).is_ok()
}
