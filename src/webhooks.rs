use std::collections::BTreeMap;

use anyhow::anyhow;
use rocket::{
    data::{ByteUnit, FromData, Outcome},
    http::Status,
    routes, Build, Data, Request, Rocket,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::trace;

use crate::dispatch::Dispatcher;

pub mod github;
pub use github::{github_webhook, Gatekeeper};

const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";

const LIMIT: ByteUnit = ByteUnit::Mebibyte(1);

/// Builds the web server answering GitHub webhooks.
pub fn rocket(gatekeeper: Gatekeeper, dispatcher: Dispatcher) -> Rocket<Build> {
    rocket::build()
        .mount("/", routes![github_webhook])
        .manage(gatekeeper)
        .manage(dispatcher)
}

/// A webhook delivery, as received.
///
/// The serialized form follows the API gateway proxy event shape, so recorded deliveries can be
/// replayed from disk, and the whole event can be handed to the build worker untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub multi_value_headers: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_base64_encoded: bool,
}

impl InboundEvent {
    /// Looks a header up, ignoring ASCII case. Single-valued headers win over the first entry of
    /// multi-valued ones.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .or_else(|| {
                self.multi_value_headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .and_then(|(_, values)| values.first())
                    .map(String::as_str)
            })
    }

    /// Returns the payload bytes, undoing the transport's base64 encoding if there was one.
    pub fn decode_body(&self) -> Result<Vec<u8>, base64::DecodeError> {
        use base64::Engine;

        if self.is_base64_encoded {
            trace!("decoding base64 body");
            base64::engine::general_purpose::STANDARD.decode(self.body.trim())
        } else {
            Ok(self.body.as_bytes().to_vec())
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[rocket::async_trait]
impl<'r> FromData<'r> for InboundEvent {
    type Error = anyhow::Error;

    async fn from_data(request: &'r Request<'_>, data: Data<'r>) -> Outcome<'r, Self> {
        trace!("received payload on GitHub webhook endpoint: {:?}", request);

        let size_limit = request.limits().get("json").unwrap_or(LIMIT);
        let body = match data.open(size_limit).into_string().await {
            Ok(s) if s.is_complete() => s.into_inner(),
            Ok(_) => {
                trace!("payload was too big");
                return Outcome::Error((Status::PayloadTooLarge, anyhow!("data limit exceeded")));
            }
            Err(e) => return Outcome::Error((Status::BadRequest, e.into())),
        };

        let mut headers = BTreeMap::new();
        let mut multi_value_headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for header in request.headers().iter() {
            let name = header.name().as_str().to_owned();
            headers
                .entry(name.clone())
                .or_insert_with(|| header.value().to_owned());
            multi_value_headers
                .entry(name)
                .or_default()
                .push(header.value().to_owned());
        }

        let is_base64_encoded = request
            .headers()
            .get_one(CONTENT_TRANSFER_ENCODING)
            .map_or(false, |encoding| encoding.eq_ignore_ascii_case("base64"));

        Outcome::Success(InboundEvent {
            headers,
            multi_value_headers,
            body,
            is_base64_encoded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let event = InboundEvent {
            headers: BTreeMap::from([("x-github-event".to_string(), "pull_request".to_string())]),
            ..Default::default()
        };

        assert_eq!(event.header("X-GitHub-Event"), Some("pull_request"));
        assert_eq!(event.header("X-Hub-Signature"), None);
    }

    #[test]
    fn test_header_lookup_falls_back_to_multi_value() {
        let event = InboundEvent {
            multi_value_headers: BTreeMap::from([(
                "X-Hub-Signature".to_string(),
                vec!["sha1=first".to_string(), "sha1=second".to_string()],
            )]),
            ..Default::default()
        };

        assert_eq!(event.header("x-hub-signature"), Some("sha1=first"));
    }

    #[test]
    fn test_decode_plain_body() {
        let event = InboundEvent {
            body: r#"{"number": 1}"#.to_string(),
            ..Default::default()
        };

        assert_eq!(event.decode_body().unwrap(), br#"{"number": 1}"#);
    }

    #[test]
    fn test_decode_base64_body() {
        let event = InboundEvent {
            // {"number": 1}
            body: "eyJudW1iZXIiOiAxfQ==".to_string(),
            is_base64_encoded: true,
            ..Default::default()
        };

        assert_eq!(event.decode_body().unwrap(), br#"{"number": 1}"#);
    }

    #[test]
    fn test_decode_invalid_base64_fails() {
        let event = InboundEvent {
            body: r#"{"number": 1}"#.to_string(),
            is_base64_encoded: true,
            ..Default::default()
        };

        assert!(event.decode_body().is_err());
    }

    #[test]
    fn test_deserialize_gateway_record() {
        let record = r#"{
            "resource": "/build_docs",
            "httpMethod": "POST",
            "headers": {"X-GitHub-Event": "pull_request"},
            "multiValueHeaders": null,
            "queryStringParameters": null,
            "body": "{}",
            "isBase64Encoded": false
        }"#;

        let event: InboundEvent = serde_json::from_str(record).unwrap();

        assert_eq!(event.header("x-github-event"), Some("pull_request"));
        assert!(event.multi_value_headers.is_empty());
        assert_eq!(event.body, "{}");
        assert!(!event.is_base64_encoded);
    }
}
