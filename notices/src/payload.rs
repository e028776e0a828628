use std::io::prelude::*;

use bytes::{Buf, Bytes};
use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::api::NoticesError;

// Bugsnag notifier payload, as POSTed by client libraries.
// Only the keys we normalize are typed, everything else is ignored. Notifiers do not
// agree on types, so a key holding an unexpected shape is read as absent instead of
// failing the whole batch.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default, deserialize_with = "lenient")]
    pub api_key: Option<String>,
    pub notifier: Option<Value>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub events: Option<Vec<RawEvent>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default, deserialize_with = "lenient")]
    pub exceptions: Option<Vec<RawException>>,
    pub context: Option<Value>,
    pub user: Option<Value>,
    pub app: Option<Value>,
    pub device: Option<Value>,
    pub meta_data: Option<Value>,
    pub threads: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawException {
    pub error_class: Option<Value>,
    pub message: Option<Value>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub stacktrace: Option<Vec<RawFrame>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFrame {
    pub method: Option<Value>,
    pub file: Option<Value>,
    pub line_number: Option<Value>,
    pub column_number: Option<Value>,
}

/// Reads a value of the wrong shape as `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Reads an array element by element. Elements of the wrong shape become `T::default()`,
/// so they keep their position and are counted like any other empty entry.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(Some(
            items
                .into_iter()
                .map(|item| serde_json::from_value(item).unwrap_or_default())
                .collect(),
        )),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Unsupported,
}

impl Compression {
    /// Maps a Content-Encoding header value, `identity` and missing headers mean no compression.
    pub fn from_header(value: Option<&str>) -> Option<Compression> {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            None => None,
            Some(v) if v.is_empty() || v == "identity" => None,
            Some(v) if v == "gzip" || v == "x-gzip" => Some(Compression::Gzip),
            Some(_) => Some(Compression::Unsupported),
        }
    }
}

impl Payload {
    /// Decodes a request body into a payload. An empty body decodes to a payload without
    /// events, so that it is answered like any other payload missing its events.
    ///
    /// `limit` caps the decoded size, compressed bodies included.
    pub fn from_bytes(
        compression: Option<Compression>,
        bytes: Bytes,
        limit: usize,
    ) -> Result<Payload, NoticesError> {
        tracing::debug!(len = bytes.len(), "decoding new payload");

        let data: Vec<u8> = match compression {
            Some(Compression::Gzip) => {
                let mut d = GzDecoder::new(bytes.reader())
                    .take((limit as u64).saturating_add(1));
                let mut buf = Vec::new();
                d.read_to_end(&mut buf).map_err(|e| {
                    tracing::error!("failed to decode gzip: {}", e);
                    NoticesError::RequestDecodingError(String::from("invalid gzip data"))
                })?;
                buf
            }
            Some(Compression::Unsupported) => {
                return Err(NoticesError::RequestDecodingError(String::from(
                    "unsupported compression format",
                )))
            }
            None => bytes.into(),
        };

        if data.len() > limit {
            tracing::warn!(limit, "decoded payload exceeds the size limit");
            return Err(NoticesError::PayloadTooLarge);
        }

        let payload = String::from_utf8(data).map_err(|e| {
            tracing::error!("failed to decode body: {}", e);
            NoticesError::RequestDecodingError(String::from("invalid body encoding"))
        })?;

        if payload.trim().is_empty() {
            return Ok(Payload::default());
        }

        tracing::debug!(json = payload, "decoded payload data");
        Ok(serde_json::from_str::<Payload>(&payload)?)
    }

    pub fn events(&self) -> &[RawEvent] {
        self.events.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use bytes::Bytes;
    use flate2::write::GzEncoder;
    use flate2::Compression as Level;

    use serde_json::json;

    use super::{Compression, Payload};
    use crate::api::NoticesError;

    const LIMIT: usize = 10_000;

    const BODY: &str = r#"{
        "apiKey": "abc123",
        "notifier": {"name": "Bugsnag Ruby", "version": "6.26.0"},
        "events": [{
            "exceptions": [{"errorClass": "NoMethodError", "message": "boom", "stacktrace": []}],
            "breadcrumbs": [{"name": "ignored"}]
        }]
    }"#;

    #[test]
    fn decode_plain_json() {
        let payload = Payload::from_bytes(None, Bytes::from(BODY), LIMIT).unwrap();

        assert_eq!(payload.api_key.as_deref(), Some("abc123"));
        assert_eq!(payload.events().len(), 1);
        let exceptions = payload.events()[0].exceptions.as_ref().unwrap();
        assert_eq!(exceptions[0].error_class, Some(json!("NoMethodError")));
    }

    #[test]
    fn decode_gzip_json() {
        let mut encoder = GzEncoder::new(Vec::new(), Level::default());
        encoder.write_all(BODY.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let payload = Payload::from_bytes(Some(Compression::Gzip), Bytes::from(compressed), LIMIT).unwrap();

        assert_eq!(payload.events().len(), 1);
    }

    #[test]
    fn empty_body_has_no_events() {
        let payload = Payload::from_bytes(None, Bytes::new(), LIMIT).unwrap();

        assert!(payload.events.is_none());
        assert!(payload.events().is_empty());
    }

    #[test]
    fn invalid_gzip_is_a_decoding_error() {
        match Payload::from_bytes(Some(Compression::Gzip), Bytes::from(BODY), LIMIT) {
            Err(NoticesError::RequestDecodingError(_)) => {}
            other => panic!("expected a decoding error, got {:?}", other),
        }
    }

    #[test]
    fn malformed_json_is_a_parsing_error() {
        match Payload::from_bytes(None, Bytes::from("{\"events\": "), LIMIT) {
            Err(NoticesError::RequestParsingError(_)) => {}
            other => panic!("expected a parsing error, got {:?}", other),
        }
    }

    #[test]
    fn content_encoding_mapping() {
        assert_eq!(Compression::from_header(None), None);
        assert_eq!(Compression::from_header(Some("identity")), None);
        assert_eq!(Compression::from_header(Some("GZIP")), Some(Compression::Gzip));
        assert_eq!(
            Compression::from_header(Some("br")),
            Some(Compression::Unsupported)
        );
    }

    #[test]
    fn inflated_size_is_capped() {
        let body = format!("{{\"padding\": \"{}\"}}", " ".repeat(LIMIT * 10));
        let mut encoder = GzEncoder::new(Vec::new(), Level::best());
        encoder.write_all(body.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();
        assert!(compressed.len() < LIMIT);

        match Payload::from_bytes(Some(Compression::Gzip), Bytes::from(compressed), LIMIT) {
            Err(NoticesError::PayloadTooLarge) => {}
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn mistyped_keys_are_read_as_absent() {
        let body = json!({
            "apiKey": 42,
            "events": [
                "not an event",
                {
                    "exceptions": [{"errorClass": 500, "stacktrace": ["frame", {"file": "a.rb"}]}],
                    "user": "alice",
                    "app": ["shop"],
                    "metaData": "none"
                },
                {"exceptions": "boom"}
            ]
        });

        let payload = Payload::from_bytes(None, Bytes::from(body.to_string()), LIMIT).unwrap();

        assert_eq!(payload.api_key, None);
        let events = payload.events();
        assert_eq!(events.len(), 3);
        assert!(events[0].exceptions.is_none());
        assert_eq!(events[1].user, Some(json!("alice")));
        let exception = &events[1].exceptions.as_ref().unwrap()[0];
        assert_eq!(exception.error_class, Some(json!(500)));
        let stacktrace = exception.stacktrace.as_ref().unwrap();
        assert!(stacktrace[0].file.is_none());
        assert_eq!(stacktrace[1].file, Some(json!("a.rb")));
        assert!(events[2].exceptions.is_none());
    }
}
