//! Typed view of the origin-request event handed over by the edge runtime.
//!
//! Header maps are keyed by lower-cased header name; every value keeps the casing the viewer
//! sent in its `key`. Decoding folds any mixed-case map keys into their lower-case entry; when
//! several spellings of one name are present their values are appended in byte order of the raw
//! key, so the result does not depend on the order of the keys in the payload.

use crate::error::{ConfigurationError, SigningError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Header name (lower case) to its values, in the order the runtime delivered them.
pub type Headers = BTreeMap<String, Vec<HeaderEntry>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EdgeEvent {
    pub records: Vec<EdgeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub cf: CfPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<DistributionConfig>,
    pub request: EdgeRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionConfig {
    #[serde(default)]
    pub distribution_domain_name: String,
    #[serde(default)]
    pub distribution_id: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub request_id: String,
}

impl EdgeEvent {
    /// Takes the single request out of the event.
    pub fn into_request(self) -> Result<EdgeRequest, ConfigurationError> {
        let count = self.records.len();
        match <[EdgeRecord; 1]>::try_from(self.records) {
            Ok([record]) => Ok(record.cf.request),
            Err(_) => Err(ConfigurationError::RecordCount(count)),
        }
    }
}

/// Decodes and validates a raw event: it must hold exactly one request carrying an origin.
pub fn decode_event(raw: &[u8]) -> Result<EdgeEvent, ConfigurationError> {
    let event: EdgeEvent = serde_json::from_slice(raw)?;
    if event.records.len() != 1 {
        return Err(ConfigurationError::RecordCount(event.records.len()));
    }
    if event.records[0].cf.request.origin.is_none() {
        return Err(ConfigurationError::MissingOrigin);
    }
    Ok(event)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(default, deserialize_with = "lowercase_headers")]
    pub headers: Headers,
    pub method: String,
    #[serde(default)]
    pub querystring: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<EdgeBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<OriginDescriptor>,
}

impl EdgeRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            client_ip: None,
            headers: Headers::new(),
            method: method.into(),
            querystring: String::new(),
            uri: uri.into(),
            body: None,
            origin: None,
        }
    }

    /// First value of the header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(|entry| entry.value.as_str())
    }

    /// Replaces every value of the header with a single entry.
    pub fn set_header(&mut self, key: &str, value: impl Into<String>) {
        self.headers.insert(
            key.to_ascii_lowercase(),
            vec![HeaderEntry::new(key, value)],
        );
    }

    pub fn remove_header(&mut self, name: &str) -> Option<Vec<HeaderEntry>> {
        self.headers.remove(&name.to_ascii_lowercase())
    }

    /// Path and query as sent on the wire.
    pub fn path_and_query(&self) -> String {
        if self.querystring.is_empty() {
            self.uri.clone()
        } else {
            format!("{}?{}", self.uri, self.querystring)
        }
    }

    /// Raw body bytes; an absent body is empty.
    pub fn body_bytes(&self) -> Result<Bytes, SigningError> {
        match &self.body {
            Some(body) => body.decode(),
            None => Ok(Bytes::new()),
        }
    }
}

fn lowercase_headers<'de, D>(deserializer: D) -> Result<Headers, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Vec<HeaderEntry>>::deserialize(deserializer)?;
    let mut headers = Headers::new();
    for (name, entries) in raw {
        headers
            .entry(name.to_ascii_lowercase())
            .or_default()
            .extend(entries);
    }
    Ok(headers)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    #[default]
    Base64,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_truncated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub encoding: BodyEncoding,
    #[serde(default)]
    pub data: String,
}

impl EdgeBody {
    /// Raw body bytes. A body the runtime truncated cannot be signed.
    pub fn decode(&self) -> Result<Bytes, SigningError> {
        if self.input_truncated == Some(true) {
            return Err(SigningError::TruncatedBody);
        }
        match self.encoding {
            BodyEncoding::Text => Ok(Bytes::copy_from_slice(self.data.as_bytes())),
            BodyEncoding::Base64 => STANDARD
                .decode(&self.data)
                .map(Bytes::from)
                .map_err(|e| SigningError::InvalidBody(e.to_string())),
        }
    }
}

/// Where the runtime is going to send the request. Only custom origins can be signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginDescriptor {
    Custom(CustomOrigin),
    S3(S3Origin),
}

impl OriginDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            OriginDescriptor::Custom(_) => "custom",
            OriginDescriptor::S3(_) => "s3",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomOrigin {
    #[serde(default)]
    pub custom_headers: Headers,
    pub domain_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepalive_timeout: Option<u64>,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<u64>,
    #[serde(default)]
    pub ssl_protocols: Vec<String>,
}

fn default_protocol() -> String {
    "https".to_string()
}

impl CustomOrigin {
    /// `<protocol>://<domain>[:port]<path>`, omitting the port when it is the protocol default.
    pub fn base_url(&self) -> String {
        let default_port = match self.protocol.as_str() {
            "http" => 80,
            _ => 443,
        };
        match self.port {
            Some(port) if port != default_port => format!(
                "{}://{}:{}{}",
                self.protocol, self.domain_name, port, self.path
            ),
            _ => format!("{}://{}{}", self.protocol, self.domain_name, self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Origin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
    #[serde(default)]
    pub custom_headers: Headers,
    pub domain_name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Short-circuit answer returned to the viewer instead of forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeResponse {
    pub status: String,
    pub status_description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: Headers,
}

impl EdgeResponse {
    pub fn new(status: u16, status_description: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            status_description: status_description.into(),
            headers: Headers::new(),
        }
    }
}

/// What the runtime should do with the invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EdgeOutcome {
    Forward(EdgeRequest),
    Respond(EdgeResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = r#"{
      "Records": [{
        "cf": {
          "config": {
            "distributionDomainName": "d111111abcdef8.cloudfront.net",
            "distributionId": "EDFDVBD6EXAMPLE",
            "eventType": "origin-request",
            "requestId": "4TyzHTaYWb1GX1qTfsHhEqV6HUDd_BzoBZnwfnvQc_1oF26ClkoUSEQ=="
          },
          "request": {
            "clientIp": "203.0.113.178",
            "headers": {
              "host": [{"key": "Host", "value": "abc.lambda-url.us-east-1.on.aws"}],
              "X-Forwarded-For": [{"key": "X-Forwarded-For", "value": "203.0.113.178"}]
            },
            "method": "POST",
            "origin": {
              "custom": {
                "customHeaders": {},
                "domainName": "abc.lambda-url.us-east-1.on.aws",
                "keepaliveTimeout": 5,
                "path": "",
                "port": 443,
                "protocol": "https",
                "readTimeout": 30,
                "sslProtocols": ["TLSv1.2"]
              }
            },
            "querystring": "a=1",
            "uri": "/createBook/",
            "body": {"inputTruncated": false, "action": "read-only", "encoding": "base64", "data": "eyJpZCI6MX0="}
          }
        }
      }]
    }"#;

    #[test_log::test]
    fn decodes_origin_request_event() {
        let request = decode_event(EVENT.as_bytes())
            .unwrap()
            .into_request()
            .unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path_and_query(), "/createBook/?a=1");
        assert_eq!(request.header("HOST"), Some("abc.lambda-url.us-east-1.on.aws"));
        assert!(request.headers.contains_key("x-forwarded-for"));
        assert_eq!(request.body_bytes().unwrap(), Bytes::from_static(b"{\"id\":1}"));
        match request.origin {
            Some(OriginDescriptor::Custom(ref origin)) => {
                assert_eq!(origin.base_url(), "https://abc.lambda-url.us-east-1.on.aws");
                assert_eq!(origin.read_timeout, Some(30));
            }
            ref other => panic!("unexpected origin {:?}", other),
        }
    }

    #[test_log::test]
    fn rejects_bad_events() {
        assert!(matches!(
            decode_event(b"{"),
            Err(ConfigurationError::MalformedEvent(_))
        ));
        assert!(matches!(
            decode_event(br#"{"Records": []}"#),
            Err(ConfigurationError::RecordCount(0))
        ));
        let no_origin = r#"{"Records": [{"cf": {"request": {"method": "GET", "uri": "/"}}}]}"#;
        assert!(matches!(
            decode_event(no_origin.as_bytes()),
            Err(ConfigurationError::MissingOrigin)
        ));
        let unknown = r#"{"Records": [{"cf": {"request": {"method": "GET", "uri": "/", "origin": {"ftp": {}}}}}]}"#;
        assert!(matches!(
            decode_event(unknown.as_bytes()),
            Err(ConfigurationError::MalformedEvent(_))
        ));
    }

    #[test_log::test]
    fn s3_origin_decodes() {
        let raw = r#"{"s3": {"authMethod": "none", "customHeaders": {}, "domainName": "b.s3.amazonaws.com", "path": "", "region": "us-east-1"}}"#;
        let origin: OriginDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(origin.kind(), "s3");
    }

    #[test_log::test]
    fn body_encodings() {
        let text = EdgeBody {
            input_truncated: None,
            action: None,
            encoding: BodyEncoding::Text,
            data: "plain".to_string(),
        };
        assert_eq!(text.decode().unwrap(), Bytes::from_static(b"plain"));

        let broken = EdgeBody {
            encoding: BodyEncoding::Base64,
            data: "***".to_string(),
            ..text
        };
        assert!(matches!(broken.decode(), Err(SigningError::InvalidBody(_))));
    }

    #[test_log::test]
    fn truncated_body_is_rejected() {
        let truncated = EdgeBody {
            input_truncated: Some(true),
            action: Some("read-only".to_string()),
            encoding: BodyEncoding::Text,
            data: "{\"title\":\"Du".to_string(),
        };
        assert!(matches!(truncated.decode(), Err(SigningError::TruncatedBody)));

        let complete = EdgeBody {
            input_truncated: Some(false),
            ..truncated
        };
        assert_eq!(complete.decode().unwrap(), Bytes::from_static(b"{\"title\":\"Du"));
    }

    #[test_log::test]
    fn mixed_case_keys_merge_independently_of_payload_order() {
        let upper_first = r#"{"method": "GET", "uri": "/", "headers": {
            "X-Custom": [{"key": "X-Custom", "value": "upper"}],
            "x-custom": [{"key": "x-custom", "value": "lower"}]
        }}"#;
        let lower_first = r#"{"method": "GET", "uri": "/", "headers": {
            "x-custom": [{"key": "x-custom", "value": "lower"}],
            "X-Custom": [{"key": "X-Custom", "value": "upper"}]
        }}"#;

        let expected = vec![
            HeaderEntry::new("X-Custom", "upper"),
            HeaderEntry::new("x-custom", "lower"),
        ];
        for raw in [upper_first, lower_first] {
            let request: EdgeRequest = serde_json::from_str(raw).unwrap();
            assert_eq!(request.headers.len(), 1);
            assert_eq!(request.headers["x-custom"], expected);
        }
    }

    #[test_log::test]
    fn custom_origin_url_keeps_non_default_port() {
        let origin = CustomOrigin {
            custom_headers: Headers::new(),
            domain_name: "backend.example.com".to_string(),
            keepalive_timeout: None,
            path: "/prod".to_string(),
            port: Some(8443),
            protocol: "https".to_string(),
            read_timeout: None,
            ssl_protocols: vec![],
        };
        assert_eq!(origin.base_url(), "https://backend.example.com:8443/prod");
    }

    #[test_log::test]
    fn outcome_serializes_without_tag() {
        let outcome = EdgeOutcome::Respond(EdgeResponse::new(204, "No Content"));
        assert_eq!(
            serde_json::to_string(&outcome).unwrap(),
            r#"{"status":"204","statusDescription":"No Content"}"#
        );
    }
}
