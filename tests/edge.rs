use chrono::{TimeZone, Utc};
use edge_sigv4_proxy::{
    decode_event, ConfigurationError, Credentials, CredentialsCache, EdgeEvent, EdgeOutcome,
    EdgeRequest, EdgeSigner, FixedClock, PreflightPolicy, ProxyConfig, ProxyError, StaticProvider,
};
use serde_json::{json, Value};

const SESSION_TOKEN: &str = "session-token-example";

fn signer(config: ProxyConfig) -> EdgeSigner<StaticProvider> {
    let credentials = Credentials::new(
        "AKIDEXAMPLE",
        "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        Some(SESSION_TOKEN.to_string()),
    );
    EdgeSigner::new(config, CredentialsCache::new(StaticProvider::new(credentials))).with_clock(
        FixedClock(Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap().into()),
    )
}

fn origin_request_event(method: &str, origin: Value, extra_headers: Value) -> EdgeEvent {
    let mut headers = json!({
        "host": [{"key": "Host", "value": "abcdefghijkl.lambda-url.eu-west-1.on.aws"}],
        "user-agent": [{"key": "User-Agent", "value": "Amazon CloudFront"}],
        "via": [{"key": "Via", "value": "2.0 0123456789abcdef.cloudfront.net (CloudFront)"}],
        "x-forwarded-for": [{"key": "X-Forwarded-For", "value": "203.0.113.178"}]
    });
    if let (Some(headers), Some(extra)) = (headers.as_object_mut(), extra_headers.as_object()) {
        headers.extend(extra.clone());
    }

    let raw = serde_json::to_vec(&json!({
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
                    "headers": headers,
                    "method": method,
                    "origin": origin,
                    "querystring": "limit=10&author=Frank%20Herbert",
                    "uri": "/createBook/books",
                    "body": {
                        "inputTruncated": false,
                        "action": "read-only",
                        "encoding": "base64",
                        "data": "eyJ0aXRsZSI6IkR1bmUifQ=="
                    }
                }
            }
        }]
    }))
    .unwrap();
    decode_event(&raw).unwrap()
}

fn custom_origin() -> Value {
    json!({
        "custom": {
            "customHeaders": {},
            "domainName": "abcdefghijkl.lambda-url.eu-west-1.on.aws",
            "keepaliveTimeout": 5,
            "path": "",
            "port": 443,
            "protocol": "https",
            "readTimeout": 30,
            "sslProtocols": ["TLSv1.2"]
        }
    })
}

fn content_type() -> Value {
    json!({"Content-Type": [{"key": "Content-Type", "value": "application/json"}]})
}

fn forwarded(outcome: EdgeOutcome) -> EdgeRequest {
    match outcome {
        EdgeOutcome::Forward(request) => request,
        other => panic!("expected a forwarded request, got {:?}", other),
    }
}

#[test_log::test(tokio::test)]
async fn signs_function_url_event() {
    let event = origin_request_event("POST", custom_origin(), content_type());
    let request = forwarded(signer(ProxyConfig::default()).handle_event(event).await.unwrap());

    assert_eq!(request.uri, "/books");
    assert_eq!(request.querystring, "limit=10&author=Frank%20Herbert");
    assert!(request.header("x-forwarded-for").is_none());
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("x-amz-date"), Some("20150830T123600Z"));
    assert_eq!(request.header("x-amz-security-token"), Some(SESSION_TOKEN));
    assert_eq!(
        request.header("authorization"),
        Some(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/eu-west-1/lambda/aws4_request, \
             SignedHeaders=content-type;host;user-agent;via;x-amz-date;x-amz-security-token, \
             Signature=175e4c525f4666f2311e4f3dbe6cd84e139aa8ff80e3234891b78897165ad95e"
        )
    );

    // What the runtime receives back.
    let json = serde_json::to_value(EdgeOutcome::Forward(request)).unwrap();
    assert_eq!(json["uri"], "/books");
    assert_eq!(json["headers"]["authorization"][0]["key"], "authorization");
    assert_eq!(json["headers"]["host"][0]["key"], "Host");
    assert!(json["headers"].get("x-forwarded-for").is_none());
    assert_eq!(
        json["origin"]["custom"]["domainName"],
        "abcdefghijkl.lambda-url.eu-west-1.on.aws"
    );
}

#[test_log::test(tokio::test)]
async fn s3_origin_is_rejected() {
    let s3 = json!({
        "s3": {
            "authMethod": "none",
            "customHeaders": {},
            "domainName": "bucket.s3.amazonaws.com",
            "path": "",
            "region": "eu-west-1"
        }
    });
    let event = origin_request_event("GET", s3, json!({}));
    assert!(matches!(
        signer(ProxyConfig::default()).handle_event(event).await,
        Err(ProxyError::Configuration(ConfigurationError::UnsupportedOrigin("s3")))
    ));
}

#[test_log::test(tokio::test)]
async fn configured_headers_are_stripped_and_not_signed() {
    let config = ProxyConfig::from_lookup(|name| match name {
        "EDGE_SIGV4_STRIP_HEADERS" => Some("user-agent, via".to_string()),
        _ => None,
    })
    .unwrap();
    let event = origin_request_event("POST", custom_origin(), content_type());
    let request = forwarded(signer(config).handle_event(event).await.unwrap());

    assert!(request.header("user-agent").is_none());
    assert!(request.header("via").is_none());
    assert!(request
        .header("authorization")
        .unwrap()
        .contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token,"));
}

#[test_log::test(tokio::test)]
async fn preflight_handling_follows_policy() {
    let preflight_headers = json!({
        "origin": [{"key": "Origin", "value": "https://app.example.com"}],
        "access-control-request-method": [
            {"key": "Access-Control-Request-Method", "value": "POST"}
        ]
    });

    let respond = ProxyConfig {
        preflight: PreflightPolicy::Respond,
        ..Default::default()
    };
    let event = origin_request_event("OPTIONS", custom_origin(), preflight_headers.clone());
    let outcome = signer(respond).handle_event(event).await.unwrap();
    assert_eq!(
        serde_json::to_value(outcome).unwrap(),
        json!({"status": "204", "statusDescription": "No Content"})
    );

    let event = origin_request_event("OPTIONS", custom_origin(), preflight_headers);
    let request = forwarded(signer(ProxyConfig::default()).handle_event(event).await.unwrap());
    assert_eq!(request.uri, "/books");
    assert!(request.header("authorization").is_some());
}
