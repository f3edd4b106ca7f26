//! Signing stage and Header Merger.

use crate::event::{EdgeRequest, HeaderEntry};
use aws_sigv4::{sign_core, Config, Credentials, SigningError, SigningSettings};
use bytes::Bytes;
use http::{header::HeaderName, HeaderValue, Method, Request, Uri};
use std::{collections::BTreeMap, time::SystemTime};

const LAMBDA_URL_LABEL: &str = "lambda-url";

/// Reads the signing region out of the host name by position; no DNS lookup involved.
///
/// Function URL hosts (`<url-id>.lambda-url.<region>.on.aws`) carry the region in the third
/// label. Any other host is read as `<service>.<region>.<partition>...`. A host with another
/// shape silently yields a wrong region; fewer than three labels is an error.
pub fn region_from_host(host: &str) -> Result<&str, SigningError> {
    let host = host.split(':').next().unwrap_or(host);
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 || labels.iter().any(|label| label.is_empty()) {
        return Err(SigningError::InvalidHost(host.to_string()));
    }
    if labels.len() > 3 && labels[1] == LAMBDA_URL_LABEL {
        Ok(labels[2])
    } else {
        Ok(labels[1])
    }
}

/// Signature headers computed for one request, keyed by the name the signer emitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignedHeaders(BTreeMap<String, String>);

impl SignedHeaders {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SignedHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        SignedHeaders(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Converts the edge request into the `http::Request` the signer works on. Every value of every
/// header is carried over.
pub fn to_http_request(request: &EdgeRequest) -> Result<Request<Bytes>, SigningError> {
    let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|_| SigningError::InvalidMethod(request.method.clone()))?;
    let path_and_query = request.path_and_query();
    let uri: Uri = path_and_query
        .parse()
        .map_err(|_| SigningError::InvalidUri(path_and_query.clone()))?;

    let mut builder = Request::builder().method(method).uri(uri);
    for (name, entries) in &request.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| SigningError::InvalidHeaderName(name.clone()))?;
        for entry in entries {
            let value = HeaderValue::from_str(&entry.value)
                .map_err(|_| SigningError::InvalidHeaderValue(name.clone()))?;
            builder = builder.header(header_name.clone(), value);
        }
    }
    Ok(builder.body(request.body_bytes()?)?)
}

/// Computes the signature headers for an already normalized and rewritten request.
///
/// The region comes from the `host` header. The request itself is not modified.
pub fn sign_request(
    request: &EdgeRequest,
    credentials: &Credentials,
    service: &str,
    settings: SigningSettings,
    date: SystemTime,
) -> Result<SignedHeaders, SigningError> {
    let host = request.header("host").ok_or(SigningError::MissingHost)?;
    let region = region_from_host(host)?;
    let http_request = to_http_request(request)?;

    let signed = sign_core(
        &http_request,
        Config {
            access_key: &credentials.access_key,
            secret_key: &credentials.secret_key,
            security_token: credentials.security_token.as_deref(),
            region,
            svc: service,
            date,
            settings,
        },
    )?;
    Ok(signed.map(|(key, value)| (key.as_str(), value)).collect())
}

/// Writes every signed header onto the request as a single-entry list under its lower-cased
/// name, replacing what was there. Headers the signer did not produce are left alone.
pub fn merge_headers(request: &mut EdgeRequest, signed: &SignedHeaders) {
    for (name, value) in signed.iter() {
        request.headers.insert(
            name.to_ascii_lowercase(),
            vec![HeaderEntry::new(name, value)],
        );
    }
}
