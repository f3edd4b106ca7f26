use crate::{
    sign::encode_bytes_with_hex, SigningError, SigningSettings, UriEncoding, AWS4_REQUEST,
    DATE_FORMAT, HMAC_256, SHORT_DATE_FORMAT, X_AMZ_DATE, X_AMZ_SECURITY_TOKEN,
};
use chrono::{DateTime, NaiveDate, Utc};
use http::{header, Method};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::{collections::BTreeMap, fmt, str};

/// Everything outside the RFC 3986 unreserved set.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Same as [`URI_ENCODE_SET`] but keeps the path separators.
const PATH_ENCODE_SET: &AsciiSet = &URI_ENCODE_SET.remove(b'/');

pub trait AsSigV4 {
    fn fmt(&self) -> String;
}

#[derive(Debug, PartialEq, Default)]
pub struct CanonicalRequest {
    pub method: Method,
    pub path: String,
    pub params: String,
    pub headers: BTreeMap<String, String>,
    pub signed_headers: SignedHeaderNames,
    pub payload_hash: String,
}

impl CanonicalRequest {
    /// Builds the canonical form of `req` as it will look once the `x-amz-date` and, when
    /// present, `x-amz-security-token` headers have been added.
    ///
    /// Every header on the request is signed. An existing `authorization` header is left out
    /// since the signature replaces it.
    pub fn from<B>(
        req: &http::Request<B>,
        date: DateTime<Utc>,
        security_token: Option<&str>,
        settings: &SigningSettings,
    ) -> Result<CanonicalRequest, SigningError>
    where
        B: AsRef<[u8]>,
    {
        let path = req.uri().path();
        let path = match settings.uri_encoding {
            UriEncoding::Double => {
                utf8_percent_encode(&normalize_path(path), PATH_ENCODE_SET).to_string()
            }
            UriEncoding::Single => path.to_string(),
        };
        let path = if path.is_empty() { "/".to_string() } else { path };

        let mut headers = BTreeMap::<String, String>::new();
        for (name, value) in req.headers() {
            if name == header::AUTHORIZATION || name == X_AMZ_DATE || name == X_AMZ_SECURITY_TOKEN
            {
                continue;
            }
            let value = str::from_utf8(value.as_bytes())
                .map_err(|_| SigningError::InvalidHeaderValue(name.to_string()))?;
            let value = normalize_header_value(value);
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push(',');
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        if !headers.contains_key(header::HOST.as_str()) {
            let authority = req.uri().authority().ok_or(SigningError::MissingHost)?;
            headers.insert(header::HOST.to_string(), authority.to_string());
        }
        headers.insert(X_AMZ_DATE.to_string(), date.fmt_aws());
        if let Some(token) = security_token {
            headers.insert(X_AMZ_SECURITY_TOKEN.to_string(), token.trim().to_string());
        }
        let signed_headers = SignedHeaderNames(headers.keys().cloned().collect());

        Ok(CanonicalRequest {
            method: req.method().clone(),
            path,
            params: canonical_query_string(req.uri().query())?,
            headers,
            signed_headers,
            payload_hash: encode_bytes_with_hex(req.body().as_ref()),
        })
    }
}

impl AsSigV4 for CanonicalRequest {
    fn fmt(&self) -> String {
        let mut canonical_headers = String::new();
        for (name, value) in &self.headers {
            canonical_headers.push_str(name);
            canonical_headers.push(':');
            canonical_headers.push_str(value);
            canonical_headers.push('\n');
        }
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method.as_str().to_ascii_uppercase(),
            self.path,
            self.params,
            canonical_headers,
            self.signed_headers,
            self.payload_hash
        )
    }
}

/// The `;`-joined, sorted list of header names covered by a signature.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct SignedHeaderNames(Vec<String>);

impl SignedHeaderNames {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for SignedHeaderNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(";"))
    }
}

/// Drops empty and `.` segments and resolves `..` against the preceding segment. A `..` at the
/// root stays at the root. Leading and trailing slashes are kept, so `/a//b/./c/../d/` becomes
/// `/a/b/d/`.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    let mut normalized = String::with_capacity(path.len());
    if path.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(&segments.join("/"));
    if !segments.is_empty() && path.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Trims the value and collapses inner runs of whitespace to a single space.
pub fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decodes the raw query string, re-encodes every key and value with the RFC 3986 unreserved
/// set and sorts the pairs by key, then value.
pub fn canonical_query_string(query: Option<&str>) -> Result<String, SigningError> {
    let query = match query {
        Some(query) if !query.is_empty() => query,
        _ => return Ok(String::new()),
    };
    let params: Vec<(String, String)> = serde_urlencoded::from_str(query)
        .map_err(|e| SigningError::MalformedQuery(e.to_string()))?;
    let mut params: Vec<(String, String)> = params
        .into_iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(&k, URI_ENCODE_SET).to_string(),
                utf8_percent_encode(&v, URI_ENCODE_SET).to_string(),
            )
        })
        .collect();
    params.sort();
    Ok(params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&"))
}

#[derive(Debug, PartialEq)]
pub struct StringToSign<'a> {
    pub scope: Scope<'a>,
    pub date: DateTime<Utc>,
    pub region: &'a str,
    pub service: &'a str,
    pub hashed_creq: &'a str,
}

impl<'a> StringToSign<'a> {
    pub fn new(
        date: DateTime<Utc>,
        region: &'a str,
        service: &'a str,
        hashed_creq: &'a str,
    ) -> Self {
        let scope = Scope {
            date: date.date_naive(),
            region,
            service,
        };
        Self {
            scope,
            date,
            region,
            service,
            hashed_creq,
        }
    }
}

impl<'a> AsSigV4 for StringToSign<'a> {
    fn fmt(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            HMAC_256,
            self.date.fmt_aws(),
            self.scope.fmt(),
            self.hashed_creq
        )
    }
}

/// The credential scope, `date/region/service/aws4_request`.
#[derive(Debug, PartialEq, Eq)]
pub struct Scope<'a> {
    pub date: NaiveDate,
    pub region: &'a str,
    pub service: &'a str,
}

impl<'a> AsSigV4 for Scope<'a> {
    fn fmt(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.date.fmt_aws(),
            self.region,
            self.service,
            AWS4_REQUEST
        )
    }
}

pub trait DateTimeExt {
    // formats using SigV4's format. YYYYMMDD'T'HHMMSS'Z'.
    fn fmt_aws(&self) -> String;
}

pub trait DateExt {
    fn fmt_aws(&self) -> String;
}

impl DateExt for NaiveDate {
    fn fmt_aws(&self) -> String {
        self.format(SHORT_DATE_FORMAT).to_string()
    }
}

impl DateTimeExt for DateTime<Utc> {
    fn fmt_aws(&self) -> String {
        self.format(DATE_FORMAT).to_string()
    }
}
