use chrono::{DateTime, Duration, Utc};
use http::header::{self, HeaderName, HeaderValue};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{fmt, iter};

pub const HMAC_256: &str = "AWS4-HMAC-SHA256";
pub const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
pub const SHORT_DATE_FORMAT: &str = "%Y%m%d";
pub const AWS4_REQUEST: &str = "aws4_request";
pub const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";
pub const X_AMZ_DATE: &str = "x-amz-date";

pub mod sign;
pub mod types;

use crate::UriEncoding::Double;
use sign::{calculate_signature, encode_with_hex, generate_signing_key};
use std::time::SystemTime;
use types::{AsSigV4, CanonicalRequest, DateTimeExt, StringToSign};

/// Errors raised while building the canonical request or the signature.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SigningError {
    /// Neither a `host` header nor a URI authority was available.
    #[error("request is missing a host header")]
    MissingHost,

    /// The host could not be parsed positionally into `<svc>.<region>.<partition>`.
    #[error("host {0:?} must have at least three dot-separated labels")]
    InvalidHost(String),

    #[error("missing credentials: {0} is empty")]
    MissingCredentials(&'static str),

    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    #[error("header {0} has a value that is not valid UTF-8 or contains control characters")]
    InvalidHeaderValue(String),

    #[error("invalid request URI {0:?}")]
    InvalidUri(String),

    #[error("malformed query string: {0}")]
    MalformedQuery(String),

    #[error("request body cannot be decoded: {0}")]
    InvalidBody(String),

    /// Only part of the body was handed over, so its hash cannot match what the origin receives.
    #[error("request body was truncated before signing")]
    TruncatedBody,

    #[error(transparent)]
    Http(#[from] http::Error),
}

/// Signs `req` in place, replacing any `authorization`, `x-amz-date` or `x-amz-security-token`
/// header already present.
pub fn sign<B>(
    req: &mut http::Request<B>,
    credential: &Credentials,
    region: &str,
    svc: &str,
) -> Result<(), SigningError>
where
    B: AsRef<[u8]>,
{
    let signed = sign_core(
        req,
        Config {
            access_key: &credential.access_key,
            secret_key: &credential.secret_key,
            security_token: credential.security_token.as_deref(),
            region,
            svc,
            date: SystemTime::now(),
            settings: Default::default(),
        },
    )?;
    for (header_name, header_value) in signed.collect::<Vec<_>>() {
        let value = HeaderValue::from_str(&header_value)
            .map_err(|_| SigningError::InvalidHeaderValue(header_name.as_str().to_string()))?;
        req.headers_mut().insert(header_name.header_name(), value);
    }

    Ok(())
}

/// SignatureKey is the key portion of the key-value pair of a generated SigV4 signature.
///
/// When signing with SigV4, the algorithm produces multiple components of a signature that MUST
/// be applied to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignatureKey {
    Authorization,
    AmzDate,
    AmzSecurityToken,
}

impl SignatureKey {
    pub fn header_name(&self) -> HeaderName {
        match self {
            SignatureKey::Authorization => header::AUTHORIZATION,
            SignatureKey::AmzDate => HeaderName::from_static(X_AMZ_DATE),
            SignatureKey::AmzSecurityToken => HeaderName::from_static(X_AMZ_SECURITY_TOKEN),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureKey::Authorization => "authorization",
            SignatureKey::AmzDate => X_AMZ_DATE,
            SignatureKey::AmzSecurityToken => X_AMZ_SECURITY_TOKEN,
        }
    }
}

pub struct Config<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub security_token: Option<&'a str>,

    pub region: &'a str,
    pub svc: &'a str,

    pub date: SystemTime,

    pub settings: SigningSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningSettings {
    /// We assume the URI will be encoded _once_ prior to transmission. Some services
    /// do not decode the path prior to checking the signature, requiring clients to actually
    /// _double-encode_ the URI in creating the canonical request in order to pass a signature check.
    pub uri_encoding: UriEncoding,
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum UriEncoding {
    /// Normalize the path (no empty, `.` or `..` segments), then re-encode it (eg. %30 becomes `%2530`)
    Double,

    /// Take the resulting URL as-is
    Single,
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            uri_encoding: Double,
        }
    }
}

/// Computes the signature headers for `req` without touching it.
///
/// The returned iterator always yields `authorization` and `x-amz-date`, followed by
/// `x-amz-security-token` when the config carries a session token. Both the date and the token
/// are folded into the canonical request before the signature is computed.
pub fn sign_core<'a, B>(
    req: &'a http::Request<B>,
    config: Config<'a>,
) -> Result<impl Iterator<Item = (SignatureKey, String)>, SigningError>
where
    B: AsRef<[u8]>,
{
    let Config {
        access_key,
        secret_key,
        security_token,
        region,
        svc,
        date,
        settings,
    } = config;
    if access_key.is_empty() {
        return Err(SigningError::MissingCredentials("access key"));
    }
    if secret_key.is_empty() {
        return Err(SigningError::MissingCredentials("secret key"));
    }
    let date = DateTime::<Utc>::from(date);

    // Step 1: https://docs.aws.amazon.com/en_pv/general/latest/gr/sigv4-create-canonical-request.html.
    let creq = CanonicalRequest::from(req, date, security_token, &settings)?;
    let creq_str = creq.fmt();
    debug!("Canonical request:\n{}", creq_str);

    // Step 2: https://docs.aws.amazon.com/en_pv/general/latest/gr/sigv4-create-string-to-sign.html.
    let encoded_creq = &encode_with_hex(&creq_str);
    let sts = StringToSign::new(date, region, svc, encoded_creq);
    let sts_str = sts.fmt();
    debug!("String to sign:\n{}", sts_str);

    // Step 3: https://docs.aws.amazon.com/en_pv/general/latest/gr/sigv4-calculate-signature.html
    let signing_key = generate_signing_key(secret_key, date.date_naive(), region, svc);
    let signature = calculate_signature(signing_key, sts_str.as_bytes());

    // Step 4: https://docs.aws.amazon.com/en_pv/general/latest/gr/sigv4-add-signature-to-request.html
    let authorization = build_authorization_header(access_key, &creq, &sts, &signature);
    let x_amz_date = date.fmt_aws();

    let mut tok = security_token.map(|it| it.to_string());
    Ok(iter::once((SignatureKey::Authorization, authorization))
        .chain(iter::once((SignatureKey::AmzDate, x_amz_date)))
        .chain(iter::from_fn(move || {
            tok.take().map(|tok| (SignatureKey::AmzSecurityToken, tok))
        })))
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Default, Clone)]
pub struct Credentials {
    #[serde(rename = "aws_access_key_id")]
    pub access_key: String,
    #[serde(rename = "aws_secret_access_key")]
    pub secret_key: String,
    #[serde(rename = "aws_session_token", default)]
    pub security_token: Option<String>,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        security_token: Option<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            security_token,
            expiration: None,
        }
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// True when the credentials expire before `now + window`. Credentials without an
    /// expiration never expire.
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.expiration {
            Some(expiration) => expiration <= now + window,
            None => false,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"** redacted **")
            .field(
                "security_token",
                &self.security_token.as_ref().map(|_| "** redacted **"),
            )
            .field("expiration", &self.expiration)
            .finish()
    }
}

// add signature to authorization header
// Authorization: algorithm Credential=access key ID/credential scope, SignedHeaders=SignedHeaders, Signature=signature
fn build_authorization_header(
    access_key: &str,
    creq: &CanonicalRequest,
    sts: &StringToSign,
    signature: &str,
) -> String {
    format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        HMAC_256,
        access_key,
        sts.scope.fmt(),
        creq.signed_headers,
        signature
    )
}
