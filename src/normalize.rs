//! Request Normalizer and Path Rewriter: the stages that run before anything is signed.

use crate::{
    error::ConfigurationError,
    event::{EdgeRequest, OriginDescriptor},
};
use log::debug;

/// Forwarded-client-address header added by the CDN. It changes per viewer and is rewritten by
/// the CDN after the handler returns, so it must never be signed.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Fails unless the request is bound for a custom origin.
pub fn check_origin(request: &EdgeRequest) -> Result<(), ConfigurationError> {
    match &request.origin {
        Some(OriginDescriptor::Custom(_)) => Ok(()),
        Some(other) => Err(ConfigurationError::UnsupportedOrigin(other.kind())),
        None => Err(ConfigurationError::MissingOrigin),
    }
}

/// Drops `x-forwarded-for` and every header named in `strip`. Names are compared
/// case-insensitively, including map keys that were inserted without lower-casing.
pub fn strip_headers(request: &mut EdgeRequest, strip: &[String]) {
    request.headers.retain(|name, _| {
        let stripped = name.eq_ignore_ascii_case(X_FORWARDED_FOR)
            || strip.iter().any(|s| name.eq_ignore_ascii_case(s));
        if stripped {
            debug!("removed {} from the request", name);
        }
        !stripped
    });
}

/// The full normalizer: origin check first, then header stripping. Nothing is modified when
/// the origin is rejected.
pub fn normalize(request: &mut EdgeRequest, strip: &[String]) -> Result<(), ConfigurationError> {
    check_origin(request)?;
    strip_headers(request, strip);
    Ok(())
}

/// Removes the behavior selector segment: `/getBooks/123` becomes `/123`, `/getBooks` becomes
/// `/`. Empty segments are kept, so `/a//b` becomes `//b`.
pub fn rewrite_path(uri: &str) -> String {
    let rest = uri.strip_prefix('/').unwrap_or(uri);
    match rest.split_once('/') {
        Some((_, rest)) => format!("/{}", rest),
        None => "/".to_string(),
    }
}

/// Rewrites `request.uri` in place; the query string is left alone.
pub fn rewrite_request_path(request: &mut EdgeRequest) {
    let rewritten = rewrite_path(&request.uri);
    debug!("rewrote uri {} to {}", request.uri, rewritten);
    request.uri = rewritten;
}

/// CORS preflight: `OPTIONS` with both `origin` and `access-control-request-method`.
pub fn is_preflight(request: &EdgeRequest) -> bool {
    request.method.eq_ignore_ascii_case("OPTIONS")
        && request.header("origin").is_some()
        && request.header("access-control-request-method").is_some()
}
