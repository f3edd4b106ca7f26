use crate::{error::ConfigurationError, normalize::X_FORWARDED_FOR};
use aws_sigv4::{SigningSettings, UriEncoding};
use std::{env, str::FromStr};

/// Service name placed in the credential scope.
pub const DEFAULT_SERVICE: &str = "lambda";

pub const ENV_SERVICE: &str = "EDGE_SIGV4_SERVICE";
pub const ENV_STRIP_HEADERS: &str = "EDGE_SIGV4_STRIP_HEADERS";
pub const ENV_PREFLIGHT: &str = "EDGE_SIGV4_PREFLIGHT";
pub const ENV_URI_ENCODING: &str = "EDGE_SIGV4_URI_ENCODING";

/// What to do with a CORS preflight (`OPTIONS` carrying `origin` and
/// `access-control-request-method`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreflightPolicy {
    /// Sign it like any other request.
    #[default]
    Sign,
    /// Forward the request exactly as received, unsigned.
    PassThrough,
    /// Answer at the edge with `204 No Content`.
    Respond,
}

impl FromStr for PreflightPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sign" => Ok(PreflightPolicy::Sign),
            "pass-through" | "passthrough" => Ok(PreflightPolicy::PassThrough),
            "respond" => Ok(PreflightPolicy::Respond),
            _ => Err(ConfigurationError::InvalidSetting {
                name: ENV_PREFLIGHT,
                value: s.to_string(),
            }),
        }
    }
}

/// Deployment-supplied settings. Everything has a default matching a Lambda function URL
/// behind a CDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub service: String,
    /// Headers removed before signing, in addition to `x-forwarded-for`.
    pub strip_headers: Vec<String>,
    pub preflight: PreflightPolicy,
    pub uri_encoding: UriEncoding,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            strip_headers: vec![X_FORWARDED_FOR.to_string()],
            preflight: PreflightPolicy::default(),
            uri_encoding: UriEncoding::Double,
        }
    }
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source; unset or blank variables keep
    /// their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(service) = var(ENV_SERVICE) {
            config.service = service.trim().to_string();
        }
        if let Some(headers) = var(ENV_STRIP_HEADERS) {
            config.strip_headers = headers
                .split(',')
                .map(|name| name.trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty())
                .collect();
        }
        if let Some(policy) = var(ENV_PREFLIGHT) {
            config.preflight = policy.parse()?;
        }
        if let Some(encoding) = var(ENV_URI_ENCODING) {
            config.uri_encoding = match encoding.trim().to_ascii_lowercase().as_str() {
                "double" => UriEncoding::Double,
                "single" => UriEncoding::Single,
                _ => {
                    return Err(ConfigurationError::InvalidSetting {
                        name: ENV_URI_ENCODING,
                        value: encoding.clone(),
                    })
                }
            };
        }
        Ok(config)
    }

    pub fn signing_settings(&self) -> SigningSettings {
        SigningSettings {
            uri_encoding: self.uri_encoding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test_log::test]
    fn defaults() {
        let config = ProxyConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ProxyConfig::default());
        assert_eq!(config.service, "lambda");
        assert_eq!(config.strip_headers, vec!["x-forwarded-for"]);
        assert_eq!(config.signing_settings(), SigningSettings::default());
    }

    #[test_log::test]
    fn overrides() {
        let config = ProxyConfig::from_lookup(lookup(&[
            (ENV_SERVICE, "execute-api"),
            (ENV_STRIP_HEADERS, "X-Forwarded-For, CloudFront-Viewer-Country,"),
            (ENV_PREFLIGHT, "pass-through"),
            (ENV_URI_ENCODING, "Single"),
            ("UNRELATED", "x"),
        ]))
        .unwrap();
        assert_eq!(config.service, "execute-api");
        assert_eq!(
            config.strip_headers,
            vec!["x-forwarded-for", "cloudfront-viewer-country"]
        );
        assert_eq!(config.preflight, PreflightPolicy::PassThrough);
        assert_eq!(config.uri_encoding, UriEncoding::Single);
    }

    #[test_log::test]
    fn blank_values_keep_defaults() {
        let config = ProxyConfig::from_lookup(lookup(&[(ENV_SERVICE, "  ")])).unwrap();
        assert_eq!(config.service, DEFAULT_SERVICE);
    }

    #[test_log::test]
    fn invalid_values() {
        let err = ProxyConfig::from_lookup(lookup(&[(ENV_PREFLIGHT, "maybe")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value \"maybe\" for EDGE_SIGV4_PREFLIGHT"
        );
        assert!(ProxyConfig::from_lookup(lookup(&[(ENV_URI_ENCODING, "triple")])).is_err());
    }
}
