//! Origin-request handler that signs CDN-forwarded requests with AWS Signature Version 4 so a
//! Lambda function URL protected by IAM auth accepts them.
//!
//! Each invocation goes through the same stages:
//!
//! 1. [`normalize`] rejects anything but a custom origin and strips headers the CDN rewrites
//!    after the handler returns (`x-forwarded-for` at least).
//! 2. [`normalize::rewrite_path`] drops the first path segment, which only selects the CDN
//!    behavior.
//! 3. [`credentials::CredentialsCache`] hands out process-wide cached credentials.
//! 4. [`signer::sign_request`] computes the SigV4 headers and [`signer::merge_headers`] writes
//!    them back onto the request.
//!
//! [`EdgeSigner`] runs the whole pipeline.

pub mod config;
pub mod credentials;
pub mod error;
pub mod event;
pub mod handler;
pub mod normalize;
pub mod signer;

pub use aws_sigv4::{Credentials, SigningSettings, UriEncoding};
pub use config::{PreflightPolicy, ProxyConfig};
pub use credentials::{CredentialsCache, ProvideCredentials, SdkProvider, StaticProvider};
pub use error::{ConfigurationError, CredentialError, ProxyError, SigningError};
pub use event::{decode_event, EdgeEvent, EdgeOutcome, EdgeRequest, EdgeResponse};
pub use handler::{Clock, EdgeSigner, FixedClock, SystemClock};
pub use signer::{merge_headers, sign_request, SignedHeaders};
