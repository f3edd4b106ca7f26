//! Credential Resolver.
//!
//! A [`CredentialsCache`] wraps one [`ProvideCredentials`] implementation and is shared by every
//! invocation a warm process serves. Providers are only consulted on a cold start and when the
//! cached credentials are about to expire.

mod cache;
mod provider;

pub use cache::{CredentialsCache, DEFAULT_REFRESH_BUFFER_SECS};
pub use provider::{SdkProvider, StaticProvider};

use crate::error::CredentialError;
use async_trait::async_trait;
use aws_sigv4::Credentials;
use std::sync::Arc;

/// A source of signing credentials.
#[async_trait]
pub trait ProvideCredentials: Send + Sync {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError>;
}

#[async_trait]
impl<T: ProvideCredentials + ?Sized> ProvideCredentials for Arc<T> {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError> {
        (**self).provide_credentials().await
    }
}

#[async_trait]
impl<T: ProvideCredentials + ?Sized> ProvideCredentials for Box<T> {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError> {
        (**self).provide_credentials().await
    }
}
