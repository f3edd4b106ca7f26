use super::ProvideCredentials;
use crate::error::CredentialError;
use async_trait::async_trait;
use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_credential_types::provider::{
    error::CredentialsError, ProvideCredentials as ProvideSdkCredentials,
};
use aws_sigv4::Credentials;
use chrono::{DateTime, Utc};
use log::debug;
use std::error::Error;

/// Always returns the same credentials.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    credentials: Credentials,
}

impl StaticProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl ProvideCredentials for StaticProvider {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError> {
        Ok(self.credentials.clone())
    }
}

/// Resolves credentials through an AWS SDK credentials provider.
#[derive(Debug)]
pub struct SdkProvider<P> {
    inner: P,
}

impl<P> SdkProvider<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl SdkProvider<DefaultCredentialsChain> {
    /// The SDK's default chain: environment variables, shared config and credentials files
    /// (profiles, SSO, credential processes), web identity tokens, the container credentials
    /// endpoint and finally EC2 instance metadata.
    pub async fn default_chain() -> Self {
        Self::new(DefaultCredentialsChain::builder().build().await)
    }
}

#[async_trait]
impl<P: ProvideSdkCredentials> ProvideCredentials for SdkProvider<P> {
    async fn provide_credentials(&self) -> Result<Credentials, CredentialError> {
        let credentials = ProvideSdkCredentials::provide_credentials(&self.inner)
            .await
            .map_err(|e| match e {
                CredentialsError::CredentialsNotLoaded(_) => {
                    CredentialError::NotConfigured(error_chain(&e))
                }
                _ => CredentialError::Provider(error_chain(&e)),
            })?;
        debug!(
            "loaded credentials for {} expiring {:?}",
            credentials.access_key_id(),
            credentials.expiry()
        );

        let converted = Credentials::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            credentials.session_token().map(str::to_string),
        );
        Ok(match credentials.expiry() {
            Some(expiry) => converted.with_expiration(DateTime::<Utc>::from(expiry)),
            None => converted,
        })
    }
}

/// The error and all of its sources, `: `-separated.
fn error_chain(e: &dyn Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
