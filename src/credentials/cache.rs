use super::ProvideCredentials;
use crate::error::CredentialError;
use aws_sigv4::Credentials;
use chrono::{Duration, Utc};
use log::{debug, trace, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Credentials expiring within this many seconds are refreshed ahead of time.
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 300;

/// Process-wide credential cache.
///
/// Readers share the cached value. A refresh happens under a separate refresh lock, and the
/// value is re-checked once that lock is held so only one caller ever talks to the provider for
/// a given refresh. The value itself is only write-locked to swap in the new credentials.
///
/// No retries: a failing provider fails the resolving invocation unless the cached credentials
/// have not actually expired yet.
///
/// Credentials inside the refresh buffer are still valid. While one caller refreshes them, the
/// others keep using them instead of queueing behind the provider call.
pub struct CredentialsCache<P> {
    provider: P,
    cached: RwLock<Option<Arc<Credentials>>>,
    refresh: Mutex<()>,
    refresh_buffer: Duration,
}

impl<P: ProvideCredentials> CredentialsCache<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
            refresh_buffer: Duration::seconds(DEFAULT_REFRESH_BUFFER_SECS),
        }
    }

    pub fn with_refresh_buffer(mut self, refresh_buffer: Duration) -> Self {
        self.refresh_buffer = refresh_buffer;
        self
    }

    pub async fn resolve(&self) -> Result<Arc<Credentials>, CredentialError> {
        let usable = {
            let cached = self.cached.read().await;
            if let Some(credentials) = self.fresh(cached.as_ref()) {
                trace!("using cached credentials");
                return Ok(credentials);
            }
            unexpired(cached.as_ref())
        };

        let _refresh = match &usable {
            Some(current) => match self.refresh.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    trace!("refresh in progress, using credentials that have not expired yet");
                    return Ok(Arc::clone(current));
                }
            },
            None => self.refresh.lock().await,
        };
        if let Some(credentials) = self.fresh(self.cached.read().await.as_ref()) {
            trace!("credentials refreshed by another caller");
            return Ok(credentials);
        }

        match self.load().await {
            Ok(credentials) => {
                *self.cached.write().await = Some(Arc::clone(&credentials));
                Ok(credentials)
            }
            Err(e) => match unexpired(self.cached.read().await.as_ref()) {
                Some(current) => {
                    warn!(
                        "refreshing credentials failed, using ones expiring {:?}: {}",
                        current.expiration, e
                    );
                    Ok(current)
                }
                None => Err(e),
            },
        }
    }

    /// Drops the cached value; the next `resolve` goes back to the provider.
    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }

    async fn load(&self) -> Result<Arc<Credentials>, CredentialError> {
        debug!("resolving credentials");
        let credentials = self.provider.provide_credentials().await?;
        if let Some(expiration) = credentials.expiration {
            if expiration <= Utc::now() {
                return Err(CredentialError::Expired(expiration));
            }
        }
        debug!(
            "resolved credentials for {} expiring {:?}",
            credentials.access_key, credentials.expiration
        );
        Ok(Arc::new(credentials))
    }

    fn fresh(&self, cached: Option<&Arc<Credentials>>) -> Option<Arc<Credentials>> {
        cached
            .filter(|credentials| !credentials.expires_within(Utc::now(), self.refresh_buffer))
            .cloned()
    }
}

fn unexpired(cached: Option<&Arc<Credentials>>) -> Option<Arc<Credentials>> {
    cached
        .filter(|credentials| !credentials.expires_within(Utc::now(), Duration::zero()))
        .cloned()
}
