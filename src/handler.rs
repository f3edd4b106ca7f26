use crate::{
    config::{PreflightPolicy, ProxyConfig},
    credentials::{CredentialsCache, ProvideCredentials},
    error::ProxyError,
    event::{EdgeEvent, EdgeOutcome, EdgeRequest, EdgeResponse},
    normalize::{check_origin, is_preflight, rewrite_request_path, strip_headers},
    signer::{merge_headers, sign_request},
};
use log::{debug, info};
use std::time::SystemTime;

/// Source of the signing timestamp.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub SystemTime);

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.0
    }
}

/// Per-process origin-request handler. Build it once and share it across invocations; the
/// only state it keeps is the credential cache.
pub struct EdgeSigner<P> {
    config: ProxyConfig,
    credentials: CredentialsCache<P>,
    clock: Box<dyn Clock>,
}

impl<P: ProvideCredentials> EdgeSigner<P> {
    pub fn new(config: ProxyConfig, credentials: CredentialsCache<P>) -> Self {
        Self {
            config,
            credentials,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialsCache<P> {
        &self.credentials
    }

    pub async fn handle_event(&self, event: EdgeEvent) -> Result<EdgeOutcome, ProxyError> {
        self.handle(event.into_request()?).await
    }

    /// Normalizes, rewrites, signs and returns the request to forward. Nothing unsigned is
    /// ever returned unless the preflight policy says so.
    pub async fn handle(&self, mut request: EdgeRequest) -> Result<EdgeOutcome, ProxyError> {
        info!(
            "request method={} uri={} querystring={:?} headers={:?}",
            request.method,
            request.uri,
            request.querystring,
            request.headers.keys().collect::<Vec<_>>()
        );
        check_origin(&request)?;

        if is_preflight(&request) {
            match self.config.preflight {
                PreflightPolicy::PassThrough => {
                    info!("passing CORS preflight through unsigned");
                    return Ok(EdgeOutcome::Forward(request));
                }
                PreflightPolicy::Respond => {
                    info!("answering CORS preflight at the edge");
                    return Ok(EdgeOutcome::Respond(EdgeResponse::new(204, "No Content")));
                }
                PreflightPolicy::Sign => debug!("signing CORS preflight"),
            }
        }

        strip_headers(&mut request, &self.config.strip_headers);
        rewrite_request_path(&mut request);

        let credentials = self.credentials.resolve().await?;
        let signed = sign_request(
            &request,
            &credentials,
            &self.config.service,
            self.config.signing_settings(),
            self.clock.now(),
        )?;
        merge_headers(&mut request, &signed);

        info!(
            "signed request method={} uri={} signed_headers={:?}",
            request.method,
            request.uri,
            signed.iter().map(|(name, _)| name).collect::<Vec<_>>()
        );
        Ok(EdgeOutcome::Forward(request))
    }
}
