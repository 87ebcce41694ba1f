use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, info, warn};

use super::{
    CallOutcome, PreparedRequest, RequestError, ReqwestTransport, Target, Transport,
    TransportError, UpstreamEndpoint, UpstreamError, UpstreamRequest,
};

/// Longest body excerpt carried in an [`UpstreamError::Status`]
const ERROR_BODY_EXCERPT: usize = 200;

/// Calls one [`UpstreamEndpoint`] with timeout, retry and failover
///
/// Retry `n` (1-based) is preceded by a sleep of
/// `retry_delay * backoff_multiplier^(n-1)`. Before the first retry the client
/// moves to the secondary target, if there is one, and stays there for the
/// rest of the call. A 429 ends the call at once with
/// [`CallOutcome::RateLimited`].
#[derive(Clone)]
pub struct UpstreamClient {
    endpoint: UpstreamEndpoint,
    transport: Arc<dyn Transport>,
}

impl UpstreamClient {
    /// Creates a client using the reqwest transport
    pub fn new(endpoint: UpstreamEndpoint) -> Self {
        Self::with_transport(endpoint, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(endpoint: UpstreamEndpoint, transport: Arc<dyn Transport>) -> Self {
        Self {
            endpoint,
            transport,
        }
    }

    pub fn endpoint(&self) -> &UpstreamEndpoint {
        &self.endpoint
    }

    /// Performs `request`, retrying per the endpoint policy
    ///
    /// # Returns
    /// * `Ok(CallOutcome::Success(body))` on the first 2xx response
    /// * `Ok(CallOutcome::RateLimited)` on a 429
    /// * `Ok(CallOutcome::Failed(last_error))` once retries are exhausted
    /// * `Err(RequestError)` if the request cannot be built
    pub async fn call(&self, request: &UpstreamRequest) -> Result<CallOutcome<Vec<u8>>, RequestError> {
        let timeout = request.timeout.unwrap_or(self.endpoint.timeout);
        let max_retries = self.endpoint.max_retries;
        let mut target = &self.endpoint.primary;
        let mut attempt = 0u32;

        loop {
            let prepared = prepare(target, request)?;
            debug!(method = %prepared.method, url = %prepared.url, attempt, "upstream request");

            let error = match tokio::time::timeout(timeout, self.transport.send(prepared)).await {
                Err(_elapsed) => UpstreamError::Timeout(timeout),
                Ok(Err(TransportError::InvalidRequest(reason))) => {
                    return Err(RequestError::Invalid(reason));
                }
                Ok(Err(TransportError::Network(message))) => UpstreamError::Network(message),
                Ok(Ok(response)) if response.status == 429 => {
                    warn!(base_url = %target.base_url, path = %request.path, "upstream rate limited");
                    return Ok(CallOutcome::RateLimited);
                }
                Ok(Ok(response)) if response.is_success() => {
                    return Ok(CallOutcome::Success(response.body));
                }
                Ok(Ok(response)) => UpstreamError::Status {
                    status: response.status,
                    body: response.excerpt(ERROR_BODY_EXCERPT),
                },
            };

            if attempt >= max_retries {
                warn!(path = %request.path, attempts = attempt + 1, error = %error, "upstream retries exhausted");
                return Ok(CallOutcome::Failed(error));
            }

            let delay = self.endpoint.retry_delay_for(attempt);
            warn!(
                path = %request.path,
                error = %error,
                "upstream attempt failed, retrying in {:?} ({}/{})",
                delay,
                attempt + 1,
                max_retries
            );
            tokio::time::sleep(delay).await;

            if attempt == 0 {
                if let Some(secondary) = &self.endpoint.secondary {
                    info!(base_url = %secondary.base_url, "switching to backup upstream");
                    target = secondary;
                }
            }
            attempt += 1;
        }
    }
}

/// Joins `target` and `request` into a concrete URL and header set
fn prepare(target: &Target, request: &UpstreamRequest) -> Result<PreparedRequest, RequestError> {
    let base = target.base_url.trim_end_matches('/');
    let raw = if request.path.is_empty() || request.path.starts_with('/') {
        format!("{}{}", base, request.path)
    } else {
        format!("{}/{}", base, request.path)
    };

    let mut url = Url::parse(&raw).map_err(|e| RequestError::InvalidUrl {
        url: raw.clone(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(RequestError::InvalidUrl {
            url: raw,
            reason: "not a hierarchical URL".to_string(),
        });
    }
    if !request.query.is_empty() {
        url.query_pairs_mut().extend_pairs(request.query.iter());
    }

    let headers = target
        .headers
        .iter()
        .chain(request.headers.iter())
        .cloned()
        .collect();

    Ok(PreparedRequest {
        method: request.method.clone(),
        url,
        headers,
        body: request.body.clone(),
    })
}
