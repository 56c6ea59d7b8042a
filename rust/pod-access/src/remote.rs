use std::sync::Arc;

use pod_gateway::{Gateway, GatewayRequest, GatewayResponse};
use tokio::sync::Semaphore;

use crate::{AccessError, EngineConfig, SessionContext};

/// What kind of document a request is about, which decides how client
/// errors are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A resource or container listing
    Resource,
    /// A policy document; a rejected request means the document itself is
    /// at fault
    Policy,
}

/// The call discipline every remote request of an engine goes through.
///
/// A single [`Remote`] is shared by all tasks of an engine. It caps the
/// number of requests in flight (further requests queue), bounds each
/// request with a timeout, retries transport failures with exponential
/// backoff, and abandons work as soon as the session is invalidated.
#[derive(Clone)]
pub struct Remote {
    gateway: Arc<dyn Gateway>,
    permits: Arc<Semaphore>,
    config: Arc<EngineConfig>,
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("available_permits", &self.permits.available_permits())
            .field("config", &self.config)
            .finish()
    }
}

impl Remote {
    /// Wrap a gateway.
    pub fn new(gateway: impl Gateway + 'static, config: Arc<EngineConfig>) -> Self {
        Self {
            gateway: Arc::new(gateway),
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            config,
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Send `request`, retrying transport failures, and classify the answer.
    ///
    /// Only 2xx responses are returned; every other status becomes the
    /// matching [`AccessError`].
    pub async fn send(
        &self,
        session: &SessionContext,
        request: GatewayRequest,
        target: Target,
    ) -> Result<GatewayResponse, AccessError> {
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.attempt(session, request.clone(), target).await {
                Err(error) if error.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = retry.delay_for(attempt);
                    tracing::debug!(
                        url = %request.url,
                        "{error}, retry {}/{} after {delay:?}",
                        attempt + 1,
                        max_attempts - 1
                    );
                    tokio::select! {
                        _ = session.cancelled() => return Err(AccessError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Like [`Remote::send`], but a missing document is `Ok(None)`.
    pub async fn send_optional(
        &self,
        session: &SessionContext,
        request: GatewayRequest,
        target: Target,
    ) -> Result<Option<GatewayResponse>, AccessError> {
        match self.send(session, request, target).await {
            Ok(response) => Ok(Some(response)),
            Err(AccessError::NotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn attempt(
        &self,
        session: &SessionContext,
        request: GatewayRequest,
        target: Target,
    ) -> Result<GatewayResponse, AccessError> {
        session.ensure_valid()?;

        let _permit = tokio::select! {
            biased;
            _ = session.cancelled() => return Err(AccessError::Cancelled),
            permit = self.permits.acquire() => permit.map_err(|_| AccessError::Cancelled)?,
        };

        let method = request.method;
        let url = request.url.clone();
        let timeout = self.config.request_timeout;

        let outcome = tokio::select! {
            biased;
            _ = session.cancelled() => return Err(AccessError::Cancelled),
            outcome = tokio::time::timeout(timeout, self.gateway.fetch(request)) => outcome,
        };

        match outcome {
            Err(_) => Err(AccessError::transport(
                &url,
                format!("no response within {timeout:?}"),
                true,
            )),
            Ok(Err(failure)) => Err(AccessError::transport(
                &url,
                &failure,
                failure.is_retryable(),
            )),
            Ok(Ok(response)) => {
                tracing::debug!(%method, %url, status = response.status, "Remote call completed");
                classify(response, target)
            }
        }
    }
}

fn classify(response: GatewayResponse, target: Target) -> Result<GatewayResponse, AccessError> {
    let url = &response.url;
    match response.status {
        200..=299 => Ok(response),
        401 | 403 => Err(AccessError::NotAuthorized { url: url.clone() }),
        404 | 410 => Err(AccessError::NotFound { url: url.clone() }),
        400 | 409 | 415 | 422 if target == Target::Policy => {
            tracing::warn!(%url, status = response.status, "Pod rejected policy document");
            Err(AccessError::malformed(
                url,
                format!("rejected with status {}", response.status),
            ))
        }
        status @ (408 | 429 | 500..=599) => {
            Err(AccessError::transport(url, format!("status {status}"), true))
        }
        status => Err(AccessError::transport(url, format!("status {status}"), false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn response(status: u16) -> GatewayResponse {
        GatewayResponse::new(Url::parse("https://pod.example/data/.acl").unwrap(), status)
    }

    #[test]
    fn it_classifies_statuses_by_target() {
        assert!(classify(response(205), Target::Policy).is_ok());
        assert!(matches!(
            classify(response(403), Target::Resource),
            Err(AccessError::NotAuthorized { .. })
        ));
        assert!(matches!(
            classify(response(410), Target::Resource),
            Err(AccessError::NotFound { .. })
        ));
        assert!(matches!(
            classify(response(422), Target::Policy),
            Err(AccessError::MalformedPolicy { .. })
        ));
        assert!(matches!(
            classify(response(422), Target::Resource),
            Err(AccessError::Transport { retryable: false, .. })
        ));
        assert!(matches!(
            classify(response(503), Target::Resource),
            Err(AccessError::Transport { retryable: true, .. })
        ));
        assert!(matches!(
            classify(response(429), Target::Policy),
            Err(AccessError::Transport { retryable: true, .. })
        ));
    }
}
