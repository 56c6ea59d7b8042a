use std::sync::Arc;

use async_trait::async_trait;

use crate::{GatewayRequest, GatewayResponse, TransportFailure};

/// Authenticated access to a pod over HTTP.
///
/// A gateway is bound to one identity: every request it sends is made on
/// behalf of the agent whose session created it. Implementations return any
/// HTTP status as a [`GatewayResponse`] and reserve [`TransportFailure`] for
/// requests that produced no response at all.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Perform a single request.
    async fn fetch(&self, request: GatewayRequest) -> Result<GatewayResponse, TransportFailure>;
}

#[async_trait]
impl<T> Gateway for Arc<T>
where
    T: Gateway + ?Sized,
{
    async fn fetch(&self, request: GatewayRequest) -> Result<GatewayResponse, TransportFailure> {
        self.as_ref().fetch(request).await
    }
}
