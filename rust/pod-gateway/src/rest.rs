//! `reqwest`-backed gateway for real pods.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::{Gateway, GatewayRequest, GatewayResponse, Method, TransportFailure};

/// Authentication methods for [`RestGateway`]
#[derive(Clone, Debug)]
pub enum AuthMethod {
    /// No authentication; only public resources will be readable
    None,

    /// Bearer token authentication
    ///
    /// Includes `Authorization: Bearer {token}` in all requests. Obtaining and
    /// refreshing the token is the session layer's concern.
    Bearer(String),
}

/// Configuration for [`RestGateway`]
#[derive(Clone, Debug)]
pub struct RestGatewayConfig {
    /// Authentication method
    pub auth_method: AuthMethod,

    /// Optional timeout for requests in seconds (default: 30)
    pub timeout_seconds: Option<u64>,

    /// Optional custom headers to send with each request
    pub headers: Vec<(String, String)>,
}

impl Default for RestGatewayConfig {
    fn default() -> Self {
        Self {
            auth_method: AuthMethod::None,
            timeout_seconds: Some(30),
            headers: Vec::new(),
        }
    }
}

impl RestGatewayConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the authentication method
    pub fn with_auth(mut self, auth_method: AuthMethod) -> Self {
        self.auth_method = auth_method;
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// A [`Gateway`] that performs HTTP requests with `reqwest`.
#[derive(Clone, Debug)]
pub struct RestGateway {
    config: RestGatewayConfig,
    client: Client,
}

impl RestGateway {
    /// Create a new gateway with the given configuration
    pub fn new(config: RestGatewayConfig) -> Result<Self, TransportFailure> {
        let mut client_builder = Client::builder();

        if let Some(timeout) = config.timeout_seconds {
            client_builder = client_builder.timeout(Duration::from_secs(timeout));
        }

        let client = client_builder
            .build()
            .map_err(|error| TransportFailure::Protocol(error.to_string()))?;

        Ok(Self { config, client })
    }

    /// Build a request with authentication and custom headers
    fn build_request(&self, request: &GatewayRequest) -> reqwest::RequestBuilder {
        let url = request.url.clone();
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Head => self.client.head(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        };

        match &self.config.auth_method {
            AuthMethod::None => {}
            AuthMethod::Bearer(token) => {
                builder = builder.bearer_auth(token);
            }
        }

        for (key, value) in &self.config.headers {
            builder = builder.header(key, value);
        }

        if let Some(content_type) = &request.content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        builder
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn fetch(&self, request: GatewayRequest) -> Result<GatewayResponse, TransportFailure> {
        tracing::trace!(method = %request.method, url = %request.url, "Sending request");

        let response = self.build_request(&request).send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();

        let body = if request.method == Method::Head {
            Vec::new()
        } else {
            response.bytes().await?.to_vec()
        };

        Ok(GatewayResponse {
            url: request.url,
            status,
            headers,
            body,
        })
    }
}
