//! Request and response shapes that cross the [`Gateway`](crate::Gateway).

use std::fmt::Display;

use url::Url;

use crate::parse_link_header;

/// The HTTP methods the access engine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read a resource's representation
    Get,
    /// Read a resource's headers only
    Head,
    /// Replace a resource's representation
    Put,
    /// Remove a resource
    Delete,
}

impl Method {
    /// The method name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request against a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    /// What to do
    pub method: Method,
    /// Where to do it
    pub url: Url,
    /// Request payload, if any
    pub body: Option<Vec<u8>>,
    /// Media type of `body`
    pub content_type: Option<String>,
}

impl GatewayRequest {
    /// A `GET` request for the given URL.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            body: None,
            content_type: None,
        }
    }

    /// A `HEAD` request for the given URL.
    pub fn head(url: Url) -> Self {
        Self {
            method: Method::Head,
            url,
            body: None,
            content_type: None,
        }
    }

    /// A `PUT` request replacing the resource at `url` with `body`.
    pub fn put(url: Url, body: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            method: Method::Put,
            url,
            body: Some(body.into()),
            content_type: Some(content_type.into()),
        }
    }
}

/// Coarse classification of an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx
    Success,
    /// 401 or 403
    NotAuthorized,
    /// 404 or 410
    NotFound,
    /// Any other 4xx
    ClientError,
    /// 5xx
    ServerError,
    /// 1xx, 3xx or out of range
    Other,
}

impl StatusClass {
    /// Classify a numeric status code.
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => StatusClass::Success,
            401 | 403 => StatusClass::NotAuthorized,
            404 | 410 => StatusClass::NotFound,
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Other,
        }
    }
}

/// The remote side's answer to a [`GatewayRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    /// The URL the request was made against, used to resolve relative links
    pub url: Url,
    /// HTTP status code
    pub status: u16,
    /// Response headers; names are stored lower-cased
    pub headers: Vec<(String, String)>,
    /// Response payload (empty for `HEAD`)
    pub body: Vec<u8>,
}

impl GatewayResponse {
    /// Create a response with no headers and an empty body.
    pub fn new(url: Url, status: u16) -> Self {
        Self {
            url,
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Add a header. The name is lower-cased.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .push((name.as_ref().to_ascii_lowercase(), value.into()));
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// The classification of this response's status.
    pub fn class(&self) -> StatusClass {
        StatusClass::of(self.status)
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.class() == StatusClass::Success
    }

    /// First value of the named header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The media type of the body without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(|value| value.split(';').next().unwrap_or(value).trim())
    }

    /// Target of the first `Link` with the given relation, resolved against
    /// the request URL. All `Link` headers are considered.
    pub fn link(&self, rel: &str) -> Option<Url> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case("link"))
            .flat_map(|(_, value)| parse_link_header(value, &self.url))
            .find(|link| link.has_rel(rel))
            .map(|link| link.target)
    }
}
