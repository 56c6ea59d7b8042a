#![warn(missing_docs)]

//! The remote side of pod access.
//!
//! A pod is reachable over HTTP, and every request it receives is made on
//! behalf of some authenticated agent. This crate defines the narrow
//! [`Gateway`] seam the access engine talks through, the request and response
//! shapes that cross it, and a [`RestGateway`] that performs real requests
//! with `reqwest`.
//!
//! The gateway does not interpret statuses beyond classifying them (see
//! [`StatusClass`]); deciding what a `403` on a policy document means is the
//! engine's job.
//!
//! ```no_run
//! use pod_gateway::{AuthMethod, Gateway, GatewayRequest, RestGateway, RestGatewayConfig};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RestGatewayConfig::new()
//!     .with_auth(AuthMethod::Bearer("token".into()))
//!     .with_timeout(10);
//! let gateway = RestGateway::new(config)?;
//!
//! let url = Url::parse("https://alice.pod.example/data/")?;
//! let response = gateway.fetch(GatewayRequest::head(url)).await?;
//! println!("policy lives at {:?}", response.link("acl"));
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

mod request;
pub use request::*;

mod link;
pub use link::*;

mod gateway;
pub use gateway::*;

mod rest;
pub use rest::*;
