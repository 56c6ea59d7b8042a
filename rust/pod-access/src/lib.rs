#![warn(missing_docs)]

//! Access-control reconciliation for decentralized storage pods.
//!
//! A pod is a per-user store of typed resources, organized as nested
//! containers and reachable over HTTP. Who may do what to each resource is
//! governed by exactly one of two authorization systems, [`PolicySystem::Wac`]
//! or [`PolicySystem::Acp`], whose documents and inheritance rules differ.
//! This crate hides that difference behind a single [`AccessEngine`]:
//!
//! - [`AccessEngine::list_tree`] walks a pod's containers and returns a flat
//!   [`PodInventory`], reporting subtrees it could not list instead of failing.
//! - [`AccessEngine::detect`] finds out which policy system a pod uses, once
//!   per pod.
//! - [`AccessEngine::resolve`] computes the effective [`PermissionSet`] an
//!   agent holds on a resource, including inherited grants.
//! - [`AccessEngine::apply_change`] applies a [`PermissionDelta`] to many
//!   resources at once and returns an [`AccessFailureBatch`] that accounts for
//!   every target, so that one refusal never hides other successes.
//!
//! Every remote call goes through the engine's [`Remote`] discipline: a
//! global cap on in-flight requests, a per-request timeout, bounded retry of
//! transport failures, and cancellation tied to the [`SessionContext`].
//!
//! ```no_run
//! use pod_access::{AccessEngine, EngineConfig, JsonCodec, PermissionDelta, AccessModes, Pod, SessionContext, WebId};
//! use pod_gateway::{AuthMethod, RestGateway, RestGatewayConfig};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = SessionContext::new(WebId::new("https://alice.pod.example/profile/card#me"));
//! let gateway = RestGateway::new(RestGatewayConfig::new().with_auth(AuthMethod::Bearer("token".into())))?;
//! let engine = AccessEngine::new(gateway, JsonCodec, EngineConfig::default());
//!
//! let pod = Pod::new(Url::parse("https://alice.pod.example/")?);
//! let system = engine.detect(&session, &pod).await?;
//! let inventory = engine.list_tree(&session, &pod, None).await?;
//!
//! let targets = inventory.entries.iter().map(|entry| entry.url.clone()).collect();
//! let delta = PermissionDelta::grant(
//!     WebId::new("https://bob.pod.example/profile/card#me").into(),
//!     AccessModes::READ,
//! );
//! let batch = engine.apply_change(&session, &pod, system, targets, &delta).await?;
//! for failure in batch.failures() {
//!     println!("{} failed: {}", failure.resource_url, failure.reason);
//! }
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

mod agent;
pub use agent::*;

mod permission;
pub use permission::*;

mod pod;
pub use pod::*;

mod policy;
pub use policy::*;

mod codec;
pub use codec::*;

mod config;
pub use config::*;

mod session;
pub use session::*;

mod remote;
pub use remote::*;

mod aggregate;
pub use aggregate::*;

mod walker;
mod detector;
pub use detector::PolicySystemCache;

mod resolver;
mod mutator;

mod engine;
pub use engine::*;

#[cfg(any(test, feature = "helpers"))]
mod helpers;
#[cfg(any(test, feature = "helpers"))]
pub use helpers::*;
