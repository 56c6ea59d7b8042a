//! An in-memory pod for tests.
//!
//! [`MemoryPod`] keeps resources and policy documents in memory and answers
//! [`GatewayRequest`]s the way a pod server would: `HEAD`/`GET` advertise the
//! policy document with a `Link: <...>; rel="acl"` header, containers list
//! their members as JSON, and policy documents can be read and replaced.
//! Faults can be injected per URL, and every request is counted.
//!
//! The emulator does not enforce the policies it stores; use
//! [`MemoryPod::deny`] to make it refuse an agent.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pod_gateway::{Gateway, GatewayRequest, GatewayResponse, Method, TransportFailure};
use url::Url;

use crate::{
    AccessControlResource, AccessModes, AclAuthorization, AclDocument, AcpPolicy, AgentRef,
    ContainerMember, DocumentCodec, JsonCodec, Pod, PolicyDocument, PolicySystem, WebId,
    parent_container,
};

const JSON: &str = "application/json";

#[derive(Debug, Clone)]
struct StoredResource {
    body: Vec<u8>,
    media_type: Option<String>,
    modified: DateTime<Utc>,
    modified_by: Option<WebId>,
}

#[derive(Debug, Default)]
struct PodState {
    resources: BTreeMap<Url, StoredResource>,
    policies: BTreeMap<Url, Vec<u8>>,
    denied: HashSet<(WebId, Url)>,
    forced: HashMap<Url, VecDeque<u16>>,
    unreachable: HashMap<Url, usize>,
    latency: Duration,
    write_budget: Option<usize>,
    requests: usize,
    written: Vec<Url>,
    in_flight: usize,
    peak_in_flight: usize,
}

/// An in-memory pod using one policy system.
///
/// Clones share state, so a test can keep a handle for inspection while the
/// engine talks to a [`MemoryGateway`] obtained from [`MemoryPod::connect`].
#[derive(Debug, Clone)]
pub struct MemoryPod {
    root: Url,
    system: PolicySystem,
    state: Arc<Mutex<PodState>>,
}

impl MemoryPod {
    /// Create a pod whose root grants `owner` every mode, on the root and on
    /// everything below it.
    pub fn new(root: Url, system: PolicySystem, owner: WebId) -> Self {
        let root = Pod::new(root).root().clone();
        let pod = Self {
            root: root.clone(),
            system,
            state: Arc::new(Mutex::new(PodState::default())),
        };
        pod.state.lock().resources.insert(
            root,
            StoredResource {
                body: Vec::new(),
                media_type: None,
                modified: Utc::now(),
                modified_by: None,
            },
        );

        let owner = AgentRef::from(owner);
        let document = match system {
            PolicySystem::Wac => PolicyDocument::Wac(AclDocument::new(vec![
                AclAuthorization::access_to("#owner", vec![owner], AccessModes::ALL).inherited(),
            ])),
            PolicySystem::Acp => PolicyDocument::Acp(AccessControlResource {
                access_control: vec![AcpPolicy::new("#owner", vec![owner.clone()], AccessModes::ALL)],
                member_access_control: vec![AcpPolicy::new(
                    "#owner-members",
                    vec![owner],
                    AccessModes::ALL,
                )],
            }),
        };
        if let Ok(url) = pod.policy_url("") {
            pod.store_policy(url, &document);
        }
        pod
    }

    /// The pod handle to pass to the engine.
    pub fn pod(&self) -> Pod {
        Pod::new(self.root.clone())
    }

    /// The policy system this pod uses.
    pub fn system(&self) -> PolicySystem {
        self.system
    }

    /// A gateway that acts as `agent`.
    pub fn connect(&self, agent: WebId) -> MemoryGateway {
        MemoryGateway {
            pod: self.clone(),
            agent,
        }
    }

    /// The URL of `path`, relative to the pod root.
    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.root.join(path.trim_start_matches('/'))?)
    }

    /// The URL of the policy document of the resource at `path`.
    pub fn policy_url(&self, path: &str) -> Result<Url> {
        let resource = self.url(path)?;
        self.system
            .conventional_policy_url(&resource)
            .ok_or_else(|| anyhow!("No policy location for {resource}"))
    }

    /// Store a document at `path`, creating missing containers on the way.
    /// Paths ending in `/` create containers.
    pub fn insert(&self, path: &str, body: impl Into<Vec<u8>>, media_type: &str) -> Result<Url> {
        let url = self.url(path)?;
        let mut state = self.state.lock();

        let mut parent = parent_container(&url);
        while let Some(container) = parent {
            if !container.as_str().starts_with(self.root.as_str()) {
                break;
            }
            state
                .resources
                .entry(container.clone())
                .or_insert_with(|| StoredResource {
                    body: Vec::new(),
                    media_type: None,
                    modified: Utc::now(),
                    modified_by: None,
                });
            parent = parent_container(&container);
        }

        let is_container = url.path().ends_with('/');
        state.resources.insert(
            url.clone(),
            StoredResource {
                body: if is_container { Vec::new() } else { body.into() },
                media_type: (!is_container).then(|| media_type.to_string()),
                modified: Utc::now(),
                modified_by: None,
            },
        );
        Ok(url)
    }

    /// Create a container at `path` (and any missing parents).
    pub fn insert_container(&self, path: &str) -> Result<Url> {
        let path = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        self.insert(&path, Vec::new(), JSON)
    }

    /// Replace the policy document of the resource at `path`.
    pub fn set_policy(&self, path: &str, document: impl Into<PolicyDocument>) -> Result<()> {
        let url = self.policy_url(path)?;
        self.store_policy(url, &document.into());
        Ok(())
    }

    /// Store raw bytes as the policy document of the resource at `path`.
    pub fn set_raw_policy(&self, path: &str, bytes: impl Into<Vec<u8>>) -> Result<()> {
        let url = self.policy_url(path)?;
        self.state.lock().policies.insert(url, bytes.into());
        Ok(())
    }

    /// Remove the policy document of the resource at `path`.
    pub fn remove_policy(&self, path: &str) -> Result<()> {
        let url = self.policy_url(path)?;
        self.state.lock().policies.remove(&url);
        Ok(())
    }

    /// The current policy document of the resource at `path`.
    pub fn policy(&self, path: &str) -> Result<Option<PolicyDocument>> {
        let url = self.policy_url(path)?;
        let bytes = self.state.lock().policies.get(&url).cloned();
        bytes
            .map(|bytes| JsonCodec.parse_policy(&bytes, Some(JSON)))
            .transpose()
            .map_err(|error| anyhow!("Stored policy is not readable: {error}"))
    }

    /// Refuse every request `agent` makes for the resource at `path` or its
    /// policy document.
    pub fn deny(&self, agent: &WebId, path: &str) -> Result<()> {
        let url = self.url(path)?;
        self.state.lock().denied.insert((agent.clone(), url));
        Ok(())
    }

    /// Answer the next requests for `url` with `statuses`, one per request,
    /// before serving it normally again.
    pub fn fail_next(&self, url: &Url, statuses: impl IntoIterator<Item = u16>) {
        self.state
            .lock()
            .forced
            .entry(url.clone())
            .or_default()
            .extend(statuses);
    }

    /// Fail the next `times` requests for `url` without any response.
    pub fn drop_next(&self, url: &Url, times: usize) {
        *self.state.lock().unreachable.entry(url.clone()).or_default() += times;
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Let only `writes` more policy writes through; any further write hangs
    /// without being applied.
    pub fn limit_writes(&self, writes: usize) {
        self.state.lock().write_budget = Some(writes);
    }

    /// Number of requests received.
    pub fn requests(&self) -> usize {
        self.state.lock().requests
    }

    /// Number of policy documents written.
    pub fn writes(&self) -> usize {
        self.state.lock().written.len()
    }

    /// Policy documents written, in order.
    pub fn written(&self) -> Vec<Url> {
        self.state.lock().written.clone()
    }

    /// The largest number of requests that were ever in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.state.lock().peak_in_flight
    }

    fn store_policy(&self, url: Url, document: &PolicyDocument) {
        if let Ok(bytes) = JsonCodec.serialize_policy(document) {
            self.state.lock().policies.insert(url, bytes);
        }
    }

    /// The resource a policy URL belongs to, if `url` is a policy URL.
    fn policy_owner(&self, url: &Url) -> Option<Url> {
        match self.system {
            PolicySystem::Wac => url
                .as_str()
                .strip_suffix(".acl")
                .and_then(|owner| Url::parse(owner).ok()),
            PolicySystem::Acp if url.query() == Some("ext=acr") => {
                let mut owner = url.clone();
                owner.set_query(None);
                Some(owner)
            }
            PolicySystem::Acp => None,
        }
    }

    fn listing(&self, state: &PodState, container: &Url) -> Vec<ContainerMember> {
        state
            .resources
            .iter()
            .filter(|(url, _)| parent_container(url).as_ref() == Some(container))
            .map(|(url, resource)| ContainerMember {
                url: url.clone(),
                container: url.path().ends_with('/'),
                media_type: resource.media_type.clone(),
                modified: Some(resource.modified),
                modified_by: resource.modified_by.clone(),
                size: (!url.path().ends_with('/')).then_some(resource.body.len() as u64),
            })
            .collect()
    }

    fn respond(&self, agent: &WebId, request: &GatewayRequest) -> Reply {
        let url = &request.url;
        let mut state = self.state.lock();

        if let Some(status) = state.forced.get_mut(url).and_then(|queue| queue.pop_front()) {
            return Reply::Ready(GatewayResponse::new(url.clone(), status));
        }
        if let Some(remaining) = state.unreachable.get_mut(url).filter(|count| **count > 0) {
            *remaining -= 1;
            return Reply::Unreachable;
        }

        let owner = self.policy_owner(url);
        let subject = owner.clone().unwrap_or_else(|| url.clone());
        if state.denied.contains(&(agent.clone(), subject)) {
            return Reply::Ready(GatewayResponse::new(url.clone(), 403));
        }

        match owner {
            Some(owner) => self.respond_policy(&mut state, request, &owner),
            None => Reply::Ready(self.respond_resource(&mut state, agent, request)),
        }
    }

    fn respond_policy(&self, state: &mut PodState, request: &GatewayRequest, owner: &Url) -> Reply {
        let url = &request.url;
        if !state.resources.contains_key(owner) {
            return Reply::Ready(GatewayResponse::new(url.clone(), 404));
        }

        match request.method {
            Method::Get | Method::Head => match state.policies.get(url) {
                Some(bytes) => {
                    let response =
                        GatewayResponse::new(url.clone(), 200).with_header("content-type", JSON);
                    Reply::Ready(if request.method == Method::Get {
                        response.with_body(bytes.clone())
                    } else {
                        response
                    })
                }
                None => Reply::Ready(GatewayResponse::new(url.clone(), 404)),
            },
            Method::Put => {
                let body = request.body.clone().unwrap_or_default();
                let readable = JsonCodec
                    .parse_policy(&body, request.content_type.as_deref())
                    .is_ok_and(|document| document.system() == self.system);
                if !readable {
                    return Reply::Ready(GatewayResponse::new(url.clone(), 422));
                }

                match state.write_budget {
                    Some(0) => return Reply::Stall,
                    Some(ref mut budget) => *budget -= 1,
                    None => {}
                }

                let existed = state.policies.insert(url.clone(), body).is_some();
                state.written.push(url.clone());
                Reply::Ready(GatewayResponse::new(url.clone(), if existed { 205 } else { 201 }))
            }
            Method::Delete => {
                state.policies.remove(url);
                Reply::Ready(GatewayResponse::new(url.clone(), 205))
            }
        }
    }

    fn respond_resource(
        &self,
        state: &mut PodState,
        agent: &WebId,
        request: &GatewayRequest,
    ) -> GatewayResponse {
        let url = &request.url;

        if request.method == Method::Put {
            let is_new = !state.resources.contains_key(url);
            state.resources.insert(
                url.clone(),
                StoredResource {
                    body: request.body.clone().unwrap_or_default(),
                    media_type: request.content_type.clone(),
                    modified: Utc::now(),
                    modified_by: Some(agent.clone()),
                },
            );
            return GatewayResponse::new(url.clone(), if is_new { 201 } else { 205 });
        }

        let Some(resource) = state.resources.get(url).cloned() else {
            return GatewayResponse::new(url.clone(), 404);
        };
        if request.method == Method::Delete {
            state.resources.remove(url);
            return GatewayResponse::new(url.clone(), 205);
        }

        let mut response = GatewayResponse::new(url.clone(), 200);
        if let Some(policy) = self.system.conventional_policy_url(url) {
            response = response.with_header("link", format!("<{policy}>; rel=\"acl\""));
        }

        let (body, media_type) = if url.path().ends_with('/') {
            let listing = self.listing(state, url);
            (
                JsonCodec.serialize_listing(&listing).unwrap_or_default(),
                Some(JSON.to_string()),
            )
        } else {
            (resource.body, resource.media_type)
        };
        if let Some(media_type) = media_type {
            response = response.with_header("content-type", media_type);
        }
        if request.method == Method::Get {
            response = response.with_body(body);
        }
        response
    }
}

enum Reply {
    Ready(GatewayResponse),
    Unreachable,
    Stall,
}

struct InFlight(Arc<Mutex<PodState>>);

impl InFlight {
    fn enter(state: &Arc<Mutex<PodState>>) -> Self {
        let mut guard = state.lock();
        guard.requests += 1;
        guard.in_flight += 1;
        guard.peak_in_flight = guard.peak_in_flight.max(guard.in_flight);
        Self(state.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.lock().in_flight -= 1;
    }
}

/// A connection to a [`MemoryPod`] acting as one agent.
#[derive(Debug, Clone)]
pub struct MemoryGateway {
    pod: MemoryPod,
    agent: WebId,
}

impl MemoryGateway {
    /// The pod behind this gateway.
    pub fn pod(&self) -> &MemoryPod {
        &self.pod
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn fetch(&self, request: GatewayRequest) -> Result<GatewayResponse, TransportFailure> {
        let _in_flight = InFlight::enter(&self.pod.state);

        let latency = self.pod.state.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match self.pod.respond(&self.agent, &request) {
            Reply::Ready(response) => Ok(response),
            Reply::Unreachable => Err(TransportFailure::Connection(format!(
                "{} is unreachable",
                request.url
            ))),
            Reply::Stall => std::future::pending().await,
        }
    }
}
