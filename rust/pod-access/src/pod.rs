//! Pods, their resources, and the descriptors produced by walking them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{AccessFailure, AccessModes, ContainerMember, EngineConfig, FailureReason, WebId};

/// A pod, identified by its root container URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pod {
    root: Url,
}

impl Pod {
    /// Create a pod handle. The root is normalized to end with `/`.
    pub fn new(mut root: Url) -> Self {
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        root.set_query(None);
        root.set_fragment(None);
        Self { root }
    }

    /// The root container URL.
    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Resolve a path relative to the pod root.
    ///
    /// Returns `None` if the path cannot be joined or escapes the pod.
    pub fn locate(&self, sub_path: &str) -> Option<Url> {
        self.root
            .join(sub_path.trim_start_matches('/'))
            .ok()
            .filter(|url| self.contains(url))
    }

    /// The application data root designated by `config`.
    pub fn data_root(&self, config: &EngineConfig) -> Option<Url> {
        self.locate(&config.data_root).map(as_container)
    }

    /// Whether `url` lies within this pod (the root itself included).
    pub fn contains(&self, url: &Url) -> bool {
        url.as_str().starts_with(self.root.as_str())
    }

    /// The containers enclosing `url`, nearest first, up to and including
    /// the pod root. Empty for the root itself and for URLs outside the pod.
    pub fn ancestors(&self, url: &Url) -> Vec<Url> {
        let mut ancestors = Vec::new();
        if !self.contains(url) {
            return ancestors;
        }

        let mut current = url.clone();
        while current != self.root {
            match parent_container(&current) {
                Some(parent) if self.contains(&parent) => {
                    ancestors.push(parent.clone());
                    current = parent;
                }
                _ => break,
            }
        }
        ancestors
    }
}

/// Whether a URL names a container (its path ends with `/`).
pub fn is_container(url: &Url) -> bool {
    url.path().ends_with('/')
}

/// The container directly enclosing `url`, or `None` for a host root.
pub fn parent_container(url: &Url) -> Option<Url> {
    let path = url.path().trim_end_matches('/');
    if path.is_empty() {
        return None;
    }
    let cut = path.rfind('/')?;

    let mut parent = url.clone();
    parent.set_path(&path[..=cut]);
    parent.set_query(None);
    parent.set_fragment(None);
    Some(parent)
}

/// The last path segment of `url`, without a trailing `/`.
pub fn resource_name(url: &Url) -> String {
    url.path()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn as_container(mut url: Url) -> Url {
    if !is_container(&url) {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// A snapshot of one resource found while walking a pod.
///
/// Identity is the `url`. Each walk produces fresh descriptors; they are
/// never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodEntry {
    /// Where the resource lives
    pub url: Url,
    /// The container that listed it
    pub parent: Option<Url>,
    /// Last path segment
    pub name: String,
    /// Whether the resource is a container
    pub is_container: bool,
    /// Media type, when the pod reports one
    pub media_type: Option<String>,
    /// Last modification time, when the pod reports one
    pub last_modified: Option<DateTime<Utc>>,
    /// Last modifying agent, when the pod reports one
    pub last_modified_by: Option<WebId>,
    /// Size in bytes, when the pod reports one
    pub size_bytes: Option<u64>,
}

impl PodEntry {
    pub(crate) fn from_member(member: ContainerMember, parent: &Url) -> Self {
        let is_container = member.container || is_container(&member.url);
        Self {
            name: resource_name(&member.url),
            parent: Some(parent.clone()),
            is_container,
            media_type: member.media_type,
            last_modified: member.modified,
            last_modified_by: member.modified_by,
            size_bytes: member.size,
            url: member.url,
        }
    }
}

/// The result of walking a pod's containers.
#[derive(Debug, Clone, Default)]
pub struct PodInventory {
    /// Every resource found, each exactly once
    pub entries: Vec<PodEntry>,
    /// Containers that could not be listed; their subtrees are missing from
    /// `entries`
    pub omitted: Vec<AccessFailure>,
}

impl PodInventory {
    /// Whether every container reachable from the walk root was listed.
    pub fn is_complete(&self) -> bool {
        self.omitted.is_empty()
    }
}

/// Whether a resource is a container or a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    /// A container of other resources
    Container,
    /// Any non-container resource
    Document,
}

/// The acting agent's own access to a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSummary {
    /// Access was resolved
    Resolved(AccessModes),
    /// Access could not be resolved
    Unresolved(FailureReason),
}

/// A resource together with the acting agent's access to it, as presented to
/// access-control screens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Where the resource lives
    pub path: Url,
    /// Container or document
    pub resource_type: ResourceType,
    /// What the acting agent may do with it
    pub access: AccessSummary,
}

/// The result of [`AccessEngine::resources`](crate::AccessEngine::resources).
#[derive(Debug, Clone, Default)]
pub struct ResourceListing {
    /// Every resource found, with the acting agent's access
    pub resources: Vec<Resource>,
    /// Containers that could not be listed
    pub omitted: Vec<AccessFailure>,
}
