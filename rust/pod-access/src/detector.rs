use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use pod_gateway::GatewayRequest;
use url::Url;

use crate::{AccessError, Pod, PolicySystem, Remote, SessionContext, Target};

/// The policy system of every pod detected so far, keyed by pod root.
///
/// Entries are written once: when two detections of the same pod race, the
/// first one to finish is kept and returned to both.
#[derive(Debug, Default)]
pub struct PolicySystemCache {
    systems: RwLock<HashMap<Url, PolicySystem>>,
}

impl PolicySystemCache {
    /// The cached system of `pod`, if it was detected already.
    pub fn get(&self, pod: &Pod) -> Option<PolicySystem> {
        self.systems.read().get(pod.root()).copied()
    }

    /// Record `system` for `pod` unless another value got there first, and
    /// return the value that is now cached.
    pub fn settle(&self, pod: &Pod, system: PolicySystem) -> PolicySystem {
        *self
            .systems
            .write()
            .entry(pod.root().clone())
            .or_insert(system)
    }

    /// Drop the entry for `pod`, so the next detection probes again.
    pub fn forget(&self, pod: &Pod) -> Option<PolicySystem> {
        self.systems.write().remove(pod.root())
    }

    /// Number of pods with a cached system.
    pub fn len(&self) -> usize {
        self.systems.read().len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.systems.read().is_empty()
    }
}

/// Works out which policy system a pod uses by reading its root policy
/// document.
#[derive(Clone)]
pub(crate) struct Detector {
    remote: Remote,
    cache: Arc<PolicySystemCache>,
}

impl Detector {
    pub fn new(remote: Remote, cache: Arc<PolicySystemCache>) -> Self {
        Self { remote, cache }
    }

    pub async fn detect(
        &self,
        session: &SessionContext,
        pod: &Pod,
    ) -> Result<PolicySystem, AccessError> {
        if let Some(system) = self.cache.get(pod) {
            tracing::debug!(pod = %pod.root(), %system, "Policy system cached");
            return Ok(system);
        }

        let system = self
            .probe(session, pod)
            .await
            .map_err(|error| match error {
                AccessError::Cancelled | AccessError::Transport { .. } => error,
                other => AccessError::transport(pod.root(), other, false),
            })?;

        let settled = self.cache.settle(pod, system);
        tracing::debug!(pod = %pod.root(), system = %settled, "Policy system detected");
        Ok(settled)
    }

    async fn probe(&self, session: &SessionContext, pod: &Pod) -> Result<PolicySystem, AccessError> {
        let root = pod.root();
        let head = self
            .remote
            .send(session, GatewayRequest::head(root.clone()), Target::Resource)
            .await?;

        let policy_url = match head.link("acl") {
            Some(url) => url,
            None => PolicySystem::Wac
                .conventional_policy_url(root)
                .ok_or_else(|| AccessError::transport(root, "no policy resource", false))?,
        };

        let document = self
            .remote
            .send(session, GatewayRequest::get(policy_url), Target::Policy)
            .await?;

        Ok(PolicySystem::classify(&document.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_keeps_the_first_settled_value() {
        let cache = PolicySystemCache::default();
        let pod = Pod::new(Url::parse("https://pod.example/").unwrap());

        assert_eq!(cache.settle(&pod, PolicySystem::Acp), PolicySystem::Acp);
        assert_eq!(cache.settle(&pod, PolicySystem::Wac), PolicySystem::Acp);
        assert_eq!(cache.get(&pod), Some(PolicySystem::Acp));

        assert_eq!(cache.forget(&pod), Some(PolicySystem::Acp));
        assert!(cache.is_empty());
    }
}
