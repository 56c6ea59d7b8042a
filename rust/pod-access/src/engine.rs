use std::sync::Arc;

use futures_util::future::join_all;
use pod_gateway::Gateway;
use url::Url;

use crate::{
    AccessError, AccessFailureBatch, AccessSummary, AgentRef, DocumentCodec, EngineConfig,
    FailureReason, PermissionDelta, PermissionSet, Pod, PodInventory, PolicySystem,
    PolicySystemCache, Remote, Resource, ResourceListing, ResourceType, SessionContext,
    detector::Detector, mutator::Mutator, resolver::Resolver, walker::Walker,
};

/// The access-control reconciliation engine.
///
/// One engine serves any number of pods and sessions. Clones share the
/// concurrency cap and the policy system cache.
#[derive(Clone)]
pub struct AccessEngine {
    config: Arc<EngineConfig>,
    systems: Arc<PolicySystemCache>,
    walker: Walker,
    detector: Detector,
    resolver: Resolver,
    mutator: Mutator,
}

impl std::fmt::Debug for AccessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessEngine")
            .field("config", &self.config)
            .field("systems", &self.systems)
            .finish()
    }
}

impl AccessEngine {
    /// Create an engine that reaches pods through `gateway` and reads their
    /// documents with `codec`.
    pub fn new(
        gateway: impl Gateway + 'static,
        codec: impl DocumentCodec + 'static,
        config: EngineConfig,
    ) -> Self {
        let config = Arc::new(config);
        let codec: Arc<dyn DocumentCodec> = Arc::new(codec);
        let remote = Remote::new(gateway, config.clone());
        let systems = Arc::new(PolicySystemCache::default());
        let resolver = Resolver::new(remote.clone(), codec.clone());

        Self {
            walker: Walker::new(remote.clone(), codec),
            detector: Detector::new(remote, systems.clone()),
            mutator: Mutator::new(resolver.clone()),
            resolver,
            systems,
            config,
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The policy systems detected so far.
    pub fn systems(&self) -> &PolicySystemCache {
        &self.systems
    }

    /// Walk the containers below `root_sub_path` (the pod's data root by
    /// default) and return every resource found.
    ///
    /// Containers that cannot be listed are reported in
    /// [`PodInventory::omitted`]; only a failure to list the walk root itself
    /// is an error.
    #[tracing::instrument(skip_all, fields(pod = %pod.root(), ?root_sub_path))]
    pub async fn list_tree(
        &self,
        session: &SessionContext,
        pod: &Pod,
        root_sub_path: Option<&str>,
    ) -> Result<PodInventory, AccessError> {
        session.ensure_valid()?;
        let root = match root_sub_path {
            Some(sub_path) => pod.locate(sub_path),
            None => pod.data_root(&self.config),
        }
        .ok_or_else(|| AccessError::NotFound {
            url: pod.root().clone(),
        })?;

        self.walker.walk(session, root).await
    }

    /// The policy system `pod` uses. Detected once, then served from the
    /// cache until [`AccessEngine::forget`] is called.
    #[tracing::instrument(skip_all, fields(pod = %pod.root()))]
    pub async fn detect(
        &self,
        session: &SessionContext,
        pod: &Pod,
    ) -> Result<PolicySystem, AccessError> {
        session.ensure_valid()?;
        self.detector.detect(session, pod).await
    }

    /// The effective access `agent` holds on `resource`.
    #[tracing::instrument(skip_all, fields(%resource, %agent, %system))]
    pub async fn resolve(
        &self,
        session: &SessionContext,
        pod: &Pod,
        system: PolicySystem,
        resource: &Url,
        agent: &AgentRef,
    ) -> Result<PermissionSet, AccessError> {
        session.ensure_valid()?;
        self.resolver
            .resolve(session, pod, system, resource, agent)
            .await
    }

    /// Apply `delta` to each of `targets` independently and account for
    /// every distinct target in the returned batch.
    ///
    /// The acting agent needs `control` on each target. A refusal or failure
    /// on one target never affects another. The call itself fails only with
    /// [`AccessError::Cancelled`]; changes written before the session ended
    /// stay written.
    #[tracing::instrument(skip_all, fields(pod = %pod.root(), %system, targets = targets.len()))]
    pub async fn apply_change(
        &self,
        session: &SessionContext,
        pod: &Pod,
        system: PolicySystem,
        targets: Vec<Url>,
        delta: &PermissionDelta,
    ) -> Result<AccessFailureBatch, AccessError> {
        self.mutator
            .apply(session, pod, system, targets, delta)
            .await
    }

    /// Every resource below `sub_path` with the acting agent's own access
    /// to it, for access-control screens.
    ///
    /// Resources whose access cannot be resolved are still listed, with the
    /// reason in [`AccessSummary::Unresolved`].
    #[tracing::instrument(skip_all, fields(pod = %pod.root(), ?sub_path))]
    pub async fn resources(
        &self,
        session: &SessionContext,
        pod: &Pod,
        sub_path: Option<&str>,
    ) -> Result<ResourceListing, AccessError> {
        let system = self.detect(session, pod).await?;
        let inventory = self.list_tree(session, pod, sub_path).await?;
        let acting = session.agent_ref();

        let resolved = join_all(inventory.entries.iter().map(|entry| {
            self.resolver
                .resolve(session, pod, system, &entry.url, &acting)
        }))
        .await;
        session.ensure_valid()?;

        let mut resources = Vec::with_capacity(resolved.len());
        for (entry, result) in inventory.entries.into_iter().zip(resolved) {
            let access = match result {
                Ok(permissions) => AccessSummary::Resolved(permissions.modes),
                Err(AccessError::Cancelled) => return Err(AccessError::Cancelled),
                Err(error) => {
                    AccessSummary::Unresolved(error.reason().unwrap_or(FailureReason::Transport))
                }
            };
            resources.push(Resource {
                path: entry.url,
                resource_type: if entry.is_container {
                    ResourceType::Container
                } else {
                    ResourceType::Document
                },
                access,
            });
        }

        Ok(ResourceListing {
            resources,
            omitted: inventory.omitted,
        })
    }

    /// Drop what is cached about `pod`, typically when a session ends.
    pub fn forget(&self, pod: &Pod) {
        if let Some(system) = self.systems.forget(pod) {
            tracing::debug!(pod = %pod.root(), %system, "Forgot policy system");
        }
    }
}
