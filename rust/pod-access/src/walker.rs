use std::{collections::HashSet, sync::Arc};

use indexmap::IndexSet;
use pod_gateway::GatewayRequest;
use tokio::task::JoinSet;
use url::Url;

use crate::{
    AccessError, AccessFailure, ContainerMember, DocumentCodec, PodEntry, PodInventory, Remote,
    SessionContext, Target, as_container,
};

/// Lists a pod's containers recursively.
///
/// Listings run concurrently; the engine's [`Remote`] caps how many are in
/// flight at once.
#[derive(Clone)]
pub(crate) struct Walker {
    remote: Remote,
    codec: Arc<dyn DocumentCodec>,
}

impl Walker {
    pub fn new(remote: Remote, codec: Arc<dyn DocumentCodec>) -> Self {
        Self { remote, codec }
    }

    /// Every resource below `root`, each once.
    ///
    /// A failure to list `root` itself is returned as the error, either
    /// `NotFound` or `Transport` (a refusal is reported as the latter).
    /// Failures on nested containers are recorded in
    /// [`PodInventory::omitted`] and the walk carries on without their
    /// subtrees.
    pub async fn walk(
        &self,
        session: &SessionContext,
        root: Url,
    ) -> Result<PodInventory, AccessError> {
        let root = as_container(root);
        let members = self
            .list(session, &root)
            .await
            .map_err(|error| match error {
                AccessError::Cancelled
                | AccessError::NotFound { .. }
                | AccessError::Transport { .. } => error,
                other => AccessError::transport(&root, other, false),
            })?;

        let mut inventory = PodInventory::default();
        let mut seen = HashSet::from([root.clone()]);
        let mut pending = IndexSet::new();
        let mut tasks = JoinSet::new();

        self.record(
            &root,
            &root,
            members,
            &mut seen,
            &mut inventory,
            &mut pending,
            &mut tasks,
            session,
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = session.cancelled() => return Err(AccessError::Cancelled),
                next = tasks.join_next() => next,
            };
            let Some(joined) = next else {
                break;
            };

            let (container, result) = match joined {
                Ok(listed) => listed,
                Err(error) => {
                    tracing::error!("Container listing task failed: {error}");
                    continue;
                }
            };
            pending.shift_remove(&container);

            match result {
                Ok(members) => self.record(
                    &root,
                    &container,
                    members,
                    &mut seen,
                    &mut inventory,
                    &mut pending,
                    &mut tasks,
                    session,
                ),
                Err(AccessError::Cancelled) => return Err(AccessError::Cancelled),
                Err(error) => {
                    tracing::warn!(%container, "Omitting subtree: {error}");
                    inventory.omitted.push(AccessFailure {
                        resource_url: container,
                        acting_agent: session.agent().clone(),
                        reason: error.reason().unwrap_or(crate::FailureReason::Transport),
                    });
                }
            }
        }

        // Containers whose listing task died never reported back.
        for container in pending {
            inventory.omitted.push(AccessFailure {
                resource_url: container,
                acting_agent: session.agent().clone(),
                reason: crate::FailureReason::Transport,
            });
        }

        session.ensure_valid()?;
        tracing::debug!(
            %root,
            entries = inventory.entries.len(),
            omitted = inventory.omitted.len(),
            "Walk completed"
        );
        Ok(inventory)
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        root: &Url,
        parent: &Url,
        members: Vec<ContainerMember>,
        seen: &mut HashSet<Url>,
        inventory: &mut PodInventory,
        pending: &mut IndexSet<Url>,
        tasks: &mut JoinSet<(Url, Result<Vec<ContainerMember>, AccessError>)>,
        session: &SessionContext,
    ) {
        for member in members {
            if !member.url.as_str().starts_with(root.as_str()) {
                tracing::debug!(%parent, url = %member.url, "Skipping member outside the walk");
                continue;
            }
            if !seen.insert(member.url.clone()) {
                continue;
            }

            let entry = PodEntry::from_member(member, parent);
            if entry.is_container {
                let container = as_container(entry.url.clone());
                pending.insert(container.clone());

                let walker = self.clone();
                let session = session.clone();
                tasks.spawn(async move {
                    let result = walker.list(&session, &container).await;
                    (container, result)
                });
            }
            inventory.entries.push(entry);
        }
    }

    async fn list(
        &self,
        session: &SessionContext,
        container: &Url,
    ) -> Result<Vec<ContainerMember>, AccessError> {
        let response = self
            .remote
            .send(session, GatewayRequest::get(container.clone()), Target::Resource)
            .await?;

        self.codec
            .parse_listing(&response.body, response.content_type())
            .map_err(|error| AccessError::transport(container, error, false))
    }
}
