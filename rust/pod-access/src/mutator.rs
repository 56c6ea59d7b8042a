use std::collections::HashSet;

use indexmap::IndexSet;
use pod_gateway::GatewayRequest;
use tokio::{sync::mpsc, task::JoinSet};
use url::Url;

use crate::{
    AccessError, AccessFailureBatch, AccessModes, FailureReason, PermissionDelta, Pod,
    PolicyDocument, PolicySystem, ResourceOutcome, SessionContext, Target, aggregate,
    is_container,
    resolver::{PolicyLocation, Resolver, acl, acr},
};

/// Writes permission changes into policy documents, one task per target.
#[derive(Clone)]
pub(crate) struct Mutator {
    resolver: Resolver,
}

impl Mutator {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }

    /// Apply `delta` to every distinct target independently.
    ///
    /// Targets are changed concurrently; each reports its outcome over a
    /// channel to this task, the only place outcomes are collected. The call
    /// fails only when the session ends before every outcome is in.
    pub async fn apply(
        &self,
        session: &SessionContext,
        pod: &Pod,
        system: PolicySystem,
        targets: Vec<Url>,
        delta: &PermissionDelta,
    ) -> Result<AccessFailureBatch, AccessError> {
        session.ensure_valid()?;

        let targets: IndexSet<Url> = targets.into_iter().collect();
        let (sender, mut receiver) = mpsc::channel::<ResourceOutcome>(targets.len().max(1));
        let mut tasks = JoinSet::new();

        for (index, target) in targets.iter().cloned().enumerate() {
            let mutator = self.clone();
            let session = session.clone();
            let pod = pod.clone();
            let delta = delta.clone();
            let sender = sender.clone();

            tasks.spawn(async move {
                let result = match mutator
                    .change_one(&session, &pod, system, &target, &delta)
                    .await
                {
                    Ok(()) => Ok(()),
                    Err(AccessError::Cancelled) => return,
                    Err(error) => {
                        tracing::debug!(%target, "Change not applied: {error}");
                        Err(error.reason().unwrap_or(FailureReason::Transport))
                    }
                };
                let _ = sender
                    .send(ResourceOutcome {
                        index,
                        resource_url: target,
                        result,
                    })
                    .await;
            });
        }
        drop(sender);

        let mut outcomes = Vec::with_capacity(targets.len());
        loop {
            tokio::select! {
                biased;
                _ = session.cancelled() => return Err(AccessError::Cancelled),
                outcome = receiver.recv() => match outcome {
                    Some(outcome) => outcomes.push(outcome),
                    None => break,
                },
            }
        }
        session.ensure_valid()?;

        // A task that died without reporting still has to be accounted for.
        let reported: HashSet<usize> = outcomes.iter().map(|outcome| outcome.index).collect();
        for (index, target) in targets.iter().enumerate() {
            if !reported.contains(&index) {
                tracing::error!(%target, "Change task ended without an outcome");
                outcomes.push(ResourceOutcome {
                    index,
                    resource_url: target.clone(),
                    result: Err(FailureReason::Transport),
                });
            }
        }

        let batch = aggregate(session.agent(), outcomes);
        tracing::info!(
            agent = %delta.agent,
            succeeded = batch.succeeded().len(),
            failed = batch.failures().len(),
            "Permission change applied"
        );
        Ok(batch)
    }

    async fn change_one(
        &self,
        session: &SessionContext,
        pod: &Pod,
        system: PolicySystem,
        target: &Url,
        delta: &PermissionDelta,
    ) -> Result<(), AccessError> {
        let resolver = &self.resolver;
        let acting = session.agent_ref();
        let agent = &delta.agent;
        let PolicyLocation { url, document } = resolver.policy_of(session, system, target).await?;

        let updated = match system {
            PolicySystem::Wac => {
                let own = document.map(|document| acl(&url, document)).transpose()?;

                let acting_modes = resolver
                    .wac_access(session, pod, target, own.as_ref(), &acting)
                    .await?;
                ensure_control(target, acting_modes)?;

                let current = if *agent == acting {
                    acting_modes
                } else {
                    resolver
                        .wac_access(session, pod, target, own.as_ref(), agent)
                        .await?
                };

                let mut document = match own {
                    Some(document) => document,
                    None => {
                        resolver
                            .seed_acl(session, pod, target, is_container(target))
                            .await?
                    }
                };

                let modes = delta.apply_to(document.explicit_access(agent).unwrap_or(current));
                document.set_agent_access(agent, modes, false);

                if modes.is_empty() && document.direct_access(agent).is_none() {
                    let inherited = resolver.inherited_wac(session, pod, target, agent).await?;
                    if !inherited.is_empty() {
                        document.set_agent_access(agent, AccessModes::NONE, true);
                    }
                }
                PolicyDocument::Wac(document)
            }
            PolicySystem::Acp => {
                let Some(document) = document else {
                    return Err(AccessError::NotFound { url });
                };
                let mut acr = acr(&url, document)?;

                // Member policies only add bits, so own control settles it.
                if !acr.direct_access(&acting).control {
                    let acting_modes = resolver
                        .acp_access(session, pod, target, &acr, &acting)
                        .await?;
                    ensure_control(target, acting_modes)?;
                }

                let modes = delta.apply_to(acr.explicit_access(agent).unwrap_or_default());
                acr.set_agent_access(agent, modes);
                PolicyDocument::Acp(acr)
            }
        };

        self.write(session, &url, &updated).await?;
        tracing::debug!(%target, policy = %url, %agent, "Policy document written");
        Ok(())
    }

    async fn write(
        &self,
        session: &SessionContext,
        url: &Url,
        document: &PolicyDocument,
    ) -> Result<(), AccessError> {
        let codec = self.resolver.codec();
        let body = codec
            .serialize_policy(document)
            .map_err(|error| AccessError::malformed(url, error))?;

        self.resolver
            .remote()
            .send(
                session,
                GatewayRequest::put(url.clone(), body, codec.media_type()),
                Target::Policy,
            )
            .await?;
        Ok(())
    }
}

fn ensure_control(target: &Url, modes: AccessModes) -> Result<(), AccessError> {
    if modes.control {
        Ok(())
    } else {
        Err(AccessError::NotAuthorized {
            url: target.clone(),
        })
    }
}
