use std::sync::Arc;

use futures_util::future::try_join_all;
use pod_gateway::GatewayRequest;
use url::Url;

use crate::{
    AccessControlResource, AccessError, AccessModes, AclDocument, AgentRef, DocumentCodec,
    PermissionSet, Pod, PolicyDocument, PolicySystem, Remote, SessionContext, Target,
};

/// A resource's policy document and where it lives.
#[derive(Debug, Clone)]
pub(crate) struct PolicyLocation {
    pub url: Url,
    pub document: Option<PolicyDocument>,
}

/// Computes effective permissions from policy documents.
#[derive(Clone)]
pub(crate) struct Resolver {
    remote: Remote,
    codec: Arc<dyn DocumentCodec>,
}

impl Resolver {
    pub fn new(remote: Remote, codec: Arc<dyn DocumentCodec>) -> Self {
        Self { remote, codec }
    }

    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    pub fn codec(&self) -> &dyn DocumentCodec {
        self.codec.as_ref()
    }

    /// The effective access `agent` holds on `resource`.
    pub async fn resolve(
        &self,
        session: &SessionContext,
        pod: &Pod,
        system: PolicySystem,
        resource: &Url,
        agent: &AgentRef,
    ) -> Result<PermissionSet, AccessError> {
        let modes = match system {
            PolicySystem::Wac => {
                let PolicyLocation { url, document } =
                    self.policy_of(session, system, resource).await?;
                let own = document.map(|document| acl(&url, document)).transpose()?;
                self.wac_access(session, pod, resource, own.as_ref(), agent)
                    .await?
            }
            PolicySystem::Acp => {
                let PolicyLocation { url, document } =
                    self.policy_of(session, system, resource).await?;
                let Some(document) = document else {
                    return Err(AccessError::NotFound { url });
                };
                let acr = acr(&url, document)?;
                self.acp_access(session, pod, resource, &acr, agent).await?
            }
        };

        tracing::debug!(%resource, %agent, %system, ?modes, "Resolved access");
        Ok(PermissionSet {
            agent: agent.clone(),
            modes,
        })
    }

    /// WAC access given the resource's own document (if any): the own
    /// document when it has a rule for the agent, otherwise the nearest
    /// ancestor that passes one down.
    pub async fn wac_access(
        &self,
        session: &SessionContext,
        pod: &Pod,
        resource: &Url,
        own: Option<&AclDocument>,
        agent: &AgentRef,
    ) -> Result<AccessModes, AccessError> {
        if let Some(modes) = own.and_then(|document| document.direct_access(agent)) {
            return Ok(modes);
        }
        self.inherited_wac(session, pod, resource, agent).await
    }

    /// What the nearest ancestor with an applicable default rule passes down
    /// to `agent`; nothing when no ancestor has one.
    pub async fn inherited_wac(
        &self,
        session: &SessionContext,
        pod: &Pod,
        resource: &Url,
        agent: &AgentRef,
    ) -> Result<AccessModes, AccessError> {
        for ancestor in pod.ancestors(resource) {
            let Some(document) = self.ancestor_acl(session, &ancestor).await? else {
                continue;
            };
            if let Some(modes) = document.inherited_access(agent) {
                tracing::debug!(%resource, %ancestor, %agent, "Access inherited");
                return Ok(modes);
            }
        }
        Ok(AccessModes::NONE)
    }

    /// A fresh ACL for `resource`, carrying over the default rules of its
    /// nearest ancestor that has any.
    pub async fn seed_acl(
        &self,
        session: &SessionContext,
        pod: &Pod,
        resource: &Url,
        is_container: bool,
    ) -> Result<AclDocument, AccessError> {
        for ancestor in pod.ancestors(resource) {
            let Some(document) = self.ancestor_acl(session, &ancestor).await? else {
                continue;
            };
            let seeded = AclDocument::seeded_from([&document], is_container);
            if !seeded.authorizations.is_empty() {
                return Ok(seeded);
            }
        }
        Ok(AclDocument::default())
    }

    /// ACP access given the resource's own ACR: its own policies together
    /// with the member policies of every ancestor.
    pub async fn acp_access(
        &self,
        session: &SessionContext,
        pod: &Pod,
        resource: &Url,
        own: &AccessControlResource,
        agent: &AgentRef,
    ) -> Result<AccessModes, AccessError> {
        let inherited = try_join_all(
            pod.ancestors(resource)
                .into_iter()
                .map(|ancestor| self.ancestor_acr(session, ancestor)),
        )
        .await?;

        Ok(inherited
            .iter()
            .flatten()
            .fold(own.direct_access(agent), |modes, acr| {
                modes.union(acr.member_access(agent))
            }))
    }

    /// Locate and read the policy document of `resource`.
    pub async fn policy_of(
        &self,
        session: &SessionContext,
        system: PolicySystem,
        resource: &Url,
    ) -> Result<PolicyLocation, AccessError> {
        let url = self.locate(session, system, resource).await?;
        let document = self.fetch_policy(session, system, &url).await?;
        Ok(PolicyLocation { url, document })
    }

    /// Where the policy document of `resource` lives, as advertised by the
    /// pod or by convention.
    pub async fn locate(
        &self,
        session: &SessionContext,
        system: PolicySystem,
        resource: &Url,
    ) -> Result<Url, AccessError> {
        let head = self
            .remote
            .send(session, GatewayRequest::head(resource.clone()), Target::Resource)
            .await?;

        match head.link("acl") {
            Some(url) => Ok(url),
            None => system.conventional_policy_url(resource).ok_or_else(|| {
                AccessError::transport(resource, "cannot derive a policy location", false)
            }),
        }
    }

    /// Read and decode the policy document at `url`; `None` when there is
    /// none.
    pub async fn fetch_policy(
        &self,
        session: &SessionContext,
        system: PolicySystem,
        url: &Url,
    ) -> Result<Option<PolicyDocument>, AccessError> {
        let Some(response) = self
            .remote
            .send_optional(session, GatewayRequest::get(url.clone()), Target::Policy)
            .await?
        else {
            return Ok(None);
        };

        let document = self
            .codec
            .parse_policy(&response.body, response.content_type())
            .map_err(|error| {
                tracing::warn!(%url, "Undecodable policy document: {error}");
                AccessError::malformed(url, error)
            })?;

        if document.system() != system {
            tracing::warn!(%url, expected = %system, found = %document.system(), "Policy document uses the wrong system");
            return Err(AccessError::malformed(
                url,
                format!("expected a {system} document, found {}", document.system()),
            ));
        }
        Ok(Some(document))
    }

    /// An ancestor's ACL, or `None` when it has none or the acting agent
    /// may not read it. Access on a resource never depends on being able
    /// to read the policies above it.
    async fn ancestor_acl(
        &self,
        session: &SessionContext,
        ancestor: &Url,
    ) -> Result<Option<AclDocument>, AccessError> {
        match self.policy_of(session, PolicySystem::Wac, ancestor).await {
            Ok(location) => location
                .document
                .map(|document| acl(&location.url, document))
                .transpose(),
            Err(AccessError::NotFound { .. }) => Ok(None),
            Err(AccessError::NotAuthorized { url }) => {
                tracing::debug!(%url, "Ancestor policy not readable, skipping it");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn ancestor_acr(
        &self,
        session: &SessionContext,
        ancestor: Url,
    ) -> Result<Option<AccessControlResource>, AccessError> {
        match self.policy_of(session, PolicySystem::Acp, &ancestor).await {
            Ok(location) => location
                .document
                .map(|document| acr(&location.url, document))
                .transpose(),
            Err(AccessError::NotFound { .. }) => Ok(None),
            Err(AccessError::NotAuthorized { url }) => {
                tracing::debug!(%url, "Ancestor policy not readable, skipping it");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

pub(crate) fn acl(url: &Url, document: PolicyDocument) -> Result<AclDocument, AccessError> {
    match document {
        PolicyDocument::Wac(acl) => Ok(acl),
        PolicyDocument::Acp(_) => Err(AccessError::malformed(url, "expected an ACL document")),
    }
}

pub(crate) fn acr(url: &Url, document: PolicyDocument) -> Result<AccessControlResource, AccessError> {
    match document {
        PolicyDocument::Acp(acr) => Ok(acr),
        PolicyDocument::Wac(_) => Err(AccessError::malformed(
            url,
            "expected an access control resource",
        )),
    }
}
