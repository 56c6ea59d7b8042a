use serde::{Deserialize, Serialize};

use crate::{AccessModes, AgentRef};

use super::rule_id;

/// One rule of an ACL document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AclAuthorization {
    /// Fragment identifier of the rule within its document
    #[serde(default)]
    pub id: String,
    /// Who the rule is for
    #[serde(default)]
    pub agents: Vec<AgentRef>,
    /// The rule applies to the resource owning the document
    #[serde(default)]
    pub access_to: bool,
    /// The rule is inherited by descendants of the owning container
    #[serde(default)]
    pub default: bool,
    /// What the rule grants
    #[serde(default)]
    pub modes: AccessModes,
}

impl AclAuthorization {
    /// A rule granting `modes` to `agents` on the owning resource.
    pub fn access_to(id: impl Into<String>, agents: Vec<AgentRef>, modes: AccessModes) -> Self {
        Self {
            id: id.into(),
            agents,
            access_to: true,
            default: false,
            modes,
        }
    }

    /// Make the rule inherited by the owning container's descendants as well.
    pub fn inherited(mut self) -> Self {
        self.default = true;
        self
    }

    /// Whether the rule applies to `agent`, directly or through the public
    /// marker.
    pub fn applies_to(&self, agent: &AgentRef) -> bool {
        self.agents.iter().any(|listed| listed.covers(agent))
    }

    /// Whether `agent` is listed by name.
    pub fn names(&self, agent: &AgentRef) -> bool {
        self.agents.contains(agent)
    }
}

/// A Web Access Control document: the rules attached to one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclDocument {
    /// Rules in document order
    #[serde(default)]
    pub authorizations: Vec<AclAuthorization>,
}

impl AclDocument {
    /// Create a document from its rules.
    pub fn new(authorizations: Vec<AclAuthorization>) -> Self {
        Self { authorizations }
    }

    /// Access granted to `agent` on the owning resource, or `None` when no
    /// rule of this document applies to it.
    pub fn direct_access(&self, agent: &AgentRef) -> Option<AccessModes> {
        Self::union_of(
            self.authorizations
                .iter()
                .filter(|rule| rule.access_to && rule.applies_to(agent)),
        )
    }

    /// Access this document passes down to `agent` on descendants, or
    /// `None` when no default rule applies to it.
    pub fn inherited_access(&self, agent: &AgentRef) -> Option<AccessModes> {
        Self::union_of(
            self.authorizations
                .iter()
                .filter(|rule| rule.default && rule.applies_to(agent)),
        )
    }

    /// Access granted on the owning resource by rules naming `agent`
    /// explicitly, or `None` when no such rule exists.
    pub fn explicit_access(&self, agent: &AgentRef) -> Option<AccessModes> {
        Self::union_of(
            self.authorizations
                .iter()
                .filter(|rule| rule.access_to && rule.names(agent)),
        )
    }

    fn union_of<'a>(rules: impl Iterator<Item = &'a AclAuthorization>) -> Option<AccessModes> {
        rules.fold(None, |acc, rule| {
            Some(acc.unwrap_or(AccessModes::NONE).union(rule.modes))
        })
    }

    /// Replace `agent`'s direct access with `modes`.
    ///
    /// The agent is taken out of every `access_to` rule naming it; rules
    /// left without agents are dropped. Inherited grants the agent held
    /// through those rules are kept in a separate default-only rule. Unless
    /// `modes` is empty, one dedicated rule for the agent is added. With
    /// `pin` set an empty dedicated rule is written anyway, which stops
    /// resolution from falling through to ancestors for this agent.
    ///
    /// Rules for other agents are left as they are.
    pub fn set_agent_access(&mut self, agent: &AgentRef, modes: AccessModes, pin: bool) {
        let mut kept_default = AccessModes::NONE;

        for rule in self.authorizations.iter_mut() {
            if !rule.access_to || !rule.names(agent) {
                continue;
            }
            if rule.default {
                kept_default = kept_default.union(rule.modes);
            }
            rule.agents.retain(|listed| listed != agent);
        }
        self.authorizations.retain(|rule| !rule.agents.is_empty());

        if !kept_default.is_empty() {
            let id = rule_id("default", agent);
            match self
                .authorizations
                .iter_mut()
                .find(|rule| rule.id == id && !rule.access_to)
            {
                Some(rule) => rule.modes = rule.modes.union(kept_default),
                None => self.authorizations.push(AclAuthorization {
                    id,
                    agents: vec![agent.clone()],
                    access_to: false,
                    default: true,
                    modes: kept_default,
                }),
            }
        }

        if !modes.is_empty() || pin {
            self.authorizations.push(AclAuthorization::access_to(
                rule_id("access", agent),
                vec![agent.clone()],
                modes,
            ));
        }
    }

    /// A new document for a resource that has none, carrying over the
    /// default rules of the nearest ancestor that has any.
    ///
    /// `ancestors` is ordered nearest first. Carried-over rules apply to the
    /// resource itself, and are inherited further when it is a container.
    pub fn seeded_from<'a>(
        ancestors: impl IntoIterator<Item = &'a AclDocument>,
        is_container: bool,
    ) -> AclDocument {
        let authorizations = ancestors
            .into_iter()
            .map(|document| {
                document
                    .authorizations
                    .iter()
                    .filter(|rule| rule.default && !rule.agents.is_empty())
                    .map(|rule| AclAuthorization {
                        id: rule.id.clone(),
                        agents: rule.agents.clone(),
                        access_to: true,
                        default: is_container,
                        modes: rule.modes,
                    })
                    .collect::<Vec<_>>()
            })
            .find(|rules| !rules.is_empty())
            .unwrap_or_default();

        AclDocument { authorizations }
    }
}
