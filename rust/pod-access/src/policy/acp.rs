use serde::{Deserialize, Serialize};

use crate::{AccessModes, AgentRef};

use super::rule_id;

/// Selects the agents a policy applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcpMatcher {
    /// Matched agents; the public marker matches everyone
    #[serde(default)]
    pub agents: Vec<AgentRef>,
}

/// A named policy: what it allows, and to whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcpPolicy {
    /// Fragment identifier of the policy
    #[serde(default)]
    pub id: String,
    /// Modes granted when any matcher matches
    #[serde(default)]
    pub allow: AccessModes,
    /// The policy applies if any of these matchers matches
    #[serde(default)]
    pub any_of: Vec<AcpMatcher>,
}

impl AcpPolicy {
    /// A policy allowing `modes` to exactly `agents`.
    pub fn new(id: impl Into<String>, agents: Vec<AgentRef>, modes: AccessModes) -> Self {
        Self {
            id: id.into(),
            allow: modes,
            any_of: vec![AcpMatcher { agents }],
        }
    }

    /// Whether the policy applies to `agent`.
    pub fn matches(&self, agent: &AgentRef) -> bool {
        self.any_of
            .iter()
            .flat_map(|matcher| matcher.agents.iter())
            .any(|listed| listed.covers(agent))
    }

    /// Whether any matcher lists `agent` by name.
    pub fn names(&self, agent: &AgentRef) -> bool {
        self.any_of
            .iter()
            .any(|matcher| matcher.agents.contains(agent))
    }

    fn is_vacant(&self) -> bool {
        self.any_of.iter().all(|matcher| matcher.agents.is_empty())
    }
}

/// An ACP access control resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlResource {
    /// Policies governing the resource itself
    #[serde(default)]
    pub access_control: Vec<AcpPolicy>,
    /// Policies governing every descendant of the resource
    #[serde(default)]
    pub member_access_control: Vec<AcpPolicy>,
}

impl AccessControlResource {
    /// Union of what the resource's own policies allow `agent`.
    pub fn direct_access(&self, agent: &AgentRef) -> AccessModes {
        Self::allowed(&self.access_control, agent)
    }

    /// Union of what this resource's member policies allow `agent` on its
    /// descendants.
    pub fn member_access(&self, agent: &AgentRef) -> AccessModes {
        Self::allowed(&self.member_access_control, agent)
    }

    /// Union of the own policies naming `agent` explicitly, or `None` when
    /// there is none.
    pub fn explicit_access(&self, agent: &AgentRef) -> Option<AccessModes> {
        self.access_control
            .iter()
            .filter(|policy| policy.names(agent))
            .fold(None, |acc, policy| {
                Some(acc.unwrap_or(AccessModes::NONE).union(policy.allow))
            })
    }

    fn allowed(policies: &[AcpPolicy], agent: &AgentRef) -> AccessModes {
        policies
            .iter()
            .filter(|policy| policy.matches(agent))
            .fold(AccessModes::NONE, |acc, policy| acc.union(policy.allow))
    }

    /// Replace what the own policies allow `agent` with `modes`.
    ///
    /// The agent is removed from every own policy's matchers and policies
    /// left matching nobody are dropped; a dedicated policy is added unless
    /// `modes` is empty. Member policies are never touched.
    pub fn set_agent_access(&mut self, agent: &AgentRef, modes: AccessModes) {
        for policy in self.access_control.iter_mut() {
            if !policy.names(agent) {
                continue;
            }
            for matcher in policy.any_of.iter_mut() {
                matcher.agents.retain(|listed| listed != agent);
            }
            policy.any_of.retain(|matcher| !matcher.agents.is_empty());
        }
        self.access_control.retain(|policy| !policy.is_vacant());

        if !modes.is_empty() {
            self.access_control.push(AcpPolicy::new(
                rule_id("policy", agent),
                vec![agent.clone()],
                modes,
            ));
        }
    }
}
