use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Marker used in policy documents for "any agent, authenticated or not".
pub const PUBLIC_AGENT: &str = "http://xmlns.com/foaf/0.1/Agent";

/// The identity of an agent: a WebID URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebId(String);

impl WebId {
    /// Create a WebID from its URL string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The WebID URL string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WebId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WebId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for WebId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Who a grant is for: one specific agent, or everyone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentRef {
    /// A specific identity
    Agent(WebId),
    /// Any agent
    Public,
}

impl AgentRef {
    /// Whether a rule written for `self` applies to `subject`.
    ///
    /// A [`AgentRef::Public`] rule applies to every subject; an agent rule
    /// applies only to that agent.
    pub fn covers(&self, subject: &AgentRef) -> bool {
        match self {
            AgentRef::Public => true,
            AgentRef::Agent(_) => self == subject,
        }
    }

    /// Whether this is the any-agent marker
    pub fn is_public(&self) -> bool {
        matches!(self, AgentRef::Public)
    }
}

impl From<WebId> for AgentRef {
    fn from(id: WebId) -> Self {
        AgentRef::Agent(id)
    }
}

impl From<String> for AgentRef {
    fn from(value: String) -> Self {
        if value == PUBLIC_AGENT {
            AgentRef::Public
        } else {
            AgentRef::Agent(WebId(value))
        }
    }
}

impl From<AgentRef> for String {
    fn from(agent: AgentRef) -> Self {
        match agent {
            AgentRef::Agent(id) => id.0,
            AgentRef::Public => PUBLIC_AGENT.to_string(),
        }
    }
}

impl Display for AgentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRef::Agent(id) => id.fmt(f),
            AgentRef::Public => f.write_str(PUBLIC_AGENT),
        }
    }
}
