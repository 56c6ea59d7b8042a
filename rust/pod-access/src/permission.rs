use serde::{Deserialize, Serialize};

use crate::AgentRef;

/// One capability an agent can hold on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    /// Read the resource's representation
    Read,
    /// Replace or delete the resource
    Write,
    /// Add to the resource without removing anything
    Append,
    /// Read and modify the resource's policy document
    Control,
}

/// A set of [`AccessMode`]s, one independent bit each.
///
/// No bit implies another: `control` without `read` is a valid grant and
/// callers must not assume a capability hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<AccessMode>", into = "Vec<AccessMode>")]
pub struct AccessModes {
    /// See [`AccessMode::Read`]
    pub read: bool,
    /// See [`AccessMode::Write`]
    pub write: bool,
    /// See [`AccessMode::Append`]
    pub append: bool,
    /// See [`AccessMode::Control`]
    pub control: bool,
}

impl AccessModes {
    /// No access at all
    pub const NONE: AccessModes = AccessModes {
        read: false,
        write: false,
        append: false,
        control: false,
    };

    /// Only [`AccessMode::Read`]
    pub const READ: AccessModes = AccessModes {
        read: true,
        ..AccessModes::NONE
    };

    /// Only [`AccessMode::Write`]
    pub const WRITE: AccessModes = AccessModes {
        write: true,
        ..AccessModes::NONE
    };

    /// Only [`AccessMode::Append`]
    pub const APPEND: AccessModes = AccessModes {
        append: true,
        ..AccessModes::NONE
    };

    /// Only [`AccessMode::Control`]
    pub const CONTROL: AccessModes = AccessModes {
        control: true,
        ..AccessModes::NONE
    };

    /// Every mode
    pub const ALL: AccessModes = AccessModes {
        read: true,
        write: true,
        append: true,
        control: true,
    };

    /// Whether `mode` is set.
    pub fn contains(&self, mode: AccessMode) -> bool {
        match mode {
            AccessMode::Read => self.read,
            AccessMode::Write => self.write,
            AccessMode::Append => self.append,
            AccessMode::Control => self.control,
        }
    }

    /// Whether no mode is set.
    pub fn is_empty(&self) -> bool {
        *self == AccessModes::NONE
    }

    /// Bitwise union.
    pub fn union(self, other: AccessModes) -> AccessModes {
        AccessModes {
            read: self.read || other.read,
            write: self.write || other.write,
            append: self.append || other.append,
            control: self.control || other.control,
        }
    }

    /// The modes of `self` that are not in `other`.
    pub fn difference(self, other: AccessModes) -> AccessModes {
        AccessModes {
            read: self.read && !other.read,
            write: self.write && !other.write,
            append: self.append && !other.append,
            control: self.control && !other.control,
        }
    }

    /// The set modes, in a fixed order.
    pub fn modes(&self) -> Vec<AccessMode> {
        [
            AccessMode::Read,
            AccessMode::Write,
            AccessMode::Append,
            AccessMode::Control,
        ]
        .into_iter()
        .filter(|mode| self.contains(*mode))
        .collect()
    }
}

impl FromIterator<AccessMode> for AccessModes {
    fn from_iter<T: IntoIterator<Item = AccessMode>>(iter: T) -> Self {
        iter.into_iter()
            .fold(AccessModes::NONE, |modes, mode| match mode {
                AccessMode::Read => AccessModes { read: true, ..modes },
                AccessMode::Write => AccessModes { write: true, ..modes },
                AccessMode::Append => AccessModes { append: true, ..modes },
                AccessMode::Control => AccessModes { control: true, ..modes },
            })
    }
}

impl From<Vec<AccessMode>> for AccessModes {
    fn from(modes: Vec<AccessMode>) -> Self {
        modes.into_iter().collect()
    }
}

impl From<AccessModes> for Vec<AccessMode> {
    fn from(modes: AccessModes) -> Self {
        modes.modes()
    }
}

/// The effective access an agent holds on a resource.
///
/// Computed on demand and never stored: it is stale as soon as any change is
/// applied to the same resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionSet {
    /// Whose access this is
    pub agent: AgentRef,
    /// What they may do
    pub modes: AccessModes,
}

impl PermissionSet {
    /// A permission set granting nothing
    pub fn none(agent: AgentRef) -> Self {
        Self {
            agent,
            modes: AccessModes::NONE,
        }
    }
}

/// A change to one agent's access.
///
/// Modes in `grant` are added and modes in `revoke` are removed; every other
/// mode is left as it is. A mode present in both ends up revoked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionDelta {
    /// Whose access changes
    pub agent: AgentRef,
    /// Modes to add
    pub grant: AccessModes,
    /// Modes to remove
    pub revoke: AccessModes,
}

impl PermissionDelta {
    /// A delta that adds `modes` for `agent`.
    pub fn grant(agent: AgentRef, modes: AccessModes) -> Self {
        Self {
            agent,
            grant: modes,
            revoke: AccessModes::NONE,
        }
    }

    /// A delta that removes `modes` for `agent`.
    pub fn revoke(agent: AgentRef, modes: AccessModes) -> Self {
        Self {
            agent,
            grant: AccessModes::NONE,
            revoke: modes,
        }
    }

    /// The delta that undoes this one for modes it actually changed.
    pub fn inverse(&self) -> Self {
        Self {
            agent: self.agent.clone(),
            grant: self.revoke,
            revoke: self.grant,
        }
    }

    /// Apply this delta to an existing set of modes.
    pub fn apply_to(&self, modes: AccessModes) -> AccessModes {
        modes.union(self.grant).difference(self.revoke)
    }
}
