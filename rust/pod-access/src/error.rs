use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Why a single resource could not be listed, resolved, or changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// The acting agent lacks the capability the operation needs
    NotAuthorized,
    /// The resource or container does not exist
    NotFound,
    /// A policy document exists but cannot be decoded or is inconsistent
    MalformedPolicy,
    /// Timeout, connection failure, or a non-authorization HTTP failure
    Transport,
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FailureReason::NotAuthorized => "not authorized",
            FailureReason::NotFound => "not found",
            FailureReason::MalformedPolicy => "malformed policy",
            FailureReason::Transport => "transport failure",
        })
    }
}

/// The error type produced by engine operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    /// The acting agent lacks the capability required on `url`
    #[error("Not authorized to access {url}")]
    NotAuthorized {
        /// The resource the failure applies to
        url: Url,
    },

    /// The resource or container at `url` does not exist
    #[error("Resource {url} not found")]
    NotFound {
        /// The missing resource
        url: Url,
    },

    /// The policy document at `url` cannot be used
    #[error("Malformed policy document {url}: {reason}")]
    MalformedPolicy {
        /// The policy document
        url: Url,
        /// What is wrong with it
        reason: String,
    },

    /// The request for `url` produced no usable response
    #[error("Transport failure for {url}: {reason}")]
    Transport {
        /// The requested URL
        url: Url,
        /// What went wrong
        reason: String,
        /// Whether repeating the request may succeed
        retryable: bool,
    },

    /// The owning session was invalidated while the operation was in flight
    #[error("Operation cancelled because the session ended")]
    Cancelled,
}

impl AccessError {
    /// The per-resource reason for this error, or `None` for [`AccessError::Cancelled`],
    /// which applies to a whole operation rather than a single resource.
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            AccessError::NotAuthorized { .. } => Some(FailureReason::NotAuthorized),
            AccessError::NotFound { .. } => Some(FailureReason::NotFound),
            AccessError::MalformedPolicy { .. } => Some(FailureReason::MalformedPolicy),
            AccessError::Transport { .. } => Some(FailureReason::Transport),
            AccessError::Cancelled => None,
        }
    }

    /// Whether the operation may be repeated automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccessError::Transport { retryable: true, .. })
    }

    pub(crate) fn malformed(url: &Url, reason: impl Display) -> Self {
        AccessError::MalformedPolicy {
            url: url.clone(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn transport(url: &Url, reason: impl Display, retryable: bool) -> Self {
        AccessError::Transport {
            url: url.clone(),
            reason: reason.to_string(),
            retryable,
        }
    }
}
