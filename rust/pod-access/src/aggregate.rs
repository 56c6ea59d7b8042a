use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{FailureReason, WebId};

/// One resource an operation could not complete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessFailure {
    /// The resource (or container) the failure applies to
    pub resource_url: Url,
    /// The agent the operation ran as
    pub acting_agent: WebId,
    /// What went wrong
    pub reason: FailureReason,
}

/// The outcome of a batch permission change.
///
/// Every requested resource appears exactly once, either in
/// [`AccessFailureBatch::succeeded`] or among the
/// [`AccessFailureBatch::failures`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessFailureBatch {
    succeeded: IndexSet<Url>,
    failures: Vec<AccessFailure>,
}

impl AccessFailureBatch {
    /// Resources whose change was written, in request order.
    pub fn succeeded(&self) -> &IndexSet<Url> {
        &self.succeeded
    }

    /// Resources whose change was not written, in request order.
    pub fn failures(&self) -> &[AccessFailure] {
        &self.failures
    }

    /// The URLs of [`AccessFailureBatch::failures`].
    pub fn failed_urls(&self) -> impl Iterator<Item = &Url> {
        self.failures.iter().map(|failure| &failure.resource_url)
    }

    /// The failure recorded for `url`, if any.
    pub fn failure_for(&self, url: &Url) -> Option<&AccessFailure> {
        self.failures
            .iter()
            .find(|failure| &failure.resource_url == url)
    }

    /// Number of resources accounted for.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }

    /// Whether nothing failed.
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// What happened to one target of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOutcome {
    /// Position of the target in the request
    pub index: usize,
    /// The target
    pub resource_url: Url,
    /// `Ok` if the change was written
    pub result: Result<(), FailureReason>,
}

/// Assemble per-target outcomes into an [`AccessFailureBatch`].
///
/// Outcomes may arrive in any order; the batch lists them in request order.
/// A target reported more than once is an accounting error: only its first
/// outcome (by index) is kept and the violation is logged.
pub fn aggregate(acting_agent: &WebId, mut outcomes: Vec<ResourceOutcome>) -> AccessFailureBatch {
    outcomes.sort_by_key(|outcome| outcome.index);

    let mut batch = AccessFailureBatch::default();
    let mut seen = IndexSet::with_capacity(outcomes.len());
    let mut duplicates = 0usize;

    for outcome in outcomes {
        if !seen.insert(outcome.resource_url.clone()) {
            duplicates += 1;
            continue;
        }
        match outcome.result {
            Ok(()) => {
                batch.succeeded.insert(outcome.resource_url);
            }
            Err(reason) => batch.failures.push(AccessFailure {
                resource_url: outcome.resource_url,
                acting_agent: acting_agent.clone(),
                reason,
            }),
        }
    }

    if duplicates > 0 {
        tracing::error!(duplicates, "Batch outcome reported the same resource more than once");
    }
    debug_assert_eq!(duplicates, 0, "every target must be reported exactly once");
    debug_assert_eq!(batch.total(), seen.len());

    batch
}
