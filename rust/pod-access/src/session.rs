use tokio_util::sync::CancellationToken;

use crate::{AccessError, AgentRef, WebId};

/// The authenticated session an engine call runs on behalf of.
///
/// Clones share validity: invalidating any clone cancels every operation
/// started with any of them. Establishing and refreshing the session is
/// done elsewhere; the engine only reads the acting agent and watches for
/// invalidation.
#[derive(Debug, Clone)]
pub struct SessionContext {
    agent: WebId,
    token: CancellationToken,
}

impl SessionContext {
    /// A valid session for `agent`.
    pub fn new(agent: WebId) -> Self {
        Self {
            agent,
            token: CancellationToken::new(),
        }
    }

    /// The acting agent.
    pub fn agent(&self) -> &WebId {
        &self.agent
    }

    /// The acting agent as a rule subject.
    pub fn agent_ref(&self) -> AgentRef {
        AgentRef::Agent(self.agent.clone())
    }

    /// Whether the session is still valid.
    pub fn is_valid(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// End the session. In-flight operations return
    /// [`AccessError::Cancelled`].
    pub fn invalidate(&self) {
        self.token.cancel();
    }

    /// Completes once the session is invalidated.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Fail with [`AccessError::Cancelled`] if the session has ended.
    pub fn ensure_valid(&self) -> Result<(), AccessError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(AccessError::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn it_shares_invalidation_between_clones() {
        let session = SessionContext::new(WebId::new("https://alice.example/#me"));
        let clone = session.clone();

        assert!(clone.ensure_valid().is_ok());
        session.invalidate();

        assert!(!clone.is_valid());
        assert_eq!(clone.ensure_valid(), Err(AccessError::Cancelled));
        clone.cancelled().await;
    }
}
