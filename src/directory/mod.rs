//! Agent directory lookup.
//!
//! The socket engine asks the directory whether the `agentId` presented in
//! `AGENT_HELLO` belongs to a registered agent before accepting the handshake.
//! Where agents are actually stored (and how they are created) is up to the
//! implementation; the engine only needs a yes/no answer.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use uuid::Uuid;

use crate::error::{Result, SignalError};

/// Boxed future returned by directory lookups
pub type LookupFuture<'a> = Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

/// Lookup service for registered agents.
pub trait AgentDirectory: Send + Sync {
    /// Whether `agent_id` names a known agent.
    fn is_known<'a>(&'a self, agent_id: &'a str) -> LookupFuture<'a>;

    /// Directory name for logging.
    fn name(&self) -> &'static str;
}

/// Directory that accepts every agent
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenDirectory;

impl AgentDirectory for OpenDirectory {
    fn is_known<'a>(&'a self, _agent_id: &'a str) -> LookupFuture<'a> {
        Box::pin(async { Ok(true) })
    }

    fn name(&self) -> &'static str {
        "open"
    }
}

/// Fixed set of registered agent UUIDs
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    agents: HashSet<Uuid>,
}

impl StaticDirectory {
    /// Create from already parsed IDs
    pub fn new(agents: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            agents: agents.into_iter().collect(),
        }
    }

    /// Parse agent IDs from their textual form
    pub fn parse<I, S>(ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let agents = ids
            .into_iter()
            .map(|id| {
                Uuid::parse_str(id.as_ref()).map_err(|e| {
                    SignalError::Config(format!("Invalid agent id {:?}: {e}", id.as_ref()))
                })
            })
            .collect::<Result<HashSet<_>>>()?;
        Ok(Self { agents })
    }

    /// Add an agent
    pub fn with_agent(mut self, agent_id: Uuid) -> Self {
        self.agents.insert(agent_id);
        self
    }

    /// Number of registered agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent is registered
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl AgentDirectory for StaticDirectory {
    fn is_known<'a>(&'a self, agent_id: &'a str) -> LookupFuture<'a> {
        Box::pin(async move {
            // Agents that do not even present a UUID are simply unknown
            Ok(Uuid::parse_str(agent_id).is_ok_and(|id| self.agents.contains(&id)))
        })
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
