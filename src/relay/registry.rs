//! Registry of relay-addressable agent sessions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::protocol::AgentSession;

/// Entry of the session listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListing {
    /// Agent display name
    pub agent_name: String,
    /// Session ID to relay through
    pub session_id: String,
    /// When the agent socket opened
    pub connected_at: DateTime<Utc>,
}

/// Live sessions by session ID.
///
/// Only handshaken sessions are registered; the socket engine inserts on
/// handshake and removes on teardown. Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<AgentSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Returns false if the ID was already present.
    pub fn register(&self, session: Arc<AgentSession>) -> bool {
        let id = session.id().to_string();
        self.sessions.insert(id, session).is_none()
    }

    /// Remove a session
    pub fn unregister(&self, session_id: &str) -> Option<Arc<AgentSession>> {
        self.sessions.remove(session_id).map(|(_, session)| session)
    }

    /// Find a session by ID
    pub fn lookup(&self, session_id: &str) -> Option<Arc<AgentSession>> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// List every registered session, by agent name
    pub fn list_all(&self) -> Vec<SessionListing> {
        let mut listings: Vec<SessionListing> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                entry.agent_name().map(|name| SessionListing {
                    agent_name: name.to_string(),
                    session_id: entry.key().clone(),
                    connected_at: entry.connected_at(),
                })
            })
            .collect();
        listings.sort_by(|a, b| {
            a.agent_name
                .cmp(&b.agent_name)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        listings
    }

    /// Get session count
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is registered
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
