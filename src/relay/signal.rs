//! Client-to-agent signal relay.

use std::time::Duration;

use super::registry::SessionRegistry;
use crate::error::{Result, SignalError};
use crate::protocol::AgentSession;

/// Default wait for an agent answer
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Removes an exchange from the pending table when its caller goes away
struct PendingExchange<'a> {
    session: &'a AgentSession,
    exchange_id: u64,
}

impl Drop for PendingExchange<'_> {
    fn drop(&mut self) {
        if self.session.expire_exchange(self.exchange_id) {
            tracing::debug!(
                session_id = %self.session.id(),
                exchange_id = self.exchange_id,
                "caller dropped pending exchange"
            );
        }
    }
}

/// Relays client offers to agent sessions and waits for the answers
#[derive(Debug, Clone)]
pub struct SignalRelay {
    registry: SessionRegistry,
    exchange_timeout: Duration,
}

impl SignalRelay {
    /// Create a relay over `registry`
    pub fn new(registry: SessionRegistry) -> Self {
        Self {
            registry,
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }

    /// Set the per-exchange timeout
    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    /// Per-exchange timeout
    pub fn exchange_timeout(&self) -> Duration {
        self.exchange_timeout
    }

    /// Registry the relay routes through
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Send `client_sdp` to the agent behind `session_id` and wait for its SDP.
    ///
    /// Fails immediately with [`SignalError::SessionNotFound`] when no such
    /// session is registered. Otherwise resolves with the agent's answer, or
    /// fails with [`SignalError::AgentDisconnected`] if the connection ends
    /// first, or [`SignalError::ExchangeTimeout`] if the agent stays silent.
    /// A timeout only expires the exchange; the socket stays open. Dropping
    /// the returned future expires the exchange as well.
    pub async fn relay_signal(&self, session_id: &str, client_sdp: String) -> Result<String> {
        let session = self
            .registry
            .lookup(session_id)
            .ok_or_else(|| SignalError::SessionNotFound(session_id.to_string()))?;

        let mut exchange = session.open_exchange(client_sdp)?;
        tracing::debug!(session_id, exchange_id = exchange.id, "sent client init");
        let _pending = PendingExchange {
            session: &session,
            exchange_id: exchange.id,
        };

        match tokio::time::timeout(self.exchange_timeout, &mut exchange.reply).await {
            Ok(outcome) => outcome.unwrap_or(Err(SignalError::AgentDisconnected)),
            Err(_) => {
                if session.expire_exchange(exchange.id) {
                    tracing::warn!(
                        session_id,
                        exchange_id = exchange.id,
                        "agent did not answer in time"
                    );
                    Err(SignalError::ExchangeTimeout {
                        exchange_id: exchange.id,
                        timeout: self.exchange_timeout,
                    })
                } else {
                    // Resolved concurrently with the deadline; the outcome is already sent
                    exchange
                        .reply
                        .await
                        .unwrap_or(Err(SignalError::AgentDisconnected))
                }
            },
        }
    }
}
