//! Per-connection agent session state.
//!
//! An [`AgentSession`] lives exactly as long as one agent socket. It is shared
//! (behind an `Arc`) between the socket engine that owns the connection and any
//! number of relay calls that push exchanges through it, so every mutable part
//! sits behind its own synchronization:
//!
//! - the identity is a write-once cell, which makes a second hello detectable
//! - the exchange counter is atomic and never reused
//! - the pending-exchange table has its own lock, also guarding the `closed`
//!   check so nothing is registered after teardown drained it

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use super::message::{AgentIdentity, WireMessage};
use crate::error::{Result, SignalError};

/// First exchange ID issued on a session
pub const FIRST_EXCHANGE_ID: u64 = 1;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket open, `SERVER_HELLO` sent, waiting for `AGENT_HELLO`
    AwaitingHello,
    /// Handshake done, session is relay-addressable
    Established,
    /// Torn down (terminal)
    Closed,
}

/// Receiving half of a pending exchange
pub type ReplyReceiver = oneshot::Receiver<Result<String>>;

/// Resolve-once handle for an exchange awaiting the agent's reply.
///
/// Both outcomes consume the handle, so a pending exchange cannot be answered twice.
#[derive(Debug)]
pub struct PendingReply {
    sender: oneshot::Sender<Result<String>>,
}

impl PendingReply {
    /// Create a handle and the receiver its outcome is delivered to
    pub fn channel() -> (Self, ReplyReceiver) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// Deliver the agent's SDP
    pub fn resolve(self, sdp: String) {
        // The caller may have given up already; nothing to deliver to then.
        let _ = self.sender.send(Ok(sdp));
    }

    /// Deliver a failure
    pub fn fail(self, error: SignalError) {
        let _ = self.sender.send(Err(error));
    }
}

/// Outbound message queue of one socket.
///
/// Every writer (hello, relay sends, error replies) pushes here; the socket
/// writer task drains it. Completing the sink lets the writer flush what is
/// queued and then close the socket.
#[derive(Debug)]
pub struct OutboundSink {
    sender: Mutex<Option<mpsc::UnboundedSender<WireMessage>>>,
}

impl OutboundSink {
    /// Create a sink and the queue the socket writer drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WireMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Mutex::new(Some(sender)),
            },
            receiver,
        )
    }

    /// Queue a message for the socket
    pub fn push(&self, message: WireMessage) -> Result<()> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(tx) => tx.send(message).map_err(|_| SignalError::AgentDisconnected),
            None => Err(SignalError::AgentDisconnected),
        }
    }

    /// Signal the end of the outbound stream. Returns false if already completed.
    pub fn complete(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }
}

/// An exchange registered on a session, waiting for its reply
#[derive(Debug)]
pub struct Exchange {
    /// Correlation ID sent in `CLIENT_INIT`
    pub id: u64,
    /// Resolves with the agent's SDP or a failure
    pub reply: ReplyReceiver,
}

/// One live agent connection
#[derive(Debug)]
pub struct AgentSession {
    /// Session ID (registry key)
    id: String,
    /// When the socket connected
    connected_at: DateTime<Utc>,
    /// Agent identity, set by the handshake
    identity: OnceLock<AgentIdentity>,
    /// Next exchange ID to issue
    next_exchange_id: AtomicU64,
    /// Exchanges waiting for an `INIT_RESPONSE`
    pending: Mutex<HashMap<u64, PendingReply>>,
    /// Outbound queue to the socket writer
    outbound: OutboundSink,
    /// Set once by teardown
    closed: AtomicBool,
}

impl AgentSession {
    /// Create a session writing to `outbound`
    pub fn new(outbound: OutboundSink) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            connected_at: Utc::now(),
            identity: OnceLock::new(),
            next_exchange_id: AtomicU64::new(FIRST_EXCHANGE_ID),
            pending: Mutex::new(HashMap::new()),
            outbound,
            closed: AtomicBool::new(false),
        }
    }

    /// Get session ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Connection time
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Agent identity, once the handshake is done
    pub fn identity(&self) -> Option<&AgentIdentity> {
        self.identity.get()
    }

    /// Agent name, once the handshake is done
    pub fn agent_name(&self) -> Option<&str> {
        self.identity().map(|identity| identity.agent_name.as_str())
    }

    /// Whether a valid hello was accepted
    pub fn is_handshake_done(&self) -> bool {
        self.identity.get().is_some()
    }

    /// Whether teardown ran
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        if self.is_closed() {
            SessionState::Closed
        } else if self.is_handshake_done() {
            SessionState::Established
        } else {
            SessionState::AwaitingHello
        }
    }

    /// Record the agent identity.
    ///
    /// Write-once: a second call leaves the first identity in place and hands
    /// the rejected one back.
    pub fn complete_handshake(
        &self,
        identity: AgentIdentity,
    ) -> std::result::Result<(), AgentIdentity> {
        self.identity.set(identity)
    }

    /// Issue the next exchange ID
    pub fn next_exchange_id(&self) -> u64 {
        self.next_exchange_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Queue a message regardless of handshake state (hello and error replies)
    pub fn send(&self, message: WireMessage) -> Result<()> {
        self.outbound.push(message)
    }

    /// Queue a correlated message. Fails fast before the handshake.
    pub fn send_exchange(&self, message: WireMessage) -> Result<()> {
        if !self.is_handshake_done() {
            return Err(SignalError::HandshakeNotEstablished);
        }
        self.outbound.push(message)
    }

    /// Register a pending exchange for `sdp` and push its `CLIENT_INIT`
    pub fn open_exchange(&self, sdp: impl Into<String>) -> Result<Exchange> {
        let id = self.next_exchange_id();
        let (reply, receiver) = PendingReply::channel();

        {
            let mut pending = self.lock_pending();
            if self.is_closed() {
                return Err(SignalError::AgentDisconnected);
            }
            pending.insert(id, reply);
        }

        if let Err(e) = self.send_exchange(WireMessage::client_init(sdp, id)) {
            self.lock_pending().remove(&id);
            return Err(e);
        }

        tracing::trace!(session_id = %self.id, exchange_id = id, "registered exchange");
        Ok(Exchange {
            id,
            reply: receiver,
        })
    }

    /// Resolve a pending exchange with the agent's SDP. Returns false if it was not pending.
    pub fn resolve_exchange(&self, exchange_id: u64, sdp: String) -> bool {
        let reply = self.lock_pending().remove(&exchange_id);
        match reply {
            Some(reply) => {
                reply.resolve(sdp);
                true
            },
            None => false,
        }
    }

    /// Drop a pending exchange without resolving it. Returns false if it was not pending.
    pub fn expire_exchange(&self, exchange_id: u64) -> bool {
        self.lock_pending().remove(&exchange_id).is_some()
    }

    /// Number of exchanges waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Mark the session closed. Returns true only for the first caller.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// End the outbound stream
    pub(crate) fn complete_outbound(&self) -> bool {
        self.outbound.complete()
    }

    /// Fail every pending exchange with a disconnect and empty the table
    pub(crate) fn drain_pending(&self) -> usize {
        let drained: Vec<(u64, PendingReply)> = self.lock_pending().drain().collect();
        let count = drained.len();
        for (exchange_id, reply) in drained {
            tracing::trace!(session_id = %self.id, exchange_id, "failing pending exchange");
            reply.fail(SignalError::AgentDisconnected);
        }
        count
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<u64, PendingReply>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
