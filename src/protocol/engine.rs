//! Agent socket engine.
//!
//! Drives one agent connection from open to close:
//!
//! ```text
//!            open: SERVER_HELLO queued
//!     [AwaitingHello] ───────────────────> [Established]
//!            │        valid AGENT_HELLO          │
//!            │        (directory knows agent,    │
//!            │         session registered)       │
//!            v                                   v
//!         [Closed] <──── violation / remote close / transport error / cancel
//! ```
//!
//! Inbound frames are handled one at a time. Outbound frames go through the
//! session's [`OutboundSink`] and are written by a separate loop, so relay calls
//! never wait on the reader and the reader never waits on a reply.
//!
//! Every way a connection can end converges on a single idempotent teardown:
//! complete the outbound stream, unregister the session, fail all pending
//! exchanges. The teardown also runs from `Drop` when the engine future is
//! cancelled.

use std::fmt;
use std::pin::pin;
use std::sync::{Arc, OnceLock};

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::codec;
use super::message::{AgentIdentity, ProtocolErrorCode, ServerDescription, WireMessage};
use super::session::{AgentSession, OutboundSink};
use crate::directory::AgentDirectory;
use crate::relay::SessionRegistry;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// The agent broke the protocol; an `ERROR` frame with this code was sent
    Violation(ProtocolErrorCode),
    /// The agent closed the socket
    RemoteClosed,
    /// Reading from the socket failed
    Transport(String),
    /// The engine was dropped before the connection ended
    Cancelled,
}

/// Protocol violation found while dispatching a frame
#[derive(Debug)]
struct Violation {
    code: ProtocolErrorCode,
    message: String,
    exchange_id: u64,
}

impl Violation {
    fn new(code: ProtocolErrorCode, message: impl Into<String>, exchange_id: u64) -> Self {
        Self {
            code,
            message: message.into(),
            exchange_id,
        }
    }

    fn into_message(self) -> WireMessage {
        WireMessage::error(self.code, self.message, self.exchange_id)
    }
}

/// Session teardown, run at most once
struct Teardown {
    session: Arc<AgentSession>,
    registry: SessionRegistry,
    cause: OnceLock<CloseCause>,
}

impl Teardown {
    fn run(&self, cause: &CloseCause) {
        if !self.session.mark_closed() {
            return;
        }
        let _ = self.cause.set(cause.clone());

        self.session.complete_outbound();
        self.registry.unregister(self.session.id());
        let failed = self.session.drain_pending();

        info!(
            session_id = %self.session.id(),
            agent_name = self.session.agent_name().unwrap_or("-"),
            ?cause,
            failed_exchanges = failed,
            "agent session closed"
        );
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.run(&CloseCause::Cancelled);
    }
}

/// Runs agent sockets against a shared registry
#[derive(Clone)]
pub struct SessionEngine {
    registry: SessionRegistry,
    directory: Arc<dyn AgentDirectory>,
    description: ServerDescription,
}

impl fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEngine")
            .field("registry", &self.registry)
            .field("directory", &self.directory.name())
            .field("description", &self.description)
            .finish()
    }
}

impl SessionEngine {
    /// Create an engine registering handshaken sessions in `registry`
    pub fn new(registry: SessionRegistry, directory: Arc<dyn AgentDirectory>) -> Self {
        Self {
            registry,
            directory,
            description: ServerDescription::default(),
        }
    }

    /// Set the description announced in `SERVER_HELLO`
    pub fn with_description(mut self, description: ServerDescription) -> Self {
        self.description = description;
        self
    }

    /// Registry sessions are published to
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Description announced in `SERVER_HELLO`
    pub fn description(&self) -> &ServerDescription {
        &self.description
    }

    /// Name of the agent directory consulted on hello
    pub fn directory_name(&self) -> &'static str {
        self.directory.name()
    }

    /// Serve one agent connection until it ends.
    ///
    /// `inbound` yields the text of each received frame; `outbound` accepts the
    /// text of each frame to send and is closed when the session ends.
    pub async fn run<St, E, Si>(&self, inbound: St, outbound: Si) -> CloseCause
    where
        St: Stream<Item = Result<String, E>>,
        E: fmt::Display,
        Si: Sink<String>,
        Si::Error: fmt::Display,
    {
        let (sink, queue) = OutboundSink::channel();
        let session = Arc::new(AgentSession::new(sink));
        let teardown = Teardown {
            session: Arc::clone(&session),
            registry: self.registry.clone(),
            cause: OnceLock::new(),
        };
        info!(session_id = %session.id(), "agent connected");

        if let Err(e) = session.send(WireMessage::server_hello(self.description.clone())) {
            warn!(session_id = %session.id(), error = %e, "failed to queue server hello");
        }

        let reader = async {
            let cause = self.read_frames(&session, inbound).await;
            teardown.run(&cause);
            cause
        };
        let writer = async {
            if let Err(e) = write_frames(session.id(), queue, outbound).await {
                teardown.run(&CloseCause::Transport(e));
            }
        };

        let (cause, ()) = tokio::join!(reader, writer);
        teardown.cause.get().cloned().unwrap_or(cause)
    }

    async fn read_frames<St, E>(&self, session: &Arc<AgentSession>, inbound: St) -> CloseCause
    where
        St: Stream<Item = Result<String, E>>,
        E: fmt::Display,
    {
        let mut inbound = pin!(inbound);

        while let Some(frame) = inbound.next().await {
            let text = match frame {
                Ok(text) => text,
                Err(e) => {
                    warn!(session_id = %session.id(), error = %e, "socket receive failed");
                    return CloseCause::Transport(e.to_string());
                },
            };

            if session.is_closed() {
                return CloseCause::Transport("socket writer closed".to_string());
            }

            if let Err(violation) = self.dispatch(session, &text).await {
                debug!(
                    session_id = %session.id(),
                    agent_name = session.agent_name().unwrap_or("-"),
                    code = violation.code.code(),
                    exchange_id = violation.exchange_id,
                    "{}",
                    violation.message
                );
                let code = violation.code;
                if let Err(e) = session.send(violation.into_message()) {
                    debug!(session_id = %session.id(), error = %e, "could not queue error reply");
                }
                return CloseCause::Violation(code);
            }
        }

        CloseCause::RemoteClosed
    }

    async fn dispatch(&self, session: &Arc<AgentSession>, text: &str) -> Result<(), Violation> {
        let message = codec::decode(text).map_err(|e| {
            Violation::new(
                ProtocolErrorCode::DecodeFailure,
                format!("Failed to decode message: {e}"),
                0,
            )
        })?;

        trace!(
            session_id = %session.id(),
            command = message.command(),
            exchange_id = message.exchange_id(),
            "frame received"
        );

        match message {
            WireMessage::AgentHello { data, exchange_id } => {
                self.accept_hello(session, data, exchange_id).await
            },
            WireMessage::InitResponse { data, exchange_id } => {
                if session.resolve_exchange(exchange_id, data.sdp) {
                    Ok(())
                } else {
                    Err(Violation::new(
                        ProtocolErrorCode::UnknownExchange,
                        "Can't find client init SDP request",
                        exchange_id,
                    ))
                }
            },
            invalid @ (WireMessage::ServerHello { .. }
            | WireMessage::ClientInit { .. }
            | WireMessage::Error { .. }) => Err(Violation::new(
                ProtocolErrorCode::InvalidCommand,
                format!(
                    "Server received invalid command name: {} not allowed",
                    invalid.command()
                ),
                invalid.exchange_id(),
            )),
        }
    }

    async fn accept_hello(
        &self,
        session: &Arc<AgentSession>,
        identity: AgentIdentity,
        exchange_id: u64,
    ) -> Result<(), Violation> {
        let duplicate = |identity: &AgentIdentity| {
            Violation::new(
                ProtocolErrorCode::DuplicateHello,
                format!(
                    "Received agent hello more than one time: {} ({})",
                    identity.agent_name, identity.agent_id
                ),
                exchange_id,
            )
        };

        if session.is_handshake_done() {
            return Err(duplicate(&identity));
        }

        match self.directory.is_known(&identity.agent_id).await {
            Ok(true) => {},
            Ok(false) => {
                return Err(Violation::new(
                    ProtocolErrorCode::UnknownAgent,
                    format!("Agent {} is not registered", identity.agent_id),
                    exchange_id,
                ));
            },
            Err(e) => {
                warn!(
                    session_id = %session.id(),
                    directory = self.directory.name(),
                    error = %e,
                    "agent lookup failed"
                );
                return Err(Violation::new(
                    ProtocolErrorCode::UnknownAgent,
                    format!("Agent lookup failed: {e}"),
                    exchange_id,
                ));
            },
        }

        session
            .complete_handshake(identity)
            .map_err(|rejected| duplicate(&rejected))?;
        self.registry.register(Arc::clone(session));
        if session.is_closed() {
            // Teardown ran concurrently; it may have missed the entry
            self.registry.unregister(session.id());
            return Ok(());
        }

        if let Some(identity) = session.identity() {
            info!(
                session_id = %session.id(),
                agent_name = %identity.agent_name,
                agent_type = %identity.agent_type,
                version = %identity.version,
                protocol = %format!(
                    "{}.{}",
                    identity.protocol_major_version, identity.protocol_minor_version
                ),
                "agent registered"
            );
        }
        Ok(())
    }
}

/// Encode queued messages onto the socket until the queue is completed.
///
/// Fails with the send error when the socket stops accepting frames.
async fn write_frames<Si>(
    session_id: &str,
    mut queue: mpsc::UnboundedReceiver<WireMessage>,
    outbound: Si,
) -> Result<(), String>
where
    Si: Sink<String>,
    Si::Error: fmt::Display,
{
    let mut outbound = pin!(outbound);

    while let Some(message) = queue.recv().await {
        let text = match codec::encode(&message) {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id, command = message.command(), error = %e, "failed to encode frame");
                continue;
            },
        };

        trace!(
            session_id,
            command = message.command(),
            exchange_id = message.exchange_id(),
            "frame sent"
        );

        if let Err(e) = outbound.send(text).await {
            debug!(session_id, error = %e, "socket send failed");
            return Err(e.to_string());
        }
    }

    if let Err(e) = outbound.close().await {
        debug!(session_id, error = %e, "socket close failed");
    }
    Ok(())
}
