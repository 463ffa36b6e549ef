//! End-to-end agent session tests.
//!
//! These drive the session engine over in-memory channels standing in for the
//! agent WebSocket, with the signal relay playing the client side.

use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc;
use futures::StreamExt;
use proptest::prelude::*;
use qsp_signal::directory::{OpenDirectory, StaticDirectory};
use qsp_signal::protocol::{
    decode, encode, AgentIdentity, AgentSession, CloseCause, OutboundSink, ProtocolErrorCode,
    SessionEngine, SessionState, WireMessage, CLIENT_INIT, SERVER_HELLO,
};
use qsp_signal::relay::{SessionRegistry, SignalRelay};
use qsp_signal::{AgentDirectory, SignalError};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const AGENT_ID: &str = "4d6f3c1e-8a52-4b7e-9c0d-2f1a3b4c5d6e";

/// In-memory agent connected to a running engine
struct TestAgent {
    to_server: Option<mpsc::UnboundedSender<Result<String, Infallible>>>,
    from_server: mpsc::UnboundedReceiver<String>,
    task: JoinHandle<CloseCause>,
}

impl TestAgent {
    fn connect(engine: &SessionEngine) -> Self {
        let (to_server, inbound) = mpsc::unbounded();
        let (outbound, from_server) = mpsc::unbounded();
        let engine = engine.clone();
        let task = tokio::spawn(async move { engine.run(inbound, outbound).await });

        Self {
            to_server: Some(to_server),
            from_server,
            task,
        }
    }

    fn send(&self, message: &WireMessage) {
        self.send_raw(encode(message).unwrap());
    }

    fn send_raw(&self, frame: String) {
        self.to_server
            .as_ref()
            .expect("agent already disconnected")
            .unbounded_send(Ok(frame))
            .unwrap();
    }

    async fn recv(&mut self) -> WireMessage {
        let frame = timeout(Duration::from_secs(5), self.from_server.next())
            .await
            .expect("timed out waiting for server frame")
            .expect("server closed the socket");
        decode(&frame).unwrap()
    }

    /// Read `SERVER_HELLO`, answer with `AGENT_HELLO` and wait for registration
    async fn handshake(&mut self, registry: &SessionRegistry, name: &str) -> String {
        let hello = self.recv().await;
        assert_eq!(hello.command(), SERVER_HELLO);

        self.send(&WireMessage::agent_hello(identity(name)));
        wait_for_agent(registry, name).await
    }

    fn disconnect(&mut self) {
        self.to_server = None;
    }

    async fn closed(self) -> (CloseCause, Vec<WireMessage>) {
        let TestAgent {
            to_server,
            from_server,
            task,
        } = self;
        drop(to_server);

        let cause = timeout(Duration::from_secs(5), task)
            .await
            .expect("engine did not finish")
            .unwrap();
        let rest = from_server
            .map(|frame| decode(&frame).unwrap())
            .collect()
            .await;
        (cause, rest)
    }
}

fn identity(name: &str) -> AgentIdentity {
    AgentIdentity {
        agent_type: "station".to_string(),
        agent_name: name.to_string(),
        version: "1.0.0".to_string(),
        protocol_major_version: 0,
        protocol_minor_version: 1,
        agent_id: AGENT_ID.to_string(),
    }
}

async fn wait_for_agent(registry: &SessionRegistry, name: &str) -> String {
    timeout(Duration::from_secs(5), async {
        loop {
            if let Some(listing) = registry.list_all().into_iter().find(|l| l.agent_name == name) {
                return listing.session_id;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("agent never registered")
}

fn setup() -> (SessionEngine, SignalRelay) {
    let registry = SessionRegistry::new();
    let engine = SessionEngine::new(registry.clone(), Arc::new(OpenDirectory));
    let relay = SignalRelay::new(registry);
    (engine, relay)
}

/// Connect, handshake, relay one offer and get the answer back
#[tokio::test]
async fn test_handshake_and_relay() {
    let (engine, relay) = setup();
    let mut agent = TestAgent::connect(&engine);
    let session_id = agent.handshake(engine.registry(), "A").await;

    let client = {
        let relay = relay.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move { relay.relay_signal(&session_id, "offer-1".to_string()).await })
    };

    let init = agent.recv().await;
    assert_eq!(init, WireMessage::client_init("offer-1", 1));

    agent.send(&WireMessage::init_response("answer-1", 1));
    let answer = client.await.unwrap().unwrap();
    assert_eq!(answer, "answer-1");

    let (cause, _) = agent.closed().await;
    assert_eq!(cause, CloseCause::RemoteClosed);
    assert!(relay.registry().lookup(&session_id).is_none());
}

/// Relay to an unregistered session fails without touching any socket
#[tokio::test]
async fn test_relay_unknown_session_fails_fast() {
    let (engine, relay) = setup();
    let mut agent = TestAgent::connect(&engine);
    agent.handshake(engine.registry(), "A").await;

    let err = relay
        .relay_signal("not-a-session", "offer".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, SignalError::SessionNotFound(ref id) if id == "not-a-session"));

    let (_, rest) = agent.closed().await;
    assert!(rest.is_empty(), "unexpected frames: {rest:?}");
}

/// Agent socket closes while an exchange is pending
#[tokio::test]
async fn test_disconnect_mid_flight() {
    let (engine, relay) = setup();
    let mut agent = TestAgent::connect(&engine);
    let session_id = agent.handshake(engine.registry(), "A").await;

    let client = {
        let relay = relay.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move { relay.relay_signal(&session_id, "offer".to_string()).await })
    };

    assert_eq!(agent.recv().await.command(), CLIENT_INIT);
    agent.disconnect();

    let err = client.await.unwrap().unwrap_err();
    assert!(matches!(err, SignalError::AgentDisconnected));

    let (cause, _) = agent.closed().await;
    assert_eq!(cause, CloseCause::RemoteClosed);
    assert!(engine.registry().is_empty());
}

/// Every pending exchange fails exactly once when the agent drops
#[tokio::test]
async fn test_disconnect_fails_all_pending() {
    let (engine, relay) = setup();
    let mut agent = TestAgent::connect(&engine);
    let session_id = agent.handshake(engine.registry(), "A").await;
    let session = engine.registry().lookup(&session_id).unwrap();

    let clients: Vec<_> = (0..3)
        .map(|i| {
            let relay = relay.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move { relay.relay_signal(&session_id, format!("offer-{i}")).await })
        })
        .collect();

    for _ in 0..3 {
        assert_eq!(agent.recv().await.command(), CLIENT_INIT);
    }
    assert_eq!(session.pending_count(), 3);

    agent.disconnect();
    for client in clients {
        let err = client.await.unwrap().unwrap_err();
        assert!(matches!(err, SignalError::AgentDisconnected));
    }

    agent.closed().await;
    assert_eq!(session.pending_count(), 0);
    assert_eq!(session.state(), SessionState::Closed);
}

/// Answers may come back in any order
#[tokio::test]
async fn test_out_of_order_answers() {
    let (engine, relay) = setup();
    let mut agent = TestAgent::connect(&engine);
    let session_id = agent.handshake(engine.registry(), "A").await;

    let first = {
        let relay = relay.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move { relay.relay_signal(&session_id, "first".to_string()).await })
    };
    let first_init = agent.recv().await;

    let second = {
        let relay = relay.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move { relay.relay_signal(&session_id, "second".to_string()).await })
    };
    let second_init = agent.recv().await;
    assert!(second_init.exchange_id() > first_init.exchange_id());

    agent.send(&WireMessage::init_response(
        "answer-second",
        second_init.exchange_id(),
    ));
    agent.send(&WireMessage::init_response(
        "answer-first",
        first_init.exchange_id(),
    ));

    assert_eq!(first.await.unwrap().unwrap(), "answer-first");
    assert_eq!(second.await.unwrap().unwrap(), "answer-second");
}

/// A second hello is rejected with 104 and the first identity stays
#[tokio::test]
async fn test_duplicate_hello() {
    let (engine, _relay) = setup();
    let mut agent = TestAgent::connect(&engine);
    let session_id = agent.handshake(engine.registry(), "A").await;
    let session = engine.registry().lookup(&session_id).unwrap();

    agent.send(&WireMessage::agent_hello(identity("B")));
    let error = agent.recv().await;
    assert_eq!(error.error_code(), Some(ProtocolErrorCode::DuplicateHello.code()));

    let (cause, _) = agent.closed().await;
    assert_eq!(cause, CloseCause::Violation(ProtocolErrorCode::DuplicateHello));
    assert_eq!(session.agent_name(), Some("A"));
    assert!(engine.registry().is_empty());
}

/// An answer for an exchange that was never issued is rejected with 103
#[tokio::test]
async fn test_unknown_exchange() {
    let (engine, _relay) = setup();
    let mut agent = TestAgent::connect(&engine);
    agent.handshake(engine.registry(), "A").await;

    agent.send(&WireMessage::init_response("stray", 42));
    let error = agent.recv().await;
    assert_eq!(error.error_code(), Some(103));
    assert_eq!(error.exchange_id(), 42);

    let (cause, _) = agent.closed().await;
    assert_eq!(cause, CloseCause::Violation(ProtocolErrorCode::UnknownExchange));
}

/// Answering the same exchange twice is rejected with 103
#[tokio::test]
async fn test_already_resolved_exchange() {
    let (engine, relay) = setup();
    let mut agent = TestAgent::connect(&engine);
    let session_id = agent.handshake(engine.registry(), "A").await;

    let client = {
        let relay = relay.clone();
        tokio::spawn(async move { relay.relay_signal(&session_id, "offer".to_string()).await })
    };
    let init = agent.recv().await;

    agent.send(&WireMessage::init_response("answer", init.exchange_id()));
    assert_eq!(client.await.unwrap().unwrap(), "answer");

    agent.send(&WireMessage::init_response("answer", init.exchange_id()));
    assert_eq!(agent.recv().await.error_code(), Some(103));
}

/// An answer arriving after the client gave up is rejected with 103
#[tokio::test]
async fn test_late_answer_after_timeout() {
    let registry = SessionRegistry::new();
    let engine = SessionEngine::new(registry.clone(), Arc::new(OpenDirectory));
    let relay = SignalRelay::new(registry).with_exchange_timeout(Duration::from_millis(50));

    let mut agent = TestAgent::connect(&engine);
    let session_id = agent.handshake(engine.registry(), "A").await;

    let err = relay
        .relay_signal(&session_id, "offer".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, SignalError::ExchangeTimeout { exchange_id: 1, .. }));

    // The session survives the timeout
    assert!(engine.registry().lookup(&session_id).is_some());

    let init = agent.recv().await;
    agent.send(&WireMessage::init_response("late", init.exchange_id()));
    assert_eq!(agent.recv().await.error_code(), Some(103));
}

/// `CLIENT_INIT` before the handshake never reaches the wire
#[tokio::test]
async fn test_client_init_before_handshake() {
    let (sink, mut queue) = OutboundSink::channel();
    let session = AgentSession::new(sink);

    let err = session.open_exchange("offer").unwrap_err();
    assert!(matches!(err, SignalError::HandshakeNotEstablished));
    assert_eq!(session.pending_count(), 0);
    assert!(queue.try_recv().is_err());

    // Nor is an unhandshaken socket addressable through the relay
    let (engine, relay) = setup();
    let mut agent = TestAgent::connect(&engine);
    assert_eq!(agent.recv().await.command(), SERVER_HELLO);
    assert!(engine.registry().is_empty());
    assert!(matches!(
        relay.relay_signal("anything", "offer".to_string()).await,
        Err(SignalError::SessionNotFound(_))
    ));
}

/// Agents missing from the directory are refused with 105
#[tokio::test]
async fn test_unknown_agent_rejected() {
    let directory: Arc<dyn AgentDirectory> = Arc::new(StaticDirectory::parse([
        "00000000-0000-4000-8000-000000000001",
    ])
    .unwrap());
    let engine = SessionEngine::new(SessionRegistry::new(), directory);

    let mut agent = TestAgent::connect(&engine);
    assert_eq!(agent.recv().await.command(), SERVER_HELLO);
    agent.send(&WireMessage::agent_hello(identity("A")));

    assert_eq!(agent.recv().await.error_code(), Some(105));
    let (cause, _) = agent.closed().await;
    assert_eq!(cause, CloseCause::Violation(ProtocolErrorCode::UnknownAgent));
    assert!(engine.registry().is_empty());
}

/// Garbage frames are answered with 101
#[tokio::test]
async fn test_garbage_frame() {
    let (engine, _relay) = setup();
    let mut agent = TestAgent::connect(&engine);
    assert_eq!(agent.recv().await.command(), SERVER_HELLO);

    agent.send_raw("{\"command\":".to_string());
    assert_eq!(agent.recv().await.error_code(), Some(101));

    let (cause, _) = agent.closed().await;
    assert_eq!(cause, CloseCause::Violation(ProtocolErrorCode::DecodeFailure));
}

/// Several agents are listed by name
#[tokio::test]
async fn test_multiple_agents_listed() {
    let (engine, _relay) = setup();
    let mut bravo = TestAgent::connect(&engine);
    let mut alpha = TestAgent::connect(&engine);
    bravo.handshake(engine.registry(), "Bravo").await;
    alpha.handshake(engine.registry(), "Alpha").await;

    let names: Vec<_> = engine
        .registry()
        .list_all()
        .into_iter()
        .map(|l| l.agent_name)
        .collect();
    assert_eq!(names, ["Alpha", "Bravo"]);

    bravo.closed().await;
    assert_eq!(engine.registry().len(), 1);
}

fn handshaken_session(name: &str) -> Arc<AgentSession> {
    let (sink, _queue) = OutboundSink::channel();
    let session = Arc::new(AgentSession::new(sink));
    session.complete_handshake(identity(name)).unwrap();
    session
}

#[derive(Debug, Clone, Copy)]
enum ExchangeOp {
    Open,
    ResolveOldest,
    ExpireNewest,
}

fn exchange_op() -> impl Strategy<Value = ExchangeOp> {
    prop_oneof![
        3 => Just(ExchangeOp::Open),
        1 => Just(ExchangeOp::ResolveOldest),
        1 => Just(ExchangeOp::ExpireNewest),
    ]
}

#[derive(Debug, Clone, Copy)]
enum RegistryOp {
    Register(usize),
    Unregister(usize),
    Lookup(usize),
}

fn registry_op() -> impl Strategy<Value = RegistryOp> {
    prop_oneof![
        (0..4usize).prop_map(RegistryOp::Register),
        (0..4usize).prop_map(RegistryOp::Unregister),
        (0..4usize).prop_map(RegistryOp::Lookup),
    ]
}

proptest! {
    /// Exchange IDs strictly increase and never repeat, whatever happens to earlier exchanges
    #[test]
    fn prop_exchange_ids_strictly_increase(ops in prop::collection::vec(exchange_op(), 1..100)) {
        let (sink, _queue) = OutboundSink::channel();
        let session = AgentSession::new(sink);
        session.complete_handshake(identity("A")).unwrap();

        let mut issued = Vec::new();
        let mut open: Vec<u64> = Vec::new();

        for op in ops {
            match op {
                ExchangeOp::Open => {
                    let exchange = session.open_exchange("offer").unwrap();
                    if let Some(last) = issued.last() {
                        prop_assert!(exchange.id > *last);
                    }
                    issued.push(exchange.id);
                    open.push(exchange.id);
                },
                ExchangeOp::ResolveOldest => {
                    if !open.is_empty() {
                        let id = open.remove(0);
                        prop_assert!(session.resolve_exchange(id, "answer".to_string()));
                    }
                },
                ExchangeOp::ExpireNewest => {
                    if let Some(id) = open.pop() {
                        prop_assert!(session.expire_exchange(id));
                    }
                },
            }
        }

        let unique: HashSet<_> = issued.iter().collect();
        prop_assert_eq!(unique.len(), issued.len());
        prop_assert_eq!(session.pending_count(), open.len());
    }

    /// Concurrent register/unregister/lookup never lose or duplicate an entry
    #[test]
    fn prop_registry_concurrent_ops(
        plans in prop::collection::vec(prop::collection::vec(registry_op(), 1..40), 2..6)
    ) {
        let registry = SessionRegistry::new();
        let sessions: Vec<Vec<Arc<AgentSession>>> = plans
            .iter()
            .enumerate()
            .map(|(t, _)| (0..4).map(|i| handshaken_session(&format!("agent-{t}-{i}"))).collect())
            .collect();

        // Each thread owns its sessions, so its final view is deterministic
        let expected: Vec<HashSet<String>> = std::thread::scope(|scope| {
            let handles: Vec<_> = plans
                .iter()
                .zip(&sessions)
                .map(|(plan, owned)| {
                    let registry = registry.clone();
                    scope.spawn(move || {
                        let mut present = HashSet::new();
                        for op in plan {
                            match *op {
                                RegistryOp::Register(i) => {
                                    let id = owned[i].id().to_string();
                                    let inserted = registry.register(Arc::clone(&owned[i]));
                                    assert_eq!(inserted, present.insert(id));
                                },
                                RegistryOp::Unregister(i) => {
                                    let removed = registry.unregister(owned[i].id());
                                    assert_eq!(removed.is_some(), present.remove(owned[i].id()));
                                },
                                RegistryOp::Lookup(i) => {
                                    let found = registry.lookup(owned[i].id());
                                    assert_eq!(found.is_some(), present.contains(owned[i].id()));
                                },
                            }
                        }
                        present
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let expected: HashSet<String> = expected.into_iter().flatten().collect();
        let listed: Vec<String> = registry.list_all().into_iter().map(|l| l.session_id).collect();
        let listed_set: HashSet<String> = listed.iter().cloned().collect();

        prop_assert_eq!(listed.len(), listed_set.len());
        prop_assert_eq!(listed_set, expected);
        prop_assert_eq!(registry.len(), listed.len());
    }
}
