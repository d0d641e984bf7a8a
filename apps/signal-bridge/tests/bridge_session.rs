//! Bridge Session Integration Tests
//!
//! Drives a real `BridgeClient` against an in-process WebSocket bridge and
//! checks the handshake, signal execution round trip, heartbeat handling and
//! reconnect behavior end to end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use signal_bridge::{
    BridgeClient, BridgeError, BridgeEvent, ConnectionState, EndpointConfig, ExecutionError,
    OrderExecutor, PlacedOrder, StaticConfigProvider, TradeSignal, TradingMode,
    WebSocketSettings,
};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Mock bridge server
// =============================================================================

/// How the mock bridge answers an `auth` message.
#[derive(Clone, Copy)]
enum AuthReply {
    Accept(&'static str),
    Reject(&'static str),
    Ignore,
}

/// Instructions for the currently open server-side connection.
enum ServerCommand {
    Send(Value),
    SendRaw(String),
    Close(&'static str),
}

struct MockBridge {
    url: String,
    inbound: mpsc::UnboundedReceiver<Value>,
    commands: mpsc::UnboundedSender<ServerCommand>,
    accepted: Arc<AtomicUsize>,
}

impl MockBridge {
    /// Start a bridge that handles one connection at a time.
    async fn start(auth: AuthReply, ack_heartbeats: bool) -> Self {
        Self::start_on("127.0.0.1:0", auth, ack_heartbeats).await
    }

    /// Start a bridge listening on a specific address.
    async fn start_on(addr: &str, auth: AuthReply, ack_heartbeats: bool) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<ServerCommand>();
        let accepted = Arc::new(AtomicUsize::new(0));
        let accepted_count = Arc::clone(&accepted);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accepted_count.fetch_add(1, Ordering::SeqCst);
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                loop {
                    tokio::select! {
                        frame = ws.next() => {
                            let Some(Ok(Message::Text(text))) = frame else {
                                break;
                            };
                            let message: Value = serde_json::from_str(text.as_str()).unwrap();
                            let reply = match (message["type"].as_str(), auth) {
                                (Some("auth"), AuthReply::Accept(id)) => {
                                    Some(json!({"type": "auth_success", "payload": {"clientId": id}}))
                                }
                                (Some("auth"), AuthReply::Reject(error)) => {
                                    Some(json!({"type": "auth_failed", "payload": {"error": error}}))
                                }
                                (Some("heartbeat"), _) if ack_heartbeats => {
                                    Some(json!({"type": "heartbeat_ack"}))
                                }
                                _ => None,
                            };
                            let _ = inbound_tx.send(message);
                            if let Some(reply) = reply {
                                let _ = ws.send(Message::Text(reply.to_string().into())).await;
                            }
                        }
                        command = command_rx.recv() => match command {
                            Some(ServerCommand::Send(value)) => {
                                let _ = ws.send(Message::Text(value.to_string().into())).await;
                            }
                            Some(ServerCommand::SendRaw(text)) => {
                                let _ = ws.send(Message::Text(text.into())).await;
                            }
                            Some(ServerCommand::Close(reason)) => {
                                let _ = ws
                                    .close(Some(tokio_tungstenite::tungstenite::protocol::CloseFrame {
                                        code: tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::Away,
                                        reason: reason.into(),
                                    }))
                                    .await;
                                break;
                            }
                            None => return,
                        }
                    }
                }
            }
        });

        Self {
            url: format!("http://{addr}"),
            inbound: inbound_rx,
            commands: command_tx,
            accepted,
        }
    }

    fn send(&self, value: Value) {
        self.commands.send(ServerCommand::Send(value)).unwrap();
    }

    fn send_raw(&self, text: &str) {
        self.commands
            .send(ServerCommand::SendRaw(text.to_string()))
            .unwrap();
    }

    fn close(&self, reason: &'static str) {
        self.commands.send(ServerCommand::Close(reason)).unwrap();
    }

    /// Next message of type `kind` received from the client.
    async fn expect(&mut self, kind: &str) -> Value {
        timeout(WAIT, async {
            loop {
                let message = self.inbound.recv().await.unwrap();
                if message["type"] == kind {
                    return message;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no {kind} message received"))
    }

    /// Discard everything received so far.
    fn drain(&mut self) {
        while self.inbound.try_recv().is_ok() {}
    }

    /// Next message received from the client, of any type.
    async fn next(&mut self) -> Value {
        timeout(WAIT, self.inbound.recv())
            .await
            .expect("no message received")
            .unwrap()
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Test fixtures
// =============================================================================

/// Executor that places every order as `O123` unless the symbol is `FAIL`.
struct ScriptedExecutor {
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderExecutor for ScriptedExecutor {
    async fn execute(&self, signal: &TradeSignal) -> Result<PlacedOrder, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if signal.symbol == "FAIL" {
            Err(ExecutionError::new("insufficient buying power"))
        } else {
            Ok(PlacedOrder {
                id: "O123".to_string(),
                status: "accepted".to_string(),
            })
        }
    }
}

fn fast_settings() -> WebSocketSettings {
    WebSocketSettings {
        heartbeat_interval: Duration::from_secs(30),
        heartbeat_timeout: None,
        reconnect_delay_initial: Duration::from_millis(20),
        reconnect_delay_max: Duration::from_millis(100),
        reconnect_delay_multiplier: 2.0,
        reconnect_jitter: 0.0,
        max_reconnect_attempts: 3,
        handshake_timeout: Duration::from_secs(2),
    }
}

fn endpoint(url: &str, auto_reconnect: bool) -> EndpointConfig {
    EndpointConfig::new(url, "s3cret", TradingMode::Paper, auto_reconnect)
}

fn spawn_client(
    settings: &WebSocketSettings,
    endpoint: EndpointConfig,
    executor: Arc<ScriptedExecutor>,
) -> (BridgeClient, mpsc::Receiver<BridgeEvent>) {
    let (event_tx, event_rx) = mpsc::channel(256);
    let client = BridgeClient::spawn(
        settings,
        Arc::new(StaticConfigProvider::new(endpoint)),
        executor,
        event_tx,
    );
    (client, event_rx)
}

/// Wait for the first event matching `predicate`, skipping the rest.
async fn next_event(
    events: &mut mpsc::Receiver<BridgeEvent>,
    predicate: impl Fn(&BridgeEvent) -> bool,
) -> BridgeEvent {
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event not received")
}

/// Poll the client status until `state` is reached.
async fn wait_for_state(client: &BridgeClient, state: ConnectionState) {
    timeout(WAIT, async {
        while client.status().state != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("state {state} not reached, still {}", client.status().state));
}

fn trade(symbol: &str, order_type: &str) -> Value {
    let mut signal = json!({
        "type": "trade",
        "action": "BUY",
        "symbol": symbol,
        "quantity": 10,
        "orderType": order_type,
        "pairId": 7,
        "side": "base",
    });
    if order_type == "limit" {
        signal["limitPrice"] = json!(187.5);
    }
    signal
}

// =============================================================================
// Handshake
// =============================================================================

#[tokio::test]
async fn connect_authenticates_and_reports_status() {
    let mut bridge = MockBridge::start(AuthReply::Accept("client-42"), true).await;
    let (client, mut events) =
        spawn_client(&fast_settings(), endpoint(&bridge.url, true), ScriptedExecutor::new());

    client.connect().await.unwrap();

    let auth = bridge.expect("auth").await;
    assert_eq!(auth["payload"]["secret"], "s3cret");
    assert_eq!(auth["payload"]["version"], "1.0.0");
    assert_eq!(auth["payload"]["tradingMode"], "paper");

    let status = client.status();
    assert!(status.connected);
    assert_eq!(status.client_id.as_deref(), Some("client-42"));
    assert_eq!(status.state, ConnectionState::Authenticated);
    assert_eq!(status.reconnect_attempts, 0);

    let event = next_event(&mut events, |e| matches!(e, BridgeEvent::Connected { .. })).await;
    assert_eq!(
        event,
        BridgeEvent::Connected {
            client_id: "client-42".to_string()
        }
    );

    client.shutdown().await;
}

#[tokio::test]
async fn connect_while_authenticated_is_a_no_op() {
    let bridge = MockBridge::start(AuthReply::Accept("c-1"), true).await;
    let (client, _events) =
        spawn_client(&fast_settings(), endpoint(&bridge.url, true), ScriptedExecutor::new());

    client.connect().await.unwrap();
    client.connect().await.unwrap();

    assert_eq!(bridge.accepted(), 1);
    assert_eq!(client.status().state, ConnectionState::Authenticated);

    client.shutdown().await;
}

#[tokio::test]
async fn rejected_auth_surfaces_server_text_and_is_not_retried() {
    let bridge = MockBridge::start(AuthReply::Reject("invalid secret"), true).await;
    let (client, mut events) =
        spawn_client(&fast_settings(), endpoint(&bridge.url, true), ScriptedExecutor::new());

    let err = client.connect().await.unwrap_err();
    assert_eq!(
        err,
        BridgeError::AuthenticationFailed("invalid secret".to_string())
    );
    assert!(err.to_string().contains("invalid secret"));

    let event = next_event(&mut events, |e| matches!(e, BridgeEvent::Disconnected { .. })).await;
    assert_eq!(
        event,
        BridgeEvent::Disconnected {
            reason: "authentication failed: invalid secret".to_string(),
            retry_in: None,
        }
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = client.status();
    assert!(!status.connected);
    assert_eq!(status.state, ConnectionState::Idle);
    assert_eq!(bridge.accepted(), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn silent_bridge_times_out_the_handshake() {
    let bridge = MockBridge::start(AuthReply::Ignore, true).await;
    let settings = WebSocketSettings {
        handshake_timeout: Duration::from_millis(150),
        ..fast_settings()
    };
    let (client, _events) =
        spawn_client(&settings, endpoint(&bridge.url, false), ScriptedExecutor::new());

    let err = client.connect().await.unwrap_err();
    assert_eq!(err, BridgeError::HandshakeTimeout(Duration::from_millis(150)));
    assert_eq!(client.status().state, ConnectionState::Closed);

    client.shutdown().await;
}

// =============================================================================
// Signal pipeline
// =============================================================================

#[tokio::test]
async fn signal_is_executed_once_and_result_echoes_it() {
    let mut bridge = MockBridge::start(AuthReply::Accept("c-1"), true).await;
    let executor = ScriptedExecutor::new();
    let (client, mut events) =
        spawn_client(&fast_settings(), endpoint(&bridge.url, true), Arc::clone(&executor));

    client.connect().await.unwrap();
    bridge.send(trade("AAPL", "market"));

    let result = bridge.expect("trade_result").await;
    let payload = &result["payload"];
    assert_eq!(payload["success"], true);
    assert_eq!(payload["orderId"], "O123");
    assert!(payload.get("error").is_none());
    assert_eq!(payload["signal"]["type"], "trade");
    assert_eq!(payload["signal"]["symbol"], "AAPL");
    assert_eq!(payload["signal"]["action"], "BUY");
    assert_eq!(payload["signal"]["pairId"], 7);
    assert_eq!(payload["signal"]["side"], "base");
    assert_eq!(executor.calls(), 1);

    let event = next_event(&mut events, |e| matches!(e, BridgeEvent::TradeResult(_))).await;
    let BridgeEvent::TradeResult(result) = event else {
        unreachable!()
    };
    assert!(result.is_success());
    assert_eq!(result.order_id(), Some("O123"));

    client.shutdown().await;
}

#[tokio::test]
async fn executor_failure_is_reported_as_failed_result() {
    let mut bridge = MockBridge::start(AuthReply::Accept("c-1"), true).await;
    let (client, _events) =
        spawn_client(&fast_settings(), endpoint(&bridge.url, true), ScriptedExecutor::new());

    client.connect().await.unwrap();
    bridge.send(trade("FAIL", "limit"));

    let result = bridge.expect("trade_result").await;
    assert_eq!(result["payload"]["success"], false);
    assert_eq!(result["payload"]["error"], "insufficient buying power");
    assert!(result["payload"].get("orderId").is_none());
    assert_eq!(result["payload"]["signal"]["limitPrice"], 187.5);

    client.shutdown().await;
}

#[tokio::test]
async fn invalid_signal_fails_without_reaching_the_broker() {
    let mut bridge = MockBridge::start(AuthReply::Accept("c-1"), true).await;
    let executor = ScriptedExecutor::new();
    let (client, _events) =
        spawn_client(&fast_settings(), endpoint(&bridge.url, true), Arc::clone(&executor));

    client.connect().await.unwrap();
    let mut signal = trade("AAPL", "limit");
    signal.as_object_mut().unwrap().remove("limitPrice");
    bridge.send(signal);

    let result = bridge.expect("trade_result").await;
    assert_eq!(result["payload"]["success"], false);
    assert!(
        result["payload"]["error"]
            .as_str()
            .unwrap()
            .contains("limitPrice")
    );
    assert_eq!(executor.calls(), 0);

    client.shutdown().await;
}

#[tokio::test]
async fn malformed_messages_are_ignored() {
    let mut bridge = MockBridge::start(AuthReply::Accept("c-1"), true).await;
    let executor = ScriptedExecutor::new();
    let (client, mut events) =
        spawn_client(&fast_settings(), endpoint(&bridge.url, true), Arc::clone(&executor));

    client.connect().await.unwrap();
    bridge.send(json!({"type": "heartbeat_ack"}));
    next_event(&mut events, |e| matches!(e, BridgeEvent::Heartbeat { .. })).await;
    let before = client.status();
    assert!(before.last_heartbeat.is_some());

    bridge.send_raw("{not json");
    bridge.send_raw("[]");
    bridge.send(json!({"type": "mystery", "payload": {}}));
    bridge.send(json!({"type": "auth_success"}));
    bridge.send(trade("MSFT", "market"));

    let result = bridge.expect("trade_result").await;
    assert_eq!(result["payload"]["signal"]["symbol"], "MSFT");
    assert_eq!(executor.calls(), 1);

    let after = client.status();
    assert_eq!(after.state, ConnectionState::Authenticated);
    assert_eq!(after.last_heartbeat, before.last_heartbeat);
    assert_eq!(after.client_id.as_deref(), Some("c-1"));

    client.shutdown().await;
}

// =============================================================================
// Heartbeat
// =============================================================================

#[tokio::test]
async fn heartbeat_ack_updates_last_heartbeat() {
    let mut bridge = MockBridge::start(AuthReply::Accept("c-1"), true).await;
    let settings = WebSocketSettings {
        heartbeat_interval: Duration::from_millis(50),
        ..fast_settings()
    };
    let (client, mut events) =
        spawn_client(&settings, endpoint(&bridge.url, true), ScriptedExecutor::new());

    client.connect().await.unwrap();
    assert!(client.status().last_heartbeat.is_none());

    bridge.expect("heartbeat").await;
    let event = next_event(&mut events, |e| matches!(e, BridgeEvent::Heartbeat { .. })).await;
    let BridgeEvent::Heartbeat { at } = event else {
        unreachable!()
    };

    let last = client.status().last_heartbeat.expect("heartbeat recorded");
    assert!(last >= at);

    client.shutdown().await;
}

#[tokio::test]
async fn unanswered_heartbeats_drop_the_connection() {
    let bridge = MockBridge::start(AuthReply::Accept("c-1"), false).await;
    let settings = WebSocketSettings {
        heartbeat_interval: Duration::from_millis(40),
        heartbeat_timeout: Some(Duration::from_millis(100)),
        ..fast_settings()
    };
    let (client, mut events) =
        spawn_client(&settings, endpoint(&bridge.url, false), ScriptedExecutor::new());

    client.connect().await.unwrap();

    let event = next_event(&mut events, |e| matches!(e, BridgeEvent::Disconnected { .. })).await;
    assert_eq!(
        event,
        BridgeEvent::Disconnected {
            reason: "heartbeat acknowledgment timed out".to_string(),
            retry_in: None,
        }
    );
    assert_eq!(client.status().state, ConnectionState::Closed);

    client.shutdown().await;
}

// =============================================================================
// Reconnect
// =============================================================================

#[tokio::test]
async fn server_close_schedules_reconnect_and_recovers() {
    let mut bridge = MockBridge::start(AuthReply::Accept("c-1"), true).await;
    let settings = WebSocketSettings {
        heartbeat_interval: Duration::from_millis(30),
        reconnect_delay_initial: Duration::from_millis(200),
        reconnect_delay_max: Duration::from_secs(1),
        ..fast_settings()
    };
    let (client, mut events) =
        spawn_client(&settings, endpoint(&bridge.url, true), ScriptedExecutor::new());

    client.connect().await.unwrap();
    next_event(&mut events, |e| matches!(e, BridgeEvent::Heartbeat { .. })).await;
    assert!(client.status().last_heartbeat.is_some());

    bridge.close("server restarting");

    let event = next_event(&mut events, |e| matches!(e, BridgeEvent::Disconnected { .. })).await;
    assert_eq!(
        event,
        BridgeEvent::Disconnected {
            reason: "server restarting".to_string(),
            retry_in: Some(Duration::from_millis(200)),
        }
    );

    let status = client.status();
    assert!(!status.connected);
    assert_eq!(status.state, ConnectionState::ReconnectScheduled);
    assert!(status.client_id.is_none());
    assert!(status.last_heartbeat.is_none());

    // Everything from the closed connection; the next frame is from the retry.
    bridge.drain();

    let event = next_event(&mut events, |e| matches!(e, BridgeEvent::Reconnecting { .. })).await;
    assert_eq!(event, BridgeEvent::Reconnecting { attempt: 1 });

    let first = bridge.next().await;
    assert_eq!(first["type"], "auth", "first frame after reconnect was {first}");

    next_event(&mut events, |e| matches!(e, BridgeEvent::Connected { .. })).await;
    assert_eq!(bridge.accepted(), 2);

    let status = client.status();
    assert!(status.connected);
    assert_eq!(status.reconnect_attempts, 0);

    bridge.expect("heartbeat").await;

    client.shutdown().await;
}

#[tokio::test]
async fn reconnect_gives_up_after_max_attempts() {
    // Bind then drop to get a port that refuses connections.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let url = format!("http://{addr}");
    drop(listener);

    let settings = WebSocketSettings {
        reconnect_delay_initial: Duration::from_millis(10),
        max_reconnect_attempts: 2,
        ..fast_settings()
    };
    let (client, mut events) = spawn_client(&settings, endpoint(&url, true), ScriptedExecutor::new());

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, BridgeError::ConnectionClosed(_)));

    let mut delays = Vec::new();
    let mut attempts = Vec::new();
    loop {
        match next_event(&mut events, |_| true).await {
            BridgeEvent::Disconnected { retry_in, .. } => {
                delays.push(retry_in);
                if retry_in.is_none() {
                    break;
                }
            }
            BridgeEvent::Reconnecting { attempt } => attempts.push(attempt),
            _ => {}
        }
    }

    assert_eq!(
        delays,
        vec![
            Some(Duration::from_millis(10)),
            Some(Duration::from_millis(20)),
            None
        ]
    );
    assert_eq!(attempts, vec![1, 2]);

    let status = client.status();
    assert_eq!(status.state, ConnectionState::Closed);
    assert_eq!(status.reconnect_attempts, 2);

    tokio::time::sleep(Duration::from_millis(150)).await;
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, BridgeEvent::Reconnecting { .. }),
            "retry fired after exhaustion"
        );
    }
    let status = client.status();
    assert!(!status.connected);
    assert_eq!(status.state, ConnectionState::Closed);

    // The bridge comes back; only a manual connect recovers.
    let bridge = MockBridge::start_on(&addr, AuthReply::Accept("c-9"), true).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(bridge.accepted(), 0);

    client.connect().await.unwrap();
    let status = client.status();
    assert!(status.connected);
    assert_eq!(status.client_id.as_deref(), Some("c-9"));
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(bridge.accepted(), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn disconnect_cancels_pending_retry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let settings = WebSocketSettings {
        reconnect_delay_initial: Duration::from_millis(300),
        reconnect_delay_max: Duration::from_secs(1),
        ..fast_settings()
    };
    let (client, mut events) = spawn_client(&settings, endpoint(&url, true), ScriptedExecutor::new());

    assert!(client.connect().await.is_err());
    wait_for_state(&client, ConnectionState::ReconnectScheduled).await;

    client.disconnect().await.unwrap();
    assert_eq!(client.status().state, ConnectionState::Idle);
    assert_eq!(client.status().reconnect_attempts, 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, BridgeEvent::Reconnecting { .. }),
            "retry fired after disconnect"
        );
    }
    assert_eq!(client.status().state, ConnectionState::Idle);

    client.shutdown().await;
}

#[tokio::test]
async fn non_finite_jitter_keeps_the_session_alive() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let settings = WebSocketSettings {
        reconnect_jitter: f64::NAN,
        reconnect_delay_initial: Duration::from_millis(10),
        max_reconnect_attempts: 1,
        ..fast_settings()
    };
    let (client, mut events) = spawn_client(&settings, endpoint(&url, true), ScriptedExecutor::new());

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, BridgeError::ConnectionClosed(_)));

    let mut delays = Vec::new();
    loop {
        if let BridgeEvent::Disconnected { retry_in, .. } = next_event(&mut events, |_| true).await {
            delays.push(retry_in);
            if retry_in.is_none() {
                break;
            }
        }
    }
    assert_eq!(delays, vec![Some(Duration::from_millis(10)), None]);
    assert_eq!(client.status().state, ConnectionState::Closed);

    let second = client.connect().await.unwrap_err();
    assert!(matches!(second, BridgeError::ConnectionClosed(_)), "{second:?}");
    client.disconnect().await.unwrap();
    assert_eq!(client.status().state, ConnectionState::Idle);

    client.shutdown().await;
}

#[tokio::test]
async fn disconnect_during_handshake_rejects_connect_then_reconnects_cleanly() {
    let bridge = MockBridge::start(AuthReply::Ignore, true).await;
    let (client, _events) =
        spawn_client(&fast_settings(), endpoint(&bridge.url, true), ScriptedExecutor::new());
    let client = Arc::new(client);

    let connecting = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.connect().await })
    };
    wait_for_state(&client, ConnectionState::Authenticating).await;

    client.disconnect().await.unwrap();
    let err = connecting.await.unwrap().unwrap_err();
    assert_eq!(err, BridgeError::Cancelled);
    assert_eq!(client.status().state, ConnectionState::Idle);

    // A fresh bridge that accepts; the stale session must not interfere.
    let good = MockBridge::start(AuthReply::Accept("c-2"), true).await;
    let (fresh, _fresh_events) =
        spawn_client(&fast_settings(), endpoint(&good.url, true), ScriptedExecutor::new());
    fresh.connect().await.unwrap();
    assert_eq!(fresh.status().client_id.as_deref(), Some("c-2"));
    assert_eq!(client.status().state, ConnectionState::Idle);

    fresh.shutdown().await;
}

#[tokio::test]
async fn disconnect_while_authenticated_emits_one_event() {
    let bridge = MockBridge::start(AuthReply::Accept("c-1"), true).await;
    let (client, mut events) =
        spawn_client(&fast_settings(), endpoint(&bridge.url, true), ScriptedExecutor::new());

    client.connect().await.unwrap();
    client.disconnect().await.unwrap();
    client.disconnect().await.unwrap();

    let event = next_event(&mut events, |e| matches!(e, BridgeEvent::Disconnected { .. })).await;
    assert_eq!(
        event,
        BridgeEvent::Disconnected {
            reason: "disconnected by client".to_string(),
            retry_in: None,
        }
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, BridgeEvent::Disconnected { .. }));
    }

    let status = client.status();
    assert!(!status.connected);
    assert!(status.client_id.is_none());
    assert_eq!(status.state, ConnectionState::Idle);

    client.shutdown().await;
}

#[tokio::test]
async fn missing_configuration_fails_connect() {
    let (event_tx, _events) = mpsc::channel(16);
    let client = BridgeClient::spawn(
        &fast_settings(),
        Arc::new(StaticConfigProvider::empty()),
        ScriptedExecutor::new(),
        event_tx,
    );

    assert_eq!(client.connect().await, Err(BridgeError::NotConfigured));
    assert_eq!(client.status().state, ConnectionState::Idle);

    client.shutdown().await;
}
