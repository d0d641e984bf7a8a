//! Bridge Session Driver
//!
//! A single task owns the WebSocket and processes every input in order:
//! control commands, transport open, inbound frames, heartbeat ticks, the
//! handshake deadline, the reconnect timer and execution results. Nothing
//! else touches the transport, so state transitions never overlap.
//!
//! # State Machine
//!
//! ```text
//! idle ──connect──▶ connecting ──open──▶ authenticating ──auth_success──▶ authenticated
//!                        │                      │                              │
//!                        └──────────── transport lost / timeout ───────────────┘
//!                                               │
//!                         auto-reconnect & attempts left? ──yes──▶ reconnect_scheduled
//!                                               │                        │
//!                                               no                  timer fires
//!                                               ▼                        ▼
//!                                            closed                  connecting
//! ```
//!
//! `auth_failed` and `disconnect()` return to `idle` without a retry.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::auth::{AuthError, AuthHandler};
use super::client::{BridgeError, BridgeEvent, StatusHandle};
use super::codec::JsonCodec;
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::messages::{AuthFailed, AuthSuccess, BridgeMessage, OutgoingMessage};
use super::reconnect::{ReconnectConfig, ReconnectScheduler};
use crate::application::ports::{ConfigProvider, OrderExecutor};
use crate::application::services::SignalPipeline;
use crate::domain::connection::{ConnectionState, ConnectionStatus, EndpointConfig};
use crate::domain::signal::{TradeResult, TradeSignal};
use crate::infrastructure::config::WebSocketSettings;
use crate::infrastructure::metrics::{self, ResultOutcome};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type OpenFuture = BoxFuture<'static, Result<WsStream, tungstenite::Error>>;
type ConnectReply = oneshot::Sender<Result<(), BridgeError>>;

const RESULT_CHANNEL_CAPACITY: usize = 64;
const HEARTBEAT_CHANNEL_CAPACITY: usize = 4;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Close code reported when the peer sent no status.
const NO_STATUS_CODE: u16 = 1005;

/// Control requests from [`BridgeClient`](super::BridgeClient).
pub(super) enum Command {
    Connect(ConnectReply),
    Disconnect(oneshot::Sender<()>),
}

struct ActiveHeartbeat {
    events: mpsc::Receiver<HeartbeatEvent>,
    cancel: CancellationToken,
}

pub(super) struct Session {
    config_provider: Arc<dyn ConfigProvider>,
    pipeline: SignalPipeline,
    codec: JsonCodec,
    auth: AuthHandler,
    reconnect: ReconnectScheduler,
    heartbeat_config: HeartbeatConfig,
    heartbeat_state: Arc<HeartbeatState>,
    heartbeat: Option<ActiveHeartbeat>,
    handshake_timeout: Duration,

    state: ConnectionState,
    endpoint: Option<EndpointConfig>,
    opening: Option<OpenFuture>,
    transport: Option<WsStream>,
    handshake_deadline: Option<Instant>,
    pending_connect: Option<ConnectReply>,
    client_id: Option<String>,

    commands: mpsc::Receiver<Command>,
    results: mpsc::Receiver<TradeResult>,
    events: mpsc::Sender<BridgeEvent>,
    status: StatusHandle,
    cancel: CancellationToken,
}

impl Session {
    pub(super) fn new(
        settings: &WebSocketSettings,
        config_provider: Arc<dyn ConfigProvider>,
        executor: Arc<dyn OrderExecutor>,
        commands: mpsc::Receiver<Command>,
        events: mpsc::Sender<BridgeEvent>,
        status: StatusHandle,
        cancel: CancellationToken,
    ) -> Self {
        let (results_tx, results_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);

        Self {
            config_provider,
            pipeline: SignalPipeline::new(executor, results_tx),
            codec: JsonCodec::new(),
            auth: AuthHandler::new(),
            reconnect: ReconnectScheduler::new(ReconnectConfig::from_websocket_settings(settings)),
            heartbeat_config: HeartbeatConfig::from_websocket_settings(settings),
            heartbeat_state: Arc::new(HeartbeatState::new()),
            heartbeat: None,
            handshake_timeout: settings.handshake_timeout,
            state: ConnectionState::Idle,
            endpoint: None,
            opening: None,
            transport: None,
            handshake_deadline: None,
            pending_connect: None,
            client_id: None,
            commands,
            results: results_rx,
            events,
            status,
            cancel,
        }
    }

    /// Process session inputs until the client is dropped or shut down.
    pub(super) async fn run(mut self) {
        self.publish_status();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.stop(BridgeError::ClientStopped).await;
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(Command::Connect(reply)) => self.begin_connect(Some(reply)),
                    Some(Command::Disconnect(reply)) => {
                        self.stop(BridgeError::Cancelled).await;
                        let _ = reply.send(());
                    }
                    None => {
                        self.stop(BridgeError::ClientStopped).await;
                        break;
                    }
                },
                opened = poll_opening(&mut self.opening) => self.on_transport_opened(opened).await,
                frame = next_frame(&mut self.transport) => self.on_frame(frame).await,
                event = next_heartbeat(&mut self.heartbeat) => self.on_heartbeat_event(event).await,
                () = sleep_until(self.handshake_deadline) => self.on_handshake_timeout(),
                () = sleep_until(self.reconnect.deadline()) => self.on_reconnect_due(),
                Some(result) = self.results.recv() => self.on_trade_result(result).await,
            }
        }

        tracing::debug!("Bridge session stopped");
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    fn begin_connect(&mut self, reply: Option<ConnectReply>) {
        if self.state.is_active() {
            tracing::debug!(state = %self.state, "Connect ignored, attempt already in progress");
            if let Some(reply) = reply {
                let _ = reply.send(Ok(()));
            }
            return;
        }

        let endpoint = match self.config_provider.endpoint() {
            Ok(Some(endpoint)) => endpoint,
            Ok(None) => return self.abort_connect(reply, BridgeError::NotConfigured),
            Err(e) => return self.abort_connect(reply, BridgeError::Config(e)),
        };

        self.reconnect.cancel();
        self.pending_connect = reply;

        let url = endpoint.stream_url();
        tracing::info!(
            url = %url,
            trading_mode = endpoint.trading_mode.as_str(),
            attempt = self.reconnect.attempt_count(),
            "Connecting to bridge"
        );

        self.endpoint = Some(endpoint);
        self.opening = Some(Box::pin(async move {
            tokio_tungstenite::connect_async(url)
                .await
                .map(|(ws, _response)| ws)
        }));
        self.handshake_deadline = Some(Instant::now() + self.handshake_timeout);
        self.set_state(ConnectionState::Connecting);
    }

    fn abort_connect(&mut self, reply: Option<ConnectReply>, error: BridgeError) {
        tracing::warn!(error = %error, "Cannot connect to bridge");
        match reply {
            Some(reply) => {
                let _ = reply.send(Err(error));
            }
            None => {
                // A retry found no usable configuration; wait for a manual connect.
                self.set_state(ConnectionState::Closed);
                self.notify(BridgeEvent::Disconnected {
                    reason: error.to_string(),
                    retry_in: None,
                });
            }
        }
    }

    async fn on_transport_opened(&mut self, opened: Result<WsStream, tungstenite::Error>) {
        self.opening = None;

        let ws = match opened {
            Ok(ws) => ws,
            Err(e) => {
                self.on_transport_lost(format!("connection failed: {e}"), None);
                return;
            }
        };
        self.transport = Some(ws);

        let Some(endpoint) = self.endpoint.as_ref() else {
            self.on_transport_lost("endpoint configuration missing".to_string(), None);
            return;
        };
        let auth_request = self.auth.create_auth_request(endpoint);
        let frame = match self.codec.encode(&auth_request) {
            Ok(frame) => frame,
            Err(e) => {
                self.on_transport_lost(format!("failed to encode auth: {e}"), None);
                return;
            }
        };

        if let Err(e) = self.send_text(frame).await {
            self.on_transport_lost(format!("failed to send auth: {e}"), None);
            return;
        }

        tracing::debug!("Bridge transport open, authenticating");
        self.set_state(ConnectionState::Authenticating);
    }

    /// Tear down the transport after a loss and arm a retry if allowed.
    ///
    /// `error` is what a pending `connect()` receives; it defaults to
    /// `ConnectionClosed` with the same reason.
    fn on_transport_lost(&mut self, reason: String, error: Option<BridgeError>) {
        self.stop_heartbeat();
        self.heartbeat_state.reset();
        self.opening = None;
        self.transport = None;
        self.handshake_deadline = None;
        self.client_id = None;
        self.auth.reset();

        let auto_reconnect = self.endpoint.as_ref().is_some_and(|e| e.auto_reconnect);
        let retry_in = if auto_reconnect {
            self.reconnect.schedule()
        } else {
            None
        };

        if let Some(delay) = retry_in {
            tracing::warn!(
                reason = %reason,
                attempt = self.reconnect.attempt_count() + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Bridge connection lost, reconnect scheduled"
            );
            self.set_state(ConnectionState::ReconnectScheduled);
        } else {
            if auto_reconnect {
                tracing::error!(
                    reason = %reason,
                    attempts = self.reconnect.attempt_count(),
                    "Bridge connection lost, reconnect attempts exhausted"
                );
            } else {
                tracing::warn!(reason = %reason, "Bridge connection lost");
            }
            self.set_state(ConnectionState::Closed);
        }

        if let Some(reply) = self.pending_connect.take() {
            let error = error.unwrap_or_else(|| BridgeError::ConnectionClosed(reason.clone()));
            let _ = reply.send(Err(error));
        }

        self.notify(BridgeEvent::Disconnected { reason, retry_in });
    }

    fn on_handshake_timeout(&mut self) {
        self.handshake_deadline = None;
        let timeout = self.handshake_timeout;
        tracing::warn!(
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            state = %self.state,
            "Bridge handshake timed out"
        );
        self.on_transport_lost(
            format!("handshake timed out after {}ms", timeout.as_millis()),
            Some(BridgeError::HandshakeTimeout(timeout)),
        );
    }

    fn on_reconnect_due(&mut self) {
        let attempt = self.reconnect.fire();
        metrics::record_reconnect();
        tracing::info!(
            attempt,
            max_attempts = self.reconnect.max_attempts(),
            "Reconnecting to bridge"
        );
        self.notify(BridgeEvent::Reconnecting { attempt });
        self.begin_connect(None);
    }

    /// Return to idle: cancel timers, close the transport, reject a pending
    /// connect with `error`. Never schedules a retry.
    async fn stop(&mut self, error: BridgeError) {
        let was_active = self.state.is_active();

        self.reconnect.reset();
        self.stop_heartbeat();
        self.heartbeat_state.reset();
        self.opening = None;
        self.handshake_deadline = None;
        self.close_transport().await;
        self.client_id = None;
        self.auth.reset();

        self.set_state(ConnectionState::Idle);

        if let Some(reply) = self.pending_connect.take() {
            let _ = reply.send(Err(error));
        }

        if was_active {
            tracing::info!("Bridge connection closed by client");
            self.notify(BridgeEvent::Disconnected {
                reason: "disconnected by client".to_string(),
                retry_in: None,
            });
        }
    }

    async fn close_transport(&mut self) {
        let Some(mut ws) = self.transport.take() else {
            return;
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await {
            Ok(Ok(())) => tracing::debug!("Bridge transport closed"),
            Ok(Err(e)) => tracing::debug!(error = %e, "Bridge transport close failed"),
            Err(_) => tracing::debug!("Bridge transport close timed out"),
        }
    }

    // =========================================================================
    // Inbound frames
    // =========================================================================

    async fn on_frame(&mut self, frame: Option<Result<Message, tungstenite::Error>>) {
        match frame {
            Some(Ok(Message::Text(text))) => self.on_text(text.as_str()).await,
            Some(Ok(Message::Binary(data))) => {
                tracing::warn!(len = data.len(), "Dropping binary bridge frame");
                metrics::record_message_dropped("binary");
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = close_reason(frame.as_ref());
                tracing::info!(reason = %reason, "Bridge sent close frame");
                self.on_transport_lost(reason, None);
            }
            Some(Ok(_)) => {
                // Ping/pong are answered by the transport.
            }
            Some(Err(e)) => {
                self.on_transport_lost(format!("transport error: {e}"), None);
            }
            None => {
                self.on_transport_lost(close_reason(None), None);
            }
        }
    }

    async fn on_text(&mut self, text: &str) {
        let message = match self.codec.decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable bridge message");
                metrics::record_message_dropped(e.reason());
                return;
            }
        };

        tracing::trace!(kind = message.kind(), "Bridge message received");

        match message {
            BridgeMessage::AuthSuccess(reply) => self.on_auth_success(reply).await,
            BridgeMessage::AuthFailed(reply) => self.on_auth_failed(reply).await,
            BridgeMessage::HeartbeatAck => self.on_heartbeat_ack(),
            BridgeMessage::Trade(signal) => self.on_signal(signal),
        }
    }

    async fn on_auth_success(&mut self, reply: AuthSuccess) {
        match self.auth.on_success(reply) {
            Ok(client_id) => {
                self.handshake_deadline = None;
                self.reconnect.reset();
                self.client_id = Some(client_id.clone());
                self.set_state(ConnectionState::Authenticated);
                self.start_heartbeat();

                tracing::info!(client_id = %client_id, "Authenticated with bridge");
                self.notify(BridgeEvent::Connected { client_id });

                if let Some(reply) = self.pending_connect.take() {
                    let _ = reply.send(Ok(()));
                }
            }
            Err(AuthError::UnexpectedReply(state)) => {
                tracing::warn!(?state, "Ignoring auth_success outside of the handshake");
                metrics::record_message_dropped("unexpected");
            }
            Err(e) => self.reject_handshake(e.to_string()).await,
        }
    }

    async fn on_auth_failed(&mut self, reply: AuthFailed) {
        match self.auth.on_failure(reply) {
            Ok(rejection) => self.reject_handshake(rejection.to_string()).await,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring auth_failed outside of the handshake");
                metrics::record_message_dropped("unexpected");
            }
        }
    }

    /// Close after a rejected handshake. Not retried.
    async fn reject_handshake(&mut self, error: String) {
        tracing::warn!(error = %error, "Bridge rejected authentication");

        self.handshake_deadline = None;
        self.stop_heartbeat();
        self.heartbeat_state.reset();
        self.reconnect.cancel();
        self.close_transport().await;
        self.client_id = None;
        self.auth.reset();
        self.set_state(ConnectionState::Idle);

        if let Some(reply) = self.pending_connect.take() {
            let _ = reply.send(Err(BridgeError::AuthenticationFailed(error.clone())));
        }
        self.notify(BridgeEvent::Disconnected {
            reason: format!("authentication failed: {error}"),
            retry_in: None,
        });
    }

    fn on_heartbeat_ack(&mut self) {
        if self.state != ConnectionState::Authenticated {
            tracing::debug!(state = %self.state, "Ignoring heartbeat_ack while not authenticated");
            metrics::record_message_dropped("unexpected");
            return;
        }

        let at = self.heartbeat_state.record_ack();
        metrics::record_heartbeat_acked();
        self.publish_status();
        self.notify(BridgeEvent::Heartbeat { at });
    }

    fn on_signal(&mut self, signal: TradeSignal) {
        if self.state != ConnectionState::Authenticated {
            tracing::warn!(
                state = %self.state,
                symbol = %signal.symbol,
                "Ignoring trade signal while not authenticated"
            );
            metrics::record_message_dropped("unauthenticated");
            return;
        }

        metrics::record_signal_received(signal.action);
        tracing::info!(
            action = %signal.action,
            symbol = %signal.symbol,
            pair_id = signal.pair_id,
            "Trade signal received"
        );

        self.notify(BridgeEvent::SignalReceived(signal.clone()));
        drop(self.pipeline.dispatch(signal));
    }

    // =========================================================================
    // Heartbeat
    // =========================================================================

    fn start_heartbeat(&mut self) {
        self.stop_heartbeat();

        let (event_tx, event_rx) = mpsc::channel(HEARTBEAT_CHANNEL_CAPACITY);
        let cancel = self.cancel.child_token();
        let manager = HeartbeatManager::new(
            self.heartbeat_config.clone(),
            Arc::clone(&self.heartbeat_state),
            event_tx,
            cancel.clone(),
        );
        tokio::spawn(manager.run());

        self.heartbeat = Some(ActiveHeartbeat {
            events: event_rx,
            cancel,
        });
    }

    /// Dropping the receiver discards pings the monitor already queued.
    fn stop_heartbeat(&mut self) {
        if let Some(active) = self.heartbeat.take() {
            active.cancel.cancel();
        }
    }

    async fn on_heartbeat_event(&mut self, event: Option<HeartbeatEvent>) {
        match event {
            Some(HeartbeatEvent::SendPing) => {
                if self.state != ConnectionState::Authenticated || self.transport.is_none() {
                    return;
                }
                let frame = match self.codec.encode(&OutgoingMessage::Heartbeat) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode heartbeat");
                        return;
                    }
                };
                match self.send_text(frame).await {
                    Ok(()) => {
                        self.heartbeat_state.mark_ping_sent();
                        metrics::record_heartbeat_sent();
                    }
                    Err(e) => tracing::debug!(error = %e, "Failed to send heartbeat"),
                }
            }
            Some(HeartbeatEvent::Timeout) => {
                self.on_transport_lost("heartbeat acknowledgment timed out".to_string(), None);
            }
            None => {
                if self.state == ConnectionState::Authenticated {
                    tracing::warn!("Heartbeat monitor stopped while authenticated");
                }
                self.heartbeat = None;
            }
        }
    }

    // =========================================================================
    // Outbound results
    // =========================================================================

    async fn on_trade_result(&mut self, result: TradeResult) {
        if self.state == ConnectionState::Authenticated && self.transport.is_some() {
            match self.codec.encode(&OutgoingMessage::trade_result(&result)) {
                Ok(frame) => match self.send_text(frame).await {
                    Ok(()) => {
                        metrics::record_result_sent(ResultOutcome::from_success(
                            result.is_success(),
                        ));
                        tracing::info!(
                            success = result.is_success(),
                            order_id = result.order_id(),
                            error = result.error(),
                            symbol = %result.signal.symbol,
                            pair_id = result.signal.pair_id,
                            "Trade result sent"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to send trade result, dropping it");
                        metrics::record_result_dropped();
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode trade result, dropping it");
                    metrics::record_result_dropped();
                }
            }
        } else {
            tracing::warn!(
                state = %self.state,
                symbol = %result.signal.symbol,
                pair_id = result.signal.pair_id,
                "Transport not open, dropping trade result"
            );
            metrics::record_result_dropped();
        }

        self.notify(BridgeEvent::TradeResult(result));
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn send_text(&mut self, frame: String) -> Result<(), BridgeError> {
        let Some(ws) = self.transport.as_mut() else {
            return Err(BridgeError::Transport("transport not open".to_string()));
        };
        ws.send(Message::Text(frame.into()))
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "Bridge state changed");
        }
        self.state = state;
        metrics::set_connection_state(state);
        self.publish_status();
    }

    fn publish_status(&self) {
        let authenticated = self.state == ConnectionState::Authenticated;
        let client_id = if authenticated {
            self.client_id.clone()
        } else {
            None
        };

        self.status.publish(ConnectionStatus {
            connected: client_id.is_some(),
            client_id,
            last_heartbeat: self.heartbeat_state.last_ack(),
            state: self.state,
            reconnect_attempts: self.reconnect.attempt_count(),
        });
    }

    /// Never blocks the session; a full or closed event channel drops the
    /// notification.
    fn notify(&self, event: BridgeEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(?event, "Event channel full, notification dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("Event receiver gone, notification dropped");
            }
        }
    }
}

/// Human-readable reason for a closed transport.
fn close_reason(frame: Option<&CloseFrame>) -> String {
    match frame {
        Some(frame) if !frame.reason.as_str().trim().is_empty() => {
            frame.reason.as_str().to_string()
        }
        Some(frame) => format!("connection closed ({})", u16::from(frame.code)),
        None => format!("connection closed ({NO_STATUS_CODE})"),
    }
}

async fn poll_opening(opening: &mut Option<OpenFuture>) -> Result<WsStream, tungstenite::Error> {
    match opening {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn next_frame(
    transport: &mut Option<WsStream>,
) -> Option<Result<Message, tungstenite::Error>> {
    match transport {
        Some(ws) => ws.next().await,
        None => pending().await,
    }
}

async fn next_heartbeat(active: &mut Option<ActiveHeartbeat>) -> Option<HeartbeatEvent> {
    match active {
        Some(active) => active.events.recv().await,
        None => pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}
