//! Client socket for the message-RPC protocol.
//!
//! One [`RpcSocket`] wraps one WebSocket connection. The handshake runs
//! inline during [`RpcSocket::connect`]; afterwards a spawned event loop
//! owns the stream and handles:
//!
//! - Outgoing calls from the adapter
//! - Incoming results and errors, correlated by [`CallId`]
//! - Server-pushed notifications, forwarded to the notification bus
//!
//! The socket never reconnects by itself; when the event loop terminates it
//! signals the adapter through the closed receiver returned by `connect`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value, from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use crate::adapter::ConnectionParams;
use crate::bus::{DATA_CHANNEL, Notice, NotificationBus};
use crate::config::WampEndpoint;
use crate::error::{Error, Result};
use crate::protocol::{CallId, WireMessage, message};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for one call round-trip.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending calls before rejecting new ones.
const MAX_PENDING_CALLS: usize = 100;

/// Timeout for the connect + authentication handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Map of call IDs to response channels.
type CorrelationMap = FxHashMap<CallId, oneshot::Sender<Result<Value>>>;

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the event loop.
enum SocketCommand {
    /// Send a call and wait for its result.
    Call {
        call_id: CallId,
        message: WireMessage,
        response_tx: oneshot::Sender<Result<Value>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(CallId),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// RpcSocket
// ============================================================================

/// One authenticated message-RPC connection.
///
/// Cheap to clone; clones share the same event loop. All operations are
/// non-blocking.
#[derive(Debug)]
pub struct RpcSocket {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Server-assigned session identifier.
    session: String,
}

impl Clone for RpcSocket {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            correlation: Arc::clone(&self.correlation),
            session: self.session.clone(),
        }
    }
}

impl RpcSocket {
    /// Dials the endpoint and completes the authentication handshake.
    ///
    /// Returns the socket plus a receiver that fires when the event loop
    /// terminates (orderly close or transport failure); the adapter uses it
    /// to drive reconnection.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] / [`Error::WebSocket`] if dialing fails
    /// - [`Error::ConnectionTimeout`] if the handshake stalls
    /// - [`Error::AuthRejected`] if the server refuses the credentials
    pub async fn connect(
        endpoint: &WampEndpoint,
        params: &ConnectionParams,
        bus: NotificationBus,
    ) -> Result<(Self, oneshot::Receiver<()>)> {
        let (mut ws_stream, _) = timeout(HANDSHAKE_TIMEOUT, connect_async(endpoint.url.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(HANDSHAKE_TIMEOUT.as_millis() as u64))??;

        let hello = WireMessage::Hello {
            realm: endpoint.realm.clone(),
            authid: params.principal().map(str::to_string),
            authmethods: if params.has_credentials() {
                vec![params.method().as_str().to_string()]
            } else {
                Vec::new()
            },
        };
        send_message(&mut ws_stream, &hello).await?;

        let session = timeout(HANDSHAKE_TIMEOUT, handshake(&mut ws_stream, params))
            .await
            .map_err(|_| Error::connection_timeout(HANDSHAKE_TIMEOUT.as_millis() as u64))??;

        debug!(%session, url = %endpoint.url, "Session established");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            bus,
            closed_tx,
        ));

        Ok((
            Self {
                command_tx,
                correlation,
                session,
            },
            closed_rx,
        ))
    }

    /// Returns the server-assigned session identifier.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Issues a call with the default timeout (30s).
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::RequestTimeout`] if the result does not arrive in time
    /// - [`Error::QueueFull`] if too many calls are pending
    /// - [`Error::CallFailed`] if the remote end fails the call
    pub async fn call(
        &self,
        procedure: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value> {
        self.call_with_timeout(procedure, args, kwargs, DEFAULT_CALL_TIMEOUT)
            .await
    }

    /// Issues a call with a custom timeout.
    ///
    /// # Errors
    ///
    /// Same as [`RpcSocket::call`].
    pub async fn call_with_timeout(
        &self,
        procedure: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        call_timeout: Duration,
    ) -> Result<Value> {
        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_CALLS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_CALLS,
                    "Too many pending calls"
                );
                return Err(Error::queue_full(MAX_PENDING_CALLS));
            }
        }

        let call_id = CallId::generate();
        let message = WireMessage::Call {
            id: call_id,
            procedure: procedure.to_string(),
            args,
            kwargs,
        };

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(SocketCommand::Call {
                call_id,
                message,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(call_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Timeout - clean up correlation entry
                let _ = self
                    .command_tx
                    .send(SocketCommand::RemoveCorrelation(call_id));

                Err(Error::request_timeout(
                    call_id,
                    call_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the number of pending calls.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Shuts down the connection gracefully.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(SocketCommand::Shutdown);
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// Runs the post-hello handshake until `welcome` or `abort`.
async fn handshake(ws_stream: &mut WsStream, params: &ConnectionParams) -> Result<String> {
    loop {
        let message = ws_stream.next().await.ok_or(Error::ConnectionClosed)??;

        match message {
            Message::Text(text) => match from_str::<WireMessage>(text.as_str())? {
                WireMessage::Challenge { method, nonce } => {
                    let responder = params.responder().ok_or_else(|| {
                        Error::auth_rejected(format!("challenge {method} without credentials"))
                    })?;
                    let reply = WireMessage::Authenticate {
                        signature: responder(&nonce),
                    };
                    send_message(ws_stream, &reply).await?;
                }

                WireMessage::Welcome { session } => return Ok(session),

                WireMessage::Abort { reason, message } => {
                    let detail = message.unwrap_or_else(|| reason.clone());
                    return Err(if message::is_auth_reason(&reason) {
                        Error::auth_rejected(detail)
                    } else {
                        Error::connection(detail)
                    });
                }

                other => {
                    return Err(Error::protocol(format!(
                        "unexpected message during handshake: {other:?}"
                    )));
                }
            },

            Message::Close(_) => return Err(Error::ConnectionClosed),

            // Ignore Binary, Ping, Pong
            _ => {}
        }
    }
}

/// Serializes and sends one message.
async fn send_message(ws_stream: &mut WsStream, message: &WireMessage) -> Result<()> {
    let json = to_string(message)?;
    ws_stream.send(Message::Text(json.into())).await?;
    Ok(())
}

// ============================================================================
// Event Loop
// ============================================================================

/// Event loop that handles WebSocket I/O after the handshake.
async fn run_event_loop(
    ws_stream: WsStream,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    correlation: Arc<Mutex<CorrelationMap>>,
    bus: NotificationBus,
    closed_tx: oneshot::Sender<()>,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            // Incoming messages from the server
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if handle_incoming_message(text.as_str(), &correlation, &bus) {
                            break;
                        }
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!("WebSocket closed by remote");
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            // Commands from the adapter
            command = command_rx.recv() => {
                match command {
                    Some(SocketCommand::Call { call_id, message, response_tx }) => {
                        handle_call_command(
                            call_id,
                            message,
                            response_tx,
                            &mut ws_write,
                            &correlation,
                        ).await;
                    }

                    Some(SocketCommand::RemoveCorrelation(call_id)) => {
                        correlation.lock().remove(&call_id);
                        debug!(%call_id, "Removed timed-out correlation");
                    }

                    Some(SocketCommand::Shutdown) => {
                        debug!("Shutdown command received");
                        let _ = ws_write.close().await;
                        break;
                    }

                    None => {
                        debug!("Command channel closed");
                        break;
                    }
                }
            }
        }
    }

    // Fail all pending calls, then signal the adapter
    fail_pending_calls(&correlation);
    let _ = closed_tx.send(());

    debug!("Event loop terminated");
}

/// Handles an incoming text message. Returns `true` to terminate the loop.
fn handle_incoming_message(
    text: &str,
    correlation: &Arc<Mutex<CorrelationMap>>,
    bus: &NotificationBus,
) -> bool {
    let message = match from_str::<WireMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, text, "Failed to parse incoming message");
            return false;
        }
    };

    match message {
        WireMessage::CallResult { id, payload } => {
            let tx = correlation.lock().remove(&id);
            if let Some(tx) = tx {
                let _ = tx.send(Ok(payload.unwrap_or(Value::Null)));
            } else {
                warn!(%id, "Result for unknown call");
            }
            false
        }

        WireMessage::CallError { id, error, message } => {
            let tx = correlation.lock().remove(&id);
            if let Some(tx) = tx {
                let detail = message.unwrap_or_else(|| error.clone());
                let _ = tx.send(Err(Error::call_failed(error, detail)));
            } else {
                warn!(%id, "Error for unknown call");
            }
            false
        }

        WireMessage::Notify { topic, payload } => {
            trace!(%topic, "Notification received");
            if topic == "auth_failed" {
                let reason = payload
                    .as_ref()
                    .and_then(Value::as_str)
                    .unwrap_or("auth_failed")
                    .to_string();
                bus.publish(DATA_CHANNEL, Notice::AuthFailed { reason });
            }
            false
        }

        WireMessage::Goodbye { reason } => {
            debug!(%reason, "Goodbye from server");
            true
        }

        other => {
            warn!(?other, "Unexpected message outside handshake");
            false
        }
    }
}

/// Handles an outgoing call command.
async fn handle_call_command(
    call_id: CallId,
    message: WireMessage,
    response_tx: oneshot::Sender<Result<Value>>,
    ws_write: &mut futures_util::stream::SplitSink<WsStream, Message>,
    correlation: &Arc<Mutex<CorrelationMap>>,
) {
    // Serialize call
    let json = match to_string(&message) {
        Ok(j) => j,
        Err(e) => {
            let _ = response_tx.send(Err(Error::Json(e)));
            return;
        }
    };

    // Store correlation before sending
    correlation.lock().insert(call_id, response_tx);

    // Send over WebSocket
    if let Err(e) = ws_write.send(Message::Text(json.into())).await {
        // Remove correlation and notify caller
        if let Some(tx) = correlation.lock().remove(&call_id) {
            let _ = tx.send(Err(Error::connection(e.to_string())));
        }
    }

    trace!(%call_id, "Call sent");
}

/// Fails all pending calls with ConnectionClosed.
fn fail_pending_calls(correlation: &Arc<Mutex<CorrelationMap>>) {
    let pending: Vec<_> = correlation.lock().drain().collect();
    let count = pending.len();

    for (_, tx) in pending {
        let _ = tx.send(Err(Error::ConnectionClosed));
    }

    if count > 0 {
        debug!(count, "Failed pending calls on shutdown");
    }
}

// ============================================================================
// Tests
// ============================================================================
