//! Message-RPC adapter: owns the persistent connection.
//!
//! The adapter holds at most one [`RpcSocket`]. Whenever new connection
//! parameters arrive via `configure`, the current socket is torn down and a
//! fresh connection is opened with the new parameters; a mid-session fatal
//! disconnect triggers the same reconnect loop.
//!
//! Reconnect attempts are paced by the configured [`RetryPolicy`]; the
//! attempt counter resets to zero on every successful open. Rejected
//! credentials stop the loop immediately — retrying them cannot succeed.
//!
//! Calls issued while the connection is opening are parked in a bounded
//! queue and resolved once the connection settles or the retry budget is
//! exhausted; overflow is an explicit error rather than unbounded growth.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::bus::{DATA_CHANNEL, Notice, NotificationBus};
use crate::config::{RetryPolicy, WampEndpoint};
use crate::error::{Error, Result};
use crate::routes::{Protocol, RouteEntry};
use crate::transport::RpcSocket;

use super::{CallArgs, ConnectionParams, keyword, positional};

// ============================================================================
// Constants
// ============================================================================

/// Maximum calls parked while the connection is opening.
const MAX_QUEUED_CALLS: usize = 64;

// ============================================================================
// Link
// ============================================================================

/// Connection lifecycle state.
enum Link {
    /// No connection and none in progress.
    Idle,
    /// A connect attempt is in flight; calls queue.
    Connecting,
    /// Session established.
    Open(RpcSocket),
    /// Credentials were rejected; parked until reconfigured.
    Refused(String),
    /// Retry budget exhausted; parked until reconfigured.
    Unavailable(u32),
}

// ============================================================================
// Shared State
// ============================================================================

struct RpcInner {
    /// Current connection parameters.
    params: ConnectionParams,
    /// Connection state.
    link: Link,
    /// Reconnect attempt counter; reset to zero on every successful open.
    attempts: u32,
    /// Bumped by `configure` to cancel stale reconnect loops.
    epoch: u64,
    /// Calls waiting for the connection to settle.
    queue: Vec<oneshot::Sender<Result<RpcSocket>>>,
}

struct RpcShared {
    /// Endpoint from configuration; `None` leaves the adapter unconfigured.
    endpoint: Option<WampEndpoint>,
    /// Reconnect policy.
    retry: RetryPolicy,
    /// Bus for transport notifications.
    bus: NotificationBus,
    /// Mutable state.
    inner: Mutex<RpcInner>,
}

// ============================================================================
// RpcAdapter
// ============================================================================

/// The message-RPC protocol adapter.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct RpcAdapter {
    shared: Arc<RpcShared>,
}

impl RpcAdapter {
    /// Creates an adapter.
    ///
    /// With `endpoint = None` the adapter starts unconfigured and every
    /// call fails until the configuration is corrected.
    #[must_use]
    pub fn new(endpoint: Option<WampEndpoint>, retry: RetryPolicy, bus: NotificationBus) -> Self {
        Self {
            shared: Arc::new(RpcShared {
                endpoint,
                retry,
                bus,
                inner: Mutex::new(RpcInner {
                    params: ConnectionParams::anonymous(),
                    link: Link::Idle,
                    attempts: 0,
                    epoch: 0,
                    queue: Vec::new(),
                }),
            }),
        }
    }

    /// Replaces the connection parameters and reopens the connection.
    ///
    /// The previous socket is torn down; in-flight calls on it fail and may
    /// be retried by their callers. Calls already parked in the queue carry
    /// over to the new connection.
    pub fn configure(&self, params: ConnectionParams) {
        if self.shared.endpoint.is_none() {
            warn!("No server configured; connection parameters ignored");
            return;
        }

        let epoch = {
            let mut inner = self.shared.inner.lock();
            inner.params = params;
            inner.epoch += 1;
            inner.attempts = 0;

            if let Link::Open(socket) = std::mem::replace(&mut inner.link, Link::Connecting) {
                socket.shutdown();
            }
            inner.epoch
        };

        debug!(epoch, "Connection parameters changed; reconnecting");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(run(shared, epoch));
    }

    /// Executes a route over the connection.
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolUnsupported`] if the entry lacks a wamp descriptor
    /// - [`Error::Unconfigured`] if no server is configured
    /// - [`Error::QueueFull`] if too many calls are parked
    /// - [`Error::Unavailable`] / [`Error::AuthRejected`] while parked
    /// - transport and remote errors from the call itself
    pub async fn execute(&self, name: &str, entry: &RouteEntry, args: CallArgs) -> Result<Value> {
        let descriptor = entry
            .wamp
            .as_ref()
            .ok_or_else(|| Error::protocol_unsupported(name, Protocol::Wamp))?;

        let socket = self.ready_socket().await?;

        let args_out = positional(&args, &descriptor.args);
        let kwargs = keyword(&args, &descriptor.kargs);

        socket.call(&descriptor.rpc, args_out, kwargs).await
    }

    /// Returns the open socket, parking the caller while connecting.
    async fn ready_socket(&self) -> Result<RpcSocket> {
        let waiter = {
            let mut inner = self.shared.inner.lock();
            match &inner.link {
                Link::Open(socket) => return Ok(socket.clone()),

                Link::Refused(reason) => return Err(Error::auth_rejected(reason.clone())),

                Link::Unavailable(attempts) => return Err(Error::unavailable(*attempts)),

                Link::Idle => {
                    if self.shared.endpoint.is_none() {
                        return Err(Error::unconfigured(Protocol::Wamp));
                    }
                    // First call before any explicit configure: open with
                    // the current parameters and park this call.
                    inner.link = Link::Connecting;
                    let epoch = inner.epoch;
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(run(shared, epoch));

                    let (tx, rx) = oneshot::channel();
                    inner.queue.push(tx);
                    rx
                }

                Link::Connecting => {
                    if inner.queue.len() >= MAX_QUEUED_CALLS {
                        return Err(Error::queue_full(MAX_QUEUED_CALLS));
                    }
                    let (tx, rx) = oneshot::channel();
                    inner.queue.push(tx);
                    rx
                }
            }
        };

        waiter.await.map_err(|_| Error::ConnectionClosed)?
    }
}

// ============================================================================
// Reconnect Loop
// ============================================================================

/// Connection task for one epoch: connect with retries, then watch for a
/// fatal disconnect and reconnect. Exits when the epoch goes stale or the
/// adapter parks.
async fn run(shared: Arc<RpcShared>, epoch: u64) {
    let Some(endpoint) = shared.endpoint.clone() else {
        return;
    };

    loop {
        let Some(closed) = connect_with_retry(&shared, &endpoint, epoch).await else {
            return;
        };

        let _ = closed.await;

        {
            let mut inner = shared.inner.lock();
            if inner.epoch != epoch {
                return;
            }
            inner.link = Link::Connecting;
        }
        warn!("Connection lost; reconnecting");
    }
}

/// One connect-with-retries pass. Returns the closed receiver of the newly
/// opened socket, or `None` when the epoch went stale or the adapter parked.
async fn connect_with_retry(
    shared: &Arc<RpcShared>,
    endpoint: &WampEndpoint,
    epoch: u64,
) -> Option<oneshot::Receiver<()>> {
    loop {
        let (params, attempt) = {
            let mut inner = shared.inner.lock();
            if inner.epoch != epoch {
                return None;
            }
            inner.attempts += 1;
            (inner.params.clone(), inner.attempts)
        };

        debug!(attempt, url = %endpoint.url, "Opening connection");

        match RpcSocket::connect(endpoint, &params, shared.bus.clone()).await {
            Ok((socket, closed_rx)) => {
                let waiters = {
                    let mut inner = shared.inner.lock();
                    if inner.epoch != epoch {
                        socket.shutdown();
                        return None;
                    }
                    inner.attempts = 0;
                    inner.link = Link::Open(socket.clone());
                    std::mem::take(&mut inner.queue)
                };

                for tx in waiters {
                    let _ = tx.send(Ok(socket.clone()));
                }

                shared.bus.publish(
                    DATA_CHANNEL,
                    Notice::Opened {
                        authenticated: params.has_credentials(),
                    },
                );
                info!(session = socket.session(), "Connection open");

                return Some(closed_rx);
            }

            Err(Error::AuthRejected { reason }) => {
                let waiters = {
                    let mut inner = shared.inner.lock();
                    if inner.epoch != epoch {
                        return None;
                    }
                    inner.link = Link::Refused(reason.clone());
                    std::mem::take(&mut inner.queue)
                };

                for tx in waiters {
                    let _ = tx.send(Err(Error::auth_rejected(reason.clone())));
                }

                warn!(%reason, "Credentials rejected; not retrying");
                shared.bus.publish(DATA_CHANNEL, Notice::AuthFailed { reason });

                return None;
            }

            Err(err) => {
                warn!(error = %err, attempt, "Connection attempt failed");

                if shared.retry.exhausted(attempt) {
                    let waiters = {
                        let mut inner = shared.inner.lock();
                        if inner.epoch != epoch {
                            return None;
                        }
                        inner.link = Link::Unavailable(attempt);
                        std::mem::take(&mut inner.queue)
                    };

                    for tx in waiters {
                        let _ = tx.send(Err(Error::unavailable(attempt)));
                    }

                    shared
                        .bus
                        .publish(DATA_CHANNEL, Notice::Unavailable { attempts: attempt });

                    return None;
                }

                tokio::time::sleep(shared.retry.delay()).await;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::auth::AuthMethod;
    use crate::routes::RouteTable;
    use crate::transport::testserver::TestServer;

    const ROUTES: &str = r#"{
        "routes": {
            "echo": {
                "return": "text",
                "wamp": { "rpc": "com.app.echo", "args": ["value"] }
            }
        }
    }"#;

    fn echo_args(value: &str) -> CallArgs {
        let mut args = CallArgs::new();
        args.insert("value".to_string(), Value::from(value));
        args
    }

    fn echo_entry(table: &RouteTable) -> &RouteEntry {
        table.lookup("echo").expect("route")
    }

    fn fast_retry(max: i32) -> RetryPolicy {
        RetryPolicy::new(max, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_execute_unconfigured() {
        let table = RouteTable::from_json(ROUTES).expect("routes");
        let adapter = RpcAdapter::new(None, RetryPolicy::default(), NotificationBus::new());

        let err = adapter
            .execute("echo", echo_entry(&table), echo_args("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unconfigured { .. }));
    }

    #[tokio::test]
    async fn test_call_queued_during_connect_then_resolves() {
        let server = TestServer::spawn("pw").await;
        let table = RouteTable::from_json(ROUTES).expect("routes");
        let adapter = RpcAdapter::new(
            Some(server.endpoint()),
            fast_retry(-1),
            NotificationBus::new(),
        );

        // configure() flips the link to Connecting synchronously; the call
        // parks in the queue and resolves once the handshake completes.
        adapter.configure(ConnectionParams::anonymous());

        let result = adapter
            .execute("echo", echo_entry(&table), echo_args("hi"))
            .await
            .expect("call");
        assert_eq!(result, Value::from("hi"));
    }

    #[tokio::test]
    async fn test_lazy_connect_without_configure() {
        let server = TestServer::spawn("pw").await;
        let table = RouteTable::from_json(ROUTES).expect("routes");
        let adapter = RpcAdapter::new(
            Some(server.endpoint()),
            fast_retry(-1),
            NotificationBus::new(),
        );

        let result = adapter
            .execute("echo", echo_entry(&table), echo_args("lazy"))
            .await
            .expect("call");
        assert_eq!(result, Value::from("lazy"));
    }

    #[tokio::test]
    async fn test_configure_reconnects_with_new_parameters() {
        let server = TestServer::spawn("pw").await;
        let table = RouteTable::from_json(ROUTES).expect("routes");
        let adapter = RpcAdapter::new(
            Some(server.endpoint()),
            fast_retry(-1),
            NotificationBus::new(),
        );

        adapter.configure(ConnectionParams::anonymous());
        adapter
            .execute("echo", echo_entry(&table), echo_args("one"))
            .await
            .expect("first call");
        assert_eq!(server.connection_count(), 1);

        adapter.configure(ConnectionParams::with_credentials(
            AuthMethod::Ticket,
            "alice".to_string(),
            "pw".to_string(),
        ));
        adapter
            .execute("echo", echo_entry(&table), echo_args("two"))
            .await
            .expect("second call");
        assert_eq!(server.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_retry_zero_means_single_attempt() {
        // Bind a port, then drop the listener so connects are refused.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let endpoint = WampEndpoint {
            url: url::Url::parse(&format!("ws://127.0.0.1:{port}")).expect("url"),
            realm: "test".to_string(),
        };

        let bus = NotificationBus::new();
        let mut data_rx = bus.subscribe(DATA_CHANNEL);
        let table = RouteTable::from_json(ROUTES).expect("routes");
        let adapter = RpcAdapter::new(Some(endpoint), fast_retry(0), bus);

        adapter.configure(ConnectionParams::anonymous());

        // Single attempt, no retries.
        let notice = data_rx.recv().await.expect("notice");
        assert_eq!(notice, Notice::Unavailable { attempts: 1 });

        let err = adapter
            .execute("echo", echo_entry(&table), echo_args("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable { attempts: 1 }));
    }

    #[tokio::test]
    async fn test_rejected_credentials_park_without_retry() {
        let server = TestServer::spawn("pw").await;
        let bus = NotificationBus::new();
        let mut data_rx = bus.subscribe(DATA_CHANNEL);
        let table = RouteTable::from_json(ROUTES).expect("routes");
        let adapter = RpcAdapter::new(Some(server.endpoint()), fast_retry(-1), bus);

        adapter.configure(ConnectionParams::with_credentials(
            AuthMethod::Ticket,
            "alice".to_string(),
            "wrong".to_string(),
        ));

        let notice = data_rx.recv().await.expect("notice");
        assert!(matches!(notice, Notice::AuthFailed { .. }));

        // Unlimited retries configured, yet a bad secret is attempted once.
        assert_eq!(server.connection_count(), 1);

        let err = adapter
            .execute("echo", echo_entry(&table), echo_args("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthRejected { .. }));
    }

    #[tokio::test]
    async fn test_queue_overflow_is_explicit() {
        // A TCP listener that accepts but never speaks WebSocket keeps the
        // adapter in Connecting until the handshake times out.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let endpoint = WampEndpoint {
            url: url::Url::parse(&format!("ws://127.0.0.1:{port}")).expect("url"),
            realm: "test".to_string(),
        };

        let table = std::sync::Arc::new(RouteTable::from_json(ROUTES).expect("routes"));
        let adapter = RpcAdapter::new(Some(endpoint), fast_retry(-1), NotificationBus::new());

        adapter.configure(ConnectionParams::anonymous());

        for _ in 0..MAX_QUEUED_CALLS {
            let adapter = adapter.clone();
            let table = std::sync::Arc::clone(&table);
            tokio::spawn(async move {
                let _ = adapter
                    .execute("echo", table.lookup("echo").expect("route"), CallArgs::new())
                    .await;
            });
        }

        // Let the spawned calls park in the queue.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let err = adapter
            .execute("echo", echo_entry(&table), echo_args("overflow"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueueFull { .. }));
    }
}
