//! In-process message-RPC server for transport and adapter tests.
//!
//! Accepts any number of connections, verifies ticket and challenge
//! signatures against a fixed secret, and serves a small set of scripted
//! procedures.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, from_str, to_string};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::auth::sign_challenge;
use crate::config::WampEndpoint;
use crate::protocol::WireMessage;

// ============================================================================
// TestServer
// ============================================================================

/// Scripted server bound to a random localhost port.
pub(crate) struct TestServer {
    port: u16,
    connections: Arc<AtomicU32>,
}

impl TestServer {
    /// Binds and starts accepting connections.
    pub(crate) async fn spawn(secret: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let connections = Arc::new(AtomicU32::new(0));
        let secret = secret.to_string();

        let counter = Arc::clone(&connections);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let session = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let secret = secret.clone();
                tokio::spawn(async move {
                    if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                        serve_connection(ws, session, &secret).await;
                    }
                });
            }
        });

        Self { port, connections }
    }

    /// Returns the endpoint clients should dial.
    pub(crate) fn endpoint(&self) -> WampEndpoint {
        WampEndpoint {
            url: Url::parse(&format!("ws://127.0.0.1:{}", self.port)).expect("url"),
            realm: "test".to_string(),
        }
    }

    /// Returns the number of connections accepted so far.
    pub(crate) fn connection_count(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Connection Script
// ============================================================================

async fn serve_connection(mut ws: WebSocketStream<TcpStream>, session: u32, secret: &str) {
    // Handshake
    let Some(WireMessage::Hello { authmethods, .. }) = read_message(&mut ws).await else {
        return;
    };

    if let Some(method) = authmethods.first().cloned() {
        let nonce = "nonce-1";
        send(
            &mut ws,
            &WireMessage::Challenge {
                method: method.clone(),
                nonce: nonce.to_string(),
            },
        )
        .await;

        let Some(WireMessage::Authenticate { signature }) = read_message(&mut ws).await else {
            return;
        };

        let expected = match method.as_str() {
            "ticket" => secret.to_string(),
            _ => sign_challenge(secret, nonce),
        };

        if signature != expected {
            send(
                &mut ws,
                &WireMessage::Abort {
                    reason: "wire.error.not_authorized".to_string(),
                    message: Some("invalid credentials".to_string()),
                },
            )
            .await;
            return;
        }
    }

    send(
        &mut ws,
        &WireMessage::Welcome {
            session: format!("s-{session}"),
        },
    )
    .await;

    // Call loop
    while let Some(message) = read_message(&mut ws).await {
        let WireMessage::Call {
            id,
            procedure,
            args,
            ..
        } = message
        else {
            continue;
        };

        match procedure.as_str() {
            "com.app.echo" => {
                send(
                    &mut ws,
                    &WireMessage::CallResult {
                        id,
                        payload: args.first().cloned(),
                    },
                )
                .await;
            }

            "com.app.get_user" => {
                let payload = serde_json::json!({
                    "id": args.first().cloned().unwrap_or(Value::Null),
                    "name": "Ada"
                });
                send(
                    &mut ws,
                    &WireMessage::CallResult {
                        id,
                        payload: Some(payload),
                    },
                )
                .await;
            }

            "com.app.explode" => {
                send(
                    &mut ws,
                    &WireMessage::CallError {
                        id,
                        error: "app.error.boom".to_string(),
                        message: Some("boom".to_string()),
                    },
                )
                .await;
            }

            "com.app.kick_me" => {
                send(
                    &mut ws,
                    &WireMessage::Notify {
                        topic: "auth_failed".to_string(),
                        payload: Some(Value::String("kicked".to_string())),
                    },
                )
                .await;
                send(&mut ws, &WireMessage::CallResult { id, payload: None }).await;
            }

            "com.app.hangup" => {
                return;
            }

            _ => {
                send(
                    &mut ws,
                    &WireMessage::CallError {
                        id,
                        error: "wire.error.no_such_procedure".to_string(),
                        message: None,
                    },
                )
                .await;
            }
        }
    }
}

async fn read_message(ws: &mut WebSocketStream<TcpStream>) -> Option<WireMessage> {
    loop {
        match ws.next().await? {
            Ok(Message::Text(text)) => return from_str(text.as_str()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => {}
        }
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, message: &WireMessage) {
    let json = to_string(message).expect("serialize");
    let _ = ws.send(Message::Text(json.into())).await;
}
