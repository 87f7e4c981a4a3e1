//! Message definitions for the message-RPC protocol.
//!
//! Messages are JSON objects discriminated by a `"type"` field and carried
//! as WebSocket text frames. Calls and results are correlated by [`CallId`].
//!
//! # Format
//!
//! ```json
//! { "type": "call", "id": "uuid", "procedure": "com.app.get_user",
//!   "args": [42], "kwargs": { "verbose": true } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ============================================================================
// CallId
// ============================================================================

/// Unique identifier correlating a call with its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    /// Generates a fresh random ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// WireMessage
// ============================================================================

/// All protocol messages, discriminated by the `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    /// Session open. Offers the principal and supported auth methods.
    Hello {
        /// Target realm.
        realm: String,
        /// Principal identifier, omitted for anonymous sessions.
        #[serde(skip_serializing_if = "Option::is_none")]
        authid: Option<String>,
        /// Offered authentication methods, empty for anonymous sessions.
        #[serde(default)]
        authmethods: Vec<String>,
    },

    /// Server-issued authentication challenge.
    Challenge {
        /// Challenge method (`ticket` or `challenge`).
        method: String,
        /// Server-supplied nonce to sign.
        nonce: String,
    },

    /// Client response to a challenge.
    Authenticate {
        /// Signature over the nonce, or the ticket itself.
        signature: String,
    },

    /// Session established.
    Welcome {
        /// Server-assigned session identifier.
        session: String,
    },

    /// Session refused during the handshake.
    Abort {
        /// Machine-readable reason URI.
        reason: String,
        /// Human-readable detail.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Remote procedure call.
    Call {
        /// Correlation ID.
        id: CallId,
        /// Remote procedure identifier.
        procedure: String,
        /// Positional arguments.
        #[serde(default)]
        args: Vec<Value>,
        /// Keyword arguments.
        #[serde(default)]
        kwargs: Map<String, Value>,
    },

    /// Successful call result.
    #[serde(rename = "result")]
    CallResult {
        /// Matches the call `id`.
        id: CallId,
        /// Result payload, absent for void calls.
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    /// Failed call.
    #[serde(rename = "error")]
    CallError {
        /// Matches the call `id`.
        id: CallId,
        /// Machine-readable error URI.
        error: String,
        /// Human-readable detail.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Server-pushed notification, outside any call.
    Notify {
        /// Notification topic (e.g. `auth_failed`).
        topic: String,
        /// Optional payload.
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    /// Orderly session close.
    Goodbye {
        /// Machine-readable reason URI.
        reason: String,
    },
}

impl WireMessage {
    /// Returns `true` if this abort reason denotes rejected credentials.
    ///
    /// Rejected credentials are terminal for the connection attempt; the
    /// adapter must not retry them.
    #[inline]
    #[must_use]
    pub fn is_auth_abort(&self) -> bool {
        match self {
            Self::Abort { reason, .. } => is_auth_reason(reason),
            _ => false,
        }
    }
}

/// Returns `true` if an abort reason URI denotes rejected credentials.
#[inline]
#[must_use]
pub fn is_auth_reason(reason: &str) -> bool {
    reason.contains("not_authorized") || reason.contains("authentication")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_id_unique() {
        assert_ne!(CallId::generate(), CallId::generate());
    }

    #[test]
    fn test_hello_serialization() {
        let msg = WireMessage::Hello {
            realm: "app".to_string(),
            authid: Some("alice".to_string()),
            authmethods: vec!["challenge".to_string()],
        };

        let json = serde_json::to_string(&msg).expect("serialize");
        assert!(json.contains("\"type\":\"hello\""));
        assert!(json.contains("\"authid\":\"alice\""));
    }

    #[test]
    fn test_anonymous_hello_omits_authid() {
        let msg = WireMessage::Hello {
            realm: "app".to_string(),
            authid: None,
            authmethods: Vec::new(),
        };

        let json = serde_json::to_string(&msg).expect("serialize");
        assert!(!json.contains("authid"));
    }

    #[test]
    fn test_call_round_trip() {
        let id = CallId::generate();
        let mut kwargs = Map::new();
        kwargs.insert("verbose".to_string(), Value::Bool(true));

        let msg = WireMessage::Call {
            id,
            procedure: "com.app.get_user".to_string(),
            args: vec![Value::from(42)],
            kwargs,
        };

        let json = serde_json::to_string(&msg).expect("serialize");
        let back: WireMessage = serde_json::from_str(&json).expect("parse");

        match back {
            WireMessage::Call {
                id: back_id,
                procedure,
                args,
                kwargs,
            } => {
                assert_eq!(back_id, id);
                assert_eq!(procedure, "com.app.get_user");
                assert_eq!(args, vec![Value::from(42)]);
                assert_eq!(kwargs.get("verbose"), Some(&Value::Bool(true)));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_result_parse() {
        let id = CallId::generate();
        let json = format!(r#"{{"type":"result","id":"{id}","payload":{{"name":"test"}}}}"#);

        let msg: WireMessage = serde_json::from_str(&json).expect("parse");
        match msg {
            WireMessage::CallResult { id: back, payload } => {
                assert_eq!(back, id);
                assert_eq!(
                    payload.and_then(|p| p.get("name").cloned()),
                    Some(Value::String("test".to_string()))
                );
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_error_parse_without_message() {
        let id = CallId::generate();
        let json = format!(r#"{{"type":"error","id":"{id}","error":"app.error.no_such_user"}}"#);

        let msg: WireMessage = serde_json::from_str(&json).expect("parse");
        assert!(matches!(msg, WireMessage::CallError { message: None, .. }));
    }

    #[test]
    fn test_is_auth_abort() {
        let abort = WireMessage::Abort {
            reason: "wire.error.not_authorized".to_string(),
            message: Some("bad ticket".to_string()),
        };
        assert!(abort.is_auth_abort());

        let abort = WireMessage::Abort {
            reason: "wire.error.no_such_realm".to_string(),
            message: None,
        };
        assert!(!abort.is_auth_abort());

        let welcome = WireMessage::Welcome {
            session: "s1".to_string(),
        };
        assert!(!welcome.is_auth_abort());
    }

    #[test]
    fn test_notify_parse() {
        let json = r#"{"type":"notify","topic":"auth_failed"}"#;
        let msg: WireMessage = serde_json::from_str(json).expect("parse");
        assert!(matches!(msg, WireMessage::Notify { topic, payload: None } if topic == "auth_failed"));
    }
}
