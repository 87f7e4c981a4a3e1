//! Protocol adapters: one strategy per wire protocol.
//!
//! Each adapter owns its transport entirely — the message-RPC adapter owns
//! the persistent connection and its reconnect loop, the REST adapter owns
//! an HTTP client, the SQL adapter owns the embedded database handle. The
//! active adapter is selected once from configuration and dispatched over
//! exhaustively.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `rpc` | Message-RPC adapter with reconnect loop and call queue |
//! | `rest` | Stateless REST adapter |
//! | `sql` | Embedded SQL adapter |

// ============================================================================
// Submodules
// ============================================================================

/// Stateless REST adapter.
pub mod rest;

/// Message-RPC adapter.
pub mod rpc;

/// Embedded SQL adapter.
pub mod sql;

// ============================================================================
// Re-exports
// ============================================================================

pub use rest::RestAdapter;
pub use rpc::RpcAdapter;
pub use sql::SqliteAdapter;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::{Map, Value};

use crate::auth::{AuthMethod, ChallengeResponder, challenge_responder};
use crate::error::Result;
use crate::routes::{Protocol, RouteEntry};

// ============================================================================
// CallArgs
// ============================================================================

/// Named call arguments supplied by application code.
pub type CallArgs = Map<String, Value>;

// ============================================================================
// ConnectionParams
// ============================================================================

/// Connection parameters pushed into an adapter by the authentication
/// state machine.
///
/// Reconfiguring the message-RPC adapter with new parameters tears down
/// and reopens its connection.
#[derive(Clone)]
pub struct ConnectionParams {
    method: AuthMethod,
    principal: Option<String>,
    secret: Option<String>,
    responder: Option<ChallengeResponder>,
}

impl ConnectionParams {
    /// Parameters for an anonymous connection.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            method: AuthMethod::Ticket,
            principal: None,
            secret: None,
            responder: None,
        }
    }

    /// Parameters carrying a principal/secret pair.
    ///
    /// The challenge responder is derived from the method and secret.
    #[must_use]
    pub fn with_credentials(method: AuthMethod, principal: String, secret: String) -> Self {
        let responder = challenge_responder(method, secret.clone());
        Self {
            method,
            principal: Some(principal),
            secret: Some(secret),
            responder: Some(responder),
        }
    }

    /// Returns the authentication method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> AuthMethod {
        self.method
    }

    /// Returns the principal, if any.
    #[inline]
    #[must_use]
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    /// Returns the challenge responder, if credentials are present.
    #[inline]
    #[must_use]
    pub fn responder(&self) -> Option<&ChallengeResponder> {
        self.responder.as_ref()
    }

    /// Returns `true` if a non-empty principal/secret pair is carried.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        matches!(
            (&self.principal, &self.secret),
            (Some(p), Some(s)) if !p.is_empty() && !s.is_empty()
        )
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The secret stays out of logs.
        f.debug_struct("ConnectionParams")
            .field("method", &self.method)
            .field("principal", &self.principal)
            .field("has_credentials", &self.has_credentials())
            .finish()
    }
}

// ============================================================================
// DataAdapter
// ============================================================================

/// The active protocol adapter, selected once from configuration.
pub enum DataAdapter {
    /// Message-RPC over a persistent WebSocket.
    Rpc(RpcAdapter),
    /// REST over HTTP.
    Rest(RestAdapter),
    /// Embedded SQL.
    Sqlite(SqliteAdapter),
}

impl DataAdapter {
    /// Returns the protocol this adapter serves.
    #[inline]
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        match self {
            Self::Rpc(_) => Protocol::Wamp,
            Self::Rest(_) => Protocol::Rest,
            Self::Sqlite(_) => Protocol::Sqlite,
        }
    }

    /// Executes a route over this adapter.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::ProtocolUnsupported`] if the entry lacks a descriptor
    /// - [`crate::Error::Unconfigured`] if the adapter has no settings
    /// - adapter-specific transport and remote errors
    pub async fn execute(&self, name: &str, entry: &RouteEntry, args: CallArgs) -> Result<Value> {
        match self {
            Self::Rpc(adapter) => adapter.execute(name, entry, args).await,
            Self::Rest(adapter) => adapter.execute(name, entry, args).await,
            Self::Sqlite(adapter) => adapter.execute(name, entry, args).await,
        }
    }

    /// Pushes new connection parameters into the adapter.
    ///
    /// Only the message-RPC adapter holds a connection; the others accept
    /// and ignore the parameters.
    pub fn configure(&self, params: ConnectionParams) {
        match self {
            Self::Rpc(adapter) => adapter.configure(params),
            Self::Rest(adapter) => adapter.configure(params),
            Self::Sqlite(adapter) => adapter.configure(params),
        }
    }
}

// ============================================================================
// Argument Marshaling
// ============================================================================

/// Extracts positional arguments by name, in descriptor order.
///
/// Missing arguments become null so positions stay aligned.
pub(crate) fn positional(args: &CallArgs, names: &[String]) -> Vec<Value> {
    names
        .iter()
        .map(|name| args.get(name).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Extracts keyword arguments by name; missing names are omitted.
pub(crate) fn keyword(args: &CallArgs, names: &[String]) -> Map<String, Value> {
    names
        .iter()
        .filter_map(|name| args.get(name).map(|value| (name.clone(), value.clone())))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> CallArgs {
        let mut args = CallArgs::new();
        args.insert("id".to_string(), Value::from(42));
        args.insert("name".to_string(), Value::from("ada"));
        args
    }

    #[test]
    fn test_positional_preserves_order_and_pads_missing() {
        let names = vec!["name".to_string(), "missing".to_string(), "id".to_string()];
        assert_eq!(
            positional(&args(), &names),
            vec![Value::from("ada"), Value::Null, Value::from(42)]
        );
    }

    #[test]
    fn test_keyword_omits_missing() {
        let names = vec!["id".to_string(), "missing".to_string()];
        let kwargs = keyword(&args(), &names);
        assert_eq!(kwargs.len(), 1);
        assert_eq!(kwargs.get("id"), Some(&Value::from(42)));
    }

    #[test]
    fn test_anonymous_params_have_no_credentials() {
        let params = ConnectionParams::anonymous();
        assert!(!params.has_credentials());
        assert!(params.principal().is_none());
        assert!(params.responder().is_none());
    }

    #[test]
    fn test_credential_params() {
        let params = ConnectionParams::with_credentials(
            AuthMethod::Challenge,
            "alice".to_string(),
            "pw".to_string(),
        );
        assert!(params.has_credentials());
        assert_eq!(params.principal(), Some("alice"));
        assert!(params.responder().is_some());
    }

    #[test]
    fn test_empty_pair_does_not_count_as_credentials() {
        let params = ConnectionParams::with_credentials(
            AuthMethod::Ticket,
            String::new(),
            "pw".to_string(),
        );
        assert!(!params.has_credentials());
    }

    #[test]
    fn test_debug_omits_secret() {
        let params = ConnectionParams::with_credentials(
            AuthMethod::Ticket,
            "alice".to_string(),
            "hunter2".to_string(),
        );
        let rendered = format!("{params:?}");
        assert!(!rendered.contains("hunter2"));
    }
}
