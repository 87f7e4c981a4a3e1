//! Error types for the data access layer.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use databridge::{Result, Error};
//!
//! async fn example(client: &DataClient) -> Result<()> {
//!     let user = client.invoke("getUser", args).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Route`] |
//! | Call | [`Error::RouteNotFound`], [`Error::ProtocolUnsupported`], [`Error::Unconfigured`], [`Error::InvalidArgument`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Unavailable`], [`Error::QueueFull`] |
//! | Remote | [`Error::CallFailed`], [`Error::RequestTimeout`], [`Error::Protocol`] |
//! | Authentication | [`Error::AuthRejected`], [`Error::NoCredentials`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Database`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::protocol::CallId;
use crate::routes::Protocol;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Fatal at load time: a missing route table or missing active protocol
    /// must abort application startup.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Route table validation error.
    ///
    /// Returned when a route entry violates a load-time invariant.
    #[error("Route error: {message}")]
    Route {
        /// Description of the route error.
        message: String,
    },

    // ========================================================================
    // Call Errors
    // ========================================================================
    /// No route registered under the given name.
    ///
    /// A programmer error, never retried.
    #[error("Route not found: {name}")]
    RouteNotFound {
        /// The unknown route name.
        name: String,
    },

    /// Route exists but has no descriptor for the active protocol.
    #[error("Route {name} does not support protocol {protocol}")]
    ProtocolUnsupported {
        /// The route name.
        name: String,
        /// The active protocol.
        protocol: Protocol,
    },

    /// Adapter has no server/database settings and cannot execute calls.
    #[error("Adapter for {protocol} is not configured")]
    Unconfigured {
        /// The protocol whose settings are missing.
        protocol: Protocol,
    },

    /// Invalid call argument.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Reconnect attempts exhausted; the adapter is parked until reconfigured.
    #[error("Service unavailable after {attempts} connection attempts")]
    Unavailable {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Bounded pending-call queue overflowed while the connection was opening.
    #[error("Call queue full ({limit} calls waiting for connection)")]
    QueueFull {
        /// Queue capacity.
        limit: usize,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// Remote end rejected or failed the call.
    #[error("Call failed ({code}): {message}")]
    CallFailed {
        /// Error code or URI supplied by the remote end.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// Call round-trip timed out.
    #[error("Call {call_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The call ID that timed out.
        call_id: CallId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Protocol violation or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Authentication Errors
    // ========================================================================
    /// Credentials were rejected during the authentication handshake.
    ///
    /// Distinct from [`Error::Unavailable`]: the endpoint was reachable and
    /// refused the credentials. Not retried by the adapter.
    #[error("Authentication rejected: {reason}")]
    AuthRejected {
        /// Reason supplied by the remote end.
        reason: String,
    },

    /// No usable principal/secret pair is available.
    #[error("No credentials available")]
    NoCredentials,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Embedded database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a route validation error.
    #[inline]
    pub fn route(message: impl Into<String>) -> Self {
        Self::Route {
            message: message.into(),
        }
    }

    /// Creates a route not found error.
    #[inline]
    pub fn route_not_found(name: impl Into<String>) -> Self {
        Self::RouteNotFound { name: name.into() }
    }

    /// Creates a protocol unsupported error.
    #[inline]
    pub fn protocol_unsupported(name: impl Into<String>, protocol: Protocol) -> Self {
        Self::ProtocolUnsupported {
            name: name.into(),
            protocol,
        }
    }

    /// Creates an unconfigured adapter error.
    #[inline]
    pub fn unconfigured(protocol: Protocol) -> Self {
        Self::Unconfigured { protocol }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates an unavailable error.
    #[inline]
    pub fn unavailable(attempts: u32) -> Self {
        Self::Unavailable { attempts }
    }

    /// Creates a queue full error.
    #[inline]
    pub fn queue_full(limit: usize) -> Self {
        Self::QueueFull { limit }
    }

    /// Creates a call failed error.
    #[inline]
    pub fn call_failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CallFailed {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(call_id: CallId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            call_id,
            timeout_ms,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an authentication rejected error.
    #[inline]
    pub fn auth_rejected(reason: impl Into<String>) -> Self {
        Self::AuthRejected {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Unavailable { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is an authentication error.
    #[inline]
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::AuthRejected { .. } | Self::NoCredentials)
    }

    /// Returns `true` if this is a fatal configuration error.
    ///
    /// Fatal configuration errors must abort application startup.
    #[inline]
    #[must_use]
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Route { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::RequestTimeout { .. }
                | Self::QueueFull { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_route_not_found_display() {
        let err = Error::route_not_found("getUser");
        assert_eq!(err.to_string(), "Route not found: getUser");
    }

    #[test]
    fn test_protocol_unsupported_display() {
        let err = Error::protocol_unsupported("getUser", Protocol::Sqlite);
        assert_eq!(
            err.to_string(),
            "Route getUser does not support protocol sqlite"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::ConnectionTimeout { timeout_ms: 5000 };
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::unavailable(3).is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_auth_error() {
        assert!(Error::auth_rejected("bad ticket").is_auth_error());
        assert!(Error::NoCredentials.is_auth_error());
        assert!(!Error::ConnectionClosed.is_auth_error());
    }

    #[test]
    fn test_is_fatal_config() {
        assert!(Error::config("no protocol").is_fatal_config());
        assert!(Error::route("no descriptor").is_fatal_config());
        assert!(!Error::connection("test").is_fatal_config());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::ConnectionClosed.is_recoverable());
        assert!(Error::queue_full(64).is_recoverable());
        assert!(!Error::config("test").is_recoverable());
        assert!(!Error::auth_rejected("nope").is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
