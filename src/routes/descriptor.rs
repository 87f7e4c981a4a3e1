//! Return shape and per-protocol call descriptors.
//!
//! A descriptor carries the transport-specific instructions for executing one
//! route over one protocol: which endpoint to hit and how to map named call
//! arguments onto the wire.
//!
//! # Configuration Format
//!
//! ```json
//! {
//!   "return": "object",
//!   "wamp":   { "rpc": "com.app.get_user", "args": ["id"], "kargs": ["verbose"] },
//!   "rest":   { "url": "/users/$id", "type": "GET", "params": ["id"], "body": [] },
//!   "sqlite": { "query": "SELECT * FROM users WHERE id = ?", "args": ["id"] }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// ReturnShape
// ============================================================================

/// Declared shape of a route's result.
///
/// Normalization to the declared shape is advisory: the dispatcher converts
/// on a best-effort basis and returns the raw value unchanged when no
/// conversion applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnShape {
    /// A single structured value.
    Object,
    /// A sequence of values.
    Array,
    /// A string.
    Text,
    /// No meaningful result.
    Void,
}

// ============================================================================
// RpcDescriptor
// ============================================================================

/// Message-RPC descriptor: remote procedure plus argument mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcDescriptor {
    /// Remote procedure identifier.
    pub rpc: String,

    /// Call argument names passed positionally, in this order.
    #[serde(default)]
    pub args: Vec<String>,

    /// Call argument names passed as keyword arguments.
    #[serde(default)]
    pub kargs: Vec<String>,
}

// ============================================================================
// RestDescriptor
// ============================================================================

/// REST descriptor: URL template, HTTP method, and argument mapping.
///
/// The URL template may embed `$field` placeholders which are substituted
/// from same-named call arguments. A substituted argument is consumed and
/// no longer eligible as a query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestDescriptor {
    /// URL template, absolute or relative to the configured origin.
    pub url: String,

    /// HTTP method name (GET, POST, ...).
    #[serde(rename = "type")]
    pub method: String,

    /// Argument names attached as query parameters, in this order.
    #[serde(default)]
    pub params: Vec<String>,

    /// Argument names sent as the JSON request body.
    #[serde(default)]
    pub body: Vec<String>,
}

// ============================================================================
// SqlDescriptor
// ============================================================================

/// SQL descriptor: parameterized query plus positional argument order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlDescriptor {
    /// Parameterized query template (`?` placeholders).
    pub query: String,

    /// Argument names bound positionally, in this order.
    #[serde(default)]
    pub args: Vec<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_shape_serde() {
        let shape: ReturnShape = serde_json::from_str("\"object\"").expect("parse");
        assert_eq!(shape, ReturnShape::Object);

        let shape: ReturnShape = serde_json::from_str("\"void\"").expect("parse");
        assert_eq!(shape, ReturnShape::Void);
    }

    #[test]
    fn test_rpc_descriptor_defaults() {
        let d: RpcDescriptor =
            serde_json::from_str(r#"{"rpc": "com.app.ping"}"#).expect("parse");
        assert_eq!(d.rpc, "com.app.ping");
        assert!(d.args.is_empty());
        assert!(d.kargs.is_empty());
    }

    #[test]
    fn test_rest_descriptor_method_rename() {
        let d: RestDescriptor = serde_json::from_str(
            r#"{"url": "/users/$id", "type": "GET", "params": ["id"]}"#,
        )
        .expect("parse");
        assert_eq!(d.method, "GET");
        assert_eq!(d.params, vec!["id"]);
        assert!(d.body.is_empty());
    }

    #[test]
    fn test_sql_descriptor() {
        let d: SqlDescriptor = serde_json::from_str(
            r#"{"query": "SELECT * FROM users WHERE id = ?", "args": ["id"]}"#,
        )
        .expect("parse");
        assert_eq!(d.args.len(), 1);
    }
}
