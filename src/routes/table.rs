//! Route entries and the loaded-once route table.
//!
//! The table is built from static configuration during startup and is
//! immutable afterwards; any number of logical callers may read it
//! concurrently. Lookup of an unknown name is a fatal misconfiguration
//! surfaced by the dispatcher, never a retryable condition.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::{Error, Result};

use super::descriptor::{RestDescriptor, ReturnShape, RpcDescriptor, SqlDescriptor};
use super::Protocol;

// ============================================================================
// RouteEntry
// ============================================================================

/// One named logical call with its per-protocol descriptors.
///
/// # Invariants
///
/// Enforced at load time by [`RouteTable::from_json`]:
///
/// - at least one protocol descriptor is present
/// - `return: "text"` is invalid combined with a `sqlite` descriptor
#[derive(Debug, Clone, Deserialize)]
pub struct RouteEntry {
    /// Declared shape of the result.
    #[serde(rename = "return")]
    pub return_shape: ReturnShape,

    /// Message-RPC descriptor.
    #[serde(default)]
    pub wamp: Option<RpcDescriptor>,

    /// REST descriptor.
    #[serde(default)]
    pub rest: Option<RestDescriptor>,

    /// SQL descriptor.
    #[serde(default)]
    pub sqlite: Option<SqlDescriptor>,
}

impl RouteEntry {
    /// Returns `true` if this entry defines a descriptor for `protocol`.
    #[inline]
    #[must_use]
    pub fn supports(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::Wamp => self.wamp.is_some(),
            Protocol::Rest => self.rest.is_some(),
            Protocol::Sqlite => self.sqlite.is_some(),
        }
    }
}

// ============================================================================
// RoutesFile
// ============================================================================

/// Top-level route configuration document.
#[derive(Debug, Deserialize)]
struct RoutesFile {
    routes: FxHashMap<String, RouteEntry>,
}

// ============================================================================
// RouteTable
// ============================================================================

/// Static mapping from logical call name to [`RouteEntry`].
///
/// Keys are unique, case-sensitive strings. Loaded once, read-only afterwards.
#[derive(Debug)]
pub struct RouteTable {
    entries: FxHashMap<String, RouteEntry>,
}

impl RouteTable {
    /// Builds a table from a route configuration JSON document.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the document has no `routes` mapping or it is empty
    /// - [`Error::Route`] if an entry violates a load-time invariant
    /// - [`Error::Json`] if the document fails to parse
    pub fn from_json(raw: &str) -> Result<Self> {
        let file: RoutesFile = serde_json::from_str(raw)?;
        Self::from_entries(file.routes)
    }

    /// Builds a table from an already-decoded `routes` value.
    ///
    /// # Errors
    ///
    /// Same as [`RouteTable::from_json`].
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let file: RoutesFile = serde_json::from_value(value)?;
        Self::from_entries(file.routes)
    }

    fn from_entries(entries: FxHashMap<String, RouteEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::config("route table is missing or empty"));
        }

        for (name, entry) in &entries {
            Self::validate_entry(name, entry)?;
        }

        Ok(Self { entries })
    }

    /// Looks up a route by name.
    ///
    /// Returns `None` for an unknown name; callers must treat that as a fatal
    /// misconfiguration, not a retryable error.
    #[inline]
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&RouteEntry> {
        self.entries.get(name)
    }

    /// Returns the number of routes in the table.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table holds no routes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over route names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Validates one entry against the load-time invariants.
    fn validate_entry(name: &str, entry: &RouteEntry) -> Result<()> {
        if entry.wamp.is_none() && entry.rest.is_none() && entry.sqlite.is_none() {
            return Err(Error::route(format!(
                "route {name} defines no protocol descriptor"
            )));
        }

        if entry.return_shape == ReturnShape::Text && entry.sqlite.is_some() {
            return Err(Error::route(format!(
                "route {name}: return shape text is invalid for the sqlite protocol"
            )));
        }

        if let Some(rest) = &entry.rest
            && !matches!(
                rest.method.to_ascii_uppercase().as_str(),
                "GET" | "POST" | "PUT" | "DELETE" | "PATCH" | "HEAD"
            )
        {
            return Err(Error::route(format!(
                "route {name}: unknown HTTP method {}",
                rest.method
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTES: &str = r#"{
        "routes": {
            "getUser": {
                "return": "object",
                "rest": { "url": "/users/$id", "type": "GET", "params": ["id"] },
                "wamp": { "rpc": "com.app.get_user", "args": ["id"] },
                "sqlite": { "query": "SELECT * FROM users WHERE id = ?", "args": ["id"] }
            },
            "listUsers": {
                "return": "array",
                "wamp": { "rpc": "com.app.list_users" }
            }
        }
    }"#;

    #[test]
    fn test_load_and_lookup() {
        let table = RouteTable::from_json(ROUTES).expect("load");
        assert_eq!(table.len(), 2);

        let entry = table.lookup("getUser").expect("route present");
        assert_eq!(entry.return_shape, ReturnShape::Object);
        assert!(entry.supports(Protocol::Wamp));
        assert!(entry.supports(Protocol::Rest));
        assert!(entry.supports(Protocol::Sqlite));

        let entry = table.lookup("listUsers").expect("route present");
        assert!(entry.supports(Protocol::Wamp));
        assert!(!entry.supports(Protocol::Rest));
    }

    #[test]
    fn test_lookup_unknown_returns_none() {
        let table = RouteTable::from_json(ROUTES).expect("load");
        assert!(table.lookup("nope").is_none());
        // Case-sensitive keys.
        assert!(table.lookup("getuser").is_none());
    }

    #[test]
    fn test_empty_table_is_fatal() {
        let err = RouteTable::from_json(r#"{"routes": {}}"#).unwrap_err();
        assert!(err.is_fatal_config());
    }

    #[test]
    fn test_missing_routes_key_is_error() {
        assert!(RouteTable::from_json("{}").is_err());
    }

    #[test]
    fn test_entry_without_descriptor_rejected() {
        let raw = r#"{"routes": {"bad": {"return": "void"}}}"#;
        let err = RouteTable::from_json(raw).unwrap_err();
        assert!(matches!(err, Error::Route { .. }));
    }

    #[test]
    fn test_text_shape_invalid_for_sqlite() {
        let raw = r#"{
            "routes": {
                "bad": {
                    "return": "text",
                    "sqlite": { "query": "SELECT name FROM users", "args": [] }
                }
            }
        }"#;
        let err = RouteTable::from_json(raw).unwrap_err();
        assert!(matches!(err, Error::Route { .. }));
    }

    #[test]
    fn test_unknown_http_method_rejected() {
        let raw = r#"{
            "routes": {
                "bad": {
                    "return": "void",
                    "rest": { "url": "/x", "type": "FROB" }
                }
            }
        }"#;
        assert!(RouteTable::from_json(raw).is_err());
    }
}
