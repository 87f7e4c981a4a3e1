//! Route table: named logical calls and their per-protocol descriptors.
//!
//! A route maps one logical call name to up to three transport-specific
//! descriptors plus a declared return shape. The table is loaded once from
//! static configuration and never mutated at runtime.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `descriptor` | Return shape and per-protocol descriptors |
//! | `table` | Route entries, the table, load-time validation |

// ============================================================================
// Submodules
// ============================================================================

/// Return shape and per-protocol descriptors.
pub mod descriptor;

/// Route entries and the loaded-once table.
pub mod table;

// ============================================================================
// Re-exports
// ============================================================================

pub use descriptor::{ReturnShape, RestDescriptor, RpcDescriptor, SqlDescriptor};
pub use table::{RouteEntry, RouteTable};

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Protocol
// ============================================================================

/// Wire protocol identifier.
///
/// Exactly one protocol is active per process, chosen by configuration.
/// Dispatch over the active protocol is an exhaustive match; adding a
/// protocol is a compile-time change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Message-oriented RPC over a persistent WebSocket.
    Wamp,
    /// REST over HTTP.
    Rest,
    /// Embedded SQL.
    Sqlite,
}

impl Protocol {
    /// Returns the configuration name for this protocol.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wamp => "wamp",
            Self::Rest => "rest",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
