//! WebSocket transport for the message-RPC protocol.
//!
//! # Connection Flow
//!
//! 1. Client dials the configured server URL
//! 2. Client sends `hello` with realm, principal, and offered auth methods
//! 3. Server replies `challenge` (credentials offered) or `welcome` (anonymous)
//! 4. Client answers the challenge via the supplied [`ChallengeResponder`]
//! 5. Server replies `welcome` (accepted) or `abort` (rejected)
//! 6. Session established, calls flow with request/response correlation
//!
//! [`ChallengeResponder`]: crate::auth::ChallengeResponder

// ============================================================================
// Submodules
// ============================================================================

/// The client socket: handshake, correlation, event loop.
pub mod socket;

#[cfg(test)]
pub(crate) mod testserver;

// ============================================================================
// Re-exports
// ============================================================================

pub use socket::RpcSocket;
