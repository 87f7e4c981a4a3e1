//! In-memory authentication session state.
//!
//! The session is never persisted. It is mutated only by the
//! [`super::AuthManager`] and read by UI collaborators through the
//! synchronous `authenticated` flag; all mutation happens on one logical
//! thread, so no further synchronization is layered on top of the manager's
//! own lock.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// AuthState
// ============================================================================

/// Authentication lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No usable credentials.
    Unauthenticated,
    /// Interactive login in flight.
    Authenticating,
    /// Credentials accepted.
    Authenticated,
    /// The authentication endpoint itself is unreachable.
    ///
    /// Distinct from rejected credentials; reachable from any state.
    Unavailable,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

// ============================================================================
// AuthSession
// ============================================================================

/// In-memory session: flag, current pair, and credential provenance.
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// Synchronous flag read by UI collaborators.
    pub authenticated: bool,

    /// Lifecycle state.
    pub state: AuthState,

    /// Current principal, if any.
    pub principal: Option<String>,

    /// Current secret, if any.
    pub secret: Option<String>,

    /// `true` when the pair came from static configuration rather than
    /// interactive login. Preconfigured sessions are exempt from the
    /// forced-logout restart.
    pub preconfigured: bool,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self {
            authenticated: false,
            state: AuthState::Unauthenticated,
            principal: None,
            secret: None,
            preconfigured: false,
        }
    }
}

impl AuthSession {
    /// Creates an empty, unauthenticated session.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a non-empty principal/secret pair is held.
    #[must_use]
    pub fn has_pair(&self) -> bool {
        matches!(
            (&self.principal, &self.secret),
            (Some(p), Some(s)) if !p.is_empty() && !s.is_empty()
        )
    }

    /// Installs a candidate pair.
    pub fn set_pair(&mut self, principal: String, secret: String, preconfigured: bool) {
        self.principal = Some(principal);
        self.secret = Some(secret);
        self.preconfigured = preconfigured;
    }

    /// Clears the pair and resets provenance.
    pub fn clear_pair(&mut self) {
        self.principal = None;
        self.secret = None;
        self.preconfigured = false;
    }
}

// ============================================================================
// Tests
// ============================================================================
