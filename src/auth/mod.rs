//! Authentication: session state, credential storage, and the state machine.
//!
//! The [`AuthManager`] owns all mutation of the in-memory session. It
//! observes transport notifications on the bus, reconfigures the active
//! adapter when credentials change, and requests terminal host effects
//! (client restart) when the session can no longer be trusted.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `challenge` | Auth methods and challenge-response signatures |
//! | `session` | In-memory session state |
//! | `store` | Persisted credential records |
//! | `manager` | The authentication state machine |

// ============================================================================
// Submodules
// ============================================================================

/// Auth methods and challenge-response signatures.
pub mod challenge;

/// The authentication state machine.
pub mod manager;

/// In-memory session state.
pub mod session;

/// Persisted credential records.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use challenge::{AuthMethod, ChallengeResponder, challenge_responder, sign_challenge};
pub use manager::{
    AuthManager, HostEffect, HostEffectHandler, REVALIDATION_PERIOD, RevalidationGuard,
};
pub use session::{AuthSession, AuthState};
pub use store::{CredentialRecord, CredentialStore, FileCredentialStore, MemoryCredentialStore};
