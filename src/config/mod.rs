//! Configuration loading and resolution.
//!
//! The profile document selects the active protocol, server endpoints, retry
//! policy, and authentication settings. [`ConfigResolver`] turns the raw
//! documents into one immutable [`Config`] value that is assembled once at
//! process start and passed by reference to every consumer.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `profile` | Raw serde types matching the profile document |
//! | `resolver` | Resolution, placeholder substitution, fatal/warning split |

// ============================================================================
// Submodules
// ============================================================================

/// Raw serde types for the profile document.
pub mod profile;

/// Configuration resolution.
pub mod resolver;

// ============================================================================
// Re-exports
// ============================================================================

pub use profile::RawProfile;
pub use resolver::{
    AuthSettings, Config, ConfigResolver, DatabaseSettings, RetryPolicy, WampEndpoint,
};
