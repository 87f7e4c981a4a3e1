//! Authentication methods and challenge-response signatures.
//!
//! Two methods are supported on the message-RPC connection:
//!
//! - **ticket**: the secret is sent directly in response to the challenge
//! - **challenge**: the client signs the server-supplied nonce with the
//!   shared secret (HMAC-SHA256, base64-encoded) and never transmits the
//!   secret itself
//!
//! The state machine builds a [`ChallengeResponder`] — a typed function
//! value — and hands it to the transport at connect time; the transport
//! calls it synchronously when the server issues a challenge.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

// ============================================================================
// Types
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Synchronous responder mapping a server nonce to an authentication signature.
pub type ChallengeResponder = Arc<dyn Fn(&str) -> String + Send + Sync>;

// ============================================================================
// AuthMethod
// ============================================================================

/// Authentication method used on the message-RPC connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Static secret exchange.
    Ticket,
    /// Computed signature over a server-supplied nonce.
    Challenge,
}

impl AuthMethod {
    /// Returns the wire name of this method.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::Challenge => "challenge",
        }
    }

    /// Returns `true` for the challenge-response method.
    #[inline]
    #[must_use]
    pub const fn is_challenge(self) -> bool {
        matches!(self, Self::Challenge)
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Signatures
// ============================================================================

/// Signs a server nonce with the shared secret.
///
/// HMAC-SHA256 keyed by the secret over the nonce bytes, base64-encoded.
#[must_use]
pub fn sign_challenge(secret: &str, nonce: &str) -> String {
    // HMAC accepts keys of any length; new_from_slice cannot fail here.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(nonce.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Builds the responder for a method and secret.
#[must_use]
pub fn challenge_responder(method: AuthMethod, secret: String) -> ChallengeResponder {
    match method {
        AuthMethod::Ticket => Arc::new(move |_nonce| secret.clone()),
        AuthMethod::Challenge => Arc::new(move |nonce| sign_challenge(&secret, nonce)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_display() {
        assert_eq!(AuthMethod::Ticket.to_string(), "ticket");
        assert_eq!(AuthMethod::Challenge.to_string(), "challenge");
    }

    #[test]
    fn test_sign_challenge_deterministic() {
        let a = sign_challenge("secret", "nonce-1");
        let b = sign_challenge("secret", "nonce-1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_sign_challenge_varies_by_nonce_and_secret() {
        let base = sign_challenge("secret", "nonce-1");
        assert_ne!(base, sign_challenge("secret", "nonce-2"));
        assert_ne!(base, sign_challenge("other", "nonce-1"));
    }

    #[test]
    fn test_ticket_responder_returns_secret() {
        let responder = challenge_responder(AuthMethod::Ticket, "s3cr3t".to_string());
        assert_eq!(responder("whatever"), "s3cr3t");
    }

    #[test]
    fn test_challenge_responder_signs_nonce() {
        let responder = challenge_responder(AuthMethod::Challenge, "s3cr3t".to_string());
        assert_eq!(responder("nonce-1"), sign_challenge("s3cr3t", "nonce-1"));
        assert_ne!(responder("nonce-1"), "s3cr3t");
    }
}
