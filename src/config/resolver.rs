//! Configuration resolution.
//!
//! [`ConfigResolver`] turns the raw profile and route documents into one
//! immutable [`Config`] value. Two placeholder substitutions are applied to
//! the message-RPC server URL: `$host` resolves to the origin's host and
//! `$port` to the origin's port, falling back to 443/80 by scheme.
//!
//! # Failure Classification
//!
//! Missing route table or active protocol is fatal and must abort startup.
//! Missing server/database settings for the chosen protocol is a warning:
//! the adapter starts unconfigured and every call fails until the
//! configuration is corrected.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::auth::AuthMethod;
use crate::error::{Error, Result};
use crate::routes::{Protocol, RouteTable};

use super::profile::RawProfile;

// ============================================================================
// Constants
// ============================================================================

/// Default credential storage key.
pub const DEFAULT_STORAGE_KEY: &str = "auth_token";

/// Default delay between reconnect attempts.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Host placeholder in the message-RPC server URL.
const HOST_TOKEN: &str = "$host";

/// Port placeholder in the message-RPC server URL.
const PORT_TOKEN: &str = "$port";

// ============================================================================
// RetryPolicy
// ============================================================================

/// Reconnect retry policy: maximum attempts and fixed delay between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt; negative means unlimited.
    max: i32,
    /// Fixed delay between attempts.
    delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    ///
    /// `max = 0` means a single connection attempt with no retries;
    /// `max < 0` means unbounded retries.
    #[inline]
    #[must_use]
    pub const fn new(max: i32, delay: Duration) -> Self {
        Self { max, delay }
    }

    /// Returns the delay between attempts.
    #[inline]
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns `true` once `completed` attempts have used up the budget.
    ///
    /// The budget is `max + 1` total attempts for `max >= 0`, unlimited
    /// otherwise.
    #[inline]
    #[must_use]
    pub const fn exhausted(&self, completed: u32) -> bool {
        self.max >= 0 && completed >= self.max as u32 + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(-1, DEFAULT_RETRY_DELAY)
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Resolved authentication settings.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Route name of the login endpoint (ticket method).
    pub service: Option<String>,

    /// Route name of the logout endpoint, invoked best-effort during logout.
    pub logout_service: Option<String>,

    /// Selected authentication method.
    pub method: AuthMethod,

    /// Preconfigured principal.
    pub key: Option<String>,

    /// Preconfigured secret.
    pub secret: Option<String>,

    /// Credential storage key.
    pub storage_key: String,
}

impl AuthSettings {
    /// Returns `true` if a non-empty preconfigured principal/secret pair exists.
    #[must_use]
    pub fn has_preconfigured(&self) -> bool {
        matches!((&self.key, &self.secret), (Some(k), Some(s)) if !k.is_empty() && !s.is_empty())
    }
}

/// Resolved message-RPC server endpoint.
#[derive(Debug, Clone)]
pub struct WampEndpoint {
    /// Server URL with placeholders substituted.
    pub url: Url,

    /// Realm to join.
    pub realm: String,
}

/// Resolved embedded database settings.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Database file name or path (`:memory:` supported).
    pub name: String,

    /// Schema version, recorded as `PRAGMA user_version`.
    pub version: Option<u32>,

    /// Template database copied into place when `name` does not exist yet.
    pub create_from_location: Option<PathBuf>,
}

// ============================================================================
// Config
// ============================================================================

/// Process-wide configuration, immutable after load.
#[derive(Debug, Clone)]
pub struct Config {
    /// Active protocol.
    pub protocol: Protocol,

    /// Reconnect retry policy.
    pub retry: RetryPolicy,

    /// Authentication settings.
    pub auth: AuthSettings,

    /// Message-RPC endpoint; `None` leaves the adapter unconfigured.
    pub wamp: Option<WampEndpoint>,

    /// Embedded database settings; `None` leaves the adapter unconfigured.
    pub database: Option<DatabaseSettings>,

    /// Origin used for placeholder substitution and relative REST URLs.
    pub origin: Url,

    /// Route table.
    pub routes: Arc<RouteTable>,
}

// ============================================================================
// ConfigResolver
// ============================================================================

/// Resolves raw configuration documents into a [`Config`] value.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    origin: Url,
}

impl ConfigResolver {
    /// Creates a resolver for the given origin.
    #[inline]
    #[must_use]
    pub fn new(origin: Url) -> Self {
        Self { origin }
    }

    /// Resolves profile and route JSON documents.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the active protocol or route table is missing
    /// - [`Error::Route`] if a route entry is invalid
    /// - [`Error::Json`] if a document fails to parse
    pub fn resolve(&self, profile_json: &str, routes_json: &str) -> Result<Config> {
        let profile: RawProfile = serde_json::from_str(profile_json)?;
        let routes = RouteTable::from_json(routes_json)?;
        self.resolve_profile(profile, routes)
    }

    /// Resolves an already-decoded profile against a loaded route table.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigResolver::resolve`].
    pub fn resolve_profile(&self, profile: RawProfile, routes: RouteTable) -> Result<Config> {
        let data = profile.data.unwrap_or_default();

        let protocol = match data.protocol.as_deref() {
            Some("wamp") => Protocol::Wamp,
            Some("rest") => Protocol::Rest,
            Some("sqlite") => Protocol::Sqlite,
            Some(other) => {
                return Err(Error::config(format!("unknown protocol: {other}")));
            }
            None => {
                return Err(Error::config("no active protocol configured"));
            }
        };

        let retry = RetryPolicy::new(
            data.retry_max.unwrap_or(-1),
            data.retry_delay
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RETRY_DELAY),
        );

        let raw_auth = profile.auth.unwrap_or_default();
        let key = raw_auth.auth_key.filter(|k| !k.is_empty());
        let secret = raw_auth.auth_secret.filter(|s| !s.is_empty());

        // Explicit method wins; otherwise challenge-response when a static
        // pair is known, ticket otherwise.
        let method = match raw_auth.wamp_auth_method.as_deref() {
            Some("ticket") => AuthMethod::Ticket,
            Some("challenge") => AuthMethod::Challenge,
            Some(other) => {
                return Err(Error::config(format!("unknown auth method: {other}")));
            }
            None if key.is_some() && secret.is_some() => AuthMethod::Challenge,
            None => AuthMethod::Ticket,
        };

        let auth = AuthSettings {
            service: raw_auth.auth_service,
            logout_service: raw_auth.logout_service,
            method,
            key,
            secret,
            storage_key: raw_auth
                .storage_key
                .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string()),
        };

        let wamp = match profile.servers.and_then(|s| s.wamp) {
            Some(server) => Some(WampEndpoint {
                url: self.substitute_endpoint(&server.url)?,
                realm: server.realm,
            }),
            None => {
                if protocol == Protocol::Wamp {
                    warn!("no wamp server configured; adapter starts unconfigured");
                }
                None
            }
        };

        let database = match profile.database {
            Some(db) => Some(DatabaseSettings {
                name: db.name,
                version: db.version.and_then(|v| v.parse().ok()),
                create_from_location: db.create_from_location.map(PathBuf::from),
            }),
            None => {
                if protocol == Protocol::Sqlite {
                    warn!("no database configured; adapter starts unconfigured");
                }
                None
            }
        };

        debug!(%protocol, routes = routes.len(), "Configuration resolved");

        Ok(Config {
            protocol,
            retry,
            auth,
            wamp,
            database,
            origin: self.origin.clone(),
            routes: Arc::new(routes),
        })
    }

    /// Substitutes `$host` and `$port` in a server URL template.
    ///
    /// `$host` becomes the origin's host; `$port` the origin's port, falling
    /// back to 443 or 80 by the origin's scheme.
    fn substitute_endpoint(&self, template: &str) -> Result<Url> {
        let mut resolved = template.to_string();

        if resolved.contains(HOST_TOKEN) {
            let host = self
                .origin
                .host_str()
                .ok_or_else(|| Error::config("origin has no host for $host substitution"))?;
            resolved = resolved.replace(HOST_TOKEN, host);
        }

        if resolved.contains(PORT_TOKEN) {
            let port = self.origin.port_or_known_default().unwrap_or_else(|| {
                match self.origin.scheme() {
                    "https" | "wss" => 443,
                    _ => 80,
                }
            });
            resolved = resolved.replace(PORT_TOKEN, &port.to_string());
        }

        Url::parse(&resolved)
            .map_err(|e| Error::config(format!("invalid server URL {resolved}: {e}")))
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
            "ping": { "return": "void", "wamp": { "rpc": "com.app.ping" } }
        }
    }"#;

    fn resolver(origin: &str) -> ConfigResolver {
        ConfigResolver::new(Url::parse(origin).expect("origin"))
    }

    #[test]
    fn test_resolve_minimal() {
        let profile = r#"{ "data": { "protocol": "wamp" } }"#;
        let config = resolver("https://app.example.com")
            .resolve(profile, ROUTES)
            .expect("resolve");

        assert_eq!(config.protocol, Protocol::Wamp);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.wamp.is_none());
        assert_eq!(config.auth.storage_key, DEFAULT_STORAGE_KEY);
    }

    #[test]
    fn test_missing_protocol_is_fatal() {
        let err = resolver("https://app.example.com")
            .resolve("{}", ROUTES)
            .unwrap_err();
        assert!(err.is_fatal_config());
    }

    #[test]
    fn test_unknown_protocol_is_fatal() {
        let profile = r#"{ "data": { "protocol": "carrier-pigeon" } }"#;
        let err = resolver("https://app.example.com")
            .resolve(profile, ROUTES)
            .unwrap_err();
        assert!(err.is_fatal_config());
    }

    #[test]
    fn test_missing_routes_is_fatal() {
        let profile = r#"{ "data": { "protocol": "wamp" } }"#;
        let err = resolver("https://app.example.com")
            .resolve(profile, r#"{"routes": {}}"#)
            .unwrap_err();
        assert!(err.is_fatal_config());
    }

    #[test]
    fn test_host_port_substitution_explicit_port() {
        let profile = r#"{
            "data": { "protocol": "wamp" },
            "servers": { "wamp": { "url": "wss://$host:$port/ws", "realm": "app" } }
        }"#;
        let config = resolver("https://app.example.com:8443")
            .resolve(profile, ROUTES)
            .expect("resolve");

        let endpoint = config.wamp.expect("endpoint");
        assert_eq!(endpoint.url.as_str(), "wss://app.example.com:8443/ws");
        assert_eq!(endpoint.realm, "app");
    }

    #[test]
    fn test_port_substitution_falls_back_to_scheme_default() {
        let profile = r#"{
            "data": { "protocol": "wamp" },
            "servers": { "wamp": { "url": "wss://$host:$port/ws", "realm": "app" } }
        }"#;

        let config = resolver("https://app.example.com")
            .resolve(profile, ROUTES)
            .expect("resolve");
        // wss omits the default 443 when rendered.
        assert_eq!(
            config.wamp.expect("endpoint").url.as_str(),
            "wss://app.example.com/ws"
        );

        let config = resolver("http://app.example.com")
            .resolve(profile, ROUTES)
            .expect("resolve");
        assert_eq!(
            config.wamp.expect("endpoint").url.port_or_known_default(),
            Some(80)
        );
    }

    #[test]
    fn test_default_method_with_static_pair_is_challenge() {
        let profile = r#"{
            "data": { "protocol": "wamp" },
            "auth": { "authKey": "svc", "authSecret": "pw" }
        }"#;
        let config = resolver("https://app.example.com")
            .resolve(profile, ROUTES)
            .expect("resolve");

        assert_eq!(config.auth.method, AuthMethod::Challenge);
        assert!(config.auth.has_preconfigured());
    }

    #[test]
    fn test_default_method_without_pair_is_ticket() {
        let profile = r#"{ "data": { "protocol": "wamp" } }"#;
        let config = resolver("https://app.example.com")
            .resolve(profile, ROUTES)
            .expect("resolve");

        assert_eq!(config.auth.method, AuthMethod::Ticket);
        assert!(!config.auth.has_preconfigured());
    }

    #[test]
    fn test_empty_static_pair_does_not_count() {
        let profile = r#"{
            "data": { "protocol": "wamp" },
            "auth": { "authKey": "", "authSecret": "pw" }
        }"#;
        let config = resolver("https://app.example.com")
            .resolve(profile, ROUTES)
            .expect("resolve");

        assert!(!config.auth.has_preconfigured());
        assert_eq!(config.auth.method, AuthMethod::Ticket);
    }

    #[test]
    fn test_retry_policy_boundaries() {
        let policy = RetryPolicy::new(0, Duration::from_millis(100));
        // Single attempt, no retries.
        assert!(!policy.exhausted(0));
        assert!(policy.exhausted(1));

        let policy = RetryPolicy::new(2, Duration::from_millis(100));
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));

        let policy = RetryPolicy::new(-1, Duration::from_millis(100));
        assert!(!policy.exhausted(u32::MAX));
    }
}
