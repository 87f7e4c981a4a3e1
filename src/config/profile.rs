//! Raw serde types for the profile configuration document.
//!
//! These mirror the on-disk format verbatim; [`super::resolver`] turns them
//! into the validated [`super::Config`] value.
//!
//! # Format
//!
//! ```json
//! {
//!   "data":     { "protocol": "wamp", "retryMax": -1, "retryDelay": 2000 },
//!   "auth":     { "authService": "login", "wampAuthMethod": "ticket",
//!                 "authKey": "svc", "authSecret": "s3cr3t" },
//!   "servers":  { "wamp": { "url": "wss://$host:$port/ws", "realm": "app" } },
//!   "database": { "name": "app.db", "version": "1", "createFromLocation": "seed.db" }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

// ============================================================================
// RawProfile
// ============================================================================

/// Top-level profile document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProfile {
    /// Data layer section.
    #[serde(default)]
    pub data: Option<RawData>,

    /// Authentication section.
    #[serde(default)]
    pub auth: Option<RawAuth>,

    /// Server endpoints per protocol.
    #[serde(default)]
    pub servers: Option<RawServers>,

    /// Embedded database identity.
    #[serde(default)]
    pub database: Option<RawDatabase>,
}

// ============================================================================
// Sections
// ============================================================================

/// `data` section: protocol selection and retry policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawData {
    /// Active protocol name.
    #[serde(default)]
    pub protocol: Option<String>,

    /// Maximum reconnect retries; negative means unlimited.
    #[serde(rename = "retryMax", default)]
    pub retry_max: Option<i32>,

    /// Delay between reconnect attempts, milliseconds.
    #[serde(rename = "retryDelay", default)]
    pub retry_delay: Option<u64>,
}

/// `auth` section: service routes, method, preconfigured credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAuth {
    /// Route name of the login endpoint.
    #[serde(rename = "authService", default)]
    pub auth_service: Option<String>,

    /// Route name of the logout endpoint.
    #[serde(rename = "logoutService", default)]
    pub logout_service: Option<String>,

    /// Explicit auth method (`ticket` or `challenge`).
    #[serde(rename = "wampAuthMethod", default)]
    pub wamp_auth_method: Option<String>,

    /// Preconfigured principal.
    #[serde(rename = "authKey", default)]
    pub auth_key: Option<String>,

    /// Preconfigured secret.
    #[serde(rename = "authSecret", default)]
    pub auth_secret: Option<String>,

    /// Credential storage key.
    #[serde(rename = "storageKey", default)]
    pub storage_key: Option<String>,
}

/// `servers` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawServers {
    /// Message-RPC server endpoint.
    #[serde(default)]
    pub wamp: Option<RawWampServer>,
}

/// Message-RPC server endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWampServer {
    /// Server URL template; may embed `$host` and `$port`.
    pub url: String,

    /// Realm to join.
    pub realm: String,
}

/// `database` section: embedded database identity.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDatabase {
    /// Database file name or path (`:memory:` supported).
    pub name: String,

    /// Schema version, recorded as `PRAGMA user_version`.
    #[serde(default)]
    pub version: Option<String>,

    /// Template database copied into place when `name` does not exist yet.
    #[serde(rename = "createFromLocation", default)]
    pub create_from_location: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_profile_parse() {
        let raw: RawProfile = serde_json::from_str(
            r#"{
                "data": { "protocol": "wamp", "retryMax": 3, "retryDelay": 500 },
                "auth": { "authService": "login", "authKey": "svc", "authSecret": "pw" },
                "servers": { "wamp": { "url": "wss://$host:$port/ws", "realm": "app" } },
                "database": { "name": "app.db" }
            }"#,
        )
        .expect("parse");

        let data = raw.data.expect("data section");
        assert_eq!(data.protocol.as_deref(), Some("wamp"));
        assert_eq!(data.retry_max, Some(3));
        assert_eq!(data.retry_delay, Some(500));

        let auth = raw.auth.expect("auth section");
        assert_eq!(auth.auth_service.as_deref(), Some("login"));
        assert_eq!(auth.storage_key, None);

        assert!(raw.servers.expect("servers").wamp.is_some());
        assert!(raw.database.expect("database").version.is_none());
    }

    #[test]
    fn test_empty_profile_parses() {
        let raw: RawProfile = serde_json::from_str("{}").expect("parse");
        assert!(raw.data.is_none());
        assert!(raw.auth.is_none());
    }
}
