//! Databridge - Protocol-agnostic data access and authentication layer.
//!
//! Application code issues named logical calls; configuration decides, once
//! at startup, which wire protocol carries them: message-oriented RPC over
//! a persistent WebSocket, REST over HTTP, or embedded SQL. A session and
//! authentication state machine manages credential acquisition, connection
//! reconfiguration, challenge-response authentication, and failure
//! recovery alongside.
//!
//! # Architecture
//!
//! Control flow for one call:
//!
//! - **Application** → [`DataClient::invoke`] with a route name and arguments
//! - **Dispatcher** resolves the route and selects the active adapter
//! - **Adapter** marshals arguments per the route's descriptor and executes
//! - the raw result is normalized to the route's declared shape
//!
//! Independently, the [`AuthManager`] observes transport notices on the
//! [`NotificationBus`] and pushes new connection parameters into the
//! adapter whenever credentials change, which reopens the persistent
//! connection.
//!
//! Key design principles:
//!
//! - One immutable [`Config`] value, assembled once, passed by reference
//! - The active adapter is a tagged variant, matched exhaustively
//! - Each adapter exclusively owns its transport and retry behavior
//! - Challenge/response is a typed function value, not a registered callback
//!
//! # Quick Start
//!
//! ```no_run
//! use databridge::{ConfigResolver, DataClient, Result};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let origin = Url::parse("https://app.example.com").expect("origin");
//!     let config = ConfigResolver::new(origin)
//!         .resolve(PROFILE_JSON, ROUTES_JSON)?;
//!
//!     let client = DataClient::builder().config(config).build()?;
//!     client.activate().await;
//!
//!     let mut args = serde_json::Map::new();
//!     args.insert("id".to_string(), serde_json::Value::from(42));
//!     let user = client.invoke("getUser", args).await?;
//!     println!("user: {user}");
//!
//!     Ok(())
//! }
//! # const PROFILE_JSON: &str = "";
//! # const ROUTES_JSON: &str = "";
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapter`] | Protocol adapters: [`RpcAdapter`], [`RestAdapter`], [`SqliteAdapter`] |
//! | [`auth`] | Session state machine, credential store, challenge signatures |
//! | [`bus`] | Notification bus (publish/subscribe by channel name) |
//! | [`client`] | [`DataClient`] assembly |
//! | [`config`] | Configuration loading and resolution |
//! | [`dispatch`] | Call dispatcher and result normalization |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | Wire message types (internal) |
//! | [`routes`] | Route table and per-protocol descriptors |
//! | [`transport`] | WebSocket transport layer (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Protocol adapters and the tagged [`DataAdapter`] variant.
pub mod adapter;

/// Authentication: session, store, challenge signatures, state machine.
pub mod auth;

/// Notification bus.
pub mod bus;

/// Client assembly.
pub mod client;

/// Configuration loading and resolution.
pub mod config;

/// Call dispatcher.
pub mod dispatch;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Wire message types for the message-RPC protocol.
pub mod protocol;

/// Route table: named calls and their per-protocol descriptors.
pub mod routes;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Adapter types
pub use adapter::{CallArgs, ConnectionParams, DataAdapter, RestAdapter, RpcAdapter, SqliteAdapter};

// Auth types
pub use auth::{
    AuthManager, AuthMethod, AuthSession, AuthState, CredentialRecord, CredentialStore,
    FileCredentialStore, HostEffect, HostEffectHandler, MemoryCredentialStore, RevalidationGuard,
};

// Bus types
pub use bus::{AUTH_CHANNEL, DATA_CHANNEL, Notice, NotificationBus};

// Client types
pub use client::{DataClient, DataClientBuilder};

// Config types
pub use config::{Config, ConfigResolver, RetryPolicy};

// Dispatcher types
pub use dispatch::Dispatcher;

// Error types
pub use error::{Error, Result};

// Route types
pub use routes::{Protocol, ReturnShape, RouteEntry, RouteTable};
