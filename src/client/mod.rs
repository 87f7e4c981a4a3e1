//! Client assembly: explicit construction of the data layer.
//!
//! [`DataClientBuilder`] wires configuration → adapter → dispatcher →
//! authentication manager once at process start; there is no global
//! registry and every dependency is an explicit constructor parameter.
//!
//! # Example
//!
//! ```no_run
//! use databridge::{ConfigResolver, DataClient, Result};
//! use url::Url;
//!
//! # async fn example(profile: &str, routes: &str) -> Result<()> {
//! let origin = Url::parse("https://app.example.com").expect("origin");
//! let config = ConfigResolver::new(origin).resolve(profile, routes)?;
//!
//! let client = DataClient::builder().config(config).build()?;
//! client.activate().await;
//!
//! let user = client.invoke("getUser", serde_json::Map::new()).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use crate::adapter::{CallArgs, DataAdapter, RestAdapter, RpcAdapter, SqliteAdapter};
use crate::auth::{
    AuthManager, CredentialStore, HostEffectHandler, MemoryCredentialStore, RevalidationGuard,
    REVALIDATION_PERIOD,
};
use crate::bus::NotificationBus;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::routes::Protocol;

// ============================================================================
// DataClientBuilder
// ============================================================================

/// Builder for configuring a [`DataClient`] instance.
///
/// Use [`DataClient::builder()`] to create a new builder.
#[derive(Default)]
pub struct DataClientBuilder {
    /// Resolved configuration.
    config: Option<Config>,
    /// Credential store; defaults to an in-memory store.
    store: Option<Arc<dyn CredentialStore>>,
    /// Notification bus; defaults to a fresh bus.
    bus: Option<NotificationBus>,
    /// Host effect handler; defaults to logging only.
    effects: Option<HostEffectHandler>,
}

impl DataClientBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resolved configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the credential store.
    #[inline]
    #[must_use]
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the notification bus shared with other components.
    #[inline]
    #[must_use]
    pub fn bus(mut self, bus: NotificationBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Sets the handler for terminal host effects (client restart).
    #[inline]
    #[must_use]
    pub fn host_effects(mut self, effects: HostEffectHandler) -> Self {
        self.effects = Some(effects);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if no configuration was supplied.
    pub fn build(self) -> Result<DataClient> {
        let config = self.config.ok_or_else(|| {
            Error::config(
                "Configuration is required. Use .config() to set it.\n\
                 Example: DataClient::builder().config(config)",
            )
        })?;

        let bus = self.bus.unwrap_or_default();
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let effects = self.effects.unwrap_or_else(|| {
            Arc::new(|effect| {
                error!(?effect, "Host effect requested but no handler installed");
            })
        });

        let adapter = Arc::new(match config.protocol {
            Protocol::Wamp => DataAdapter::Rpc(RpcAdapter::new(
                config.wamp.clone(),
                config.retry,
                bus.clone(),
            )),
            Protocol::Rest => DataAdapter::Rest(RestAdapter::new(config.origin.clone())),
            Protocol::Sqlite => DataAdapter::Sqlite(SqliteAdapter::open(config.database.as_ref())),
        });

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&config.routes),
            Arc::clone(&adapter),
            config.protocol,
        ));

        let auth = Arc::new(AuthManager::new(
            config.auth.clone(),
            Arc::clone(&dispatcher),
            Arc::clone(&adapter),
            store,
            bus.clone(),
            effects,
        ));

        info!(protocol = %config.protocol, routes = config.routes.len(), "Data client built");

        Ok(DataClient {
            config: Arc::new(config),
            dispatcher,
            auth,
            bus,
        })
    }
}

// ============================================================================
// DataClient
// ============================================================================

/// The assembled data layer: dispatcher plus authentication manager.
pub struct DataClient {
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    auth: Arc<AuthManager>,
    bus: NotificationBus,
}

impl core::fmt::Debug for DataClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DataClient").finish_non_exhaustive()
    }
}

impl DataClient {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> DataClientBuilder {
        DataClientBuilder::new()
    }

    /// Activates the layer: subscribes the authentication manager to
    /// transport notices, performs the initial credential check, and opens
    /// the initial connection. Never fails startup.
    pub async fn activate(&self) {
        self.auth.activate().await;
    }

    /// Invokes a route by name with named arguments.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::invoke`].
    pub async fn invoke(&self, name: &str, args: CallArgs) -> Result<Value> {
        self.dispatcher.invoke(name, args).await
    }

    /// Invokes a route that takes no arguments.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::invoke`].
    pub async fn call(&self, name: &str) -> Result<Value> {
        self.dispatcher.call(name).await
    }

    /// Starts the periodic credential re-validation timer.
    ///
    /// The timer stops when the returned guard drops; UI collaborators
    /// hold it for the life of their login surface.
    #[must_use]
    pub fn start_revalidation(&self) -> RevalidationGuard {
        self.auth.start_revalidation(REVALIDATION_PERIOD)
    }

    /// Returns the authentication manager.
    #[inline]
    #[must_use]
    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    /// Returns the notification bus.
    #[inline]
    #[must_use]
    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Returns the resolved configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

// ============================================================================
// Tests
// ============================================================================
