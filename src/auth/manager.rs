//! The authentication state machine.
//!
//! States run `Unauthenticated → Authenticating → Authenticated`, with
//! `Unavailable` reachable from any state when the transport reports the
//! authentication endpoint itself unreachable — distinct from rejected
//! credentials.
//!
//! The manager is the only writer of the in-memory session and of the
//! credential store. It observes transport notices on the bus, pushes new
//! connection parameters into the active adapter when credentials change,
//! and — for the one unrecoverable case, a forced logout without
//! preconfigured credentials — requests a client restart from its host
//! through the typed [`HostEffect`] handler rather than burying the
//! decision in a deep call stack.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};

use crate::adapter::{CallArgs, ConnectionParams, DataAdapter};
use crate::bus::{AUTH_CHANNEL, DATA_CHANNEL, Notice, NotificationBus};
use crate::config::AuthSettings;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};

use super::session::{AuthSession, AuthState};
use super::store::{CredentialRecord, CredentialStore};

// ============================================================================
// Constants
// ============================================================================

/// Grace period for the remote logout call; logout never hangs past it.
const LOGOUT_GRACE: Duration = Duration::from_secs(3);

/// Default period for background credential re-validation.
pub const REVALIDATION_PERIOD: Duration = Duration::from_secs(2);

// ============================================================================
// HostEffect
// ============================================================================

/// Terminal actions the state machine may request of its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEffect {
    /// Restart the client process to guarantee a clean state.
    ///
    /// Requested after a forced logout with non-preconfigured credentials,
    /// when session state may be inconsistent with the server.
    RestartClient,
}

/// Handler invoked for requested host effects.
pub type HostEffectHandler = Arc<dyn Fn(HostEffect) + Send + Sync>;

// ============================================================================
// AuthManager
// ============================================================================

/// The authentication state machine.
pub struct AuthManager {
    settings: AuthSettings,
    session: Mutex<AuthSession>,
    store: Arc<dyn CredentialStore>,
    dispatcher: Arc<Dispatcher>,
    adapter: Arc<DataAdapter>,
    bus: NotificationBus,
    effects: HostEffectHandler,
    connection_started: AtomicBool,
}

impl AuthManager {
    /// Creates a manager. Call [`AuthManager::activate`] once at startup.
    #[must_use]
    pub fn new(
        settings: AuthSettings,
        dispatcher: Arc<Dispatcher>,
        adapter: Arc<DataAdapter>,
        store: Arc<dyn CredentialStore>,
        bus: NotificationBus,
        effects: HostEffectHandler,
    ) -> Self {
        Self {
            settings,
            session: Mutex::new(AuthSession::new()),
            store,
            dispatcher,
            adapter,
            bus,
            effects,
            connection_started: AtomicBool::new(false),
        }
    }

    /// Returns the synchronous authenticated flag.
    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.lock().authenticated
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.session.lock().state
    }

    /// Returns a snapshot of the session.
    #[must_use]
    pub fn session(&self) -> AuthSession {
        self.session.lock().clone()
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Runs once at startup: subscribes to transport notices, performs the
    /// initial credential check, and opens the initial connection.
    ///
    /// Never fails the startup sequence regardless of outcome.
    pub async fn activate(self: &Arc<Self>) {
        self.spawn_listeners();

        if let Err(err) = self.has_credentials().await {
            debug!(error = %err, "No credentials at startup");
        }

        // has_credentials only reconfigures on a flag change; make sure the
        // connection exists even for a fresh anonymous session.
        if !self.connection_started.load(Ordering::SeqCst) {
            self.configure_adapter();
        }

        debug!(state = %self.state(), "Authentication manager active");
    }

    /// Subscribes to the auth and data channels.
    fn spawn_listeners(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let mut auth_rx = self.bus.subscribe(AUTH_CHANNEL);
        tokio::spawn(async move {
            loop {
                match auth_rx.recv().await {
                    Ok(Notice::Evaluate) => {
                        let _ = manager.has_credentials().await;
                    }
                    Ok(Notice::Logout) => {
                        let _ = manager.logout().await;
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth listener lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let manager = Arc::clone(self);
        let mut data_rx = self.bus.subscribe(DATA_CHANNEL);
        tokio::spawn(async move {
            loop {
                match data_rx.recv().await {
                    Ok(Notice::AuthFailed { reason }) => manager.on_auth_failed(&reason),
                    Ok(Notice::Opened { authenticated }) => manager.on_opened(authenticated),
                    Ok(Notice::Unavailable { attempts }) => manager.on_unavailable(attempts),
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Data listener lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ========================================================================
    // Login / Logout
    // ========================================================================

    /// Attempts an interactive login.
    ///
    /// Ticket method: calls the configured authentication route through the
    /// dispatcher; on success the credential record is persisted, the
    /// session flips authenticated, and the connection is reconfigured. On
    /// failure the returned error carries the server's message and the
    /// state returns to `Unauthenticated`.
    ///
    /// Challenge method: stores the candidate pair in memory and triggers a
    /// reconnect; success or failure is discovered asynchronously via the
    /// challenge handshake on the ensuing connection attempt.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for an empty principal or secret
    /// - [`Error::Config`] if no authentication route is configured (ticket)
    /// - the server-supplied error on rejection (ticket)
    pub async fn login(&self, principal: &str, secret: &str) -> Result<()> {
        if principal.is_empty() || secret.is_empty() {
            return Err(Error::invalid_argument("principal and secret are required"));
        }

        self.set_state(AuthState::Authenticating);

        if self.settings.method.is_challenge() {
            {
                let mut session = self.session.lock();
                session.set_pair(principal.to_string(), secret.to_string(), false);
            }
            debug!("Challenge login: candidate stored, reconnecting");
            self.configure_adapter();
            return Ok(());
        }

        let service = match self.settings.service.clone() {
            Some(service) => service,
            None => {
                self.set_state(AuthState::Unauthenticated);
                return Err(Error::config("no authentication route configured"));
            }
        };

        let mut args = CallArgs::new();
        args.insert("key".to_string(), Value::String(principal.to_string()));
        args.insert("secret".to_string(), Value::String(secret.to_string()));

        match self.dispatcher.invoke(&service, args).await {
            Ok(_) => {
                self.store.save(&CredentialRecord {
                    principal: principal.to_string(),
                    secret: secret.to_string(),
                })?;

                {
                    let mut session = self.session.lock();
                    session.set_pair(principal.to_string(), secret.to_string(), false);
                    session.authenticated = true;
                    session.state = AuthState::Authenticated;
                }

                self.configure_adapter();
                self.publish_state(AuthState::Authenticated);
                info!(principal, "Login succeeded");
                Ok(())
            }
            Err(err) => {
                self.set_state(AuthState::Unauthenticated);
                self.bus.publish(
                    AUTH_CHANNEL,
                    Notice::LoginFailed {
                        message: err.to_string(),
                    },
                );
                warn!(principal, error = %err, "Login failed");
                Err(err)
            }
        }
    }

    /// Logs out.
    ///
    /// The local effect is immediate: the flag flips, the stored record and
    /// in-memory pair are cleared, and the connection is reconfigured
    /// anonymous. The remote logout call is best-effort and raced against a
    /// fixed grace timeout — logout never hangs waiting on the network.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns store failures; the session is already logged out locally.
    pub async fn logout(&self) -> Result<()> {
        let was_authenticated = {
            let mut session = self.session.lock();
            let was = session.authenticated;
            session.authenticated = false;
            session.state = AuthState::Unauthenticated;
            session.clear_pair();
            was
        };

        self.store.clear()?;
        self.publish_state(AuthState::Unauthenticated);

        if was_authenticated && let Some(service) = &self.settings.logout_service {
            let call = self.dispatcher.call(service);
            match timeout(LOGOUT_GRACE, call).await {
                Ok(Ok(_)) => debug!("Remote logout settled"),
                Ok(Err(err)) => debug!(error = %err, "Remote logout failed"),
                Err(_) => debug!("Remote logout timed out"),
            }
        }

        self.configure_adapter();
        info!("Logged out");
        Ok(())
    }

    // ========================================================================
    // Credential Evaluation
    // ========================================================================

    /// Checks whether a usable principal/secret pair is available — from
    /// the session, the credential store, or static configuration.
    ///
    /// As a side effect the authenticated flag is reconciled with the
    /// outcome, and the connection is reconfigured if the flag changed.
    ///
    /// # Errors
    ///
    /// [`Error::NoCredentials`] when no usable pair exists.
    pub async fn has_credentials(&self) -> Result<()> {
        let pair = self.locate_pair();

        let changed = {
            let mut session = self.session.lock();
            let available = pair.is_some();
            let changed = session.authenticated != available;
            session.authenticated = available;

            match &pair {
                Some((principal, secret, preconfigured)) => {
                    session.set_pair(principal.clone(), secret.clone(), *preconfigured);
                    if changed {
                        session.state = AuthState::Authenticated;
                    }
                }
                None => {
                    session.clear_pair();
                    if changed {
                        session.state = AuthState::Unauthenticated;
                    }
                }
            }
            changed
        };

        if changed {
            let state = self.state();
            debug!(%state, "Credential availability changed");
            self.configure_adapter();
            self.publish_state(state);
        }

        if pair.is_some() {
            Ok(())
        } else {
            Err(Error::NoCredentials)
        }
    }

    /// Finds a usable pair: session first, then store, then static config.
    fn locate_pair(&self) -> Option<(String, String, bool)> {
        {
            let session = self.session.lock();
            if session.has_pair()
                && let (Some(principal), Some(secret)) = (&session.principal, &session.secret)
            {
                return Some((principal.clone(), secret.clone(), session.preconfigured));
            }
        }

        match self.store.load() {
            Ok(Some(record)) => return Some((record.principal, record.secret, false)),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "Credential store read failed"),
        }

        if self.settings.has_preconfigured()
            && let (Some(key), Some(secret)) = (&self.settings.key, &self.settings.secret)
        {
            return Some((key.clone(), secret.clone(), true));
        }

        None
    }

    /// Spawns the periodic re-validation timer.
    ///
    /// Runs [`AuthManager::has_credentials`] every `period` until the
    /// returned guard drops.
    #[must_use]
    pub fn start_revalidation(self: &Arc<Self>, period: Duration) -> RevalidationGuard {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let _ = manager.has_credentials().await;
            }
        });

        RevalidationGuard { handle }
    }

    // ========================================================================
    // Transport Notices
    // ========================================================================

    /// Handles a connection open reported by the transport.
    ///
    /// An open with credentials confirms a pending challenge login: the
    /// handshake succeeded without any call to the login route.
    pub(crate) fn on_opened(&self, with_credentials: bool) {
        let confirmed = {
            let mut session = self.session.lock();
            if with_credentials && session.has_pair() {
                session.authenticated = true;
                session.state = AuthState::Authenticated;
                true
            } else if session.state == AuthState::Unavailable {
                session.state = if session.authenticated {
                    AuthState::Authenticated
                } else {
                    AuthState::Unauthenticated
                };
                false
            } else {
                false
            }
        };

        if confirmed {
            let (record, preconfigured) = {
                let session = self.session.lock();
                (
                    match (&session.principal, &session.secret) {
                        (Some(principal), Some(secret)) => Some(CredentialRecord {
                            principal: principal.clone(),
                            secret: secret.clone(),
                        }),
                        _ => None,
                    },
                    session.preconfigured,
                )
            };

            if let Some(record) = record
                && !preconfigured
                && let Err(err) = self.store.save(&record)
            {
                warn!(error = %err, "Credential store write failed");
            }

            self.publish_state(AuthState::Authenticated);
            info!("Authenticated via connection handshake");
        }
    }

    /// Handles rejected credentials reported by the transport.
    ///
    /// During an interactive attempt the failure is recoverable: the state
    /// returns to `Unauthenticated` and the login UI gets the message. A
    /// preconfigured session also merely drops to `Unauthenticated`. Any
    /// other case is a forced logout — the store is cleared and a client
    /// restart is requested, since session state may be inconsistent with
    /// the server.
    pub(crate) fn on_auth_failed(&self, reason: &str) {
        let (was_authenticating, preconfigured) = {
            let session = self.session.lock();
            (
                session.state == AuthState::Authenticating,
                session.preconfigured,
            )
        };

        if was_authenticating {
            {
                let mut session = self.session.lock();
                session.authenticated = false;
                session.state = AuthState::Unauthenticated;
                session.clear_pair();
            }
            self.publish_state(AuthState::Unauthenticated);
            self.bus.publish(
                AUTH_CHANNEL,
                Notice::LoginFailed {
                    message: reason.to_string(),
                },
            );
            warn!(reason, "Login attempt rejected");
            return;
        }

        if preconfigured {
            {
                let mut session = self.session.lock();
                session.authenticated = false;
                session.state = AuthState::Unauthenticated;
            }
            self.publish_state(AuthState::Unauthenticated);
            warn!(reason, "Preconfigured credentials rejected");
            return;
        }

        if let Err(err) = self.store.clear() {
            warn!(error = %err, "Credential store clear failed");
        }
        {
            let mut session = self.session.lock();
            session.authenticated = false;
            session.state = AuthState::Unauthenticated;
            session.clear_pair();
        }
        self.publish_state(AuthState::Unauthenticated);

        error!(reason, "Forced logout; requesting client restart");
        (self.effects)(HostEffect::RestartClient);
    }

    /// Handles exhausted reconnect attempts.
    pub(crate) fn on_unavailable(&self, attempts: u32) {
        self.set_state(AuthState::Unavailable);
        warn!(attempts, "Authentication service unavailable");
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Pushes connection parameters matching the session into the adapter.
    fn configure_adapter(&self) {
        let params = {
            let session = self.session.lock();
            match (&session.principal, &session.secret) {
                (Some(principal), Some(secret)) if session.has_pair() => {
                    ConnectionParams::with_credentials(
                        self.settings.method,
                        principal.clone(),
                        secret.clone(),
                    )
                }
                _ => ConnectionParams::anonymous(),
            }
        };

        self.connection_started.store(true, Ordering::SeqCst);
        self.adapter.configure(params);
    }

    fn set_state(&self, state: AuthState) {
        self.session.lock().state = state;
        self.publish_state(state);
    }

    fn publish_state(&self, state: AuthState) {
        self.bus.publish(AUTH_CHANNEL, Notice::StateChanged { state });
    }
}

// ============================================================================
// RevalidationGuard
// ============================================================================

/// Cancels the re-validation timer on drop.
#[derive(Debug)]
pub struct RevalidationGuard {
    handle: JoinHandle<()>,
}

impl Drop for RevalidationGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// Tests
// ============================================================================
