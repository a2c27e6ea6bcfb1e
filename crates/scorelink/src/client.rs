//! `Client` builder and the sign-in flows.
//!
//! The client is an explicit context object: build one per signed-in app
//! (or per test) and clone it freely, clones share everything. It ties the
//! layers together:
//!
//! ```text
//! login/register/restore ──→ CredentialStore + SessionStore
//!                                 │
//!                                 ├──→ connection actor ──→ EventBus ──→ listeners
//!                                 └──→ refresh loop ──renew──→ represent()
//! ```

use std::sync::{Arc, Mutex};

use scorelink_events::{EventBus, ListenerError};
use scorelink_protocol::{Identity, LeaderboardUpdated};
use scorelink_session::{
    AuthApi, AuthGrant, Credential, CredentialStore, SessionSnapshot, SessionStore,
};
use scorelink_timing::TaskHandle;
use scorelink_transport::{Connector, WebSocketConnector};
use tokio::sync::watch;

use crate::connection::{ConnectionHandle, ConnectionStatus, LinkContext, spawn_connection};
use crate::refresh::{RefreshOutcome, Refresher};
use crate::{ClientConfig, HttpAuthApi, Navigator, Observer, ScorelinkError, TracingObserver};

/// Builder for configuring a [`Client`].
///
/// # Example
///
/// ```rust,no_run
/// use scorelink::{Client, ClientConfig};
///
/// # async fn run() -> Result<(), scorelink::ScorelinkError> {
/// let client = Client::builder()
///     .config(ClientConfig::from_env())
///     .build()?;
/// let me = client.login("ann@example.com", "hunter2").await?;
/// println!("signed in as {} with {} points", me.username, me.score);
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
    observer: Arc<dyn Observer>,
    navigator: Arc<dyn Navigator>,
}

impl ClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            observer: Arc::new(TracingObserver),
            navigator: Arc::new(TracingObserver),
        }
    }

    /// Sets the client configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Receives renewal failures and reconnect exhaustion.
    pub fn observer(mut self, observer: impl Observer) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Routes the user to sign-in after a credential rejection.
    pub fn navigator(mut self, navigator: impl Navigator) -> Self {
        self.navigator = Arc::new(navigator);
        self
    }

    /// Builds a client talking HTTP to `api_url` and WebSocket to
    /// `socket_url`.
    ///
    /// Must be called inside a Tokio runtime: the connection actor is
    /// spawned here.
    pub fn build(self) -> Result<Client, ScorelinkError> {
        let config = self.config.clone().validated();
        let auth = HttpAuthApi::new(config.api_url.clone(), config.request_timeout)
            .map_err(|e| ScorelinkError::Config(e.to_string()))?;
        let connector = WebSocketConnector::new(config.socket_url.clone());
        Ok(self.config(config).build_with(auth, connector))
    }

    /// Builds a client on custom auth and transport implementations.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build_with<A: AuthApi, C: Connector>(self, auth: A, connector: C) -> Client<A, C> {
        let config = self.config.validated();
        let credentials = CredentialStore::new();
        let session = SessionStore::new();
        let events = EventBus::new();
        let (leaderboard, _) = watch::channel(None);
        let leaderboard = Arc::new(leaderboard);

        // Built-in listeners run first so UI listeners see updated state.
        let score_session = session.clone();
        events.on_score_updated(move |update| {
            score_session.apply_score(update);
            Ok::<(), ListenerError>(())
        });
        let board = Arc::clone(&leaderboard);
        events.on_leaderboard_updated(move |update| {
            store_leaderboard(&board, update);
            Ok::<(), ListenerError>(())
        });

        let (connection, status) = spawn_connection(
            connector,
            LinkContext {
                credentials: credentials.clone(),
                session: session.clone(),
                events: events.clone(),
                leaderboard: Arc::clone(&leaderboard),
                observer: Arc::clone(&self.observer),
                navigator: Arc::clone(&self.navigator),
                reconnect: config.reconnect,
                handshake_timeout: config.handshake_timeout,
            },
        );

        let refresher = Refresher {
            auth: Arc::new(auth),
            credentials: credentials.clone(),
            session: session.clone(),
            connection: connection.clone(),
            observer: self.observer,
            policy: config.refresh,
        };

        Client {
            inner: Arc::new(ClientInner {
                config,
                credentials,
                session,
                events,
                connection,
                status,
                leaderboard,
                refresher,
                refresh_task: Mutex::new(None),
            }),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the newest board; an update older than the cached one is dropped.
fn store_leaderboard(cell: &watch::Sender<Option<LeaderboardUpdated>>, update: &LeaderboardUpdated) {
    cell.send_if_modified(|current| match current {
        Some(existing) if existing.updated_at > update.updated_at => {
            tracing::debug!(updated_at = %update.updated_at, "dropping stale leaderboard");
            false
        }
        _ => {
            *current = Some(update.clone());
            true
        }
    });
}

struct ClientInner<A: AuthApi, C: Connector> {
    config: ClientConfig,
    credentials: CredentialStore,
    session: SessionStore,
    events: EventBus,
    connection: ConnectionHandle<C::Connection>,
    status: watch::Receiver<ConnectionStatus>,
    leaderboard: Arc<watch::Sender<Option<LeaderboardUpdated>>>,
    refresher: Refresher<A, C::Connection>,
    refresh_task: Mutex<Option<TaskHandle>>,
}

/// The live scoreboard client.
///
/// Cheap to clone; clones share the same session, connection, and
/// listeners.
pub struct Client<A: AuthApi = HttpAuthApi, C: Connector = WebSocketConnector> {
    inner: Arc<ClientInner<A, C>>,
}

impl<A: AuthApi, C: Connector> Clone for Client<A, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Client {
    /// Creates a new builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<A: AuthApi, C: Connector> Client<A, C> {
    // -- sign-in flows -----------------------------------------------------

    /// Signs in with email and password, then opens the push channel.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, ScorelinkError> {
        let grant = self.inner.refresher.auth.login(email, password).await?;
        tracing::info!(user = %grant.identity.id, "signed in");
        Ok(self.establish(grant).await)
    }

    /// Creates an account, then opens the push channel.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<Identity, ScorelinkError> {
        let grant = self
            .inner
            .refresher
            .auth
            .register(email, username, password)
            .await?;
        tracing::info!(user = %grant.identity.id, "registered");
        Ok(self.establish(grant).await)
    }

    /// Re-enters a session from a credential kept from an earlier run,
    /// then refreshes the profile from the server.
    ///
    /// # Errors
    /// Whatever the profile refresh fails with. An `Unauthorized` answer
    /// signs the user out again.
    pub async fn restore(
        &self,
        credential: Credential,
        identity: Identity,
    ) -> Result<Identity, ScorelinkError> {
        tracing::info!(user = %identity.id, "restoring session");
        self.establish(AuthGrant {
            credential,
            identity,
        })
        .await;
        self.refresh_profile().await
    }

    /// Signs out: revokes the credential (best effort), clears local
    /// state, closes the channel, and stops the refresh loop.
    pub async fn logout(&self) {
        if let Some(credential) = self.inner.credentials.current() {
            if let Err(e) = self.inner.refresher.auth.revoke(&credential).await {
                tracing::debug!(error = %e, "revoke failed, signing out locally anyway");
            }
        }
        self.sign_out_locally().await;
        tracing::info!("signed out");
    }

    /// Fetches the profile and replaces the local identity with it.
    ///
    /// A newer pushed score survives an older profile snapshot. An
    /// `Unauthorized` answer signs the user out. If the user signed out or
    /// in again while the fetch was in flight, the profile is dropped and
    /// this returns [`ScorelinkError::NotSignedIn`].
    pub async fn refresh_profile(&self) -> Result<Identity, ScorelinkError> {
        let credential = self
            .inner
            .credentials
            .current()
            .ok_or(ScorelinkError::NotSignedIn)?;

        match self.inner.refresher.auth.fetch_profile(&credential).await {
            Ok(identity) => {
                let applied = self.inner.credentials.with_current(&credential, || {
                    self.inner.session.replace_identity(identity);
                });
                if !applied {
                    tracing::debug!("session changed during profile fetch, discarding profile");
                    return Err(ScorelinkError::NotSignedIn);
                }
                self.inner
                    .session
                    .identity()
                    .ok_or(ScorelinkError::NotSignedIn)
            }
            Err(e) if e.is_unauthorized() => {
                tracing::warn!(error = %e, "profile refresh unauthorized, signing out");
                self.sign_out_locally().await;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Runs one credential check now instead of waiting for the next tick.
    pub async fn refresh_credential_now(&self) -> Result<RefreshOutcome, ScorelinkError> {
        Ok(self.inner.refresher.refresh_if_needed().await?)
    }

    // -- connection --------------------------------------------------------

    /// Opens the push channel with the current credential.
    ///
    /// No-op while a channel is open or being opened. From a closed state
    /// (including after reconnects were exhausted) the attempt counter
    /// starts over and the first attempt is immediate.
    pub async fn connect(&self) -> Result<(), ScorelinkError> {
        let credential = self
            .inner
            .credentials
            .current()
            .ok_or(ScorelinkError::NotSignedIn)?;
        self.inner.connection.connect(credential).await;
        Ok(())
    }

    /// Closes the push channel and cancels any pending reconnect.
    /// Idempotent; the session stays signed in.
    pub async fn disconnect(&self) {
        self.inner.connection.disconnect().await;
    }

    /// Presents the current credential on the live channel, or reconnects
    /// with it if the channel is down.
    pub async fn represent_credential(&self) {
        self.inner.connection.represent().await;
    }

    /// The current connection status.
    pub fn connection_status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// `true` once the server has welcomed the channel.
    pub fn is_connected(&self) -> bool {
        self.connection_status() == ConnectionStatus::Connected
    }

    /// Watches connection status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.clone()
    }

    // -- state -------------------------------------------------------------

    /// The shared credential store.
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    /// The shared session store.
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    /// A copy of the current identity snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.session.snapshot()
    }

    /// `true` while an identity snapshot is held.
    pub fn is_authenticated(&self) -> bool {
        self.inner.session.is_authenticated()
    }

    /// Push event subscriptions.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// The most recent leaderboard pushed by the server, if any arrived.
    pub fn leaderboard(&self) -> Option<LeaderboardUpdated> {
        self.inner.leaderboard.borrow().clone()
    }

    /// Watches leaderboard cache updates.
    pub fn watch_leaderboard(&self) -> watch::Receiver<Option<LeaderboardUpdated>> {
        self.inner.leaderboard.subscribe()
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// `true` while the credential refresh loop is running.
    pub fn is_refreshing(&self) -> bool {
        self.refresh_slot()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    // -- internals ---------------------------------------------------------

    async fn establish(&self, grant: AuthGrant) -> Identity {
        let AuthGrant {
            credential,
            identity,
        } = grant;
        self.inner.credentials.replace(credential.clone());
        self.inner.session.replace_identity(identity.clone());
        self.inner.connection.connect(credential).await;
        self.start_refresh();
        identity
    }

    /// Starts the refresh loop unless one is already running.
    fn start_refresh(&self) {
        let mut slot = self.refresh_slot();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        *slot = Some(self.inner.refresher.clone().start());
    }

    async fn sign_out_locally(&self) {
        let task = self.refresh_slot().take();
        if let Some(task) = task {
            task.cancel().await;
        }
        self.inner.credentials.clear();
        self.inner.session.clear();
        self.inner.leaderboard.send_replace(None);
        self.inner.connection.disconnect().await;
    }

    fn refresh_slot(&self) -> std::sync::MutexGuard<'_, Option<TaskHandle>> {
        self.inner
            .refresh_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
