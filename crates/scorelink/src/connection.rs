//! The connection actor: one task that owns the push channel.
//!
//! Caller commands (connect, represent, disconnect) and transport callbacks
//! (attempt finished, frame received, channel dropped, retry timer fired)
//! all arrive on one mpsc channel. Each handler runs to completion without
//! awaiting, so state transitions never interleave.
//!
//! ```text
//!            connect()                 Welcome
//!  Absent ─────────────→ Connecting ───────────→ Open
//!                          ↑    │                  │ dropped / Disconnect{retry}
//!                 RetryDue │    │ transient        ↓
//!                          └────┴──────────── schedule_retry ──→ Closed (exhausted)
//!
//!  auth rejection (any time) ──→ Closed, session cleared, no retry
//!  disconnect()  (any time)  ──→ DisconnectedByCaller
//! ```
//!
//! Every I/O helper task is tagged with the generation that spawned it.
//! Entering a new phase bumps the generation, so a callback from an
//! abandoned attempt or timer is recognised and dropped.

use std::sync::Arc;
use std::time::Duration;

use scorelink_events::EventBus;
use scorelink_protocol::{ClientFrame, Codec, JsonCodec, LeaderboardUpdated, ServerFrame};
use scorelink_session::{Credential, CredentialStore, SessionStore};
use scorelink_timing::{Backoff, ReconnectPolicy, RetryDecision};
use scorelink_transport::{Connection, Connector};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

use crate::{Navigator, Observer};

/// Command channel size for the connection actor.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// What the UI shows about the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// The server accepted the credential and pushes are flowing.
    Connected,
    /// An attempt is in flight or a retry is pending.
    Connecting,
    /// No channel and no retry pending.
    Disconnected,
}

/// Collaborators the actor reads and writes.
pub(crate) struct LinkContext {
    pub(crate) credentials: CredentialStore,
    pub(crate) session: SessionStore,
    pub(crate) events: EventBus,
    pub(crate) leaderboard: Arc<watch::Sender<Option<LeaderboardUpdated>>>,
    pub(crate) observer: Arc<dyn Observer>,
    pub(crate) navigator: Arc<dyn Navigator>,
    pub(crate) reconnect: ReconnectPolicy,
    pub(crate) handshake_timeout: Duration,
}

/// Messages processed by the actor.
enum Command<K> {
    Connect {
        credential: Credential,
        done: oneshot::Sender<()>,
    },
    Represent {
        done: oneshot::Sender<()>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
    AttemptFinished {
        generation: u64,
        outcome: Result<Arc<K>, AttemptFailure>,
    },
    Inbound {
        generation: u64,
        frame: ServerFrame,
    },
    Dropped {
        generation: u64,
        reason: String,
    },
    RetryDue {
        generation: u64,
    },
}

/// Why an attempt did not produce an open channel.
#[derive(Debug)]
enum AttemptFailure {
    /// The server refused the credential.
    Rejected(String),
    /// Network trouble, timeout, or the channel closed mid-handshake.
    Transient(String),
    /// The server answered the handshake with `Disconnect`.
    ServerClosed { reason: String, retry: bool },
}

enum Link<K> {
    Absent,
    /// `task` is either the attempt in flight or the retry timer.
    Connecting { task: AbortHandle },
    Open { conn: Arc<K>, reader: AbortHandle },
    Closed,
    DisconnectedByCaller,
}

/// Handle to the running connection actor.
///
/// Every method resolves once the actor has processed the command, not
/// once the channel is open. Watch the status for that.
pub(crate) struct ConnectionHandle<K> {
    tx: mpsc::Sender<Command<K>>,
}

impl<K> Clone for ConnectionHandle<K> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<K: Connection> ConnectionHandle<K> {
    /// Opens the channel with `credential` unless one is already open or
    /// being opened.
    pub(crate) async fn connect(&self, credential: Credential) {
        self.request(|done| Command::Connect { credential, done })
            .await;
    }

    /// Presents the current credential again.
    pub(crate) async fn represent(&self) {
        self.request(|done| Command::Represent { done }).await;
    }

    /// Closes the channel and cancels any pending retry.
    pub(crate) async fn disconnect(&self) {
        self.request(|done| Command::Disconnect { done }).await;
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<()>) -> Command<K>,
    ) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(make(done_tx)).await.is_err() {
            debug!("connection actor is gone");
            return;
        }
        let _ = done_rx.await;
    }
}

/// Spawns the connection actor.
pub(crate) fn spawn_connection<C: Connector>(
    connector: C,
    ctx: LinkContext,
) -> (
    ConnectionHandle<C::Connection>,
    watch::Receiver<ConnectionStatus>,
) {
    let (tx, receiver) = mpsc::channel(COMMAND_CHANNEL_SIZE);
    let (status, status_rx) = watch::channel(ConnectionStatus::Disconnected);
    let actor = ConnectionActor {
        connector: Arc::new(connector),
        backoff: Backoff::new(ctx.reconnect),
        ctx,
        link: Link::Absent,
        generation: 0,
        status,
        receiver,
        weak_tx: tx.downgrade(),
        codec: JsonCodec,
    };
    tokio::spawn(actor.run());
    (ConnectionHandle { tx }, status_rx)
}

struct ConnectionActor<C: Connector> {
    connector: Arc<C>,
    ctx: LinkContext,
    backoff: Backoff,
    link: Link<C::Connection>,
    generation: u64,
    status: watch::Sender<ConnectionStatus>,
    receiver: mpsc::Receiver<Command<C::Connection>>,
    /// Helper tasks report back through this. Weak so the actor stops once
    /// every handle is dropped.
    weak_tx: mpsc::WeakSender<Command<C::Connection>>,
    codec: JsonCodec,
}

impl<C: Connector> ConnectionActor<C> {
    async fn run(mut self) {
        debug!("connection actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                Command::Connect { credential, done } => {
                    self.handle_connect(credential);
                    let _ = done.send(());
                }
                Command::Represent { done } => {
                    self.handle_represent();
                    let _ = done.send(());
                }
                Command::Disconnect { done } => {
                    self.handle_disconnect();
                    let _ = done.send(());
                }
                Command::AttemptFinished {
                    generation,
                    outcome,
                } => {
                    if generation == self.generation {
                        self.handle_attempt_finished(outcome);
                    } else if let Ok(conn) = outcome {
                        trace!(generation, "closing channel from abandoned attempt");
                        close_detached(conn);
                    }
                }
                Command::Inbound { generation, frame }
                    if generation == self.generation =>
                {
                    self.handle_frame(frame);
                }
                Command::Dropped { generation, reason }
                    if generation == self.generation =>
                {
                    self.handle_dropped(reason);
                }
                Command::RetryDue { generation } if generation == self.generation => {
                    self.handle_retry_due();
                }
                Command::Inbound { generation, .. }
                | Command::Dropped { generation, .. }
                | Command::RetryDue { generation } => {
                    trace!(
                        generation,
                        current = self.generation,
                        "ignoring callback from a superseded attempt"
                    );
                }
            }
        }

        self.release_link();
        debug!("connection actor stopped");
    }

    // -- caller commands ---------------------------------------------------

    fn handle_connect(&mut self, credential: Credential) {
        if matches!(self.link, Link::Open { .. } | Link::Connecting { .. }) {
            debug!("connect ignored, channel already open or opening");
            return;
        }
        self.backoff.reset();
        self.start_attempt(credential);
    }

    fn handle_represent(&mut self) {
        let open = match &self.link {
            Link::Open { conn, .. } => Some(Arc::clone(conn)),
            _ => None,
        };
        let Some(credential) = self.ctx.credentials.current() else {
            debug!("represent skipped, no credential");
            return;
        };

        if let Some(conn) = open {
            let frame = ClientFrame::Reauthenticate {
                token: credential.token().to_string(),
            };
            let bytes = match self.codec.encode(&frame) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "failed to encode reauthenticate frame");
                    return;
                }
            };
            tokio::spawn(async move {
                if let Err(e) = conn.send(&bytes).await {
                    warn!(conn_id = %conn.id(), error = %e, "failed to re-present credential");
                }
            });
            debug!("credential re-presented on open channel");
            return;
        }

        match self.link {
            Link::Connecting { .. } => {
                debug!("represent while connecting, next attempt reads the store");
            }
            Link::DisconnectedByCaller => {
                debug!("represent ignored, disconnected by caller");
            }
            Link::Absent | Link::Closed => {
                self.backoff.reset();
                self.start_attempt(credential);
            }
            Link::Open { .. } => {}
        }
    }

    fn handle_disconnect(&mut self) {
        self.release_link();
        self.generation += 1;
        self.backoff.reset();
        if !matches!(self.link, Link::DisconnectedByCaller) {
            info!("disconnected by caller");
        }
        self.link = Link::DisconnectedByCaller;
        self.set_status(ConnectionStatus::Disconnected);
    }

    // -- transport callbacks -----------------------------------------------

    fn handle_attempt_finished(&mut self, outcome: Result<Arc<C::Connection>, AttemptFailure>) {
        match outcome {
            Ok(conn) => self.open(conn),
            Err(AttemptFailure::Rejected(reason)) => self.reject(&reason),
            Err(AttemptFailure::ServerClosed {
                reason,
                retry: false,
            }) => self.close_by_server(&reason),
            Err(AttemptFailure::ServerClosed {
                reason,
                retry: true,
            })
            | Err(AttemptFailure::Transient(reason)) => self.schedule_retry(&reason),
        }
    }

    fn handle_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Event(event) => {
                if matches!(self.link, Link::Open { .. }) {
                    self.ctx.events.dispatch(&event);
                } else {
                    trace!(kind = %event.kind(), "dropping push, channel not open");
                }
            }
            ServerFrame::AuthError { message } => self.reject(&message),
            ServerFrame::Disconnect {
                reason,
                retry: false,
            } => self.close_by_server(&reason),
            ServerFrame::Disconnect {
                reason,
                retry: true,
            } => self.schedule_retry(&reason),
            ServerFrame::Welcome { connection_id } => {
                debug!(%connection_id, "server acknowledged credential");
            }
        }
    }

    fn handle_dropped(&mut self, reason: String) {
        if matches!(self.link, Link::Open { .. }) {
            warn!(%reason, "channel dropped");
            self.schedule_retry(&reason);
        }
    }

    fn handle_retry_due(&mut self) {
        match self.ctx.credentials.current() {
            Some(credential) => self.start_attempt(credential),
            None => {
                info!("no credential at retry time, giving up");
                self.generation += 1;
                self.link = Link::Closed;
                self.set_status(ConnectionStatus::Disconnected);
            }
        }
    }

    // -- transitions -------------------------------------------------------

    fn start_attempt(&mut self, credential: Credential) {
        self.release_link();
        self.generation += 1;
        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let tx = self.weak_tx.clone();
        let codec = self.codec;
        let handshake_timeout = self.ctx.handshake_timeout;

        let task = tokio::spawn(async move {
            let outcome =
                open_channel(connector.as_ref(), &credential, handshake_timeout, codec).await;
            notify(&tx, Command::AttemptFinished {
                generation,
                outcome,
            })
            .await;
        });

        info!(
            generation,
            attempt = self.backoff.attempts() + 1,
            "connecting"
        );
        self.link = Link::Connecting {
            task: task.abort_handle(),
        };
        self.set_status(ConnectionStatus::Connecting);
    }

    fn open(&mut self, conn: Arc<C::Connection>) {
        self.backoff.reset();
        let reader = tokio::spawn(read_frames(
            Arc::clone(&conn),
            self.generation,
            self.weak_tx.clone(),
            self.codec,
        ));
        info!(conn_id = %conn.id(), generation = self.generation, "connected");
        self.link = Link::Open {
            conn,
            reader: reader.abort_handle(),
        };
        self.set_status(ConnectionStatus::Connected);
    }

    fn schedule_retry(&mut self, reason: &str) {
        self.release_link();
        self.generation += 1;

        match self.backoff.record_failure() {
            RetryDecision::Retry { attempt, delay } => {
                warn!(attempt, ?delay, reason, "connection attempt failed, retrying");
                let generation = self.generation;
                let tx = self.weak_tx.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    notify(&tx, Command::RetryDue { generation }).await;
                });
                self.link = Link::Connecting {
                    task: task.abort_handle(),
                };
                self.set_status(ConnectionStatus::Connecting);
            }
            RetryDecision::Exhausted { attempts } => {
                self.link = Link::Closed;
                self.set_status(ConnectionStatus::Disconnected);
                self.ctx.observer.on_reconnect_exhausted(attempts);
            }
        }
    }

    /// The server refused the credential: sign out and stay down.
    fn reject(&mut self, reason: &str) {
        warn!(reason, "credential rejected, signing out");
        self.release_link();
        self.generation += 1;
        self.backoff.reset();
        self.ctx.credentials.clear();
        self.ctx.session.clear();
        self.ctx.leaderboard.send_replace(None);
        self.link = Link::Closed;
        self.set_status(ConnectionStatus::Disconnected);
        self.ctx.navigator.route_to_sign_in();
    }

    fn close_by_server(&mut self, reason: &str) {
        info!(reason, "server closed the channel, not reconnecting");
        self.release_link();
        self.generation += 1;
        self.link = Link::Closed;
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Stops helper tasks and closes any open channel. Leaves `Absent`.
    fn release_link(&mut self) {
        match std::mem::replace(&mut self.link, Link::Absent) {
            Link::Connecting { task } => task.abort(),
            Link::Open { conn, reader } => {
                reader.abort();
                close_detached(conn);
            }
            previous @ (Link::Absent | Link::Closed | Link::DisconnectedByCaller) => {
                self.link = previous;
            }
        }
    }

    fn set_status(&self, next: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Helper tasks
// ---------------------------------------------------------------------------

/// Dials, then waits for the server's `Welcome`.
async fn open_channel<C: Connector>(
    connector: &C,
    credential: &Credential,
    handshake_timeout: Duration,
    codec: JsonCodec,
) -> Result<Arc<C::Connection>, AttemptFailure> {
    let conn = connector
        .connect(credential.token())
        .await
        .map_err(|e| {
            if e.is_auth_rejection() {
                AttemptFailure::Rejected(e.to_string())
            } else {
                AttemptFailure::Transient(e.to_string())
            }
        })?;

    let handshake = tokio::time::timeout(handshake_timeout, await_welcome(&conn, &codec)).await;
    match handshake {
        Ok(Ok(())) => Ok(Arc::new(conn)),
        Ok(Err(failure)) => {
            let _ = conn.close().await;
            Err(failure)
        }
        Err(_) => {
            let _ = conn.close().await;
            Err(AttemptFailure::Transient("handshake timed out".to_string()))
        }
    }
}

async fn await_welcome<K: Connection>(conn: &K, codec: &JsonCodec) -> Result<(), AttemptFailure> {
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                return Err(AttemptFailure::Transient(
                    "closed during handshake".to_string(),
                ));
            }
            Err(e) => return Err(AttemptFailure::Transient(e.to_string())),
        };

        match codec.decode::<ServerFrame>(&data) {
            Ok(ServerFrame::Welcome { connection_id }) => {
                debug!(conn_id = %conn.id(), %connection_id, "welcome received");
                return Ok(());
            }
            Ok(ServerFrame::AuthError { message }) => {
                return Err(AttemptFailure::Rejected(message));
            }
            Ok(ServerFrame::Disconnect { reason, retry }) => {
                return Err(AttemptFailure::ServerClosed { reason, retry });
            }
            Ok(ServerFrame::Event(event)) => {
                trace!(kind = %event.kind(), "dropping push received before welcome");
            }
            Err(e) => debug!(error = %e, "undecodable frame during handshake"),
        }
    }
}

/// Forwards decoded frames to the actor until the channel ends.
async fn read_frames<K: Connection>(
    conn: Arc<K>,
    generation: u64,
    tx: mpsc::WeakSender<Command<K>>,
    codec: JsonCodec,
) {
    let reason = loop {
        match conn.recv().await {
            Ok(Some(data)) => match codec.decode::<ServerFrame>(&data) {
                Ok(frame) => {
                    if !notify(&tx, Command::Inbound { generation, frame }).await {
                        return;
                    }
                }
                Err(e) => debug!(conn_id = %conn.id(), error = %e, "skipping undecodable frame"),
            },
            Ok(None) => break "closed by server".to_string(),
            Err(e) => break e.to_string(),
        }
    };
    notify(&tx, Command::Dropped { generation, reason }).await;
}

/// Sends `cmd` to the actor if it is still running.
async fn notify<K>(tx: &mpsc::WeakSender<Command<K>>, cmd: Command<K>) -> bool {
    match tx.upgrade() {
        Some(tx) => tx.send(cmd).await.is_ok(),
        None => false,
    }
}

fn close_detached<K: Connection>(conn: Arc<K>) {
    tokio::spawn(async move {
        if let Err(e) = conn.close().await {
            trace!(conn_id = %conn.id(), error = %e, "close failed");
        }
    });
}
