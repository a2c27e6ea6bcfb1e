//! Shared fakes for the client integration tests.
//!
//! - [`ScriptedConnector`]: an in-memory transport whose every dial
//!   follows a scripted outcome and records the token it was handed
//! - [`FakeAuth`]: an `AuthApi` with queued answers
//! - [`Recorder`]: observer + navigator that counts what it was told

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use scorelink::{
    AuthApi, AuthGrant, Client, ClientBuilder, ClientConfig, ConnectionStatus, Credential,
    Identity, LeaderboardEntry, LeaderboardUpdated, Navigator, Observer, PushEvent, Renewal,
    ScoreUpdated, SessionError, UserId,
};
use scorelink_protocol::{ClientFrame, ServerFrame};
use scorelink_transport::{Connection, ConnectionId, Connector, TransportError};
use tokio::sync::mpsc;
use tokio::time::Instant;

// =========================================================================
// Credentials and identities
// =========================================================================

static NEXT_JTI: AtomicU64 = AtomicU64::new(1);

/// A JWT-shaped token whose `exp` is `secs` from the wall clock. Every call
/// yields a distinct token.
pub fn jwt_expiring_in(secs: i64) -> String {
    let exp = Utc::now().timestamp() + secs;
    let jti = NEXT_JTI.fetch_add(1, Ordering::Relaxed);
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"1","exp":{exp},"jti":{jti}}}"#));
    format!("{header}.{payload}.sig")
}

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

pub fn identity(id: u64, score: i64, updated_at: DateTime<Utc>) -> Identity {
    Identity {
        id: UserId(id),
        email: format!("user{id}@example.com"),
        username: format!("user{id}"),
        score,
        created_at: at(1_600_000_000),
        updated_at,
    }
}

// =========================================================================
// In-memory transport
// =========================================================================

/// The server's end of one in-memory channel.
pub struct Peer {
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    sent: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
}

impl Peer {
    /// Pushes a frame to the client.
    pub fn push(&self, frame: &ServerFrame) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(serde_json::to_vec(frame).unwrap());
        }
    }

    /// Ends the channel from the server side.
    pub fn hang_up(&self) {
        self.tx.lock().unwrap().take();
    }

    /// Frames the client sent on this channel.
    pub fn sent_frames(&self) -> Vec<ClientFrame> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).unwrap())
            .collect()
    }

    /// `true` once the client closed this channel.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MemoryConnection {
    id: ConnectionId,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    peer: Arc<Peer>,
}

impl Connection for MemoryConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.peer.is_closed() {
            return Err(TransportError::SendFailed(io::Error::other("closed")));
        }
        self.peer.sent.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.peer.closed.store(true, Ordering::SeqCst);
        self.peer.hang_up();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// What the next dial does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Open and greet with `Welcome`.
    Accept,
    /// Wait, then open and greet.
    AcceptAfter(Duration),
    /// Refuse the upgrade with this HTTP status.
    Reject(u16),
    /// Fail to reach the server.
    Fail,
    /// Open, then answer the handshake with `AuthError`.
    AuthError,
    /// Open and never say anything.
    Silent,
    /// Open and send these frames, in order.
    Greet(Vec<ServerFrame>),
}

#[derive(Debug, Clone)]
pub struct Attempt {
    pub token: String,
    pub at: Instant,
}

struct ConnectorState {
    script: Mutex<VecDeque<Script>>,
    fallback: Mutex<Script>,
    attempts: Mutex<Vec<Attempt>>,
    peers: Mutex<Vec<Arc<Peer>>>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct ScriptedConnector {
    state: Arc<ConnectorState>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ConnectorState {
                script: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(Script::Accept),
                attempts: Mutex::new(Vec::new()),
                peers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Queues the outcome of the next unscripted dial.
    pub fn then(&self, step: Script) -> &Self {
        self.state.script.lock().unwrap().push_back(step);
        self
    }

    /// Outcome once the queue is empty. Defaults to [`Script::Accept`].
    pub fn otherwise(&self, step: Script) {
        *self.state.fallback.lock().unwrap() = step;
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.state.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.state.attempts.lock().unwrap().len()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.attempts().into_iter().map(|a| a.token).collect()
    }

    /// The server end of the `index`-th opened channel.
    pub fn peer(&self, index: usize) -> Arc<Peer> {
        Arc::clone(&self.state.peers.lock().unwrap()[index])
    }

    pub fn channels_opened(&self) -> usize {
        self.state.peers.lock().unwrap().len()
    }

    /// The server end of the most recently opened channel.
    pub fn last_peer(&self) -> Arc<Peer> {
        Arc::clone(self.state.peers.lock().unwrap().last().expect("no channel opened"))
    }

    fn open(&self, greeting: Vec<ServerFrame>) -> MemoryConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = Arc::new(Peer {
            tx: Mutex::new(Some(tx)),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        for frame in &greeting {
            peer.push(frame);
        }
        self.state.peers.lock().unwrap().push(Arc::clone(&peer));
        MemoryConnection {
            id: ConnectionId::new(self.state.next_id.fetch_add(1, Ordering::Relaxed)),
            inbound: tokio::sync::Mutex::new(rx),
            peer,
        }
    }
}

pub fn welcome() -> ServerFrame {
    ServerFrame::Welcome {
        connection_id: "test".into(),
    }
}

impl Connector for ScriptedConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, token: &str) -> Result<MemoryConnection, TransportError> {
        self.state.attempts.lock().unwrap().push(Attempt {
            token: token.to_string(),
            at: Instant::now(),
        });
        let queued = self.state.script.lock().unwrap().pop_front();
        let step = queued.unwrap_or_else(|| self.state.fallback.lock().unwrap().clone());

        match step {
            Script::Accept => Ok(self.open(vec![welcome()])),
            Script::AcceptAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.open(vec![welcome()]))
            }
            Script::Reject(status) => Err(TransportError::Rejected { status }),
            Script::Fail => Err(TransportError::ConnectFailed(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "refused",
            ))),
            Script::AuthError => Ok(self.open(vec![ServerFrame::AuthError {
                message: "token expired".into(),
            }])),
            Script::Silent => Ok(self.open(Vec::new())),
            Script::Greet(frames) => Ok(self.open(frames)),
        }
    }
}

// =========================================================================
// Auth endpoints
// =========================================================================

struct AuthState {
    user: Mutex<Identity>,
    login_ttl_secs: Mutex<i64>,
    renewals: Mutex<VecDeque<Result<Renewal, SessionError>>>,
    renew_delay: Mutex<Duration>,
    profile_delay: Mutex<Duration>,
    profiles: Mutex<VecDeque<Result<Identity, SessionError>>>,
    revoke_fails: AtomicBool,
    renew_calls: AtomicU32,
    revoked: Mutex<Vec<String>>,
}

#[derive(Clone)]
pub struct FakeAuth {
    state: Arc<AuthState>,
}

impl FakeAuth {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AuthState {
                user: Mutex::new(identity(1, 10, at(1_700_000_000))),
                login_ttl_secs: Mutex::new(3600),
                renewals: Mutex::new(VecDeque::new()),
                renew_delay: Mutex::new(Duration::ZERO),
                profile_delay: Mutex::new(Duration::ZERO),
                profiles: Mutex::new(VecDeque::new()),
                revoke_fails: AtomicBool::new(false),
                renew_calls: AtomicU32::new(0),
                revoked: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Validity of credentials issued by login/register.
    pub fn issue_tokens_valid_for(&self, secs: i64) {
        *self.state.login_ttl_secs.lock().unwrap() = secs;
    }

    pub fn queue_renewal(&self, result: Result<Renewal, SessionError>) {
        self.state.renewals.lock().unwrap().push_back(result);
    }

    pub fn delay_renewals(&self, delay: Duration) {
        *self.state.renew_delay.lock().unwrap() = delay;
    }

    pub fn delay_profiles(&self, delay: Duration) {
        *self.state.profile_delay.lock().unwrap() = delay;
    }

    pub fn queue_profile(&self, result: Result<Identity, SessionError>) {
        self.state.profiles.lock().unwrap().push_back(result);
    }

    pub fn fail_revoke(&self) {
        self.state.revoke_fails.store(true, Ordering::SeqCst);
    }

    pub fn renew_calls(&self) -> u32 {
        self.state.renew_calls.load(Ordering::SeqCst)
    }

    pub fn revoked(&self) -> Vec<String> {
        self.state.revoked.lock().unwrap().clone()
    }

    fn grant(&self) -> AuthGrant {
        let ttl = *self.state.login_ttl_secs.lock().unwrap();
        AuthGrant {
            credential: Credential::new(jwt_expiring_in(ttl)),
            identity: self.state.user.lock().unwrap().clone(),
        }
    }
}

impl AuthApi for FakeAuth {
    async fn login(&self, _email: &str, password: &str) -> Result<AuthGrant, SessionError> {
        if password == "wrong" {
            return Err(SessionError::Rejected("Invalid credentials".into()));
        }
        Ok(self.grant())
    }

    async fn register(
        &self,
        email: &str,
        username: &str,
        _password: &str,
    ) -> Result<AuthGrant, SessionError> {
        {
            let mut user = self.state.user.lock().unwrap();
            user.email = email.to_string();
            user.username = username.to_string();
        }
        Ok(self.grant())
    }

    async fn renew(&self, _credential: &Credential) -> Result<Renewal, SessionError> {
        self.state.renew_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.renew_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let queued = self.state.renewals.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| {
            Ok(Renewal {
                credential: Credential::new(jwt_expiring_in(3600)),
                identity: None,
            })
        })
    }

    async fn fetch_profile(&self, _credential: &Credential) -> Result<Identity, SessionError> {
        let delay = *self.state.profile_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let queued = self.state.profiles.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| Ok(self.state.user.lock().unwrap().clone()))
    }

    async fn revoke(&self, credential: &Credential) -> Result<(), SessionError> {
        self.state
            .revoked
            .lock()
            .unwrap()
            .push(credential.token().to_string());
        if self.state.revoke_fails.load(Ordering::SeqCst) {
            return Err(SessionError::Unavailable("server down".into()));
        }
        Ok(())
    }
}

// =========================================================================
// Observer / navigator
// =========================================================================

#[derive(Default)]
struct RecorderState {
    renewal_failures: AtomicU32,
    exhausted: Mutex<Vec<u32>>,
    sign_in_routes: AtomicU32,
}

#[derive(Clone, Default)]
pub struct Recorder {
    state: Arc<RecorderState>,
}

impl Recorder {
    pub fn renewal_failures(&self) -> u32 {
        self.state.renewal_failures.load(Ordering::SeqCst)
    }

    pub fn exhausted(&self) -> Vec<u32> {
        self.state.exhausted.lock().unwrap().clone()
    }

    pub fn sign_in_routes(&self) -> u32 {
        self.state.sign_in_routes.load(Ordering::SeqCst)
    }
}

impl Observer for Recorder {
    fn on_renewal_failed(&self, _error: &SessionError) {
        self.state.renewal_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn on_reconnect_exhausted(&self, attempts: u32) {
        self.state.exhausted.lock().unwrap().push(attempts);
    }
}

impl Navigator for Recorder {
    fn route_to_sign_in(&self) {
        self.state.sign_in_routes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn score_push(new_score: i64, points_earned: i64, updated_at: DateTime<Utc>) -> ServerFrame {
    ServerFrame::Event(PushEvent::ScoreUpdated(ScoreUpdated {
        new_score,
        points_earned,
        updated_at,
    }))
}

pub fn leaderboard_push(top_score: i64, updated_at: DateTime<Utc>) -> ServerFrame {
    ServerFrame::Event(PushEvent::LeaderboardUpdated(LeaderboardUpdated {
        entries: vec![LeaderboardEntry {
            id: UserId(7),
            username: "leader".into(),
            score: top_score,
            rank: 1,
        }],
        updated_at,
    }))
}

// =========================================================================
// Harness
// =========================================================================

pub type TestClient = Client<FakeAuth, ScriptedConnector>;

pub struct Harness {
    pub client: TestClient,
    pub auth: FakeAuth,
    pub connector: ScriptedConnector,
    pub recorder: Recorder,
}

pub fn harness() -> Harness {
    harness_with(ClientConfig::default())
}

pub fn harness_with(config: ClientConfig) -> Harness {
    let auth = FakeAuth::new();
    let connector = ScriptedConnector::new();
    let recorder = Recorder::default();
    let client = ClientBuilder::new()
        .config(config)
        .observer(recorder.clone())
        .navigator(recorder.clone())
        .build_with(auth.clone(), connector.clone());
    Harness {
        client,
        auth,
        connector,
        recorder,
    }
}

/// Waits (in virtual time) until the client reports `want`.
pub async fn wait_for_status(client: &TestClient, want: ConnectionStatus) {
    let mut rx = client.watch_status();
    tokio::time::timeout(Duration::from_secs(600), rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {want:?}"))
        .expect("connection actor stopped");
}

/// Lets spawned tasks run without letting any retry timer fire.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Polls `cond` in virtual time until it holds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held");
}

/// Logs in and waits for the push channel to open.
pub async fn sign_in(h: &Harness) -> Identity {
    let me = h.client.login("user1@example.com", "pw").await.unwrap();
    wait_for_status(&h.client, ConnectionStatus::Connected).await;
    me
}

/// A credential valid for an hour.
pub fn fresh_credential() -> Credential {
    Credential::new(jwt_expiring_in(3600))
}
