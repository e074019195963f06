/// Per-connection Stratum session
///
/// Holds the identity, auth and work state of one miner plus the write half
/// of its socket. The engine and the job broadcaster both write to a
/// session; the writer mutex keeps at most one write in flight.

use anyhow::{anyhow, Result};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub type SessionWriter = Box<dyn AsyncWrite + Send + Unpin>;

static NEXT_SESSION_KEY: AtomicU64 = AtomicU64::new(1);

pub const DEFAULT_WORKER: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub login: String,
    pub worker: String,
    pub authorized: bool,
    /// Subscription id handed out on `mining.subscribe`.
    pub sid: String,
    pub extranonce1: String,
    /// Accepted share target (hex).
    pub target: String,
    /// Target announced with the next job (hex).
    pub target_next_job: String,
    /// Negotiated version-rolling mask, 0 if none.
    pub version_mask: u32,
}

pub struct Session {
    key: u64,
    tag: u16,
    ip: IpAddr,
    timeout: Duration,
    state: RwLock<SessionState>,
    deadline: Mutex<Instant>,
    writer: tokio::sync::Mutex<Option<SessionWriter>>,
    /// Fired by `close`; the read loop exits on it.
    closed: CancellationToken,
}

impl Session {
    pub fn new(tag: u16, ip: IpAddr, writer: SessionWriter, timeout: Duration) -> Self {
        Self {
            key: NEXT_SESSION_KEY.fetch_add(1, Ordering::Relaxed),
            tag,
            ip,
            timeout,
            state: RwLock::new(SessionState {
                worker: DEFAULT_WORKER.to_string(),
                ..Default::default()
            }),
            deadline: Mutex::new(Instant::now() + timeout),
            writer: tokio::sync::Mutex::new(Some(writer)),
            closed: CancellationToken::new(),
        }
    }

    /// Process-unique registry key.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Admission slot tag.
    pub fn tag(&self) -> u16 {
        self.tag
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn is_authorized(&self) -> bool {
        self.state.read().authorized
    }

    pub fn login(&self) -> String {
        self.state.read().login.clone()
    }

    pub fn version_mask(&self) -> u32 {
        self.state.read().version_mask
    }

    pub fn subscribe(&self, target: &str, sid: String, extranonce1: String) {
        let mut state = self.state.write();
        state.target = target.to_string();
        state.target_next_job = target.to_string();
        state.sid = sid;
        state.extranonce1 = extranonce1;
    }

    pub fn authorize(&self, login: &str, worker: &str) {
        let mut state = self.state.write();
        state.login = login.to_string();
        state.worker = worker.to_string();
        state.authorized = true;
    }

    pub fn set_version_mask(&self, mask: u32) {
        self.state.write().version_mask = mask;
    }

    pub fn deadline(&self) -> Instant {
        *self.deadline.lock()
    }

    /// Push the idle read deadline out by one timeout.
    pub fn refresh_deadline(&self) {
        *self.deadline.lock() = Instant::now() + self.timeout;
    }

    pub async fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        let line = serde_json::to_string(message)?;
        self.send_line(&line).await
    }

    /// Write one JSON line. Fails if the session is closed or the write
    /// does not finish within the session timeout.
    pub async fn send_line(&self, line: &str) -> Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| anyhow!("session {} is closed", self.key))?;

        tokio::time::timeout(self.timeout, async {
            writer.write_all(&buf).await?;
            writer.flush().await
        })
        .await
        .map_err(|_| anyhow!("write to {} timed out", self.ip))??;
        Ok(())
    }

    /// Shut the write half down and wake the read loop. Idempotent.
    pub async fn close(&self) {
        self.closed.cancel();
        let writer = self.writer.lock().await.take();
        if let Some(mut w) = writer {
            let _ = w.shutdown().await;
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }

    /// Resolves once `close` has been called.
    pub async fn wait_closed(&self) {
        self.closed.cancelled().await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("tag", &self.tag)
            .field("ip", &self.ip)
            .field("state", &*self.state.read())
            .finish()
    }
}
