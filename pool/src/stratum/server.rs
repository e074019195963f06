/// Stratum server - TCP accept loop and per-connection read loop
///
/// Accept order per socket: policy check (ban / rate), then a blocking wait
/// for an admission slot, then one task per session. While every slot is
/// taken the accept loop itself stalls and the kernel backlog queues the
/// rest.

use anyhow::{anyhow, Result};
use futures::StreamExt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};

use super::admission::{Admission, Slot};
use super::handlers::Flow;
use super::protocol::{StratumError, StratumRequest, StratumResponse, MAX_REQ_SIZE};
use super::registry::SessionRegistry;
use super::session::Session;
use crate::metrics::prometheus as metrics;
use crate::policy::Policy;
use crate::work::WorkSource;

#[derive(Debug, Clone)]
pub struct StratumSettings {
    pub listen: String,
    /// Idle read deadline, also the write timeout.
    pub timeout: Duration,
    pub max_conn: usize,
    pub pool_id: u16,
    /// Target every session starts with (hex).
    pub default_target: String,
}

pub struct StratumServer {
    pub(super) settings: StratumSettings,
    pub(super) registry: Arc<SessionRegistry>,
    pub(super) work: Arc<dyn WorkSource>,
    pub(super) policy: Arc<dyn Policy>,
}

impl StratumServer {
    pub fn new(
        settings: StratumSettings,
        registry: Arc<SessionRegistry>,
        work: Arc<dyn WorkSource>,
        policy: Arc<dyn Policy>,
    ) -> Self {
        tracing::info!(
            "🌐 Creating Stratum server on {} (max_conn={}, timeout={}s, pool_id={})",
            settings.listen,
            settings.max_conn,
            settings.timeout.as_secs(),
            settings.pool_id
        );
        Self {
            settings,
            registry,
            work,
            policy,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Bind the listener with SO_REUSEADDR so restarts don't trip on TIME_WAIT.
    pub fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = self
            .settings
            .listen
            .parse()
            .map_err(|e| anyhow!("Invalid address '{}': {}", self.settings.listen, e))?;

        let socket = socket2::Socket::new(
            socket2::Domain::for_address(addr),
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&socket2::SockAddr::from(addr))?;
        socket.listen(1024)?;
        let std_listener: std::net::TcpListener = socket.into();
        Ok(TcpListener::from_std(std_listener)?)
    }

    pub async fn start(self: Arc<Self>) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Run the accept loop on an already bound listener.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        tracing::info!("✅ Stratum listening on {}", local);

        let mut admission = Admission::new(self.settings.max_conn);
        loop {
            let (socket, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            tracing::info!("🔌 Accept Stratum TCP connection from {}", peer_addr);

            if let Err(e) = socket2::SockRef::from(&socket).set_keepalive(true) {
                tracing::debug!("set_keepalive failed for {}: {}", peer_addr, e);
            }

            let ip = peer_addr.ip();
            if self.policy.is_banned(ip) || !self.policy.apply_limit_policy(ip) {
                tracing::warn!("🚫 Rejecting {} (banned or over connection limit)", ip);
                drop(socket);
                continue;
            }

            let Some(slot) = admission.acquire().await else {
                return Err(anyhow!("admission pool closed"));
            };

            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(socket, ip, slot).await {
                    tracing::error!("Connection error from {}: {}", peer_addr, e);
                }
            });
        }
    }

    async fn handle_connection(&self, socket: TcpStream, ip: IpAddr, slot: Slot) -> Result<()> {
        let (reader, writer) = socket.into_split();
        let session = Arc::new(Session::new(
            slot.tag(),
            ip,
            Box::new(writer),
            self.settings.timeout,
        ));
        metrics::inc_connections();

        let result = self.read_loop(&session, reader).await;

        self.registry.unregister(session.key()).await;
        session.close().await;
        metrics::dec_connections();
        drop(slot);
        result
    }

    async fn read_loop(&self, session: &Arc<Session>, reader: OwnedReadHalf) -> Result<()> {
        let ip = session.ip();
        // Raw bytes per line; UTF-8 is left to the JSON parser.
        let codec =
            AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), MAX_REQ_SIZE);
        let mut lines = FramedRead::new(reader, codec);

        loop {
            let next = tokio::select! {
                _ = session.wait_closed() => {
                    tracing::info!(
                        "🔌 Session {} from {} closed by the server",
                        session.key(),
                        ip
                    );
                    return Ok(());
                }
                next = tokio::time::timeout_at(session.deadline(), lines.next()) => next,
            };
            let next = match next {
                Ok(next) => next,
                Err(_) => {
                    // a job push may have moved the deadline while we slept
                    if session.deadline() > tokio::time::Instant::now() {
                        continue;
                    }
                    tracing::warn!("⏱️  Connection timeout: {}", ip);
                    self.policy.ban_client(ip);
                    return Ok(());
                }
            };

            let line = match next {
                None => {
                    tracing::info!("📥 Client {} disconnected", ip);
                    return Ok(());
                }
                Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                    tracing::error!("Socket flood detected from {}", ip);
                    self.policy.ban_client(ip);
                    return Ok(());
                }
                Some(Err(AnyDelimiterCodecError::Io(e))) => {
                    let state = session.snapshot();
                    tracing::error!(
                        "Error reading from socket: {} | Address: [{}] | Name: [{}] | IP: [{}]",
                        e,
                        state.login,
                        state.worker,
                        ip
                    );
                    return Err(e.into());
                }
                Some(Ok(line)) => line,
            };

            if line.len() <= 1 {
                continue;
            }

            let request: StratumRequest = match serde_json::from_slice(&line) {
                Ok(r) => r,
                Err(e) => {
                    self.policy.apply_malformed_policy(ip);
                    tracing::error!("Malformed stratum request from {}: {}", ip, e);
                    session
                        .send(&StratumResponse::error(
                            serde_json::Value::Null,
                            StratumError::parse_error(),
                        ))
                        .await?;
                    continue;
                }
            };

            session.refresh_deadline();
            if self.handle_message(session, request).await? == Flow::Close {
                tracing::info!("🔌 Closing session {} from {}", session.key(), ip);
                return Ok(());
            }
        }
    }
}
