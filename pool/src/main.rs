// btcpool Stratum front end
//
// Stratum engine + job broadcaster + template refresher + HTTP status API.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

use btcpool_stratum::api::{self, ApiState};
use btcpool_stratum::config::Config;
use btcpool_stratum::logging;
use btcpool_stratum::policy::MemoryPolicy;
use btcpool_stratum::stratum::{JobBroadcaster, SessionRegistry, StratumServer};
use btcpool_stratum::work::{TemplateRefresher, TemplateStore, WorkSource};

const POLICY_SWEEP_SECS: u64 = 60;

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let ctrl_c = tokio::signal::ctrl_c();
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("SIGTERM, shutting down"),
                    _ = ctrl_c => tracing::info!("SIGINT, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                let _ = ctrl_c.await;
                tracing::info!("SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Ctrl+C, shutting down");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::load()?;
    logging::init_tracing(Some(cfg.share_log.as_str()))?;

    tracing::info!("🚀 btcpool Stratum v{}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(SessionRegistry::new());
    let store = Arc::new(TemplateStore::new(cfg.genesis_work));
    let work: Arc<dyn WorkSource> = store.clone();
    let policy = Arc::new(MemoryPolicy::new(cfg.policy.clone()));

    let broadcaster = Arc::new(JobBroadcaster::new(registry.clone(), work.clone()));
    let refresher = TemplateRefresher::new(
        cfg.template_url.clone(),
        Duration::from_millis(cfg.refresh_ms.max(50)),
        cfg.sick_after_failures,
        store.clone(),
    )?;
    tokio::spawn(refresher.run(broadcaster.clone()));

    {
        let policy = policy.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(POLICY_SWEEP_SECS));
            loop {
                interval.tick().await;
                let expired = policy.sweep();
                if expired > 0 {
                    tracing::info!("🧹 {} bans expired", expired);
                }
            }
        });
    }

    let server = Arc::new(StratumServer::new(
        cfg.stratum_settings(),
        registry.clone(),
        work.clone(),
        policy,
    ));
    let listener = server.bind()?;
    tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            tracing::error!("Stratum server stopped: {}", e);
        }
    });

    let api_state = ApiState {
        registry,
        work,
        started: Instant::now(),
        listen: cfg.listen.clone(),
    };
    let api_listener = tokio::net::TcpListener::bind(&cfg.api_listen)
        .await
        .with_context(|| format!("bind API listener {}", cfg.api_listen))?;
    tracing::info!("📡 API listening on {}", cfg.api_listen);

    axum::serve(api_listener, api::router(api_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("🏁 btcpool Stratum shut down cleanly");
    Ok(())
}
