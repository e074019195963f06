/// Job broadcaster - fans `mining.notify` out to every authorized session
///
/// The notify line is built once per template. Deliveries run as separate
/// tasks, at most `FANOUT_LIMIT` in flight. A failed delivery drops its
/// permit before it unregisters, since the registry read guard is still held
/// while later deliveries are being scheduled.

use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::protocol::StratumPush;
use super::registry::SessionRegistry;
use crate::difficulty::{hash256_stratum_format, target_hash256_stratum_format};
use crate::metrics::prometheus as metrics;
use crate::work::{BlockTemplate, WorkSource};

pub const FANOUT_LIMIT: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastSummary {
    /// Registered sessions at the time of the broadcast.
    pub sessions: usize,
    /// Authorized sessions a delivery was scheduled for.
    pub targeted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// `mining.notify` params for the template's announced job, or `None` when
/// that job is missing or a hash is malformed.
pub fn notify_params(template: &BlockTemplate) -> Option<Value> {
    let job = template.last_job()?;

    let prev_hash = match target_hash256_stratum_format(&template.prev_hash) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!("Bad prev hash {}: {}", template.prev_hash, e);
            return None;
        }
    };

    let mut branch = Vec::with_capacity(job.merkle_branch.len());
    for h in &job.merkle_branch {
        match hash256_stratum_format(h) {
            Ok(s) => branch.push(s),
            Err(e) => {
                tracing::error!("Bad merkle branch hash {}: {}", h, e);
                return None;
            }
        }
    }

    Some(json!([
        template.last_job_id,
        prev_hash,
        job.coinbase1,
        job.coinbase2,
        branch,
        format!("{:08x}", template.version),
        format!("{:08x}", template.n_bits),
        format!("{:08x}", job.job_time),
        template.clean_jobs,
    ]))
}

pub struct JobBroadcaster {
    registry: Arc<SessionRegistry>,
    work: Arc<dyn WorkSource>,
    fanout: Arc<Semaphore>,
}

impl JobBroadcaster {
    pub fn new(registry: Arc<SessionRegistry>, work: Arc<dyn WorkSource>) -> Self {
        Self::with_fanout(registry, work, FANOUT_LIMIT)
    }

    pub fn with_fanout(
        registry: Arc<SessionRegistry>,
        work: Arc<dyn WorkSource>,
        fanout: usize,
    ) -> Self {
        Self {
            registry,
            work,
            fanout: Arc::new(Semaphore::new(fanout.max(1))),
        }
    }

    fn notify_line(&self) -> Result<Option<Arc<str>>> {
        let Some(template) = self.work.current_block_template() else {
            return Ok(None);
        };
        if template.prev_hash.is_empty() || self.work.is_sick() {
            return Ok(None);
        }
        let Some(params) = notify_params(&template) else {
            return Ok(None);
        };
        let line = serde_json::to_string(&StratumPush::new("mining.notify", params))?;
        Ok(Some(line.into()))
    }

    /// Push the current job to every authorized session and wait for all
    /// deliveries. `None` when there was nothing to send.
    pub async fn broadcast_new_jobs(&self) -> Option<BroadcastSummary> {
        let line = match self.notify_line() {
            Ok(Some(line)) => line,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("Failed to encode mining.notify: {}", e);
                return None;
            }
        };

        let start = Instant::now();
        let mut deliveries = JoinSet::new();

        let snapshot = self.registry.snapshot().await;
        let sessions = snapshot.len();
        tracing::info!("📢 Broadcasting new job to {} stratum miners", sessions);

        for session in snapshot.authorized() {
            let Ok(permit) = self.fanout.clone().acquire_owned().await else {
                break;
            };
            let session = Arc::clone(session);
            let registry = Arc::clone(&self.registry);
            let line = Arc::clone(&line);

            deliveries.spawn(async move {
                let result = session.send_line(&line).await;
                drop(permit);
                match result {
                    Ok(()) => {
                        session.refresh_deadline();
                        true
                    }
                    Err(e) => {
                        tracing::error!(
                            "Job transmit error to {}@{}: {}",
                            session.login(),
                            session.ip(),
                            e
                        );
                        registry.unregister(session.key()).await;
                        session.close().await;
                        false
                    }
                }
            });
        }
        drop(snapshot);

        let mut summary = BroadcastSummary {
            sessions,
            targeted: deliveries.len(),
            ..Default::default()
        };
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok(true) => summary.delivered += 1,
                _ => summary.failed += 1,
            }
        }

        metrics::inc_job_broadcasts();
        tracing::info!(
            "📢 Jobs broadcast finished in {:?} ({} delivered, {} failed)",
            start.elapsed(),
            summary.delivered,
            summary.failed
        );
        Some(summary)
    }
}
