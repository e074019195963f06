/// Template poller
///
/// Pulls the current `BlockTemplate` from an HTTP endpoint, installs it in the
/// store and kicks a job broadcast when it changed. Consecutive fetch failures
/// past the threshold mark the store sick so stale work stops going out.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{BlockTemplate, TemplateStore, WorkSource};
use crate::metrics::prometheus as metrics;
use crate::stratum::JobBroadcaster;

pub struct TemplateRefresher {
    client: reqwest::Client,
    url: String,
    interval: Duration,
    sick_after: u32,
    failures: AtomicU32,
    store: Arc<TemplateStore>,
}

impl TemplateRefresher {
    pub fn new(
        url: String,
        interval: Duration,
        sick_after: u32,
        store: Arc<TemplateStore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("HTTP client error: {}", e))?;

        Ok(Self {
            client,
            url,
            interval,
            sick_after: sick_after.max(1),
            failures: AtomicU32::new(0),
            store,
        })
    }

    pub async fn fetch(&self) -> Result<BlockTemplate> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| anyhow!("Request to {} failed: {}", self.url, e))?;

        if !response.status().is_success() {
            return Err(anyhow!("{} HTTP {}", self.url, response.status()));
        }

        let template = response
            .json::<BlockTemplate>()
            .await
            .map_err(|e| anyhow!("Parse {} failed: {}", self.url, e))?;
        Ok(template)
    }

    /// One poll. `Ok(true)` when a new template was installed.
    pub async fn refresh_once(&self) -> Result<bool> {
        match self.fetch().await {
            Ok(template) => {
                if self.failures.swap(0, Ordering::Relaxed) >= self.sick_after {
                    tracing::info!("💚 Template source recovered");
                }
                self.store.set_sick(false);

                let height = template.height;
                let job_id = template.last_job_id.clone();
                let changed = self.store.update(template);
                if changed {
                    metrics::inc_template_updates();
                    metrics::set_template_height(height);
                    tracing::info!("📋 New block template: height={}, job={}", height, job_id);
                }
                Ok(changed)
            }
            Err(e) => {
                metrics::inc_template_fetch_errors();
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.sick_after && !self.store.is_sick() {
                    tracing::error!("🤒 Template source failed {} times, marking sick", failures);
                    self.store.set_sick(true);
                }
                Err(e)
            }
        }
    }

    pub async fn run(self, broadcaster: Arc<JobBroadcaster>) {
        tracing::info!(
            "📋 Template refresher: url={}, interval={}ms",
            self.url,
            self.interval.as_millis()
        );
        let mut interval = tokio::time::interval(self.interval);
        loop {
            interval.tick().await;
            match self.refresh_once().await {
                Ok(true) => {
                    broadcaster.broadcast_new_jobs().await;
                }
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to fetch block template: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::template::fixtures;
    use axum::{routing::get, Json};

    async fn serve_template(template: BlockTemplate) -> String {
        let app = axum::Router::new().route(
            "/template",
            get(move || {
                let t = template.clone();
                async move { Json(t) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}/template", addr)
    }

    #[tokio::test]
    async fn test_refresh_installs_template() {
        let url = serve_template(fixtures::template("aa", vec![])).await;
        let store = Arc::new(TemplateStore::default());
        let refresher =
            TemplateRefresher::new(url, Duration::from_millis(100), 3, store.clone()).unwrap();

        assert!(refresher.refresh_once().await.unwrap());
        assert!(!refresher.refresh_once().await.unwrap());
        assert_eq!(store.current_block_template().unwrap().last_job_id, "aa");
    }

    #[tokio::test]
    async fn test_failures_mark_sick() {
        let store = Arc::new(TemplateStore::default());
        let refresher = TemplateRefresher::new(
            "http://127.0.0.1:1/template".to_string(),
            Duration::from_millis(100),
            2,
            store.clone(),
        )
        .unwrap();

        assert!(refresher.refresh_once().await.is_err());
        assert!(!store.is_sick());
        assert!(refresher.refresh_once().await.is_err());
        assert!(store.is_sick());
    }
}
