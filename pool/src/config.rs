use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::difficulty;
use crate::policy::PolicyConfig;
use crate::stratum::StratumSettings;

pub const DEFAULT_CONFIG_PATH: &str = "pool_config.json";

/// Largest slot count; tags are u16.
pub const MAX_CONN_LIMIT: usize = 1 << 16;

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    pub listen: String,
    /// Idle timeout per session.
    pub timeout_secs: u64,
    pub max_conn: usize,
    /// Pool instance id; high half of every extranonce1.
    pub pool_id: u16,
    /// Starting share difficulty in hashes (`2^256 / target`).
    pub default_diff: i64,
    /// Difficulty-1 work used to scale `mining.set_difficulty`.
    pub genesis_work: i64,
    pub template_url: String,
    pub refresh_ms: u64,
    pub sick_after_failures: u32,
    pub api_listen: String,
    /// Share log file; empty disables it.
    pub share_log: String,
    pub policy: PolicyConfig,
}

impl Default for Config {
    fn default() -> Self {
        let genesis_work = difficulty::genesis_target_work();
        Self {
            listen: "0.0.0.0:3333".to_string(),
            timeout_secs: 600,
            max_conn: 8192,
            pool_id: 1,
            default_diff: genesis_work.saturating_mul(65_536),
            genesis_work,
            template_url: "http://127.0.0.1:8332/template".to_string(),
            refresh_ms: 500,
            sick_after_failures: 5,
            api_listen: "0.0.0.0:8080".to_string(),
            share_log: String::new(),
            policy: PolicyConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, then the JSON file (`BTCPOOL_CONFIG` or `pool_config.json`)
    /// if present, then `BTCPOOL_*` environment overrides.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("BTCPOOL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = if Path::new(&path).exists() {
            let txt = std::fs::read_to_string(&path).with_context(|| format!("read {}", path))?;
            Self::from_json(&txt).with_context(|| format!("parse {}", path))?
        } else {
            Self::default()
        };

        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json(txt: &str) -> Result<Self> {
        Ok(serde_json::from_str(txt)?)
    }

    pub fn apply_overrides<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("BTCPOOL_LISTEN") {
            self.listen = v;
        }
        if let Some(v) = get("BTCPOOL_TIMEOUT_SECS") {
            self.timeout_secs = v.parse().context("BTCPOOL_TIMEOUT_SECS")?;
        }
        if let Some(v) = get("BTCPOOL_MAX_CONN") {
            self.max_conn = v.parse().context("BTCPOOL_MAX_CONN")?;
        }
        if let Some(v) = get("BTCPOOL_POOL_ID") {
            self.pool_id = v.parse().context("BTCPOOL_POOL_ID")?;
        }
        if let Some(v) = get("BTCPOOL_DEFAULT_DIFF") {
            self.default_diff = v.parse().context("BTCPOOL_DEFAULT_DIFF")?;
        }
        if let Some(v) = get("BTCPOOL_TEMPLATE_URL") {
            self.template_url = v;
        }
        if let Some(v) = get("BTCPOOL_API_LISTEN") {
            self.api_listen = v;
        }
        if let Some(v) = get("BTCPOOL_SHARE_LOG") {
            self.share_log = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_conn == 0 || self.max_conn > MAX_CONN_LIMIT {
            bail!("max_conn must be in 1..={}, got {}", MAX_CONN_LIMIT, self.max_conn);
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be positive");
        }
        if self.default_diff <= 0 {
            bail!("default_diff must be positive, got {}", self.default_diff);
        }
        if self.genesis_work <= 0 {
            bail!("genesis_work must be positive, got {}", self.genesis_work);
        }
        Ok(())
    }

    pub fn default_target(&self) -> String {
        difficulty::get_target_hex(self.default_diff)
    }

    pub fn stratum_settings(&self) -> StratumSettings {
        StratumSettings {
            listen: self.listen.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_conn: self.max_conn,
            pool_id: self.pool_id,
            default_target: self.default_target(),
        }
    }
}
