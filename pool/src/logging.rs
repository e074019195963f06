/// Tracing setup
///
/// Operational log to stdout through `EnvFilter` (default `info`). Share
/// decisions are also emitted on the `share_log` target, which an optional
/// second layer appends to its own file.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::filter::{EnvFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

pub const SHARE_LOG_TARGET: &str = "share_log";

pub fn init_tracing(share_log: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_filter(env_filter);

    let share_layer = match share_log {
        Some(path) if !path.is_empty() => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open share log {}", path))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .with_filter(Targets::new().with_target(SHARE_LOG_TARGET, Level::INFO));
            Some(layer)
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(share_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}
