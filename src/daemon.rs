//! Scheduled refresh of every account.
//!
//! Runs in the foreground until Ctrl-C or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};

use crate::app::{AppContext, Result};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Time between refreshes (default: 1 hour)
    pub interval: Duration,
    /// Whether to run an update immediately on start
    pub update_on_start: bool,
    /// Force refresh, ignoring cache validators
    pub force: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            update_on_start: true,
            force: false,
        }
    }
}

fn scaled(value: &str, unit_secs: u64, unit: &str) -> std::result::Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("Invalid {}: {}", unit, value))?
        .checked_mul(unit_secs)
        .ok_or_else(|| format!("Interval too large: {} {}", value, unit))
}

impl DaemonConfig {
    /// Parse interval string like "1h", "30m", "6h", "1d"
    pub fn parse_interval(s: &str) -> std::result::Result<Duration, String> {
        let s = s.trim().to_lowercase();

        let secs = if let Some(hours) = s.strip_suffix('h') {
            scaled(hours, 3600, "hours")
        } else if let Some(minutes) = s.strip_suffix('m') {
            scaled(minutes, 60, "minutes")
        } else if let Some(days) = s.strip_suffix('d') {
            scaled(days, 86400, "days")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map_err(|_| format!("Invalid seconds: {}", secs))
        } else {
            s.parse::<u64>()
                .map_err(|_| format!("Invalid interval: {}. Use format like '1h', '30m', '1d'", s))
        }?;

        if secs == 0 {
            return Err("Interval must be greater than zero".to_string());
        }
        Ok(Duration::from_secs(secs))
    }

    /// Format interval for display
    pub fn format_interval(interval: Duration) -> String {
        let secs = interval.as_secs();
        if secs >= 86400 && secs.is_multiple_of(86400) {
            format!("{}d", secs / 86400)
        } else if secs >= 3600 && secs.is_multiple_of(3600) {
            format!("{}h", secs / 3600)
        } else if secs >= 60 && secs.is_multiple_of(60) {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }
}

/// Daemon runner
pub struct Daemon {
    ctx: Arc<AppContext>,
    config: DaemonConfig,
}

impl Daemon {
    pub fn new(ctx: Arc<AppContext>, config: DaemonConfig) -> Self {
        Self { ctx, config }
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            "Estuary daemon started (update interval: {}, {} accounts, PID: {})",
            DaemonConfig::format_interval(self.config.interval),
            self.ctx.collections().len(),
            std::process::id()
        );

        let mut timer = interval(self.config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        timer.tick().await;

        if self.config.update_on_start {
            self.run_update().await;
        }

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = timer.tick() => self.run_update().await,
                _ = &mut shutdown => break,
            }
        }

        tracing::info!("Daemon shutting down");
        Ok(())
    }

    /// Run a single update cycle
    async fn run_update(&self) {
        let start = Utc::now();

        let results = match self.ctx.refresh_all(self.config.force).await {
            Ok(Some(results)) => results,
            Ok(None) => {
                tracing::info!("Previous update still running, skipping");
                return;
            }
            Err(e) => {
                tracing::error!("Update failed: {}", e);
                return;
            }
        };

        let mut total_new = 0;
        let mut errors = 0;
        for (key, result) in results {
            match result {
                Ok(Some(report)) => {
                    total_new += report.new_articles;
                    errors += report.failures.len();
                    for (url, e) in &report.failures {
                        tracing::warn!("  [{}] {}: {}", key, url, e);
                    }
                }
                Ok(None) => tracing::debug!("Account {} busy, skipped", key),
                Err(e) => {
                    errors += 1;
                    tracing::error!("  [{}] refresh failed: {}", key, e);
                }
            }
        }

        let elapsed = Utc::now().signed_duration_since(start);
        tracing::info!(
            "Update complete: {} new articles, {} errors ({:.1}s)",
            total_new,
            errors,
            elapsed.num_milliseconds() as f64 / 1000.0
        );
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = tokio::signal::ctrl_c() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to set up SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
