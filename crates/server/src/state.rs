//! Application state shared across handlers.

use crate::caches::{FileInfoCache, FileSizeCache, NameMap};
use crate::redirect::RedirectRegistry;
use crate::sizing::StrategyMemo;
use crate::upstream::Upstream;
use anyhow::Context;
use shroud_core::{AppConfig, RuleSet};
use std::sync::Arc;
use std::time::Duration;

/// Interval between redirect-registry expiry sweeps.
const REDIRECT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Interval between cache expiry sweeps.
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Compiled encryption rules, in declared order.
    pub rules: Arc<RuleSet>,
    /// Backend HTTP client.
    pub upstream: Arc<Upstream>,
    /// Directory-entry metadata cache (display paths).
    pub file_info: Arc<FileInfoCache>,
    /// File-size cache (encrypted paths).
    pub file_sizes: Arc<FileSizeCache>,
    /// Display→real name map populated by PROPFIND.
    pub name_map: Arc<NameMap>,
    /// Parked 302 targets awaiting decryption.
    pub redirects: Arc<RedirectRegistry>,
    /// Learned size-resolution strategies per directory.
    pub strategies: Arc<StrategyMemo>,
}

impl AppState {
    /// Create state from configuration: validates, compiles the rule list
    /// and builds the upstream client.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let rules = config.compile_rules().context("invalid encryption rules")?;
        let upstream = Upstream::new(&config.upstream, &config.proxy)
            .context("failed to build upstream client")?;

        tracing::info!(
            rules = rules.len(),
            upstream = %config.upstream.origin_trimmed(),
            "proxy state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            rules: Arc::new(rules),
            upstream: Arc::new(upstream),
            file_info: Arc::new(FileInfoCache::default()),
            file_sizes: Arc::new(FileSizeCache::default()),
            name_map: Arc::new(NameMap::default()),
            redirects: Arc::new(RedirectRegistry::new()),
            strategies: Arc::new(StrategyMemo::new()),
        })
    }

    /// Spawn the background expiry sweeps. Call once from `main`.
    pub fn spawn_sweepers(&self) {
        let redirects = self.redirects.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(REDIRECT_SWEEP_INTERVAL);
            tick.tick().await;
            loop {
                tick.tick().await;
                let removed = redirects.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "swept expired redirect entries");
                }
            }
        });

        let file_info = self.file_info.clone();
        let file_sizes = self.file_sizes.clone();
        let name_map = self.name_map.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(CACHE_SWEEP_INTERVAL);
            tick.tick().await;
            loop {
                tick.tick().await;
                let removed = file_info.sweep() + file_sizes.sweep() + name_map.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "swept expired cache entries");
                }
            }
        });
    }
}
