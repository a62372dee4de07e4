//! File-size resolution.
//!
//! Ciphers need the file's total length before the first keystream byte, so
//! every decrypting request runs this chain, cheapest source first:
//!
//! 1. the `FileInfo` cache (populated by listings / PROPFIND)
//! 2. the size cache keyed by the encrypted path
//! 3. a HEAD probe against the backend
//!
//! Per directory, the most recently successful source is memoised; after
//! three consecutive successes the memo short-circuits the chain, and three
//! consecutive failures invalidate it.

use crate::state::AppState;
use shroud_core::path;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Which source produced a file size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeStrategy {
    FileInfoCache,
    FileSizeCache,
    HeadRequest,
}

impl SizeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileInfoCache => "file_info_cache",
            Self::FileSizeCache => "file_size_cache",
            Self::HeadRequest => "head_request",
        }
    }
}

/// Consecutive successes before a strategy is considered reliable.
const CONFIRM_SUCCESSES: u32 = 3;
/// Consecutive failures before a learned strategy is dropped.
const INVALIDATE_FAILURES: u32 = 3;
/// How long a learned strategy stays valid without a fresh success.
const MEMO_TTL: Duration = Duration::from_secs(3600);
/// Directory entries tracked at most.
const MAX_ENTRIES: usize = 1000;

#[derive(Clone, Debug)]
struct PathStrategy {
    strategy: SizeStrategy,
    successes: u32,
    failures: u32,
    last_success: Instant,
    last_update: Instant,
}

/// Per-directory learned-strategy memo.
#[derive(Default)]
pub struct StrategyMemo {
    inner: RwLock<HashMap<String, PathStrategy>>,
}

impl StrategyMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// The confirmed strategy for a directory, if any.
    pub fn learned(&self, dir: &str) -> Option<SizeStrategy> {
        let memo = self.inner.read().expect("strategy memo poisoned");
        let entry = memo.get(dir)?;
        if entry.successes < CONFIRM_SUCCESSES || entry.last_success.elapsed() > MEMO_TTL {
            return None;
        }
        Some(entry.strategy)
    }

    pub fn record_success(&self, dir: &str, strategy: SizeStrategy) {
        let mut memo = self.inner.write().expect("strategy memo poisoned");
        let now = Instant::now();
        match memo.get_mut(dir) {
            Some(entry) if entry.strategy == strategy => {
                entry.successes += 1;
                entry.failures = 0;
                entry.last_success = now;
                entry.last_update = now;
            }
            Some(entry) => {
                // Strategy changed for this directory; restart counting.
                *entry = PathStrategy {
                    strategy,
                    successes: 1,
                    failures: 0,
                    last_success: now,
                    last_update: now,
                };
            }
            None => {
                if memo.len() >= MAX_ENTRIES {
                    evict_oldest(&mut memo);
                }
                memo.insert(
                    dir.to_string(),
                    PathStrategy {
                        strategy,
                        successes: 1,
                        failures: 0,
                        last_success: now,
                        last_update: now,
                    },
                );
            }
        }
    }

    pub fn record_failure(&self, dir: &str, strategy: SizeStrategy) {
        let mut memo = self.inner.write().expect("strategy memo poisoned");
        if let Some(entry) = memo.get_mut(dir) {
            if entry.strategy != strategy {
                return;
            }
            entry.failures += 1;
            entry.last_update = Instant::now();
            if entry.failures >= INVALIDATE_FAILURES {
                memo.remove(dir);
            }
        }
    }
}

fn evict_oldest(memo: &mut HashMap<String, PathStrategy>) {
    if let Some(oldest) = memo
        .iter()
        .min_by_key(|(_, entry)| entry.last_update)
        .map(|(dir, _)| dir.clone())
    {
        memo.remove(&oldest);
    }
}

/// Resolve a file's total size ahead of cipher construction.
///
/// Returns `None` when every source comes up empty; the caller then falls
/// back to the upstream response headers (`Content-Range` total for 206,
/// else `Content-Length`).
pub async fn resolve_size(
    state: &AppState,
    display_path: &str,
    real_path: &str,
    target_url: &str,
) -> Option<u64> {
    let dir = path::dir_name(display_path).to_string();

    if let Some(strategy) = state.strategies.learned(&dir) {
        if let Some(size) = execute(state, strategy, display_path, real_path, target_url).await {
            state.strategies.record_success(&dir, strategy);
            return Some(size);
        }
        tracing::debug!(
            dir = %dir,
            strategy = strategy.as_str(),
            "learned size strategy failed, falling back"
        );
        state.strategies.record_failure(&dir, strategy);
    }

    for strategy in [
        SizeStrategy::FileInfoCache,
        SizeStrategy::FileSizeCache,
        SizeStrategy::HeadRequest,
    ] {
        if let Some(size) = execute(state, strategy, display_path, real_path, target_url).await {
            state.strategies.record_success(&dir, strategy);
            tracing::debug!(
                dir = %dir,
                strategy = strategy.as_str(),
                size,
                "resolved file size"
            );
            return Some(size);
        }
    }

    None
}

async fn execute(
    state: &AppState,
    strategy: SizeStrategy,
    display_path: &str,
    real_path: &str,
    target_url: &str,
) -> Option<u64> {
    match strategy {
        SizeStrategy::FileInfoCache => {
            let info = state.file_info.get(display_path)?;
            (!info.is_dir && info.size > 0).then_some(info.size)
        }
        SizeStrategy::FileSizeCache => state.file_sizes.get(real_path),
        SizeStrategy::HeadRequest => {
            let size = state.upstream.head_probe(target_url).await?;
            state.file_sizes.insert(real_path, size);
            Some(size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memo_confirms_after_three_successes() {
        let memo = StrategyMemo::new();
        memo.record_success("/dir", SizeStrategy::HeadRequest);
        memo.record_success("/dir", SizeStrategy::HeadRequest);
        assert_eq!(memo.learned("/dir"), None);

        memo.record_success("/dir", SizeStrategy::HeadRequest);
        assert_eq!(memo.learned("/dir"), Some(SizeStrategy::HeadRequest));
    }

    #[test]
    fn strategy_change_restarts_counting() {
        let memo = StrategyMemo::new();
        for _ in 0..3 {
            memo.record_success("/dir", SizeStrategy::HeadRequest);
        }
        memo.record_success("/dir", SizeStrategy::FileInfoCache);
        assert_eq!(memo.learned("/dir"), None);
    }

    #[test]
    fn three_failures_invalidate() {
        let memo = StrategyMemo::new();
        for _ in 0..3 {
            memo.record_success("/dir", SizeStrategy::FileSizeCache);
        }
        assert!(memo.learned("/dir").is_some());

        for _ in 0..3 {
            memo.record_failure("/dir", SizeStrategy::FileSizeCache);
        }
        assert_eq!(memo.learned("/dir"), None);
    }

    #[test]
    fn failures_of_other_strategies_are_ignored() {
        let memo = StrategyMemo::new();
        for _ in 0..3 {
            memo.record_success("/dir", SizeStrategy::FileSizeCache);
        }
        for _ in 0..5 {
            memo.record_failure("/dir", SizeStrategy::HeadRequest);
        }
        assert_eq!(memo.learned("/dir"), Some(SizeStrategy::FileSizeCache));
    }
}
