//! 可观测性模块
//!
//! 日志初始化，以及远端同步的诊断计数。

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

// ===== Logging =====

/// 初始化全局日志
///
/// `RUST_LOG` 优先于配置中的级别。配置了日志目录时额外写入按天滚动的文件，
/// 返回的 guard 需要在进程生命周期内持有。
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let level = if config.level.is_empty() {
        "info"
    } else {
        config.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_writer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tutorhub.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.structured {
        registry
            .with(fmt::layer().json())
            .with(file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
            .try_init()
    } else {
        registry
            .with(fmt::layer())
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("logging already initialised: {}", e);
    }
    guard
}

// ===== Sync diagnostics =====

/// 远端同步计数
#[derive(Clone, Default)]
pub struct SyncMetrics {
    persist_ok: Arc<AtomicU64>,
    persist_failed: Arc<AtomicU64>,
    loads_ok: Arc<AtomicU64>,
    loads_failed: Arc<AtomicU64>,
}

/// 计数快照
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct SyncSnapshot {
    pub persist_ok: u64,
    pub persist_failed: u64,
    pub loads_ok: u64,
    pub loads_failed: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_persist(&self, ok: bool) {
        let counter = if ok {
            &self.persist_ok
        } else {
            &self.persist_failed
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_load(&self, ok: bool) {
        let counter = if ok { &self.loads_ok } else { &self.loads_failed };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            persist_ok: self.persist_ok.load(Ordering::SeqCst),
            persist_failed: self.persist_failed.load(Ordering::SeqCst),
            loads_ok: self.loads_ok.load(Ordering::SeqCst),
            loads_failed: self.loads_failed.load(Ordering::SeqCst),
        }
    }

    /// Prometheus 文本格式
    pub fn gather(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP tutorhub_persist_total Remote persist attempts by outcome
# TYPE tutorhub_persist_total counter
tutorhub_persist_total{{outcome="ok"}} {}
tutorhub_persist_total{{outcome="failed"}} {}
# HELP tutorhub_load_total Remote collection loads by outcome
# TYPE tutorhub_load_total counter
tutorhub_load_total{{outcome="ok"}} {}
tutorhub_load_total{{outcome="failed"}} {}
"#,
            s.persist_ok, s.persist_failed, s.loads_ok, s.loads_failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_shared_between_clones() {
        let metrics = SyncMetrics::new();
        let clone = metrics.clone();
        clone.record_persist(true);
        clone.record_persist(false);
        metrics.record_load(false);

        assert_eq!(
            metrics.snapshot(),
            SyncSnapshot {
                persist_ok: 1,
                persist_failed: 1,
                loads_ok: 0,
                loads_failed: 1,
            }
        );
        assert!(metrics
            .gather()
            .contains("tutorhub_persist_total{outcome=\"failed\"} 1"));
    }
}
