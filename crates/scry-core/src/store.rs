//! Per-evaluation context and store management.
//!
//! This module provides:
//! - [`SandboxContext`]: Per-call state reachable from host imports
//! - [`LogEntry`] and [`LogLevel`]: Log lines emitted by the guest
//! - [`ExecutionMetrics`]: Fuel and timing for one evaluation

use std::time::{Duration, Instant};

use wasmtime::{Store, StoreLimits, StoreLimitsBuilder};

use crate::WasmEngine;
use crate::reftable::RefTable;
use scry_common::{ExecutionConfig, RuntimeError};

/// Per-evaluation context.
///
/// A fresh context is built for every guest call and dropped with its store,
/// so nothing here is ever visible to another request.
pub struct SandboxContext {
    /// Unique request identifier for tracing.
    pub request_id: String,

    /// Values the guest refers to by index.
    pub refs: RefTable,

    /// Logs collected from guest code.
    pub logs: Vec<LogEntry>,

    /// Execution metrics.
    pub metrics: ExecutionMetrics,

    limits: StoreLimits,
    start_time: Instant,
}

/// A single log entry from guest code.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level.
    pub level: LogLevel,

    /// Log message content.
    pub message: String,

    /// Time since the evaluation started.
    pub elapsed: Duration,
}

/// Log level for guest logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Execution metrics.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetrics {
    /// Fuel consumed during the call.
    pub fuel_consumed: u64,

    /// Linear memory size after the call, in bytes.
    pub memory_bytes: usize,

    /// Total duration.
    pub duration: Option<Duration>,
}

impl SandboxContext {
    /// Create a context whose guest memory may grow to `max_memory_bytes`.
    pub fn new(request_id: String, max_memory_bytes: usize) -> Self {
        let limits = StoreLimitsBuilder::new()
            .memory_size(max_memory_bytes)
            .instances(1)
            .build();

        Self {
            request_id,
            refs: RefTable::new(),
            logs: Vec::new(),
            metrics: ExecutionMetrics::default(),
            limits,
            start_time: Instant::now(),
        }
    }

    /// Record a guest log line.
    pub fn log(&mut self, level: LogLevel, message: String) {
        self.logs.push(LogEntry {
            level,
            message,
            elapsed: self.start_time.elapsed(),
        });
    }

    /// Get elapsed time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Finalize metrics after the call.
    pub fn finalize_metrics(&mut self) {
        self.metrics.duration = Some(self.start_time.elapsed());
    }
}

/// Create a store for one evaluation.
///
/// Fuel is always armed because the engine meters unconditionally; with
/// metering disabled the budget is effectively unbounded. When the engine
/// uses epoch interruption, the deadline is expressed in ticks.
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
pub fn create_store(
    engine: &WasmEngine,
    config: &ExecutionConfig,
    request_id: String,
) -> Result<Store<SandboxContext>, RuntimeError> {
    let context = SandboxContext::new(request_id, config.max_memory_bytes());
    let mut store = Store::new(engine.inner(), context);
    store.limiter(|ctx| &mut ctx.limits);

    let fuel = if config.fuel_metering {
        config.max_fuel
    } else {
        u64::MAX
    };
    store
        .set_fuel(fuel)
        .map_err(|e| RuntimeError::invalid_config(format!("Failed to set fuel: {e}")))?;

    if engine.config().epoch_interruption {
        store.set_epoch_deadline(deadline_ticks(config.timeout_ms, engine.config().epoch_tick_ms));
    }

    Ok(store)
}

/// Number of epoch ticks covering `timeout_ms`, never less than one.
pub fn deadline_ticks(timeout_ms: u64, tick_ms: u64) -> u64 {
    timeout_ms.div_ceil(tick_ms.max(1)).max(1)
}

/// Get remaining fuel from a store.
pub fn get_remaining_fuel(store: &Store<SandboxContext>) -> Option<u64> {
    store.get_fuel().ok()
}

/// Calculate fuel consumed.
pub fn calculate_fuel_consumed(initial_fuel: u64, store: &Store<SandboxContext>) -> u64 {
    let remaining = get_remaining_fuel(store).unwrap_or(0);
    initial_fuel.saturating_sub(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_common::EngineConfig;

    fn engine() -> WasmEngine {
        WasmEngine::new(&EngineConfig {
            pooling_allocator: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_context_creation() {
        let ctx = SandboxContext::new("req-123".into(), 1024 * 1024);

        assert_eq!(ctx.request_id, "req-123");
        assert!(ctx.logs.is_empty());
        assert_eq!(ctx.refs.live(), 4);
        assert_eq!(ctx.metrics.fuel_consumed, 0);
    }

    #[test]
    fn test_context_logging() {
        let mut ctx = SandboxContext::new("test".into(), 1024);

        ctx.log(LogLevel::Info, "Hello".into());
        ctx.log(LogLevel::Error, "World".into());

        assert_eq!(ctx.logs.len(), 2);
        assert_eq!(ctx.logs[0].level, LogLevel::Info);
        assert_eq!(ctx.logs[0].message, "Hello");
        assert_eq!(ctx.logs[1].level, LogLevel::Error);
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Debug.to_string(), "DEBUG");
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
    }

    #[test]
    fn test_deadline_ticks() {
        assert_eq!(deadline_ticks(2000, 10), 200);
        assert_eq!(deadline_ticks(5, 10), 1);
        assert_eq!(deadline_ticks(0, 10), 1);
        assert_eq!(deadline_ticks(15, 0), 15);
    }

    #[test]
    fn test_store_fuel() {
        let exec_config = ExecutionConfig {
            max_fuel: 1000,
            fuel_metering: true,
            ..Default::default()
        };

        let store = create_store(&engine(), &exec_config, "test".into()).unwrap();
        assert_eq!(get_remaining_fuel(&store), Some(1000));
    }

    #[test]
    fn test_store_unmetered_fuel_is_unbounded() {
        let exec_config = ExecutionConfig {
            fuel_metering: false,
            ..Default::default()
        };

        let store = create_store(&engine(), &exec_config, "test".into()).unwrap();
        assert_eq!(get_remaining_fuel(&store), Some(u64::MAX));
    }
}
