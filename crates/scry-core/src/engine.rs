//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is built once at startup and shared by every
//! evaluation. It is configured for:
//! - Pooling allocation, so each request instantiates its own evaluator cheaply
//! - Fuel metering and epoch interruption for resource limiting
//! - Optional on-disk caching of compiled code

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};
use wasmtime::{Config, Engine, InstanceAllocationStrategy, PoolingAllocationConfig};

use scry_common::{EngineConfig, RuntimeError};

/// Thread-safe WebAssembly engine wrapper.
///
/// The engine holds no per-request state. Cloning is cheap.
///
/// # Example
///
/// ```ignore
/// use scry_common::EngineConfig;
/// use scry_core::WasmEngine;
///
/// let engine = WasmEngine::new(&EngineConfig::default())?;
/// let _ticker = engine.spawn_epoch_ticker();
/// ```
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is invalid, the pooling
    /// allocator cannot be initialized, or the cache configuration fails to load.
    pub fn new(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let mut wasmtime_config = Config::new();

        wasmtime_config.async_support(true);
        wasmtime_config.consume_fuel(true);

        if config.epoch_interruption {
            wasmtime_config.epoch_interruption(true);
        }

        wasmtime_config.cranelift_opt_level(wasmtime::OptLevel::Speed);

        if config.pooling_allocator {
            let pooling_config = Self::create_pooling_config(config);

            wasmtime_config
                .allocation_strategy(InstanceAllocationStrategy::Pooling(pooling_config));

            info!(
                max_instances = config.max_instances,
                instance_memory_mb = config.instance_memory_mb,
                "Pooling allocator enabled"
            );
        }

        if config.cache_compiled_modules {
            let loaded = match config.cache_config.as_deref() {
                Some(path) => wasmtime_config.cache_config_load(path),
                None => wasmtime_config.cache_config_load_default(),
            };
            loaded.map_err(|e| {
                RuntimeError::invalid_config(format!("Failed to load cache configuration: {e}"))
            })?;
            debug!(cache_config = ?config.cache_config, "Compiled code cache enabled");
        }

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        info!("Wasmtime engine initialized");

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    /// Create pooling allocation configuration.
    fn create_pooling_config(config: &EngineConfig) -> PoolingAllocationConfig {
        let mut pooling = PoolingAllocationConfig::default();

        // One core instance, memory and table per concurrent evaluation
        pooling.total_core_instances(config.max_instances);
        pooling.total_memories(config.max_instances);
        pooling.total_tables(config.max_instances);

        let max_memory_bytes = (config.instance_memory_mb as usize) * 1024 * 1024;
        pooling.max_memory_size(max_memory_bytes);

        pooling
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Increment the epoch counter.
    pub fn increment_epoch(&self) {
        self.engine.increment_epoch();
    }

    /// Check if the pooling allocator is enabled.
    pub fn is_pooling_enabled(&self) -> bool {
        self.config.pooling_allocator
    }

    /// Start a background thread that advances the epoch every
    /// `epoch_tick_ms`.
    ///
    /// Returns `None` when epoch interruption is disabled. The thread stops
    /// when the returned handle is dropped or the engine goes away.
    pub fn spawn_epoch_ticker(&self) -> Option<EpochTicker> {
        if !self.config.epoch_interruption {
            return None;
        }

        let weak: Weak<Engine> = Arc::downgrade(&self.engine);
        let stop = Arc::new(AtomicBool::new(false));
        let tick = self.config.epoch_tick();
        let flag = Arc::clone(&stop);

        let spawned = std::thread::Builder::new()
            .name("scry-epoch".into())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    std::thread::sleep(tick);
                    match weak.upgrade() {
                        Some(engine) => engine.increment_epoch(),
                        None => break,
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                debug!(tick_ms = tick.as_millis(), "Epoch ticker started");
                Some(EpochTicker {
                    stop,
                    handle: Some(handle),
                })
            }
            Err(e) => {
                warn!(error = %e, "Failed to start epoch ticker; deadlines will not fire");
                None
            }
        }
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("pooling_allocator", &self.config.pooling_allocator)
            .field("max_instances", &self.config.max_instances)
            .field("epoch_interruption", &self.config.epoch_interruption)
            .finish_non_exhaustive()
    }
}

/// Handle to the background epoch thread.
#[derive(Debug)]
pub struct EpochTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
