//! Evaluator lifecycle: one isolated guest call per request.
//!
//! [`WasmEvaluator`] owns the shared engine, compiled module and linker.
//! Every [`Evaluator::evaluate`] call:
//!
//! 1. Builds a fresh store and instance (nothing is shared between calls)
//! 2. Runs the optional start hook
//! 3. Encodes the script and namespace into guest memory
//! 4. Calls `execute` once and decodes the response string
//! 5. Frees the response and restores the guest stack pointer

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use wasmtime::{Linker, Store};

use crate::abi::GuestAbi;
use crate::module::exports;
use crate::store::{SandboxContext, calculate_fuel_consumed, create_store, get_remaining_fuel};
use crate::{CompiledModule, EpochTicker, WasmEngine};
use scry_common::{ExecutionConfig, RuntimeError};

/// Bytes reserved on the guest shadow stack for the `(ptr, len)` return pair.
const RETURN_AREA: i32 = 16;

/// Inputs to one guest evaluation.
#[derive(Debug, Clone)]
pub struct EvalRequest {
    /// Script source.
    pub code: String,
    /// Prior namespace, serialized as a JSON object.
    pub namespace_json: String,
    /// Canvas width.
    pub width: u32,
    /// Canvas height.
    pub height: u32,
}

/// Opaque script evaluator.
///
/// Returns the guest's raw response string; interpreting it is the caller's
/// concern.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: &EvalRequest) -> Result<String, RuntimeError>;
}

/// Evaluator backed by a wasm-bindgen style WebAssembly module.
pub struct WasmEvaluator {
    engine: WasmEngine,
    module: CompiledModule,
    linker: Linker<SandboxContext>,
    config: ExecutionConfig,
    _ticker: Option<EpochTicker>,
}

impl WasmEvaluator {
    /// Create an evaluator from a compiled module and a linker that already
    /// provides every guest import.
    ///
    /// Starts the epoch ticker when the engine uses epoch interruption.
    pub fn new(
        engine: WasmEngine,
        module: CompiledModule,
        linker: Linker<SandboxContext>,
        config: ExecutionConfig,
    ) -> Self {
        let ticker = engine.spawn_epoch_ticker();
        Self {
            engine,
            module,
            linker,
            config,
            _ticker: ticker,
        }
    }

    /// Get the compiled module.
    pub fn module(&self) -> &CompiledModule {
        &self.module
    }

    /// Get the execution configuration.
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    async fn run(
        &self,
        store: &mut Store<SandboxContext>,
        request: &EvalRequest,
    ) -> Result<String, RuntimeError> {
        let instance = self
            .linker
            .instantiate_async(&mut *store, self.module.module())
            .await
            .map_err(|e| RuntimeError::compilation_failed(format!("Instantiation failed: {e}")))?;

        let abi = GuestAbi::bind(store, &instance, self.config.timeout_ms)?;

        if self.module.has_start() {
            let start = instance
                .get_typed_func::<(), ()>(&mut *store, exports::START)
                .map_err(|_| RuntimeError::missing_export(exports::START))?;
            start
                .call_async(&mut *store, ())
                .await
                .map_err(|e| abi.classify(store, &e))?;
        }

        let execute = instance
            .get_typed_func::<(i32, i32, i32, i32, i32, i64, i64), ()>(
                &mut *store,
                exports::EXECUTE,
            )
            .map_err(|_| RuntimeError::missing_export(exports::EXECUTE))?;

        let retptr = abi.add_to_stack_pointer(store, -RETURN_AREA).await?;
        let (code_ptr, code_len) = abi.encode_string(store, &request.code).await?;
        let (scope_ptr, scope_len) = abi.encode_string(store, &request.namespace_json).await?;

        debug!(
            code_len,
            scope_len,
            memory_bytes = abi.memory_size(store),
            "Calling guest entry point"
        );

        execute
            .call_async(
                &mut *store,
                (
                    retptr,
                    code_ptr,
                    code_len,
                    scope_ptr,
                    scope_len,
                    i64::from(request.width),
                    i64::from(request.height),
                ),
            )
            .await
            .map_err(|e| abi.classify(store, &e))?;

        let (ptr, len) = abi.read_return_pair(store, retptr)?;
        let response = abi.decode_string(store, ptr, len);

        abi.free(store, ptr, len).await?;
        abi.add_to_stack_pointer(store, RETURN_AREA).await?;

        store.data_mut().metrics.memory_bytes = abi.memory_size(store);
        Ok(response?)
    }
}

#[async_trait]
impl Evaluator for WasmEvaluator {
    #[instrument(skip(self, request), fields(code_len = request.code.len(), width = request.width, height = request.height))]
    async fn evaluate(&self, request: &EvalRequest) -> Result<String, RuntimeError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut store = create_store(&self.engine, &self.config, request_id.clone())?;
        let initial_fuel = get_remaining_fuel(&store).unwrap_or(0);
        let start = Instant::now();

        // Epoch deadlines need the ticker; this bound also covers engines without it.
        let result = match tokio::time::timeout(self.config.timeout(), self.run(&mut store, request)).await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::ExecutionTimeout {
                duration_ms: self.config.timeout_ms,
            }),
        };

        let fuel_consumed = calculate_fuel_consumed(initial_fuel, &store);
        store.data_mut().metrics.fuel_consumed = fuel_consumed;
        store.data_mut().finalize_metrics();

        let duration = start.elapsed();
        let guest_logs = store.data().logs.len();

        match &result {
            Ok(response) => info!(
                request_id = %request_id,
                duration_ms = duration.as_millis(),
                fuel_consumed,
                response_len = response.len(),
                guest_logs,
                "Evaluation completed"
            ),
            Err(e) => warn!(
                request_id = %request_id,
                duration_ms = duration.as_millis(),
                fuel_consumed,
                error = %e,
                "Evaluation failed"
            ),
        }

        result
    }
}

impl std::fmt::Debug for WasmEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEvaluator")
            .field("module", &self.module)
            .field("timeout_ms", &self.config.timeout_ms)
            .field("max_fuel", &self.config.max_fuel)
            .finish_non_exhaustive()
    }
}
