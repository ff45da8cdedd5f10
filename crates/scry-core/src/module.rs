//! Evaluator module compilation and export validation.
//!
//! [`CompiledModule`] wraps a Wasmtime [`Module`] and checks, once at load
//! time, that every export the boundary relies on is present with the right
//! kind. A module that fails this check never serves a request.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;
use std::time::Instant;

use tracing::{info, instrument};
use wasmtime::{Engine, ExternType, Module};

use scry_common::RuntimeError;

/// Export names the host calls into.
pub mod exports {
    pub const MEMORY: &str = "memory";
    pub const MALLOC: &str = "__wbindgen_malloc";
    pub const FREE: &str = "__wbindgen_free";
    pub const STACK_POINTER: &str = "__wbindgen_add_to_stack_pointer";
    pub const EXECUTE: &str = "execute";
    pub const START: &str = "__wbindgen_start";
}

/// Required function exports, checked in this order.
const REQUIRED_FUNCS: [&str; 4] = [
    exports::MALLOC,
    exports::FREE,
    exports::STACK_POINTER,
    exports::EXECUTE,
];

/// A compiled evaluator module.
///
/// Thread-safe; shared by every evaluation.
#[derive(Clone)]
pub struct CompiledModule {
    inner: Module,

    /// Hash of the original Wasm bytes.
    content_hash: String,

    /// Whether the module exports `__wbindgen_start`.
    has_start: bool,

    compiled_at: Instant,
}

impl CompiledModule {
    /// Load and compile an evaluator module from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not WebAssembly,
    /// fails to compile, or lacks a required export.
    #[instrument(skip(engine, path), fields(path = %path.as_ref().display()))]
    pub fn from_file(engine: &Engine, path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(engine, &bytes)
    }

    /// Compile an evaluator module from WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails or a required export is missing.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, RuntimeError> {
        Self::validate_wasm_header(bytes)?;

        let start = Instant::now();
        let module = Module::new(engine, bytes).map_err(|e| {
            RuntimeError::compilation_failed(format!("Core module compilation failed: {e}"))
        })?;

        Self::finish(module, compute_hash(bytes), start)
    }

    /// Compile an evaluator module from WAT.
    ///
    /// Used by tests to describe small guests inline.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails or a required export is missing.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, RuntimeError> {
        let start = Instant::now();
        let module = Module::new(engine, wat).map_err(|e| {
            RuntimeError::compilation_failed(format!("WAT compilation failed: {e}"))
        })?;

        Self::finish(module, compute_hash(wat.as_bytes()), start)
    }

    fn finish(module: Module, content_hash: String, start: Instant) -> Result<Self, RuntimeError> {
        validate_exports(&module)?;
        let has_start = module
            .exports()
            .any(|e| e.name() == exports::START && matches!(e.ty(), ExternType::Func(_)));

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            has_start,
            "Evaluator module compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
            has_start,
            compiled_at: Instant::now(),
        })
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
        if bytes.len() < 8 {
            return Err(RuntimeError::compilation_failed(
                "Invalid Wasm: file too small",
            ));
        }

        if &bytes[0..4] != b"\0asm" {
            return Err(RuntimeError::compilation_failed(
                "Invalid Wasm: bad magic number",
            ));
        }

        Ok(())
    }

    /// Get the inner Wasmtime module.
    pub fn module(&self) -> &Module {
        &self.inner
    }

    /// Get the content hash of the original bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Returns `true` if the module exports a start hook.
    pub fn has_start(&self) -> bool {
        self.has_start
    }

    /// Get when this module was compiled.
    pub fn compiled_at(&self) -> Instant {
        self.compiled_at
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .field("has_start", &self.has_start)
            .finish_non_exhaustive()
    }
}

/// Check that the module exports a memory and every required function.
fn validate_exports(module: &Module) -> Result<(), RuntimeError> {
    let has_memory = module
        .exports()
        .any(|e| e.name() == exports::MEMORY && matches!(e.ty(), ExternType::Memory(_)));
    if !has_memory {
        return Err(RuntimeError::missing_export(exports::MEMORY));
    }

    for name in REQUIRED_FUNCS {
        let found = module
            .exports()
            .any(|e| e.name() == name && matches!(e.ty(), ExternType::Func(_)));
        if !found {
            return Err(RuntimeError::missing_export(name));
        }
    }

    Ok(())
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
