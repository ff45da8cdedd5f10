//! Core Wasmtime runtime for scry.
//!
//! This crate owns the boundary to the isolated script evaluator:
//! - [`WasmEngine`]: Configured Wasmtime engine, shared process-wide
//! - [`CompiledModule`]: The evaluator module, validated once at load
//! - [`SandboxContext`]: Per-call host state (reference table, guest logs)
//! - [`GuestAbi`]: The only code that touches guest linear memory
//! - [`WasmEvaluator`]: One isolated guest call per request
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              WasmEngine + CompiledModule                │
//! │  (Shared across all requests, immutable)                │
//! │  - Pooling allocator, epoch ticker                      │
//! │  - Export set checked at startup                        │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │          Store<SandboxContext> + Instance               │
//! │  (Per-request, isolated)                                │
//! │  - Fuel and epoch deadline                              │
//! │  - Linear memory, reached only through GuestAbi         │
//! │  - Reference table and guest logs                       │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod abi;
pub mod engine;
pub mod evaluator;
pub mod module;
pub mod reftable;
pub mod store;

pub use abi::GuestAbi;
pub use engine::{EpochTicker, WasmEngine};
pub use evaluator::{EvalRequest, Evaluator, WasmEvaluator};
pub use module::CompiledModule;
pub use reftable::{GuestThrow, RefTable, RefValue};
pub use store::{ExecutionMetrics, LogEntry, LogLevel, SandboxContext};
