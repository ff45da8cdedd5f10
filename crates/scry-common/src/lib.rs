//! Common types, errors, and configuration for scry.
//!
//! This crate provides shared functionality used across the scry workspace:
//! - Error types using `thiserror`, from the guest boundary up to the
//!   service-level [`ScryError`] taxonomy
//! - Configuration structures for the runtime, limits and rendering

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{EngineConfig, ExecutionConfig, LimitsConfig, RenderConfig, RuntimeConfig};
pub use config_file::{ConfigFile, ConfigFileError};
pub use error::{AbiError, RuntimeError, ScryError, StoreError};
