//! Configuration file structures for scry.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ServerConfigFile`]: HTTP server settings
//! - [`AuthConfig`]: Bearer credential for the RPC surface
//! - [`EvaluatorConfig`]: Location of the evaluator module
//! - [`StoreConfig`]: Board store backend selection

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{LimitsConfig, RenderConfig, RuntimeConfig};

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [runtime.engine]
/// pooling_allocator = true
/// max_instances = 64
///
/// [runtime.execution]
/// max_fuel = 50_000_000
/// timeout_ms = 2000
///
/// [limits]
/// max_code_bytes = 1_000_000
///
/// [render]
/// max_raster_dimension = 4096
/// font_dirs = ["./fonts"]
///
/// [server]
/// bind_addr = "0.0.0.0:8080"
/// public_url = "https://scry.example.com"
///
/// [auth]
/// token = "your-secret-token"
///
/// [evaluator]
/// module_path = "./guest/scry_sandbox.wasm"
///
/// [store]
/// backend = "postgrest"
/// url = "https://project.supabase.co/rest/v1"
/// api_key = "service-role-key"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Runtime configuration (engine + execution settings).
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Input limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Rendering settings.
    #[serde(default)]
    pub render: RenderConfig,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfigFile,

    /// RPC authentication.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Evaluator module location.
    #[serde(default)]
    pub evaluator: EvaluatorConfig,

    /// Board store backend.
    #[serde(default)]
    pub store: StoreConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// HTTP server configuration from config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfigFile {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "defaults::bind_addr")]
    pub bind_addr: String,

    /// Request timeout in seconds.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Enable graceful shutdown.
    #[serde(default = "defaults::graceful_shutdown")]
    pub graceful_shutdown: bool,

    /// Externally visible base URL used to build view links.
    ///
    /// Defaults to `http://{bind_addr}` when unset.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfigFile {
    fn default() -> Self {
        Self {
            bind_addr: defaults::bind_addr(),
            request_timeout_secs: defaults::request_timeout_secs(),
            graceful_shutdown: defaults::graceful_shutdown(),
            public_url: None,
        }
    }
}

/// RPC authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Shared bearer token.
    ///
    /// When unset, the RPC surface is open to anyone who can reach it.
    pub token: Option<String>,
}

impl AuthConfig {
    /// Returns `true` if a non-empty token is configured.
    pub fn is_configured(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Evaluator module configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluatorConfig {
    /// Path to the evaluator WebAssembly module.
    #[serde(default = "defaults::module_path")]
    pub module_path: String,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            module_path: defaults::module_path(),
        }
    }
}

/// Board store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store; contents are lost on restart.
    #[default]
    Memory,
    /// PostgREST endpoint over the `boards` and `board_history` tables.
    Postgrest,
}

/// Board store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Which backend to use.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Base URL of the PostgREST endpoint (e.g. `https://x.supabase.co/rest/v1`).
    #[serde(default)]
    pub url: Option<String>,

    /// API key sent as both `apikey` and bearer credential.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub fn bind_addr() -> String {
        "127.0.0.1:8080".to_string()
    }

    pub const fn request_timeout_secs() -> u64 {
        30
    }

    pub const fn graceful_shutdown() -> bool {
        true
    }

    pub fn module_path() -> String {
        "./guest/scry_sandbox.wasm".to_string()
    }
}
