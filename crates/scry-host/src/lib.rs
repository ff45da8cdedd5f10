//! Host imports for the scry evaluator.
//!
//! The evaluator module links against two import namespaces:
//!
//! - `wbg`: wasm-bindgen glue for passing strings and errors through the
//!   per-call reference table, and for throwing them back to the host
//! - `scry`: diagnostics ([`logging`])
//!
//! Import bodies read guest memory only through [`scry_core::abi`].

pub mod linker;
pub mod logging;

pub use linker::register_all;
pub use logging::LoggingHost;
