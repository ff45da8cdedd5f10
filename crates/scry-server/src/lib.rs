//! HTTP surfaces for scry.
//!
//! - Public viewer: composed SVG, raw SVG and PNG views by share id, plus a
//!   server-sent event stream of board changes
//! - Tool-style RPC: execute scripts against boards, list boards, browse
//!   archived artifacts
//! - Health and readiness checks
//!
//! # Quick Start
//!
//! ```ignore
//! use scry_server::{AppState, ScryServer, ServerConfig};
//!
//! let state = AppState::new(session, rasterizer, "http://localhost:8080", None);
//! ScryServer::new(state, ServerConfig::default()).run().await?;
//! ```

pub mod auth;
pub mod events;
pub mod handler;
pub mod response;
pub mod router;
pub mod rpc;
pub mod server;
pub mod state;
pub mod viewer;

pub use events::BoardChanged;
pub use response::ApiError;
pub use router::build_router;
pub use server::{ScryServer, ServerConfig, TestHandle};
pub use state::AppState;
