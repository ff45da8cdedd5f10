//! Guest logging.
//!
//! Lines the guest emits through `scry::log` are kept in the
//! [`SandboxContext`] and re-emitted through `tracing` with `guest_log = true`.

use scry_core::store::{LogLevel, SandboxContext};
use tracing::{debug, error, info, warn};

/// Host side of the `scry::log` import.
pub struct LoggingHost;

impl LoggingHost {
    /// Record and trace a guest log line.
    pub fn log(ctx: &mut SandboxContext, level: LogLevel, message: &str) {
        ctx.log(level, message.to_string());

        let request_id = &ctx.request_id;
        match level {
            LogLevel::Debug => debug!(request_id, guest_log = true, "{}", message),
            LogLevel::Info => info!(request_id, guest_log = true, "{}", message),
            LogLevel::Warn => warn!(request_id, guest_log = true, "{}", message),
            LogLevel::Error => error!(request_id, guest_log = true, "{}", message),
        }
    }
}

/// Convert a numeric log level to [`LogLevel`].
///
/// 0=debug, 1=info, 2=warn, 3=error; anything else is treated as info.
pub fn level_from_i32(level: i32) -> LogLevel {
    match level {
        0 => LogLevel::Debug,
        2 => LogLevel::Warn,
        3 => LogLevel::Error,
        _ => LogLevel::Info,
    }
}
