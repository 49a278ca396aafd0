/// Macro for prefixed status logging.
///
/// Status lines go through `tracing` at info level so they land in whatever
/// sink the binary configured (terminal, CI log, file).
///
/// Usage:
/// ```ignore
/// log_status!("deploy", "Copying to {}", release_path.display());
/// log_status!("rollback", "Restarting with previous release.");
/// ```
#[macro_export]
macro_rules! log_status {
    ($prefix:expr, $($arg:tt)*) => {
        ::tracing::info!(concat!("[", $prefix, "] {}"), format_args!($($arg)*))
    };
}

pub mod core;
pub mod utils;

// Re-export everything from core for ergonomic library use
// Users can write `stagehand::deploy` instead of `stagehand::core::deploy`
pub use core::*;
pub use utils::*;
