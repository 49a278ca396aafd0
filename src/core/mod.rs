// Public modules
pub mod config;
pub mod deploy;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod overrides;
pub mod package_manager;
pub mod parallel;
pub mod paths;
pub mod process;
pub mod roles;
pub mod server;
pub mod ssh;
pub mod strategy;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
