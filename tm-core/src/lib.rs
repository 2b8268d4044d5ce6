//! 2 Man Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by the other 2 Man crates:
//! - Application configuration (websocket URL, socket policy, logging)
//! - Global error types covering all error categories
//! - Structured logging with tracing
//! - Session/credential abstractions consumed by the connection manager
//! - App lifecycle (foreground/background) signal

pub mod config;
pub mod constants;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod session;

// Re-export commonly used items at the crate root
pub use config::AppConfig;
pub use error::{TmError, TmResult};
pub use lifecycle::{AppLifecycle, AppLifecycleState};
pub use logging::init_logging;
pub use session::{Credential, CredentialRefresher, MemorySession, SessionProvider};
