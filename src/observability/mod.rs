//! Observability for the ledsync agent
//!
//! Structured logging via the tracing crate. The agent's diagnostic sink
//! is the log stream; every error path in the synchronization core logs
//! and continues rather than terminating.

pub mod logging;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, LogFormat};
