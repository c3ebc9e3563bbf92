pub mod error;
pub mod logging;

pub use tracing;

/// Lifecycle notifications broadcast to every long-running task.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
