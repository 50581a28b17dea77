//! Error types for the queue processor.

use crate::processor::ProcessorState;
use notify_queue::QueueError;
use std::time::Duration;

/// Errors surfaced by the processor lifecycle
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("Processor failed to start: {source}")]
    StartupFailed { source: QueueError },

    #[error("Cannot {operation} processor in state {state}")]
    InvalidState {
        operation: &'static str,
        state: ProcessorState,
    },

    #[error("Processor did not stop within {timeout:?}")]
    ShutdownTimeout { timeout: Duration },

    #[error("Processing task failed: {message}")]
    TaskFailed { message: String },

    #[error("Invalid processor configuration: {message}")]
    Configuration { message: String },
}
