use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors seen by the parent side of an isolated run.
///
/// None of these are defaulted into a normal response; the dispatcher turns them into
/// a 500.
#[derive(Debug, Error)]
pub enum IsolatedError {
    /// The worker process could not be started
    #[error("failed to spawn isolated worker `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Pipe or process I/O failed while talking to the worker
    #[error("isolated worker I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The worker's output did not follow the frame protocol
    #[error("isolated worker protocol violation: {0}")]
    Protocol(String),

    /// Only returned by `coprocess`; `run` reports a timeout through a 504 envelope
    #[error("isolated worker timed out after {0:?}")]
    TimedOut(Duration),
}
