//! Pipeline-level errors (spec §8 "Error Handling Design").

use thiserror::Error;

/// Errors surfaced by the render/output pipeline. The timer and scheduler
/// never fail — bad input is absorbed as an outlier or a no-op slot (spec
/// §8: the only other fallible public API is `ConfigError` at startup).
/// `AffinityFailed` is recorded when a worker thread spawns but can't pin
/// itself to the requested core; `WorkerPanicked` is raised by
/// `Pipeline::shutdown()` if a worker thread's `join()` reports a panic.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("buffer pool worker thread panicked: {0}")]
    WorkerPanicked(String),

    #[error("failed to pin worker thread to core {core}: {reason}")]
    AffinityFailed { core: usize, reason: String },
}
