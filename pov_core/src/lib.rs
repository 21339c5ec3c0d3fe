//! Revolution timing, slot scheduling, effect dispatch, and the
//! dual-buffer render/output pipeline for a persistence-of-vision rotor.
//!
//! - [`timer`] - hall-pulse ingestion, outlier rejection, slot-width selection
//! - [`scheduler`] - absolute slot fire-time computation
//! - [`render_context`] - the per-frame pixel buffer effects paint into
//! - [`effect`] - the `Effect` trait and effect registry
//! - [`dispatcher`] - the bounded remote-command queue
//! - [`diagnostics`] - shared counters feeding an optional stats sink
//! - [`pipeline`] - the render/output worker threads and their buffer pool
//! - [`error`] - pipeline-level error types

pub mod diagnostics;
pub mod dispatcher;
pub mod effect;
pub mod error;
pub mod pipeline;
pub mod render_context;
pub mod scheduler;
pub mod timer;

pub use diagnostics::SharedDiagnostics;
pub use dispatcher::{CommandProducer, DispatcherState};
pub use effect::{Effect, EffectRegistry};
pub use error::PipelineError;
pub use pipeline::{CorePinning, Pipeline};
pub use render_context::RenderContext;
pub use scheduler::{SlotScheduler, SlotTarget};
pub use timer::{RevolutionState, RevolutionTimer};
