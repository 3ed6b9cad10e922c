//! Experiment tracking.
//!
//! - [`ExperimentTracker`](tracker::ExperimentTracker): run state and logging
//! - [`TrackingSink`](sink::TrackingSink): where records go
//!   ([`FileSink`](sink::FileSink) or [`NullSink`](sink::NullSink))

pub mod sink;
pub mod tracker;

// Re-export commonly used types
pub use sink::{FileSink, MetricRecord, NullSink, RunMeta, RunStatus, TrackingSink};
pub use tracker::{ExperimentTracker, RunHandle};
