//! Experiment tracker.
//!
//! Owns the active-run state explicitly instead of relying on a global
//! "current run". At most one run is active at a time; every logging call
//! must present the handle returned by [`ExperimentTracker::start_run`].

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

use super::sink::{NullSink, TrackingSink};

/// Proof of an open run. Not cloneable; dropped handles cannot be reused
/// against a later run because each run gets a fresh id.
#[derive(Debug, PartialEq, Eq)]
pub struct RunHandle {
    id: u64,
    name: String,
}

impl RunHandle {
    /// Name of the run.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Records runs, parameters and metrics for one experiment.
pub struct ExperimentTracker {
    experiment: String,
    sink: Box<dyn TrackingSink>,
    active: Option<(u64, String)>,
    next_id: u64,
}

impl std::fmt::Debug for ExperimentTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentTracker")
            .field("experiment", &self.experiment)
            .field("active", &self.active)
            .finish()
    }
}

impl ExperimentTracker {
    /// Creates a tracker writing to `sink`.
    pub fn new(experiment: impl Into<String>, sink: Box<dyn TrackingSink>) -> Self {
        Self {
            experiment: experiment.into(),
            sink,
            active: None,
            next_id: 0,
        }
    }

    /// Creates a tracker that enforces run state but records nothing.
    pub fn disabled(experiment: impl Into<String>) -> Self {
        Self::new(experiment, Box::new(NullSink))
    }

    /// Experiment name.
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Name of the active run, if any.
    pub fn active_run(&self) -> Option<&str> {
        self.active.as_ref().map(|(_, name)| name.as_str())
    }

    /// Opens a run. Fails if another run is active.
    pub fn start_run(&mut self, name: &str) -> Result<RunHandle> {
        if let Some((_, active)) = &self.active {
            return Err(PipelineError::run_already_active(active));
        }

        let id = self.next_id;
        self.next_id += 1;
        self.active = Some((id, name.to_string()));

        debug!("Starting run '{}' in experiment '{}'", name, self.experiment);
        if let Err(e) = self.sink.run_started(&self.experiment, name) {
            warn!("Tracking sink failed to start run '{}': {}", name, e);
        }

        Ok(RunHandle {
            id,
            name: name.to_string(),
        })
    }

    /// Logs parameters of the active run.
    pub fn log_params(&mut self, run: &RunHandle, params: &BTreeMap<String, String>) -> Result<()> {
        self.check_active(run, "log params")?;
        if let Err(e) = self.sink.params_logged(&self.experiment, &run.name, params) {
            warn!("Tracking sink failed to log params for '{}': {}", run.name, e);
        }
        Ok(())
    }

    /// Logs one metric value of the active run.
    pub fn log_metric(&mut self, run: &RunHandle, key: &str, step: usize, value: f64) -> Result<()> {
        self.check_active(run, "log metrics")?;
        if let Err(e) = self
            .sink
            .metric_logged(&self.experiment, &run.name, key, step, value)
        {
            warn!("Tracking sink failed to log metric '{}' for '{}': {}", key, run.name, e);
        }
        Ok(())
    }

    /// Closes the active run.
    pub fn end_run(&mut self, run: &RunHandle) -> Result<()> {
        self.check_active(run, "end a run")?;
        self.active = None;

        debug!("Ending run '{}'", run.name);
        if let Err(e) = self.sink.run_ended(&self.experiment, &run.name) {
            warn!("Tracking sink failed to end run '{}': {}", run.name, e);
        }
        Ok(())
    }

    fn check_active(&self, run: &RunHandle, action: &str) -> Result<()> {
        match &self.active {
            Some((id, _)) if *id == run.id => Ok(()),
            _ => Err(PipelineError::no_active_run(action)),
        }
    }
}
