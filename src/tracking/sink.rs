//! Tracking sinks.
//!
//! A sink receives run lifecycle events from the
//! [`ExperimentTracker`](super::ExperimentTracker). It never sees misuse:
//! state checks happen in the tracker before a sink is called.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Destination of tracking records.
pub trait TrackingSink: Send {
    /// A run was opened.
    fn run_started(&mut self, experiment: &str, run: &str) -> io::Result<()>;

    /// Parameters were logged for the run.
    fn params_logged(
        &mut self,
        experiment: &str,
        run: &str,
        params: &BTreeMap<String, String>,
    ) -> io::Result<()>;

    /// A metric value was logged for the run.
    fn metric_logged(
        &mut self,
        experiment: &str,
        run: &str,
        key: &str,
        step: usize,
        value: f64,
    ) -> io::Result<()>;

    /// The run was closed.
    fn run_ended(&mut self, experiment: &str, run: &str) -> io::Result<()>;
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TrackingSink for NullSink {
    fn run_started(&mut self, _: &str, _: &str) -> io::Result<()> {
        Ok(())
    }

    fn params_logged(&mut self, _: &str, _: &str, _: &BTreeMap<String, String>) -> io::Result<()> {
        Ok(())
    }

    fn metric_logged(&mut self, _: &str, _: &str, _: &str, _: usize, _: f64) -> io::Result<()> {
        Ok(())
    }

    fn run_ended(&mut self, _: &str, _: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Run status recorded in `meta.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Finished,
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub experiment: String,
    pub run: String,
    pub status: RunStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
}

/// One line of `metrics.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub key: String,
    pub step: usize,
    pub value: f64,
}

/// Sink writing one directory per run:
/// `<root>/<experiment>/<run>/{meta.json, params.json, metrics.jsonl}`.
///
/// A run whose name is already taken on disk gets `<run>_1`, `<run>_2` and
/// so on, so runs never share a directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
    claimed: HashMap<(String, String), PathBuf>,
}

impl FileSink {
    /// Creates a sink rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            claimed: HashMap::new(),
        }
    }

    /// Directory of the most recent run with this name.
    pub fn run_dir(&self, experiment: &str, run: &str) -> PathBuf {
        self.claimed
            .get(&(experiment.to_string(), run.to_string()))
            .cloned()
            .unwrap_or_else(|| self.root.join(experiment).join(run))
    }

    fn claim_run_dir(&mut self, experiment: &str, run: &str) -> io::Result<PathBuf> {
        let parent = self.root.join(experiment);
        fs::create_dir_all(&parent)?;

        let mut suffix = 0usize;
        let dir = loop {
            let name = if suffix == 0 {
                run.to_string()
            } else {
                format!("{}_{}", run, suffix)
            };
            let candidate = parent.join(name);
            match fs::create_dir(&candidate) {
                Ok(()) => break candidate,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e),
            }
        };

        self.claimed
            .insert((experiment.to_string(), run.to_string()), dir.clone());
        Ok(dir)
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        fs::write(path, bytes)
    }

    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> io::Result<T> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn now() -> String {
    Local::now().to_rfc3339()
}

impl TrackingSink for FileSink {
    fn run_started(&mut self, experiment: &str, run: &str) -> io::Result<()> {
        let dir = self.claim_run_dir(experiment, run)?;
        let meta = RunMeta {
            experiment: experiment.to_string(),
            run: run.to_string(),
            status: RunStatus::Running,
            started_at: now(),
            ended_at: None,
        };
        Self::write_json(&dir.join("meta.json"), &meta)
    }

    fn params_logged(
        &mut self,
        experiment: &str,
        run: &str,
        params: &BTreeMap<String, String>,
    ) -> io::Result<()> {
        let path = self.run_dir(experiment, run).join("params.json");
        let mut merged: BTreeMap<String, String> = if path.exists() {
            Self::read_json(&path)?
        } else {
            BTreeMap::new()
        };
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self::write_json(&path, &merged)
    }

    fn metric_logged(
        &mut self,
        experiment: &str,
        run: &str,
        key: &str,
        step: usize,
        value: f64,
    ) -> io::Result<()> {
        let path = self.run_dir(experiment, run).join("metrics.jsonl");
        let record = MetricRecord {
            key: key.to_string(),
            step,
            value,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())
    }

    fn run_ended(&mut self, experiment: &str, run: &str) -> io::Result<()> {
        let path = self.run_dir(experiment, run).join("meta.json");
        let mut meta: RunMeta = Self::read_json(&path)?;
        meta.status = RunStatus::Finished;
        meta.ended_at = Some(now());
        Self::write_json(&path, &meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_writes_run_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path());

        sink.run_started("Jazz", "2024-01-01_00-00-00").unwrap();
        let mut params = BTreeMap::new();
        params.insert("epochs".to_string(), "10".to_string());
        sink.params_logged("Jazz", "2024-01-01_00-00-00", &params).unwrap();
        params.clear();
        params.insert("batch_size".to_string(), "64".to_string());
        sink.params_logged("Jazz", "2024-01-01_00-00-00", &params).unwrap();
        sink.metric_logged("Jazz", "2024-01-01_00-00-00", "loss", 0, 2.5).unwrap();
        sink.metric_logged("Jazz", "2024-01-01_00-00-00", "loss", 1, 2.0).unwrap();
        sink.run_ended("Jazz", "2024-01-01_00-00-00").unwrap();

        let run_dir = sink.run_dir("Jazz", "2024-01-01_00-00-00");
        let meta: RunMeta = FileSink::read_json(&run_dir.join("meta.json")).unwrap();
        assert_eq!(meta.status, RunStatus::Finished);
        assert!(meta.ended_at.is_some());

        let params: BTreeMap<String, String> =
            FileSink::read_json(&run_dir.join("params.json")).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params["epochs"], "10");

        let metrics = fs::read_to_string(run_dir.join("metrics.jsonl")).unwrap();
        let records: Vec<MetricRecord> = metrics
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].step, 1);
        assert_eq!(records[1].value, 2.0);
    }

    #[test]
    fn runs_sharing_a_name_get_separate_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path());
        let run = "2024-01-01_00-00-00";

        let mut dirs = Vec::new();
        for loss in [2.5, 1.5] {
            sink.run_started("Jazz", run).unwrap();
            sink.metric_logged("Jazz", run, "loss", 0, loss).unwrap();
            sink.run_ended("Jazz", run).unwrap();
            dirs.push(sink.run_dir("Jazz", run));
        }

        assert_eq!(dirs[0], dir.path().join("Jazz").join(run));
        assert_eq!(dirs[1], dir.path().join("Jazz").join(format!("{}_1", run)));
        for (run_dir, loss) in dirs.iter().zip([2.5, 1.5]) {
            let metrics = fs::read_to_string(run_dir.join("metrics.jsonl")).unwrap();
            let records: Vec<MetricRecord> = metrics
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].step, 0);
            assert_eq!(records[0].value, loss);

            let meta: RunMeta = FileSink::read_json(&run_dir.join("meta.json")).unwrap();
            assert_eq!(meta.status, RunStatus::Finished);
        }
    }

    #[test]
    fn null_sink_accepts_everything() {
        let mut sink = NullSink;
        assert!(sink.run_started("x", "y").is_ok());
        assert!(sink.metric_logged("x", "y", "loss", 0, 1.0).is_ok());
        assert!(sink.run_ended("x", "y").is_ok());
    }
}
