mod local;

use crate::config::{ConfigErrors, HarnessConfig};
use purem_bench_analysis::{ArtifactName, ArtifactStore, RunId, StoreError};
use std::{
    fmt::{self, Display},
    path::PathBuf,
};
use thiserror::Error;

pub use local::LocalExecutor;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Artifact store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// One invocation of the benchmark entry point
#[derive(Clone, Debug)]
pub struct SweepJob {
    pub size: u64,
    pub name: ArtifactName,
    pub artifact: PathBuf,
}

/// What happened to a single size. Failures of the benchmark itself are
/// outcomes, not errors: the sweep carries on unless `fail_fast` is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// exited with 0 but never wrote its artifact
    MissingArtifact,
    /// exit code, `None` when killed by a signal
    Failed(Option<i32>),
    TimedOut,
    SpawnFailed,
    /// not attempted after an earlier failure with `fail_fast`
    Skipped,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::MissingArtifact => f.write_str("no artifact written"),
            Self::Failed(Some(code)) => write!(f, "failed with exit code {code}"),
            Self::Failed(None) => f.write_str("terminated by signal"),
            Self::TimedOut => f.write_str("timed out"),
            Self::SpawnFailed => f.write_str("could not be started"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SweepSummary {
    pub run: RunId,
    pub variant: String,
    /// every configured size in sweep order
    pub results: Vec<(u64, Outcome)>,
}

impl SweepSummary {
    pub fn failed(&self) -> impl Iterator<Item = &(u64, Outcome)> {
        self.results.iter().filter(|(_, outcome)| !outcome.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Substitute the sweep placeholders of a configured parameter
pub fn expand(param: &str, job: &SweepJob, platform: &str) -> String {
    param
        .replace("{size}", &job.size.to_string())
        .replace("{run}", job.name.run.as_str())
        .replace("{variant}", &job.name.variant)
        .replace("{platform}", platform)
        .replace("{artifact}", &job.artifact.to_string_lossy())
}

#[derive(Debug)]
pub enum Executors {
    Local(LocalExecutor),
}

impl Executors {
    pub fn load(config: &HarnessConfig, store: ArtifactStore) -> Result<Self, ConfigErrors> {
        match config.executor.name.as_str() {
            "local" => Ok(Self::Local(LocalExecutor::load(config, store)?)),
            _ => Err(ConfigErrors::UnsupportedExecutor(
                config.executor.name.clone(),
            )),
        }
    }

    pub fn execute(&mut self, run: RunId) -> Result<SweepSummary, ExecutorError> {
        match self {
            Self::Local(executor) => executor.execute(run),
        }
    }
}
