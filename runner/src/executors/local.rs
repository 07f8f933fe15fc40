use super::{expand, ExecutorError, Outcome, SweepJob, SweepSummary};
use crate::config::{
    BenchmarkConfig, ConfigErrors, HarnessConfig, SweepConfig, VariantConfig, PLATFORM_ENV,
    SIZE_ENV,
};
use purem_bench_analysis::{ArtifactName, ArtifactStore, RunId};
use std::{
    process::{Child, Command, Stdio},
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

/// Executor that runs one size after the other on the local machine
#[derive(Debug)]
pub struct LocalExecutor {
    benchmark: BenchmarkConfig,
    sweep: SweepConfig,
    variant: VariantConfig,
    store: ArtifactStore,
}

impl LocalExecutor {
    /// create a new LocalExecutor instance for the configured variant
    pub fn load(config: &HarnessConfig, store: ArtifactStore) -> Result<Self, ConfigErrors> {
        Ok(Self {
            benchmark: config.benchmark.clone(),
            sweep: config.sweep.clone(),
            variant: config.variant(&config.sweep.variant)?,
            store,
        })
    }

    fn job(&self, run: &RunId, size: u64) -> SweepJob {
        let name = ArtifactName::new(run.clone(), &self.sweep.variant, size);

        SweepJob {
            size,
            artifact: self.store.artifact_path(&name),
            name,
        }
    }

    fn command(&self, job: &SweepJob) -> Command {
        let platform = self.store.platform();
        let mut command = Command::new(&self.benchmark.exec);

        command
            .args(
                self.benchmark
                    .params
                    .iter()
                    .chain(self.variant.params.iter())
                    .map(|param| expand(param, job, platform)),
            )
            .args(self.benchmark.statistics.arguments(&job.artifact))
            .envs(&self.benchmark.env)
            .envs(&self.variant.env)
            // applied last, the per-size values always win
            .env(SIZE_ENV, job.size.to_string())
            .env(PLATFORM_ENV, platform)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        command
    }

    /// kill a child that ran past its timeout and reap it
    fn terminate(mut child: Child) {
        if let Err(e) = child.kill() {
            warn!("Failed to kill benchmark process {}: {e}", child.id());
        }
        if let Err(e) = child.wait() {
            warn!("Failed to reap benchmark process {}: {e}", child.id());
        }
    }

    fn run(&self, job: &SweepJob) -> Outcome {
        let mut command = self.command(job);
        debug!("Spawning {command:?}");

        let timeout = Duration::from_secs(self.benchmark.timeout);
        let start = Instant::now();

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    "Failed to start {} for size {}: {e}",
                    self.benchmark.exec.to_string_lossy(),
                    job.size
                );
                return Outcome::SpawnFailed;
            }
        };

        match child.wait_timeout(timeout) {
            Ok(Some(status)) => {
                debug!(
                    "Finished in {} ms | status: {status}",
                    start.elapsed().as_millis()
                );

                if !status.success() {
                    warn!("Size {} {status}", job.size);
                    Outcome::Failed(status.code())
                } else if !job.artifact.is_file() {
                    warn!(
                        "Size {} succeeded but did not write {}",
                        job.size,
                        job.artifact.display()
                    );
                    Outcome::MissingArtifact
                } else {
                    Outcome::Succeeded
                }
            }
            Ok(None) => {
                // child hasn't exited yet
                warn!("Size {} timed out after {}s", job.size, timeout.as_secs());
                Self::terminate(child);
                Outcome::TimedOut
            }
            Err(e) => {
                warn!("Failed to wait for size {}: {e}", job.size);
                Self::terminate(child);
                Outcome::Failed(None)
            }
        }
    }

    /// run the benchmark once per configured size, in order
    #[instrument(skip(self), level = "info", fields(variant = self.sweep.variant.as_str(), platform = self.store.platform()))]
    pub fn execute(&mut self, run: RunId) -> Result<SweepSummary, ExecutorError> {
        let dir = self.store.prepare()?;
        debug!("Writing artifacts to {}", dir.display());

        let total = self.sweep.sizes.len();
        let mut results = Vec::with_capacity(total);
        let mut stopped = false;

        for (index, &size) in self.sweep.sizes.iter().enumerate() {
            if stopped {
                results.push((size, Outcome::Skipped));
                continue;
            }

            let outcome = self.run(&self.job(&run, size));
            if !outcome.is_success() && self.sweep.fail_fast {
                warn!("Stopping the sweep after size {size} failed");
                stopped = true;
            }
            results.push((size, outcome));

            info!("Done with {}/{total}", index + 1);
        }

        info!("Done with sweep {run}");

        Ok(SweepSummary {
            run,
            variant: self.sweep.variant.clone(),
            results,
        })
    }
}
