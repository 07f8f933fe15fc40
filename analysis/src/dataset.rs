use crate::{
    artifact::{BenchmarkReport, RunId, Stats},
    store::ArtifactStore,
};
use itertools::Itertools;
use rayon::prelude::*;
use std::fmt::{self, Display};
use tracing::{info, instrument, warn};

/// One statistic column of a benchmark report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Min,
    Max,
    Mean,
    Stddev,
    Ops,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Min,
        Metric::Max,
        Metric::Mean,
        Metric::Stddev,
        Metric::Ops,
    ];

    pub fn value(self, stats: &Stats) -> f64 {
        match self {
            Self::Min => stats.min,
            Self::Max => stats.max,
            Self::Mean => stats.mean,
            Self::Stddev => stats.stddev,
            Self::Ops => stats.ops,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Mean => "mean",
            Self::Stddev => "stddev",
            Self::Ops => "ops",
        }
    }

    /// deviations span too little range for a log axis
    pub fn log_scale(self) -> bool {
        self != Self::Stddev
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub variant: String,
    pub size: u64,
    pub function: String,
    pub stats: Stats,
}

/// All records of a single run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub records: Vec<Record>,
}

impl Dataset {
    /// Load every artifact of `run`.
    ///
    /// Artifacts that can't be read are skipped with a warning, a run with
    /// missing sizes simply yields fewer points.
    #[instrument(skip(store), fields(platform = store.platform()))]
    pub fn load(store: &ArtifactStore, run: &RunId) -> Self {
        let artifacts = store.run_artifacts(run);

        let records = artifacts
            .par_iter()
            .filter_map(|(name, path)| match BenchmarkReport::read(path) {
                Ok(report) => Some(
                    report
                        .benchmarks
                        .into_iter()
                        .map(|entry| Record {
                            variant: name.variant.clone(),
                            size: name.size,
                            function: entry.function().to_owned(),
                            stats: entry.stats,
                        })
                        .collect_vec(),
                ),
                Err(error) => {
                    warn!("Skipping unreadable artifact: {error}");
                    None
                }
            })
            .flatten()
            .collect::<Vec<_>>();

        info!(
            "Loaded {} records from {} artifacts",
            records.len(),
            artifacts.len()
        );

        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn variants(&self) -> Vec<&str> {
        self.records
            .iter()
            .map(|record| record.variant.as_str())
            .unique()
            .sorted()
            .collect_vec()
    }

    pub fn for_variant(&self, variant: &str) -> Self {
        Self {
            records: self
                .records
                .iter()
                .filter(|record| record.variant == variant)
                .cloned()
                .collect_vec(),
        }
    }

    /// function labels, sorted
    pub fn functions(&self) -> Vec<&str> {
        self.records
            .iter()
            .map(|record| record.function.as_str())
            .unique()
            .sorted()
            .collect_vec()
    }

    pub fn sizes(&self) -> Vec<u64> {
        self.records
            .iter()
            .map(|record| record.size)
            .unique()
            .sorted()
            .collect_vec()
    }

    /// records of `function` with a size above `min_size`, ascending by size
    pub fn series(&self, function: &str, min_size: Option<u64>) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|record| record.function == function)
            .filter(|record| min_size.map_or(true, |min| record.size > min))
            .sorted_by_key(|record| record.size)
            .collect_vec()
    }
}
