use itertools::Itertools;
use purem_bench_analysis::{ArtifactStore, PlotOptions, StoreError};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    env,
    ffi::OsString,
    fs::{self, File},
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, info, warn};

/// set by the sweep for every child, never taken from the config
pub const SIZE_ENV: &str = "ARRAY_SIZE";
pub const PLATFORM_ENV: &str = "BENCHMARKS_PLATFORM";

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound)
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

/// resolve bare program names like `python3` against `PATH`
pub fn resolve_executable(exec: &Path) -> Option<PathBuf> {
    if exec.components().count() > 1 {
        return Some(exec.to_path_buf()).filter(|path| path.is_file());
    }

    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(exec))
            .find(|candidate| candidate.is_file())
    })
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config {path:?}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: Error,
    },
    #[error("Config is invalid: {0}")]
    InvalidConfig(#[from] serde_yaml::Error),
    #[error("Executor {0} not supported")]
    UnsupportedExecutor(String),
    #[error("Variant {0} is not defined")]
    UnknownVariant(String),
    #[error("File not found")]
    FileNotFound,
    #[error("Metadata not found")]
    MetadataNotFound(#[from] Error),
    #[error("Config failed the preflight checks")]
    Preflight,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    // executor config, only the local executor exists
    #[serde(default)]
    pub executor: ExecutorConfig,
    // the benchmark entry point driven once per size
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub store: StoreConfig,
    // binary flavours, e.g. arm/ x86 builds of the sandbox library
    #[serde(default)]
    pub variants: BTreeMap<String, VariantConfig>,
    #[serde(default)]
    pub plot: PlotOptions,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    // Name of the selected executor, see Executors::load for the selection proccess
    #[serde(default = "default_executor")]
    pub name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: default_executor(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkConfig {
    #[serde(default = "default_exec")]
    pub exec: PathBuf,
    // may reference {size}, {run}, {variant}, {platform} and {artifact}
    #[serde(default = "default_params")]
    pub params: Vec<String>,
    // seconds per size
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub statistics: StatisticsConfig,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            exec: default_exec(),
            params: default_params(),
            timeout: default_timeout(),
            env: BTreeMap::new(),
            statistics: StatisticsConfig::default(),
        }
    }
}

/// Fixed pytest-benchmark parameters shared by every size of a sweep
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct StatisticsConfig {
    #[serde(default = "default_min_rounds")]
    pub min_rounds: u32,
    #[serde(default = "default_true")]
    pub disable_gc: bool,
    #[serde(default = "default_sort")]
    pub sort: Option<String>,
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,
    // flag the framework uses to write its JSON report
    #[serde(default = "default_output_flag")]
    pub output_flag: String,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            min_rounds: default_min_rounds(),
            disable_gc: true,
            sort: default_sort(),
            columns: default_columns(),
            output_flag: default_output_flag(),
        }
    }
}

impl StatisticsConfig {
    pub fn arguments(&self, artifact: &Path) -> Vec<OsString> {
        let mut arguments = vec![OsString::from(format!(
            "--benchmark-min-rounds={}",
            self.min_rounds
        ))];

        if self.disable_gc {
            arguments.push("--benchmark-disable-gc".into());
        }
        if let Some(ref sort) = self.sort {
            arguments.push(format!("--benchmark-sort={sort}").into());
        }
        if !self.columns.is_empty() {
            arguments.push(format!("--benchmark-columns={}", self.columns.join(",")).into());
        }

        let mut output = OsString::from(&self.output_flag);
        output.push("=");
        output.push(artifact);
        arguments.push(output);

        arguments
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    #[serde(default = "default_sizes")]
    pub sizes: Vec<u64>,
    // variant used when none is selected on the command line
    #[serde(default = "default_variant")]
    pub variant: String,
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            sizes: default_sizes(),
            variant: default_variant(),
            fail_fast: false,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
    // fixed platform tag, detected when missing
    pub platform: Option<String>,
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_glob")]
    pub glob: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
            platform: None,
            runtime: default_runtime(),
            glob: default_glob(),
        }
    }
}

impl StoreConfig {
    pub fn open(&self, platform: &str) -> Result<ArtifactStore, StoreError> {
        ArtifactStore::new(&self.root, platform, &self.glob)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct VariantConfig {
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    // appended after benchmark.params
    #[serde(default)]
    pub params: Vec<String>,
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let content = fs::read_to_string(path).map_err(|source| ConfigErrors::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;

        if content.trim().is_empty() {
            warn!("Config {} is empty, using defaults", path.display());

            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(&content)?)
    }

    /// load `path`, falling back to the defaults if an optional file is missing
    pub fn load_or_default(path: &Path, required: bool) -> Result<Self, ConfigErrors> {
        if !required && !path.exists() {
            info!("No config at {}, using defaults", path.display());

            Ok(Self::default())
        } else {
            Self::load(path)
        }
    }

    /// Settings of the selected variant. Without any declared variants every
    /// name is accepted as a plain label.
    pub fn variant(&self, name: &str) -> Result<VariantConfig, ConfigErrors> {
        match self.variants.get(name) {
            Some(variant) => Ok(variant.clone()),
            None if self.variants.is_empty() => Ok(VariantConfig::default()),
            None => Err(ConfigErrors::UnknownVariant(name.to_owned())),
        }
    }

    /// Validate the config, logging every problem instead of stopping at the first.
    /// Returns whether an error was found. `benchmark` also checks the sweep side,
    /// plotting alone doesn't need a benchmark executable.
    pub fn preflight_checks(&mut self, benchmark: bool) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.executor.name != "local" {
            error!(
                "executor.name ({}) is not supported, please use `local`",
                self.executor.name
            );
            contains_error = true;
        }

        if self.plot.smoothing_window % 2 == 0 {
            error!("plot.smoothing_window must be odd");
            contains_error = true;
        }
        if self.plot.smoothing_order >= self.plot.smoothing_window {
            error!("plot.smoothing_order must be less than plot.smoothing_window");
            contains_error = true;
        }
        if self.plot.width == 0 || self.plot.height == 0 {
            error!("plot.width and plot.height cannot be 0");
            contains_error = true;
        }

        if !benchmark {
            return contains_error;
        }

        if self.sweep.sizes.is_empty() {
            error!("No sizes were defined, unable to build a sweep");
            contains_error = true;
        }
        if self.sweep.sizes.contains(&0) {
            error!("sweep.sizes cannot contain 0");
            contains_error = true;
        }
        if self.sweep.sizes.iter().unique().count() != self.sweep.sizes.len() {
            warn!("sweep.sizes contains duplicates, every size is only benchmarked once");
            self.sweep.sizes = self.sweep.sizes.iter().copied().unique().collect();
        }

        if let Err(e) = self.variant(&self.sweep.variant) {
            error!("sweep.variant: {e}");
            contains_error = true;
        }

        let reserved = self
            .variants
            .iter()
            .map(|(name, variant)| (format!("variants.{name}.env"), &variant.env))
            .chain([("benchmark.env".to_owned(), &self.benchmark.env)])
            .flat_map(|(section, env)| {
                [SIZE_ENV, PLATFORM_ENV]
                    .into_iter()
                    .filter(move |key| env.contains_key(*key))
                    .map(move |key| (section.clone(), key))
            })
            .collect_vec();
        for (section, key) in reserved {
            error!("{section} cannot set {key}, the sweep sets it for every size");
            contains_error = true;
        }

        if self.benchmark.timeout == 0 {
            error!("benchmark.timeout cannot be 0, every size would time out");
            contains_error = true;
        }

        match resolve_executable(&self.benchmark.exec) {
            None => {
                error!(
                    "Failed to find benchmark.exec. Either not a file or not found at {}",
                    self.benchmark.exec.to_string_lossy()
                );
                contains_error = true;
            }
            Some(path) => match check_executable(&path) {
                Ok(true) => {}
                Ok(false) => {
                    error!(
                        "Benchmark target {} is not executable",
                        path.to_string_lossy()
                    );
                    contains_error = true;
                }
                Err(e) => {
                    error!(
                        "Failed to determine if benchmark.exec ({}) is an executable: {e}",
                        path.to_string_lossy()
                    );
                    contains_error = true;
                }
            },
        }

        contains_error
    }
}

fn default_executor() -> String {
    "local".to_owned()
}

fn default_exec() -> PathBuf {
    PathBuf::from("python3")
}

fn default_params() -> Vec<String> {
    ["-m", "pytest", "src/performance_test.py"]
        .map(String::from)
        .to_vec()
}

fn default_timeout() -> u64 {
    3600
}

fn default_min_rounds() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_sort() -> Option<String> {
    Some("mean".to_owned())
}

fn default_columns() -> Vec<String> {
    ["min", "max", "mean", "stddev", "ops"]
        .map(String::from)
        .to_vec()
}

fn default_output_flag() -> String {
    "--benchmark-json".to_owned()
}

fn default_sizes() -> Vec<u64> {
    vec![
        20_000, 50_000, 100_000, 200_000, 500_000, 1_000_000, 2_000_000, 5_000_000,
    ]
}

fn default_variant() -> String {
    "sandbox".to_owned()
}

fn default_store_root() -> PathBuf {
    PathBuf::from(".benchmarks")
}

fn default_runtime() -> String {
    "CPython-3.11".to_owned()
}

fn default_glob() -> String {
    "*.json".to_owned()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
