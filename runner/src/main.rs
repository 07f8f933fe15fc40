mod config;
mod executors;
mod platform;

use crate::{
    config::{ConfigErrors, HarnessConfig},
    executors::{ExecutorError, Executors, SweepSummary},
};
use clap::{ArgAction, Args, Parser, Subcommand};
use purem_bench_analysis::{
    plot::{render_report, render_run},
    ArtifactStore, Dataset, ImageFormat, PlotError, RunId, StoreError,
};
use std::{
    io,
    path::{Path, PathBuf},
    process::ExitCode,
};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "bench.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about = "Benchmark sweep and plotting harness", long_about = None)]
struct Cli {
    #[arg(
        long,
        short,
        global = true,
        help = "Harness config, defaults to ./bench.yaml if present"
    )]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "BENCHMARKS_PLATFORM",
        help = "Platform tag used as the artifact subdirectory"
    )]
    platform: Option<String>,
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the benchmark once per size and print the run id
    Sweep(SweepArgs),
    /// Render charts and the results table of a run, the latest by default
    Plot(PlotArgs),
    /// Sweep, then plot the new run
    Test {
        #[command(flatten)]
        sweep: SweepArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print the id of the latest run, nothing if there is none
    Latest,
    /// Validate the config and exit
    Check,
}

#[derive(Args, Debug)]
struct SweepArgs {
    #[arg(long)]
    variant: Option<String>,
    #[arg(long = "size", value_name = "N", help = "Replaces the configured sizes, repeatable")]
    sizes: Vec<u64>,
    #[arg(long)]
    fail_fast: bool,
}

impl SweepArgs {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(ref variant) = self.variant {
            config.sweep.variant = variant.clone();
        }
        if !self.sizes.is_empty() {
            config.sweep.sizes = self.sizes.clone();
        }
        if self.fail_fast {
            config.sweep.fail_fast = true;
        }
    }
}

#[derive(Args, Debug)]
struct OutputArgs {
    #[arg(long)]
    format: Option<ImageFormat>,
    #[arg(long)]
    output: Option<PathBuf>,
}

impl OutputArgs {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(format) = self.format {
            config.plot.format = format;
        }
        if let Some(ref output) = self.output {
            config.plot.output = output.clone();
        }
    }
}

#[derive(Args, Debug)]
struct PlotArgs {
    #[arg(long)]
    run: Option<RunId>,
    #[arg(long, help = "Only plot this variant of the run")]
    variant: Option<String>,
    #[command(flatten)]
    output: OutputArgs,
}

impl Commands {
    fn apply(&self, config: &mut HarnessConfig) {
        match self {
            Self::Sweep(sweep) => sweep.apply(config),
            Self::Test { sweep, output } => {
                sweep.apply(config);
                output.apply(config);
            }
            Self::Plot(plot) => plot.output.apply(config),
            Self::Latest | Self::Check => {}
        }
    }

    /// whether the command needs a runnable benchmark
    fn benchmarks(&self) -> bool {
        matches!(self, Self::Sweep(_) | Self::Test { .. } | Self::Check)
    }
}

#[derive(Error, Debug)]
enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Plot(#[from] PlotError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Success,
    /// the sweep completed but at least one size did not produce an artifact
    SizesFailed,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => ExitCode::SUCCESS,
            Status::SizesFailed => ExitCode::from(2),
        }
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn sweep(config: &HarnessConfig, store: ArtifactStore) -> Result<SweepSummary, RunnerError> {
    let mut executor = Executors::load(config, store)?;
    let summary = executor.execute(RunId::now())?;

    for (size, outcome) in summary.failed() {
        error!("Size {size} {outcome}");
    }
    println!("{}", summary.run);

    Ok(summary)
}

#[instrument(skip(config, store), fields(platform = store.platform()))]
fn plot(
    config: &HarnessConfig,
    store: &ArtifactStore,
    run: Option<RunId>,
    variant: Option<&str>,
) -> Result<Vec<PathBuf>, PlotError> {
    let dataset = match run.or_else(|| store.latest_run()) {
        Some(run) => {
            info!("Plotting run {run}");
            Dataset::load(store, &run)
        }
        None => {
            warn!("No runs found in {}", store.platform_dir().display());
            Dataset::default()
        }
    };

    match variant {
        Some(variant) => render_report(&dataset.for_variant(variant), variant, &config.plot),
        None => render_run(&dataset, &config.sweep.variant, &config.plot),
    }
}

fn run(cli: Cli) -> Result<Status, RunnerError> {
    let mut config = match cli.config {
        Some(ref path) => HarnessConfig::load(path)?,
        None => HarnessConfig::load_or_default(Path::new(DEFAULT_CONFIG), false)?,
    };

    cli.command.apply(&mut config);

    if config.preflight_checks(cli.command.benchmarks()) {
        return Err(ConfigErrors::Preflight.into());
    }

    let platform = platform::resolve(cli.platform.as_deref(), &config.store);
    let store = config.store.open(&platform)?;

    let status = match cli.command {
        Commands::Check => {
            info!("Config is valid, artifacts go to {}", store.platform_dir().display());
            Status::Success
        }
        Commands::Latest => {
            if let Some(run) = store.latest_run() {
                println!("{run}");
            }
            Status::Success
        }
        Commands::Sweep(_) => {
            if sweep(&config, store)?.is_success() {
                Status::Success
            } else {
                Status::SizesFailed
            }
        }
        Commands::Test { .. } => {
            let summary = sweep(&config, store.clone())?;
            plot(&config, &store, Some(summary.run.clone()), Some(summary.variant.as_str()))?;

            if summary.is_success() {
                Status::Success
            } else {
                Status::SizesFailed
            }
        }
        Commands::Plot(args) => {
            plot(&config, &store, args.run, args.variant.as_deref())?;
            Status::Success
        }
    };

    Ok(status)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(status) => status.into(),
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::fs;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(["purem-bench"].iter().chain(args)).unwrap()
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sweep_overrides() {
        let cli = parse(&["sweep", "--variant", "x86", "--size", "10", "--size", "20"]);
        let mut config = HarnessConfig::default();

        cli.command.apply(&mut config);

        assert_eq!(config.sweep.variant, "x86");
        assert_eq!(config.sweep.sizes, vec![10, 20]);
        assert!(!config.sweep.fail_fast);
        assert!(cli.command.benchmarks());
    }

    #[test]
    fn plot_arguments() {
        let cli = parse(&["plot", "--run", "20250102_000000", "--format", "svg", "-v"]);

        assert_eq!(cli.verbose, 1);
        assert!(!cli.command.benchmarks());
        match cli.command {
            Commands::Plot(ref args) => {
                assert_eq!(args.run.as_ref().map(RunId::as_str), Some("20250102_000000"));
                assert_eq!(args.output.format, Some(ImageFormat::Svg));
            }
            ref other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["purem-bench", "plot", "--run", "yesterday"]).is_err());
        assert!(Cli::try_parse_from(["purem-bench", "plot", "--format", "gif"]).is_err());
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");
        let cli = parse(&["--config", path.to_str().unwrap(), "check"]);

        assert!(matches!(
            run(cli),
            Err(RunnerError::Config(ConfigErrors::ReadConfig { .. }))
        ));
    }

    #[test]
    fn test_command_sweeps_and_plots() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("bench.sh");
        fs::write(
            &script,
            r#"for arg in "$@"; do
    case "$arg" in --benchmark-json=*) out="${arg#--benchmark-json=}" ;; esac
done
[ "$ARRAY_SIZE" = 20 ] && exit 1
printf '{"benchmarks": [{"name": "a", "params": {"func_name": "Softmax: Purem"}, "stats": {"min": 1, "max": 1, "mean": 1, "stddev": 0, "ops": %s}}]}' "$ARRAY_SIZE" > "$out"
"#,
        )
        .unwrap();

        let config = dir.path().join("bench.yaml");
        fs::write(
            &config,
            format!(
                "benchmark:\n  exec: /bin/sh\n  params: [{script}]\n  timeout: 10\n\
                 store:\n  root: {root}\n\
                 plot:\n  output: {output}\n  format: svg\n  width: 320\n  height: 240\n",
                script = script.display(),
                root = dir.path().join("store").display(),
                output = dir.path().join("docs").display(),
            ),
        )
        .unwrap();
        let config = config.to_str().unwrap();

        let cli = parse(&[
            "--config", config, "--platform", "linux", "test", "--variant", "arm", "--size",
            "10", "--size", "20",
        ]);
        assert_eq!(run(cli).unwrap(), Status::SizesFailed);

        assert!(dir.path().join("docs/arm/benchmark_ops_full.svg").is_file());
        assert!(dir.path().join("docs/arm/benchmarks_table.md").is_file());

        let store = ArtifactStore::new(dir.path().join("store"), "linux", "*.json").unwrap();
        assert_eq!(store.list().len(), 1);

        let cli = parse(&["--config", config, "--platform", "linux", "plot"]);
        assert_eq!(run(cli).unwrap(), Status::Success);
    }

    #[test]
    fn empty_store_latest_and_plot() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("bench.yaml");
        fs::write(
            &config,
            format!(
                "store:\n  root: {root}\n\
                 plot:\n  output: {output}\n  format: svg\n  width: 320\n  height: 240\n",
                root = dir.path().join("store").display(),
                output = dir.path().join("docs").display(),
            ),
        )
        .unwrap();
        let config = config.to_str().unwrap();

        let cli = parse(&["--config", config, "--platform", "linux", "latest"]);
        assert_eq!(run(cli).unwrap(), Status::Success);
        assert!(!dir.path().join("store").exists());

        let cli = parse(&["--config", config, "--platform", "linux", "plot"]);
        assert_eq!(run(cli).unwrap(), Status::Success);

        let report = dir.path().join("docs/sandbox");
        assert!(report.join("benchmark_acceleration_large.svg").is_file());
        assert!(report.join("benchmarks_table.md").is_file());
    }
}
