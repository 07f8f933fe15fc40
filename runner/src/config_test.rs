use super::*;
use purem_bench_analysis::ImageFormat;
use std::os::unix::fs::PermissionsExt;

const FULL_CONFIG: &str = r#"
executor:
  name: local
benchmark:
  exec: /bin/sh
  params: [bench.sh, "--size={size}"]
  timeout: 600
  env:
    PUREM_LICENSE: purem-sandbox
  statistics:
    min_rounds: 25
    disable_gc: false
    sort: ops
    columns: [mean, ops]
sweep:
  sizes: [20000, 5000000]
  variant: arm
  fail_fast: true
store:
  root: /tmp/benchmarks
  platform: Darwin-CPython-3.11-64bit
variants:
  arm:
    env: { PUREM_WHEEL: purem-arm64.whl }
  x86:
    params: [--x86]
plot:
  output: docs/images
  format: svg
  large_threshold: 500000
"#;

#[test]
fn full_config_parses() {
    let config: HarnessConfig = serde_yaml::from_str(FULL_CONFIG).unwrap();

    assert_eq!(config.benchmark.exec, PathBuf::from("/bin/sh"));
    assert_eq!(config.benchmark.timeout, 600);
    assert_eq!(config.benchmark.statistics.min_rounds, 25);
    assert_eq!(config.sweep.sizes, vec![20_000, 5_000_000]);
    assert!(config.sweep.fail_fast);
    assert_eq!(
        config.store.platform.as_deref(),
        Some("Darwin-CPython-3.11-64bit")
    );
    // untouched defaults survive partial sections
    assert_eq!(config.store.glob, "*.json");
    assert_eq!(config.variants["x86"].params, vec!["--x86"]);
    assert_eq!(config.plot.format, ImageFormat::Svg);
    assert_eq!(config.plot.large_threshold, 500_000);
    assert_eq!(config.plot.smoothing_window, 5);
}

#[test]
fn unknown_fields_are_rejected() {
    let result = serde_yaml::from_str::<HarnessConfig>("sweep:\n  size: [1]\n");

    assert!(result.is_err());
}

#[test]
fn empty_config_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.yaml");
    fs::write(&path, "\n").unwrap();

    let config = HarnessConfig::load(&path).unwrap();

    assert_eq!(config.sweep.sizes.len(), 8);
    assert_eq!(config.sweep.sizes[0], 20_000);
    assert_eq!(config.benchmark.exec, PathBuf::from("python3"));
}

#[test]
fn missing_optional_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.yaml");

    assert!(HarnessConfig::load_or_default(&path, false).is_ok());
    assert!(matches!(
        HarnessConfig::load_or_default(&path, true),
        Err(ConfigErrors::ReadConfig { .. })
    ));
}

#[test]
fn statistics_arguments() {
    let arguments = StatisticsConfig::default().arguments(Path::new("/store/a.json"));

    assert_eq!(
        arguments,
        vec![
            OsString::from("--benchmark-min-rounds=10"),
            OsString::from("--benchmark-disable-gc"),
            OsString::from("--benchmark-sort=mean"),
            OsString::from("--benchmark-columns=min,max,mean,stddev,ops"),
            OsString::from("--benchmark-json=/store/a.json"),
        ]
    );
}

#[test]
fn variants_are_checked_once_declared() {
    let mut config = HarnessConfig::default();
    assert!(config.variant("anything").is_ok());

    config
        .variants
        .insert("arm".to_owned(), VariantConfig::default());
    assert!(config.variant("arm").is_ok());
    assert!(matches!(
        config.variant("x86"),
        Err(ConfigErrors::UnknownVariant(_))
    ));
}

#[test]
fn preflight_accepts_valid_config() {
    let mut config = HarnessConfig::default();
    config.benchmark.exec = PathBuf::from("/bin/sh");
    config.sweep.sizes = vec![10, 20, 10];

    assert!(!config.preflight_checks(true));
    assert_eq!(config.sweep.sizes, vec![10, 20]);
}

#[test]
fn preflight_collects_errors() {
    let mut config = HarnessConfig::default();
    config.benchmark.exec = PathBuf::from("/definitely/not/here");
    config.benchmark.timeout = 0;
    config.sweep.sizes = vec![];

    assert!(config.preflight_checks(true));
    // plotting does not depend on the benchmark side
    assert!(!config.preflight_checks(false));

    config.plot.smoothing_window = 4;
    assert!(config.preflight_checks(false));
}

#[test]
fn preflight_rejects_sweep_environment() {
    let mut config = HarnessConfig::default();
    config.benchmark.exec = PathBuf::from("/bin/sh");
    assert!(!config.preflight_checks(true));

    config
        .benchmark
        .env
        .insert(SIZE_ENV.to_owned(), "200000".to_owned());
    assert!(config.preflight_checks(true));

    config.benchmark.env.clear();
    config.variants.insert(
        "sandbox".to_owned(),
        VariantConfig {
            env: [(PLATFORM_ENV.to_owned(), "Windows".to_owned())].into(),
            params: vec![],
        },
    );
    assert!(config.preflight_checks(true));
}

#[test]
fn preflight_rejects_non_executable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench");
    fs::write(&path, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

    assert!(!check_executable(&path).unwrap());

    let mut config = HarnessConfig::default();
    config.benchmark.exec = path;
    assert!(config.preflight_checks(true));
}

#[test]
fn resolve_bare_names() {
    assert_eq!(
        resolve_executable(Path::new("/bin/sh")),
        Some(PathBuf::from("/bin/sh"))
    );
    assert!(resolve_executable(Path::new("sh")).is_some());
    assert_eq!(resolve_executable(Path::new("no-such-program-here")), None);
}
