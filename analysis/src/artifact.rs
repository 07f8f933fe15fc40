use chrono::{DateTime, Local};
use serde::Deserialize;
use std::{
    fmt::{self, Display},
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::debug;

pub const ARTIFACT_EXTENSION: &str = "json";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Run id '{0}' does not follow YYYYMMDD_HHMMSS")]
    InvalidRunId(String),
    #[error("Artifact name '{0}' does not follow <run>_<variant>_<size>.json")]
    InvalidName(String),
    #[error("Failed to access artifact {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse artifact {path:?}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Identifier shared by every artifact of one sweep, `YYYYMMDD_HHMMSS`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(String);

impl RunId {
    pub fn now() -> Self {
        Self::from_time(&Local::now())
    }

    pub fn from_time(time: &DateTime<Local>) -> Self {
        Self(time.format("%Y%m%d_%H%M%S").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// parse the run id from the start of `input`, ignoring everything after it
    pub fn from_prefix(input: &str) -> Option<Self> {
        input.get(..15).and_then(|prefix| prefix.parse().ok())
    }
}

impl FromStr for RunId {
    type Err = ArtifactError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let bytes = value.as_bytes();
        let valid = bytes.len() == 15
            && bytes[8] == b'_'
            && bytes[..8].iter().all(u8::is_ascii_digit)
            && bytes[9..].iter().all(u8::is_ascii_digit);

        if valid {
            Ok(Self(value.to_owned()))
        } else {
            Err(ArtifactError::InvalidRunId(value.to_owned()))
        }
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File name of a single artifact: `<run>_<variant>_<size>.json`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArtifactName {
    pub run: RunId,
    pub variant: String,
    pub size: u64,
}

impl ArtifactName {
    pub fn new(run: RunId, variant: impl Into<String>, size: u64) -> Self {
        Self {
            run,
            variant: variant.into(),
            size,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ArtifactError> {
        path.file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ArtifactError::InvalidName(path.to_string_lossy().into_owned()))?
            .parse()
    }
}

impl FromStr for ArtifactName {
    type Err = ArtifactError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let invalid = || ArtifactError::InvalidName(name.to_owned());

        let stem = name
            .strip_suffix(ARTIFACT_EXTENSION)
            .and_then(|stem| stem.strip_suffix('.'))
            .ok_or_else(invalid)?;
        let run = RunId::from_prefix(stem).ok_or_else(invalid)?;
        // the variant may contain underscores itself, the size is always the last field
        let (variant, size) = stem[15..]
            .strip_prefix('_')
            .and_then(|rest| rest.rsplit_once('_'))
            .ok_or_else(invalid)?;

        if variant.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            run,
            variant: variant.to_owned(),
            size: size.parse().map_err(|_| invalid())?,
        })
    }
}

impl Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}.{ARTIFACT_EXTENSION}",
            self.run, self.variant, self.size
        )
    }
}

/// Timing statistics of a single benchmark, in seconds (`ops` in 1/s)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub ops: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BenchmarkParams {
    #[serde(default)]
    pub func_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BenchmarkEntry {
    pub name: String,
    #[serde(default)]
    pub params: Option<BenchmarkParams>,
    pub stats: Stats,
}

impl BenchmarkEntry {
    /// label of the benchmarked function, the parametrized name wins over the test name
    pub fn function(&self) -> &str {
        self.params
            .as_ref()
            .and_then(|params| params.func_name.as_deref())
            .unwrap_or(&self.name)
    }
}

/// Subset of the pytest-benchmark JSON report, unknown fields are ignored
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BenchmarkReport {
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkEntry>,
}

impl BenchmarkReport {
    pub fn read(path: &Path) -> Result<Self, ArtifactError> {
        let file = File::open(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let report: Self =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| ArtifactError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = ?path, entries = report.benchmarks.len(), "Read artifact");

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    #[test]
    fn run_id_from_time() {
        let time = Local.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).unwrap();

        assert_eq!(RunId::from_time(&time).as_str(), "20250307_090501");
    }

    #[test]
    fn run_id_rejects_malformed() {
        assert!("20250101-000000".parse::<RunId>().is_err());
        assert!("2025010_0000000".parse::<RunId>().is_err());
        assert!("20250101_00000".parse::<RunId>().is_err());
        assert!("".parse::<RunId>().is_err());
        assert_eq!(RunId::from_prefix("0001_bench.json"), None);
    }

    #[test]
    fn artifact_name_parses_fields() {
        let name: ArtifactName = "20250102_000000_arm_5000000.json".parse().unwrap();

        assert_eq!(name.run.as_str(), "20250102_000000");
        assert_eq!(name.variant, "arm");
        assert_eq!(name.size, 5_000_000);
        assert_eq!(name.to_string(), "20250102_000000_arm_5000000.json");
    }

    #[test]
    fn artifact_name_variant_with_underscores() {
        let name: ArtifactName = "20250102_000000_apple_m2_20000.json".parse().unwrap();

        assert_eq!(name.variant, "apple_m2");
        assert_eq!(name.size, 20_000);
    }

    #[test]
    fn artifact_name_rejects_malformed() {
        for name in [
            "20250102_000000_arm_20000.txt",
            "20250102_000000_20000.json",
            "20250102_000000__20000.json",
            "20250102_000000_arm_big.json",
            "notes.json",
        ] {
            assert!(name.parse::<ArtifactName>().is_err(), "{name} parsed");
        }
    }

    #[test]
    fn entry_function_prefers_params() {
        let stats = Stats {
            min: 1.0,
            max: 1.0,
            mean: 1.0,
            stddev: 0.0,
            ops: 1.0,
        };
        let mut entry = BenchmarkEntry {
            name: "test_numpy_softmax[Softmax: NumPy]".to_owned(),
            params: None,
            stats,
        };
        assert_eq!(entry.function(), "test_numpy_softmax[Softmax: NumPy]");

        entry.params = Some(BenchmarkParams {
            func_name: Some("Softmax: NumPy".to_owned()),
        });
        assert_eq!(entry.function(), "Softmax: NumPy");
    }

    #[test]
    fn report_ignores_unknown_fields() {
        let raw = r#"{
            "machine_info": {"node": "mac"},
            "benchmarks": [{
                "group": null,
                "name": "test_purem_softmax[Softmax: Purem]",
                "params": {"func_name": "Softmax: Purem"},
                "stats": {"min": 0.1, "max": 0.3, "mean": 0.2, "stddev": 0.05,
                          "ops": 5.0, "rounds": 12, "iqr": 0.01}
            }],
            "datetime": "2025-01-02T00:00:00",
            "version": "4.0.0"
        }"#;
        let report: BenchmarkReport = serde_json::from_str(raw).unwrap();

        assert_eq!(report.benchmarks.len(), 1);
        assert_eq!(report.benchmarks[0].function(), "Softmax: Purem");
        assert_eq!(report.benchmarks[0].stats.ops, 5.0);
    }

    #[test]
    fn report_file_keeps_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20250102_000000_arm_10.json");
        fs::write(
            &path,
            r#"{"benchmarks": [{"name": "test_numba_softmax",
                "params": {"func_name": "Softmax: Numba"},
                "stats": {"min": 1.25e-6, "max": 9.5e-5, "mean": 3.0000000000000004e-6,
                          "stddev": 7.1e-7, "ops": 333333.3333333333}}]}"#,
        )
        .unwrap();

        let report = BenchmarkReport::read(&path).unwrap();

        assert_eq!(
            report.benchmarks[0].stats,
            Stats {
                min: 1.25e-6,
                max: 9.5e-5,
                mean: 3.0000000000000004e-6,
                stddev: 7.1e-7,
                ops: 333_333.3333333333,
            }
        );
    }

    #[test]
    fn unreadable_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20250102_000000_arm_10.json");

        assert!(matches!(
            BenchmarkReport::read(&path),
            Err(ArtifactError::Io { .. })
        ));

        fs::write(&path, "{\"benchmarks\": [").unwrap();
        assert!(matches!(
            BenchmarkReport::read(&path),
            Err(ArtifactError::Json { .. })
        ));
    }
}
