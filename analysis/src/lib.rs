//! Artifact store, run selection and report rendering for the benchmark harness.
//!
//! The runner writes one pytest-benchmark JSON artifact per input size into
//! `<root>/<platform>/<run>_<variant>_<size>.json`. This crate reads them
//! back, picks the latest run and renders comparison charts and a markdown
//! results table from it.

pub mod artifact;
pub mod dataset;
pub mod plot;
pub mod smoothing;
pub mod store;
pub mod table;

pub use artifact::{ArtifactName, BenchmarkReport, RunId, Stats};
pub use dataset::{Dataset, Metric};
pub use plot::{ImageFormat, PlotError, PlotOptions};
pub use store::{ArtifactStore, StoreError};
