use crate::artifact::{ArtifactName, RunId};
use globset::{GlobBuilder, GlobMatcher};
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Artifact glob was invalid")]
    InvalidGlob(#[from] globset::Error),
    #[error("Failed to create platform directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Append-only tree of artifacts: `<root>/<platform>/<run>_<variant>_<size>.json`
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    platform: String,
    matcher: GlobMatcher,
}

impl ArtifactStore {
    pub fn new(
        root: impl Into<PathBuf>,
        platform: impl Into<String>,
        glob: &str,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            root: root.into(),
            platform: platform.into(),
            matcher: GlobBuilder::new(glob).build()?.compile_matcher(),
        })
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn platform_dir(&self) -> PathBuf {
        self.root.join(&self.platform)
    }

    pub fn artifact_path(&self, name: &ArtifactName) -> PathBuf {
        self.platform_dir().join(name.to_string())
    }

    /// make sure the platform directory exists before anything writes into it
    pub fn prepare(&self) -> Result<PathBuf, StoreError> {
        let path = self.platform_dir();

        fs::create_dir_all(&path).map_err(|source| StoreError::CreateDir {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }

    fn is_artifact(&self, entry: &DirEntry) -> bool {
        entry.file_type().map_or(false, |kind| kind.is_file())
            && self.matcher.is_match(Path::new(entry.file_name()))
    }

    /// all artifact files below the platform directory, sorted by file name
    pub fn list(&self) -> Vec<PathBuf> {
        let dir = self.platform_dir();

        if !dir.is_dir() {
            debug!(dir = ?dir, "Platform directory does not exist, store is empty");

            return Vec::new();
        }

        // the store usually lives in a hidden, git-ignored directory
        WalkBuilder::new(&dir)
            .standard_filters(false)
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    warn!("Failed to list artifact: {error}");
                    None
                }
            })
            .filter(|entry| self.is_artifact(entry))
            .map(DirEntry::into_path)
            .sorted_by(|left, right| {
                left.file_name()
                    .cmp(&right.file_name())
                    .then_with(|| left.cmp(right))
            })
            .collect_vec()
    }

    /// Recover the id of the most recent run.
    ///
    /// File names embed a zero-padded timestamp, so the lexicographically last
    /// name belongs to the latest run. Returns `None` for an empty store or if
    /// the last name does not start with a run id.
    pub fn latest_run(&self) -> Option<RunId> {
        let latest = self.list().pop()?;
        let file_name = latest.file_name()?.to_str()?;
        let run = RunId::from_prefix(file_name);

        if run.is_none() {
            warn!(file = file_name, "Latest artifact does not start with a run id");
        }

        run
    }

    /// every artifact whose name carries `run`, sorted by file name
    pub fn run_artifacts(&self, run: &RunId) -> Vec<(ArtifactName, PathBuf)> {
        self.list()
            .into_iter()
            .filter_map(|path| match ArtifactName::from_path(&path) {
                Ok(name) if &name.run == run => Some((name, path)),
                Ok(_) => None,
                Err(error) => {
                    debug!(path = ?path, "Skipping foreign file: {error}");
                    None
                }
            })
            .collect_vec()
    }
}
