use crate::config::StoreConfig;
use nix::sys::utsname::uname;
use once_cell::sync::Lazy;
use std::env;
use tracing::{debug, warn};

/// kernel name as reported by uname(2), e.g. `Darwin` or `Linux`
static SYSTEM_NAME: Lazy<String> = Lazy::new(|| match uname() {
    Ok(info) => info.sysname().to_string_lossy().into_owned(),
    Err(errno) => {
        warn!(errno = ?errno, "uname failed, falling back to the compile time OS name");
        env::consts::OS.to_owned()
    }
});

/// platform tag in the shape pytest-benchmark uses for its storage directories
pub fn detect(runtime: &str) -> String {
    format!("{}-{runtime}-{}bit", *SYSTEM_NAME, usize::BITS)
}

/// Artifact subdirectory key: an explicit tag (command line or
/// `BENCHMARKS_PLATFORM`) wins over the config, which wins over detection.
pub fn resolve(explicit: Option<&str>, config: &StoreConfig) -> String {
    let platform = explicit
        .or(config.platform.as_deref())
        .map(str::to_owned)
        .unwrap_or_else(|| detect(&config.runtime));

    debug!(platform = platform.as_str(), "Resolved platform");

    platform
}
