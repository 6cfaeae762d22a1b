//! Harness configuration.
//!
//! Settings come from the environment and may be overridden by the command
//! line:
//! - `ALLOCSWEEP_REPLAY`: `on` (default) re-runs every test that had an
//!   allocation refused under the raising allocator; `off` skips the replay.
//! - `ALLOCSWEEP_FILTER`: only run tests whose name contains this substring.
//! - `ALLOCSWEEP_LOG`: write a JSONL structured log of the run to this path.
//!
//! The scratch directory handed to test bodies is the directory the
//! executable was invoked from.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const ENV_REPLAY: &str = "ALLOCSWEEP_REPLAY";
pub const ENV_FILTER: &str = "ALLOCSWEEP_FILTER";
pub const ENV_LOG: &str = "ALLOCSWEEP_LOG";

static SCRATCH_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Whether tests that triggered a fault are replayed with the raising allocator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplayPolicy {
    #[default]
    Raising,
    Off,
}

impl ReplayPolicy {
    /// Parse from string (case-insensitive). Unknown values keep the default.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" | "false" | "no" | "none" => Self::Off,
            _ => Self::Raising,
        }
    }

    #[must_use]
    pub const fn replays(self) -> bool {
        matches!(self, Self::Raising)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HarnessConfig {
    pub replay: ReplayPolicy,
    pub filter: Option<String>,
    pub log_path: Option<PathBuf>,
    pub scratch_dir: PathBuf,
}

impl HarnessConfig {
    /// Read the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            replay: non_empty(ENV_REPLAY)
                .map(|value| ReplayPolicy::from_str_loose(&value))
                .unwrap_or_default(),
            filter: non_empty(ENV_FILTER),
            log_path: non_empty(ENV_LOG).map(PathBuf::from),
            scratch_dir: PathBuf::new(),
        }
    }

    /// Whether a test with this name is selected by the filter.
    #[must_use]
    pub fn selects(&self, name: &str) -> bool {
        self.filter
            .as_deref()
            .is_none_or(|filter| name.contains(filter))
    }
}

/// Directory portion of the invoking path, empty when it has none.
#[must_use]
pub fn scratch_dir_from_invocation(argv0: &OsStr) -> PathBuf {
    Path::new(argv0)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// Publish the scratch directory to test bodies. Only the first call wins.
pub fn set_scratch_dir(dir: PathBuf) {
    let _ = SCRATCH_DIR.set(dir);
}

/// Directory test bodies may use for temporary files.
#[must_use]
pub fn scratch_dir() -> &'static Path {
    SCRATCH_DIR.get().map_or(Path::new(""), PathBuf::as_path)
}
