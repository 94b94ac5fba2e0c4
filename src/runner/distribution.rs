//! Distribution selection: which engine build a run executes.

use std::env;
use std::path::{Path, PathBuf};

use url::Url;

use super::ConfigError;
use crate::engine::LAUNCHER_FILE_NAME;

/// The engine distribution a run executes. Exactly one variant is active per
/// run; a runner with no explicit distribution infers an installation at
/// invocation time instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Distribution {
    /// A released engine version, e.g. `"8.4"`.
    Version(String),
    /// A local installation root (the directory containing `bin/`).
    Installation(PathBuf),
    /// An arbitrary distribution URI.
    Uri(Url),
}

/// Return the explicit distribution unchanged, or infer an installation from
/// the harness's own runtime location.
pub(crate) fn resolve(explicit: Option<&Distribution>) -> Result<Distribution, ConfigError> {
    match explicit {
        Some(distribution) => Ok(distribution.clone()),
        None => infer_installation(),
    }
}

/// Walk up from the current executable looking for an installation root.
///
/// Inference failure is always fatal: it is never silently defaulted, and the
/// error names the inspected location when it can be determined.
fn infer_installation() -> Result<Distribution, ConfigError> {
    let exe = env::current_exe().ok();
    if let Some(exe) = &exe {
        for dir in exe.ancestors().skip(1) {
            if is_installation_root(dir) {
                tracing::debug!(root = %dir.display(), "inferred engine installation");
                return Ok(Distribution::Installation(dir.to_path_buf()));
            }
        }
    }
    let inspected = exe
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "an undeterminable location".to_string());
    Err(ConfigError::UnresolvedDistribution { inspected })
}

fn is_installation_root(dir: &Path) -> bool {
    dir.join("bin").join(LAUNCHER_FILE_NAME).is_file()
}
