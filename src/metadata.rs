//! Plugin-under-test metadata: the manifest bridging build-time packaging and
//! test-time harness configuration.
//!
//! The generator side ([`write_plugin_metadata`]) runs during build packaging
//! and serializes the resolved runtime classpath of the code under test into a
//! properties-style file. The resolver side ([`read_plugin_metadata`] /
//! [`find_plugin_metadata`]) runs when a runner is configured with
//! `with_detected_plugin_classpath` and turns that file back into an ordered
//! path list.
//!
//! The file is reproducible by construction: no timestamp or comment lines
//! are ever written, so identical classpath input yields byte-identical
//! output. An empty classpath is represented by omitting the key entirely -
//! a present-but-empty value is rejected by the resolver.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Fixed name of the metadata file, on both the producer and consumer side.
pub const METADATA_FILE_NAME: &str = "plugin-under-test-metadata.properties";

/// The single property key the harness recognizes.
pub const IMPLEMENTATION_CLASSPATH_KEY: &str = "implementation-classpath";

/// Errors raised while resolving the plugin classpath from the metadata file.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("test runtime does not provide the plugin metadata file `{}`", METADATA_FILE_NAME)]
    ManifestNotFound,

    #[error("plugin metadata file `{path}` could not be read: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "plugin metadata file `{path}` does not contain expected property `{}`",
        IMPLEMENTATION_CLASSPATH_KEY
    )]
    MissingKey { path: PathBuf },

    #[error(
        "plugin metadata file `{path}` has an empty value for property `{}`",
        IMPLEMENTATION_CLASSPATH_KEY
    )]
    EmptyValue { path: PathBuf },
}

/// Write the metadata file for the given classpath into `output_dir`,
/// overwriting any existing file. Returns the path of the written file.
///
/// Entries have their separators normalized to `/` and are joined with the
/// platform PATH separator. An empty `classpath` produces a file with no
/// classpath key at all, never a key with an empty value.
pub fn write_plugin_metadata(classpath: &[PathBuf], output_dir: &Path) -> io::Result<PathBuf> {
    let mut contents = String::new();
    if !classpath.is_empty() {
        contents.push_str(IMPLEMENTATION_CLASSPATH_KEY);
        contents.push('=');
        contents.push_str(&join_classpath(classpath)?);
        contents.push('\n');
    }

    let target = output_dir.join(METADATA_FILE_NAME);
    fs::write(&target, contents).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("failed to write plugin metadata file `{}`: {}", target.display(), e),
        )
    })?;
    Ok(target)
}

/// Join classpath entries with the platform PATH separator, normalizing
/// backslashes to forward slashes first.
fn join_classpath(entries: &[PathBuf]) -> io::Result<String> {
    let normalized = entries
        .iter()
        .map(|entry| entry.to_string_lossy().replace('\\', "/"));
    let joined = env::join_paths(normalized).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("classpath entry cannot be stored in the metadata file: {}", e),
        )
    })?;
    Ok(joined.to_string_lossy().into_owned())
}

/// Read the classpath from the metadata file at `path`.
///
/// Re-reads the file on every call; nothing is cached. Fails if the file is
/// unreadable, the classpath key is absent, or its value is empty after
/// trimming.
pub fn read_plugin_metadata(path: &Path) -> Result<Vec<PathBuf>, MetadataError> {
    let text = fs::read_to_string(path).map_err(|source| MetadataError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let Some(value) = classpath_value(&text) else {
        return Err(MetadataError::MissingKey {
            path: path.to_path_buf(),
        });
    };

    let value = value.trim();
    if value.is_empty() {
        return Err(MetadataError::EmptyValue {
            path: path.to_path_buf(),
        });
    }

    Ok(env::split_paths(value).collect())
}

/// Locate the metadata file the way a test runtime would see it, then read it.
///
/// The search covers the directory of the current executable and each of its
/// ancestors (test binaries live under `target/`, where a packaging step
/// drops the file next to them), then the working directory.
pub fn find_plugin_metadata() -> Result<Vec<PathBuf>, MetadataError> {
    let Some(path) = locate_metadata_file() else {
        return Err(MetadataError::ManifestNotFound);
    };
    read_plugin_metadata(&path)
}

fn locate_metadata_file() -> Option<PathBuf> {
    if let Ok(exe) = env::current_exe() {
        for dir in exe.ancestors().skip(1) {
            let candidate = dir.join(METADATA_FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    let candidate = env::current_dir().ok()?.join(METADATA_FILE_NAME);
    candidate.is_file().then_some(candidate)
}

/// Extract the raw classpath value from properties-style text.
///
/// Only the subset the generator emits is interpreted: `key=value` lines,
/// with `#`/`!` comment lines and blank lines skipped.
fn classpath_value(text: &str) -> Option<&str> {
    for line in text.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == IMPLEMENTATION_CLASSPATH_KEY {
                return Some(value);
            }
        }
    }
    None
}
