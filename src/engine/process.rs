//! Production engine executor: spawns the Forge launcher as a subprocess.
//!
//! The launcher is resolved from the run's distribution, the build arguments
//! are passed argv-style, and runtime flags / injected classpath / debug
//! travel in the environment the engine understands (`FORGE_OPTS`,
//! `FORGE_PLUGIN_CLASSPATH`, `FORGE_DEBUG`). Stdout and stderr are pumped
//! concurrently into the configured sinks while the combined bytes are
//! captured for the result and for failure diagnostics.

use std::env;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;

use super::{
    EngineExecutor, ExecutionError, ExecutionParameters, LAUNCHER_FILE_NAME, RawRunResult,
    TaskOutcome, TaskStatus,
};
use crate::runner::distribution::Distribution;
use crate::runner::output::OutputSink;

/// Marker the engine prints in front of each task outcome line.
const TASK_LINE_PREFIX: &str = "> Task ";

/// Spawns one engine process per run and blocks until it exits.
#[derive(Debug, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the launcher binary for the run's distribution.
    ///
    /// Version distributions are expected in the state directory's
    /// `distributions/` cache; `file://` URIs name an installation root.
    /// Anything that would have to be downloaded is reported as an error -
    /// provisioning distributions is engine infrastructure, not harness work.
    fn launcher_path(parameters: &ExecutionParameters) -> Result<PathBuf, ExecutionError> {
        let install_root = match parameters.distribution() {
            Distribution::Installation(root) => root.clone(),
            Distribution::Version(version) => parameters
                .state_dir()
                .join("distributions")
                .join(format!("forge-{version}")),
            Distribution::Uri(uri) => uri
                .to_file_path()
                .map_err(|_| ExecutionError::UnsupportedUri(uri.clone()))?,
        };

        let launcher = install_root.join("bin").join(LAUNCHER_FILE_NAME);
        if !launcher.is_file() {
            return Err(ExecutionError::DistributionNotInstalled(install_root));
        }
        Ok(launcher)
    }
}

impl EngineExecutor for ProcessExecutor {
    #[tracing::instrument(skip_all, fields(project_dir = %parameters.project_dir().display()))]
    fn run(&self, parameters: ExecutionParameters) -> Result<RawRunResult, ExecutionError> {
        let launcher = Self::launcher_path(&parameters)?;

        let mut command = Command::new(&launcher);
        command
            .arg("--state-dir")
            .arg(parameters.state_dir())
            .args(parameters.arguments())
            .current_dir(parameters.project_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if !parameters.runtime_args().is_empty() {
            command.env("FORGE_OPTS", parameters.runtime_args().join(" "));
        }
        if !parameters.injected_classpath().is_empty() {
            command.env(
                "FORGE_PLUGIN_CLASSPATH",
                env::join_paths(parameters.injected_classpath())?,
            );
        }
        if parameters.is_debug() {
            command.env("FORGE_DEBUG", "true");
        }

        tracing::debug!(launcher = %launcher.display(), "spawning engine process");
        let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
            launcher: launcher.clone(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .expect("INVARIANT: stdout was configured as piped");
        let stderr = child
            .stderr
            .take()
            .expect("INVARIANT: stderr was configured as piped");

        let capture = Mutex::new(Vec::new());
        let (stdout_pump, stderr_pump, status) = thread::scope(|scope| {
            let out = scope.spawn(|| pump(stdout, &capture, parameters.stdout_sink()));
            let err = scope.spawn(|| pump(stderr, &capture, parameters.stderr_sink()));
            let status = child.wait();
            (join_pump(out), join_pump(err), status)
        });

        let status = status.map_err(ExecutionError::Wait)?;
        stdout_pump.map_err(ExecutionError::OutputCapture)?;
        stderr_pump.map_err(ExecutionError::OutputCapture)?;

        let bytes = capture
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let output = String::from_utf8_lossy(&bytes).into_owned();
        let tasks = parse_task_outcomes(&output);

        tracing::debug!(success = status.success(), tasks = tasks.len(), "engine process finished");
        Ok(RawRunResult {
            success: status.success(),
            output,
            tasks,
        })
    }
}

/// Copy one stream of the engine process into the capture buffer and, when
/// configured, the caller's sink.
fn pump(
    mut reader: impl Read,
    capture: &Mutex<Vec<u8>>,
    sink: Option<&OutputSink>,
) -> std::io::Result<()> {
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        capture
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend_from_slice(&buf[..n]);
        if let Some(sink) = sink {
            sink.write_bytes(&buf[..n])?;
        }
    }
}

fn join_pump(handle: thread::ScopedJoinHandle<'_, std::io::Result<()>>) -> std::io::Result<()> {
    handle
        .join()
        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
}

/// Scan combined output for `> Task <path> [STATUS]` lines.
///
/// A task line without a trailing status marker means the task ran and
/// succeeded; recognized markers map onto [`TaskStatus`] variants.
fn parse_task_outcomes(output: &str) -> Vec<TaskOutcome> {
    let mut tasks = Vec::new();
    for line in output.lines() {
        let Some(rest) = line.strip_prefix(TASK_LINE_PREFIX) else {
            continue;
        };
        let mut words = rest.split_whitespace();
        let Some(path) = words.next() else {
            continue;
        };
        let status = match words.next() {
            None => TaskStatus::Success,
            Some(marker) => match status_from_marker(marker) {
                Some(status) => status,
                // Not an outcome line after all (e.g. wrapped log text)
                None => continue,
            },
        };
        tasks.push(TaskOutcome::new(path, status));
    }
    tasks
}

fn status_from_marker(marker: &str) -> Option<TaskStatus> {
    match marker {
        "FAILED" => Some(TaskStatus::Failed),
        "UP-TO-DATE" => Some(TaskStatus::UpToDate),
        "SKIPPED" => Some(TaskStatus::Skipped),
        "FROM-CACHE" => Some(TaskStatus::FromCache),
        "NO-SOURCE" => Some(TaskStatus::NoSource),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_task_lines_with_and_without_markers() {
        let output = "\
> Task :compile
some compiler noise
> Task :test UP-TO-DATE
> Task :package FAILED
";
        let tasks = parse_task_outcomes(output);
        assert_eq!(
            tasks,
            vec![
                TaskOutcome::new(":compile", TaskStatus::Success),
                TaskOutcome::new(":test", TaskStatus::UpToDate),
                TaskOutcome::new(":package", TaskStatus::Failed),
            ]
        );
    }

    #[test]
    fn ignores_task_lines_with_unknown_trailing_words() {
        let tasks = parse_task_outcomes("> Task :compile took 3s\n");
        assert!(tasks.is_empty());
    }

    #[test]
    fn ignores_unrelated_output() {
        let tasks = parse_task_outcomes("BUILD SUCCESSFUL\n\nnothing to do\n");
        assert!(tasks.is_empty());
    }

    #[test]
    fn all_status_markers_are_recognized() {
        assert_eq!(status_from_marker("FAILED"), Some(TaskStatus::Failed));
        assert_eq!(status_from_marker("UP-TO-DATE"), Some(TaskStatus::UpToDate));
        assert_eq!(status_from_marker("SKIPPED"), Some(TaskStatus::Skipped));
        assert_eq!(status_from_marker("FROM-CACHE"), Some(TaskStatus::FromCache));
        assert_eq!(status_from_marker("NO-SOURCE"), Some(TaskStatus::NoSource));
        assert_eq!(status_from_marker("whatever"), None);
    }

    fn params_for(distribution: Distribution, state_dir: &std::path::Path) -> ExecutionParameters {
        ExecutionParameters::new(
            distribution,
            state_dir.to_path_buf(),
            PathBuf::from("/project"),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            false,
            None,
            None,
        )
    }

    fn fake_installation(root: &std::path::Path) -> PathBuf {
        let bin = root.join("bin");
        std::fs::create_dir_all(&bin).expect("create bin dir");
        let launcher = bin.join(LAUNCHER_FILE_NAME);
        std::fs::write(&launcher, "#!/bin/sh\n").expect("write launcher");
        launcher
    }

    #[test]
    fn launcher_resolves_from_an_installation_root() {
        let install = tempfile::tempdir().expect("temp dir");
        let launcher = fake_installation(install.path());

        let params = params_for(
            Distribution::Installation(install.path().to_path_buf()),
            std::path::Path::new("/state"),
        );
        assert_eq!(ProcessExecutor::launcher_path(&params).expect("launcher"), launcher);
    }

    #[test]
    fn version_distributions_come_from_the_state_dir_cache() {
        let state = tempfile::tempdir().expect("temp dir");
        let cached = state.path().join("distributions/forge-8.4");
        let launcher = fake_installation(&cached);

        let params = params_for(Distribution::Version("8.4".to_string()), state.path());
        assert_eq!(ProcessExecutor::launcher_path(&params).expect("launcher"), launcher);

        let params = params_for(Distribution::Version("9.0".to_string()), state.path());
        let err = ProcessExecutor::launcher_path(&params).expect_err("uncached version");
        assert!(matches!(err, ExecutionError::DistributionNotInstalled(_)));
    }

    #[test]
    fn remote_uris_are_rejected() {
        let uri = url::Url::parse("https://example.com/dist/forge-8.4.zip").expect("url");
        let params = params_for(Distribution::Uri(uri), std::path::Path::new("/state"));
        let err = ProcessExecutor::launcher_path(&params).expect_err("remote uri");
        assert!(matches!(err, ExecutionError::UnsupportedUri(_)));
    }

    #[test]
    fn file_uris_name_an_installation_root() {
        let install = tempfile::tempdir().expect("temp dir");
        let launcher = fake_installation(install.path());

        let uri = url::Url::from_directory_path(install.path()).expect("file url");
        let params = params_for(Distribution::Uri(uri), std::path::Path::new("/state"));
        assert_eq!(ProcessExecutor::launcher_path(&params).expect("launcher"), launcher);
    }

    #[cfg(unix)]
    #[test]
    fn runs_a_real_launcher_and_reports_the_outcome() {
        use std::os::unix::fs::PermissionsExt;

        let install = tempfile::tempdir().expect("temp dir");
        let launcher = fake_installation(install.path());
        std::fs::write(
            &launcher,
            "#!/bin/sh\necho \"> Task :compile\"\necho \"> Task :test UP-TO-DATE\"\necho 'warning: noisy' >&2\nexit 0\n",
        )
        .expect("write launcher script");
        std::fs::set_permissions(&launcher, std::fs::Permissions::from_mode(0o755))
            .expect("mark launcher executable");

        let project = tempfile::tempdir().expect("temp dir");
        let state = tempfile::tempdir().expect("temp dir");
        let params = ExecutionParameters::new(
            Distribution::Installation(install.path().to_path_buf()),
            state.path().to_path_buf(),
            project.path().to_path_buf(),
            vec!["check".to_string()],
            Vec::new(),
            Vec::new(),
            false,
            None,
            None,
        );

        let result = ProcessExecutor::new().run(params).expect("engine run");
        assert!(result.success);
        assert!(result.output.contains("> Task :compile"));
        assert!(result.output.contains("warning: noisy"));
        assert_eq!(
            result.tasks,
            vec![
                TaskOutcome::new(":compile", TaskStatus::Success),
                TaskOutcome::new(":test", TaskStatus::UpToDate),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn failing_launcher_reports_failure_with_output() {
        use std::os::unix::fs::PermissionsExt;

        let install = tempfile::tempdir().expect("temp dir");
        let launcher = fake_installation(install.path());
        std::fs::write(&launcher, "#!/bin/sh\necho 'error: broken build'\nexit 1\n")
            .expect("write launcher script");
        std::fs::set_permissions(&launcher, std::fs::Permissions::from_mode(0o755))
            .expect("mark launcher executable");

        let project = tempfile::tempdir().expect("temp dir");
        let state = tempfile::tempdir().expect("temp dir");
        let params = ExecutionParameters::new(
            Distribution::Installation(install.path().to_path_buf()),
            state.path().to_path_buf(),
            project.path().to_path_buf(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            false,
            None,
            None,
        );

        let result = ProcessExecutor::new().run(params).expect("engine run");
        assert!(!result.success);
        assert!(result.output.contains("error: broken build"));
    }
}
