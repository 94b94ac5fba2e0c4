//! Build runner: configure, launch, and verify one engine run.
//!
//! ## Shape
//!
//! [`ForgeRunner`] is a fluent builder over one run's configuration. The two
//! terminal operations, [`ForgeRunner::build`] and
//! [`ForgeRunner::build_and_fail`], snapshot that configuration into an
//! immutable [`ExecutionParameters`](crate::engine::ExecutionParameters),
//! delegate to the engine execution contract exactly once, and grade the raw
//! result against the caller's expectation. A violated expectation raises a
//! [`BuildError`] carrying the full diagnostics message and the structured
//! result of the run, so the failed run stays inspectable.
//!
//! ## Modules
//!
//! - `distribution` - which engine build to execute
//! - `state_dir` - the isolated filesystem root for engine caches
//! - `output` - thread-safe routing of the run's stdout/stderr
//!
//! ## Design
//!
//! Configuration setters consume and return the runner; nothing is validated
//! until a terminal operation runs, and every validation failure is a typed
//! error raised before the engine is invoked.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod distribution;
pub mod output;
pub(crate) mod state_dir;

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

use crate::engine::process::ProcessExecutor;
use crate::engine::{EngineExecutor, ExecutionError, ExecutionParameters, RawRunResult, TaskOutcome, TaskStatus};
use crate::metadata::{self, MetadataError};
use distribution::Distribution;
use output::OutputSink;
use state_dir::StateDirProvider;

/// Environment variable forcing a fixed state directory onto every runner
/// that did not receive an explicit one.
pub const STATE_DIR_ENV_VAR: &str = "FORGEKIT_DIR";

/// Environment variable seeding the default debug flag.
pub const DEBUG_ENV_VAR: &str = "FORGEKIT_DEBUG";

// ============================================================================
// Errors
// ============================================================================

/// Missing or invalid harness setup. Always fatal, never retried, and always
/// raised before any engine run is attempted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("a project directory must be specified before running a build")]
    MissingProjectDir,

    #[error("unable to use non-directory as state directory: {}", .0.display())]
    StateDirNotADirectory(PathBuf),

    #[error("unable to write to state directory: {}", .0.display())]
    StateDirNotWritable(PathBuf),

    #[error("unable to create state directory `{}`: {source}", path.display())]
    StateDirCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "could not find a Forge installation based on the location of the harness executable \
         ({inspected}); select a distribution explicitly with `with_version`, \
         `with_installation`, or `with_distribution_uri`"
    )]
    UnresolvedDistribution { inspected: String },
}

/// Failure of a terminal runner operation.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// The build was expected to succeed but the engine reported failure.
    /// `result` exposes the output and task outcomes of the failed run.
    #[error("{message}")]
    UnexpectedFailure { message: String, result: BuildResult },

    /// The build was expected to fail but the engine reported success.
    #[error("{message}")]
    UnexpectedSuccess { message: String, result: BuildResult },
}

// ============================================================================
// Environment settings
// ============================================================================

/// Process-wide switches, read once and injected into the runner so tests
/// can substitute them deterministically.
#[derive(Debug, Clone, Default)]
pub struct EnvSettings {
    /// Default debug flag for new runners.
    pub debug: bool,
    /// When set, new runners without an explicit state directory use this
    /// fixed path instead of a temporary one.
    pub state_dir_override: Option<PathBuf>,
}

impl EnvSettings {
    /// Read the switches from the process environment.
    pub fn from_env() -> Self {
        let debug = env::var(DEBUG_ENV_VAR)
            .is_ok_and(|value| value == "1" || value.eq_ignore_ascii_case("true"));
        let state_dir_override = env::var_os(STATE_DIR_ENV_VAR).map(PathBuf::from);
        Self {
            debug,
            state_dir_override,
        }
    }
}

// ============================================================================
// Structured result
// ============================================================================

/// Contract-verified result of one engine run.
///
/// Constructed only after outcome verification, so it exposes the run's
/// output and task outcomes but not the raw success flag.
#[derive(Debug, Clone)]
pub struct BuildResult {
    output: String,
    tasks: Vec<TaskOutcome>,
}

impl BuildResult {
    fn from_raw(raw: RawRunResult) -> Self {
        Self {
            output: raw.output,
            tasks: raw.tasks,
        }
    }

    /// Combined textual output of the run.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// All task outcomes, in completion order.
    pub fn tasks(&self) -> &[TaskOutcome] {
        &self.tasks
    }

    /// The outcome of the task with the given path, if it was part of the run.
    pub fn task(&self, path: &str) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|task| task.path() == path)
    }

    /// All task outcomes with the given status, in completion order.
    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<&TaskOutcome> {
        self.tasks.iter().filter(|task| task.status() == status).collect()
    }

    /// Paths of all tasks with the given status, in completion order.
    pub fn task_paths(&self, status: TaskStatus) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|task| task.status() == status)
            .map(TaskOutcome::path)
            .collect()
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Configures and executes builds against the Forge engine.
pub struct ForgeRunner {
    executor: Box<dyn EngineExecutor>,
    distribution: Option<Distribution>,
    state_dir: StateDirProvider,
    project_dir: Option<PathBuf>,
    arguments: Vec<String>,
    runtime_args: Vec<String>,
    classpath: Vec<PathBuf>,
    debug: bool,
    stdout_sink: Option<OutputSink>,
    stderr_sink: Option<OutputSink>,
    forwarding_process_streams: bool,
}

impl ForgeRunner {
    /// A runner with the production process executor and switches read from
    /// the process environment.
    pub fn create() -> Self {
        Self::with_executor(Box::new(ProcessExecutor::new()), EnvSettings::from_env())
    }

    /// A runner with a caller-supplied executor and settings. This is the
    /// seam test suites use to substitute an engine double.
    pub fn with_executor(executor: Box<dyn EngineExecutor>, settings: EnvSettings) -> Self {
        let state_dir = match settings.state_dir_override {
            Some(path) => StateDirProvider::fixed(path),
            None => StateDirProvider::temporary(),
        };
        Self {
            executor,
            distribution: None,
            state_dir,
            project_dir: None,
            arguments: Vec::new(),
            runtime_args: Vec::new(),
            classpath: Vec::new(),
            debug: settings.debug,
            stdout_sink: None,
            stderr_sink: None,
            forwarding_process_streams: false,
        }
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Directory of the project to build. Required before any terminal
    /// operation; stored in absolute form.
    pub fn with_project_dir(mut self, project_dir: impl AsRef<Path>) -> Self {
        self.project_dir = Some(absolute_path(project_dir.as_ref()));
        self
    }

    /// Build arguments, replacing any previously configured list.
    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    /// Flags for the engine's host runtime, as opposed to the build itself.
    pub fn with_runtime_args<I, S>(mut self, runtime_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runtime_args = runtime_args.into_iter().map(Into::into).collect();
        self
    }

    /// Execute the build with the given released engine version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.distribution = Some(Distribution::Version(version.into()));
        self
    }

    /// Execute the build with the engine installation at the given root.
    pub fn with_installation(mut self, installation: impl AsRef<Path>) -> Self {
        self.distribution = Some(Distribution::Installation(installation.as_ref().to_path_buf()));
        self
    }

    /// Execute the build with the distribution at the given URI.
    pub fn with_distribution_uri(mut self, uri: Url) -> Self {
        self.distribution = Some(Distribution::Uri(uri));
        self
    }

    /// Use a fixed state directory instead of a temporary one.
    pub fn with_state_dir(mut self, state_dir: impl AsRef<Path>) -> Self {
        self.state_dir = StateDirProvider::fixed(state_dir.as_ref().to_path_buf());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Inject the given classpath entries into the executed build's
    /// classloading context.
    ///
    /// Entries are made absolute here so an engine process with a different
    /// working directory still resolves them. An empty collection leaves the
    /// configured classpath unchanged.
    pub fn with_plugin_classpath<I, P>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let entries: Vec<PathBuf> = entries
            .into_iter()
            .map(|entry| absolute_path(entry.as_ref()))
            .collect();
        if !entries.is_empty() {
            self.classpath = entries;
        }
        self
    }

    /// Inject the classpath recorded in the plugin-under-test metadata file
    /// on the test runtime.
    pub fn with_detected_plugin_classpath(mut self) -> Result<Self, MetadataError> {
        self.classpath = metadata::find_plugin_metadata()?;
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Output routing (modes are mutually exclusive, last set wins)
    // ------------------------------------------------------------------

    /// Capture the run's standard output into the given writer. Disables
    /// combined forwarding if it was active.
    pub fn forward_stdout(mut self, writer: impl Write + Send + 'static) -> Self {
        if self.forwarding_process_streams {
            self.forwarding_process_streams = false;
            self.stderr_sink = None;
        }
        self.stdout_sink = Some(OutputSink::new(writer));
        self
    }

    /// Capture the run's standard error into the given writer. Disables
    /// combined forwarding if it was active.
    pub fn forward_stderr(mut self, writer: impl Write + Send + 'static) -> Self {
        if self.forwarding_process_streams {
            self.forwarding_process_streams = false;
            self.stdout_sink = None;
        }
        self.stderr_sink = Some(OutputSink::new(writer));
        self
    }

    /// Forward both of the run's streams to this process's own standard
    /// output, through one shared thread-safe sink. Clears any separate
    /// sinks configured earlier.
    pub fn forward_output(mut self) -> Self {
        self.forwarding_process_streams = true;
        let shared = OutputSink::process_stdout();
        self.stdout_sink = Some(shared.clone());
        self.stderr_sink = Some(shared);
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn project_dir(&self) -> Option<&Path> {
        self.project_dir.as_deref()
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn plugin_classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    // ------------------------------------------------------------------
    // Terminal operations
    // ------------------------------------------------------------------

    /// Run the build, expecting it to succeed.
    ///
    /// A failed build raises [`BuildError::UnexpectedFailure`] whose message
    /// carries the project directory, the arguments, and the captured output,
    /// and whose result still exposes the failed run.
    pub fn build(&self) -> Result<BuildResult, BuildError> {
        let raw = self.run_build()?;
        if !raw.success {
            let message =
                self.diagnostics_message("Unexpected build execution failure", &raw.output);
            return Err(BuildError::UnexpectedFailure {
                message,
                result: BuildResult::from_raw(raw),
            });
        }
        Ok(BuildResult::from_raw(raw))
    }

    /// Run the build, expecting it to fail.
    ///
    /// A successful build raises [`BuildError::UnexpectedSuccess`] with the
    /// same diagnostics shape as [`ForgeRunner::build`].
    pub fn build_and_fail(&self) -> Result<BuildResult, BuildError> {
        let raw = self.run_build()?;
        if raw.success {
            let message =
                self.diagnostics_message("Unexpected build execution success", &raw.output);
            return Err(BuildError::UnexpectedSuccess {
                message,
                result: BuildResult::from_raw(raw),
            });
        }
        Ok(BuildResult::from_raw(raw))
    }

    /// Validate configuration, assemble the immutable parameter set, and
    /// delegate to the engine exactly once. No retry: one call is one run.
    #[tracing::instrument(skip_all)]
    fn run_build(&self) -> Result<RawRunResult, BuildError> {
        let project_dir = self
            .project_dir
            .clone()
            .ok_or(ConfigError::MissingProjectDir)?;
        let distribution = distribution::resolve(self.distribution.as_ref())?;
        let state_dir = self.state_dir.dir()?;

        tracing::debug!(
            project_dir = %project_dir.display(),
            state_dir = %state_dir.display(),
            distribution = ?distribution,
            args = ?self.arguments,
            "launching engine build"
        );

        let parameters = ExecutionParameters::new(
            distribution,
            state_dir,
            project_dir,
            self.arguments.clone(),
            self.runtime_args.clone(),
            self.classpath.clone(),
            self.debug,
            self.stdout_sink.clone(),
            self.stderr_sink.clone(),
        );

        let raw = self.executor.run(parameters)?;
        tracing::debug!(success = raw.success, tasks = raw.tasks.len(), "engine run finished");
        Ok(raw)
    }

    /// Diagnostics message for a violated outcome expectation: a pure
    /// function of the lead-in, the project directory, the arguments, and
    /// the captured output.
    fn diagnostics_message(&self, lead_in: &str, output: &str) -> String {
        let project_dir = self.project_dir.as_deref().unwrap_or(Path::new(""));
        let mut message = format!(
            "{} in {} with arguments {:?}",
            lead_in,
            project_dir.display(),
            self.arguments
        );
        if !output.is_empty() {
            message.push_str("\n\nOutput:\n");
            message.push_str(output);
        }
        message
    }
}

/// Absolute form of `path`, resolved against the working directory without
/// touching the filesystem.
fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

// ============================================================================
// Tests
// ============================================================================
