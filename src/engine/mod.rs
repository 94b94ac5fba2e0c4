//! Engine execution contract
//!
//! This module defines the seam between the runner and the Forge engine:
//! an immutable parameter set assembled per invocation, the raw result the
//! engine reports back, and the single-method [`EngineExecutor`] trait that
//! separates engine invocation from runner orchestration.
//!
//! One production implementation exists ([`process::ProcessExecutor`]);
//! test suites substitute their own doubles to exercise the runner without
//! a real engine.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

use crate::runner::distribution::Distribution;
use crate::runner::output::OutputSink;

pub mod process;

/// File name of the engine launcher inside an installation's `bin/` directory.
#[cfg(not(windows))]
pub(crate) const LAUNCHER_FILE_NAME: &str = "forge";
#[cfg(windows)]
pub(crate) const LAUNCHER_FILE_NAME: &str = "forge.bat";

/// Errors reported by an engine executor.
///
/// These are infrastructure failures of the run itself, as opposed to a
/// build that ran and failed; they propagate to the caller unwrapped.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to launch engine process `{}`: {source}", launcher.display())]
    Spawn {
        launcher: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed while waiting for the engine process: {0}")]
    Wait(#[source] io::Error),

    #[error("failed to capture engine output: {0}")]
    OutputCapture(#[source] io::Error),

    #[error("engine distribution is not installed at `{}`", .0.display())]
    DistributionNotInstalled(PathBuf),

    #[error("unsupported distribution URI `{0}`: only file:// URIs can be launched directly")]
    UnsupportedUri(Url),

    #[error("injected classpath cannot be passed to the engine: {0}")]
    Classpath(#[from] std::env::JoinPathsError),
}

/// Immutable parameter set for exactly one engine run.
///
/// Constructed fresh by the runner per invocation; executors only read it.
#[derive(Debug)]
pub struct ExecutionParameters {
    distribution: Distribution,
    state_dir: PathBuf,
    project_dir: PathBuf,
    arguments: Vec<String>,
    runtime_args: Vec<String>,
    injected_classpath: Vec<PathBuf>,
    debug: bool,
    stdout_sink: Option<OutputSink>,
    stderr_sink: Option<OutputSink>,
}

impl ExecutionParameters {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        distribution: Distribution,
        state_dir: PathBuf,
        project_dir: PathBuf,
        arguments: Vec<String>,
        runtime_args: Vec<String>,
        injected_classpath: Vec<PathBuf>,
        debug: bool,
        stdout_sink: Option<OutputSink>,
        stderr_sink: Option<OutputSink>,
    ) -> Self {
        Self {
            distribution,
            state_dir,
            project_dir,
            arguments,
            runtime_args,
            injected_classpath,
            debug,
            stdout_sink,
            stderr_sink,
        }
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    /// Filesystem root the engine uses for caches and daemon state.
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Build arguments, in caller order.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Flags for the engine's host runtime, as opposed to the build itself.
    pub fn runtime_args(&self) -> &[String] {
        &self.runtime_args
    }

    /// Classpath entries injected into the build's classloading context.
    pub fn injected_classpath(&self) -> &[PathBuf] {
        &self.injected_classpath
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn stdout_sink(&self) -> Option<&OutputSink> {
        self.stdout_sink.as_ref()
    }

    pub fn stderr_sink(&self) -> Option<&OutputSink> {
        self.stderr_sink.as_ref()
    }
}

/// Raw payload of one engine run, before outcome verification.
#[derive(Debug, Clone)]
pub struct RawRunResult {
    /// Whether the engine reported the build as successful.
    pub success: bool,
    /// Combined textual output of the run.
    pub output: String,
    /// Per-task outcomes, in completion order.
    pub tasks: Vec<TaskOutcome>,
}

/// Outcome of a single task within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    path: String,
    status: TaskStatus,
}

impl TaskOutcome {
    pub fn new(path: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }
}

/// Status the engine reported for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Success,
    Failed,
    UpToDate,
    Skipped,
    FromCache,
    NoSource,
}

/// The engine execution contract.
///
/// One synchronous call per run: the executor receives the assembled
/// parameters, drives the engine to completion, and reports the raw result.
/// The runner imposes no protocol beyond the parameter and result shapes.
pub trait EngineExecutor {
    fn run(&self, parameters: ExecutionParameters) -> Result<RawRunResult, ExecutionError>;
}
