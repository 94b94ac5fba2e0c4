#![forbid(unsafe_code)]
//! Forgekit: an isolated build-execution harness for the Forge build engine.
//!
//! Forgekit lets a test suite configure, launch, and verify a single run of
//! the engine against a project directory. The runner owns the mutable
//! configuration (distribution, state directory, arguments, injected
//! classpath, output routing); each terminal operation snapshots it into an
//! immutable parameter set, hands that to the engine execution contract, and
//! grades the outcome against the caller's expectation.
//!
//! ## Modules
//!
//! - `runner` - the [`ForgeRunner`] builder, outcome verification, and the
//!   distribution / state-directory / output-routing pieces it is built from
//! - `engine` - the [`EngineExecutor`] contract plus the production process
//!   executor
//! - `metadata` - the plugin-under-test metadata file: generated at build
//!   time, resolved at harness-configuration time
//!
//! ## Panic Policy
//!
//! Production code uses `Result` with `?` / `ok_or` / `map_err`; the `runner`
//! module enforces `#![deny(clippy::unwrap_used)]`. A bare `.expect(...)` is
//! reserved for true invariants and carries an `INVARIANT:` explanation.
//! Test code may unwrap freely.

pub mod engine;
pub mod metadata;
pub mod runner;

pub use engine::process::ProcessExecutor;
pub use engine::{
    EngineExecutor, ExecutionError, ExecutionParameters, RawRunResult, TaskOutcome, TaskStatus,
};
pub use metadata::{
    IMPLEMENTATION_CLASSPATH_KEY, METADATA_FILE_NAME, MetadataError, find_plugin_metadata,
    read_plugin_metadata, write_plugin_metadata,
};
pub use runner::distribution::Distribution;
pub use runner::output::OutputSink;
pub use runner::{BuildError, BuildResult, ConfigError, EnvSettings, ForgeRunner};
