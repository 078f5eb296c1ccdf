//! runpad: build-and-run engine for editor-embedded code execution
//!
//! Takes the text of a C, C++, Java, or Python program, materializes it in a
//! per-language workspace, invokes the locally installed toolchain, and runs
//! the result with captured output. Built for offline editors: no network,
//! no daemons, just the compilers already on the machine.
//!
//! # Architecture
//!
//! The pipeline is a straight line from source text to transcript:
//!
//! - [`lang`]: closed set of supported languages and their toolchain
//!   profiles (command templates, probe commands, runner shapes)
//! - [`workspace`]: per-language scratch directories and collision-free
//!   basenames for generated sources and artifacts
//! - [`exec`]: child-process capture with output byte caps, timeouts, and
//!   cooperative cancellation
//! - [`build`]: source snapshotting, compile/probe dispatch, and failure
//!   classification (compile error vs missing tool vs IO failure)
//! - [`run`]: artifact launch and display-transcript composition
//! - [`session`]: the state machine an editor embeds; every new compile
//!   supersedes the previous one
//! - [`cli`]: the `runpad` binary exposing the same pipeline to scripts
//!
//! # Guarantees
//!
//! 1. **Fail fast, touch nothing** - Empty input and unknown languages are
//!    rejected before any filesystem or process side effect
//! 2. **Failures are data** - A diagnostic from the compiler is a result,
//!    not an error; errors are reserved for misuse and launch failures
//! 3. **One live artifact** - Superseded builds are cancelled, their
//!    children killed, and their late results discarded by epoch
//! 4. **Programs may fail** - A non-zero exit from user code is a completed
//!    run, never a tool failure

// Language registry
pub mod lang;

// Workspace layout and naming
pub mod workspace;

// Child-process capture
pub mod exec;

// Build and run stages
pub mod build;
pub mod run;

// Editor-facing state machine
pub mod session;

// CLI entrypoint wiring for the runpad binary.
pub mod cli;

// Shared error type
pub mod error;

// Re-export commonly used types for convenience
pub use build::{BuildResult, BuildStatus, Builder, CompilationUnit, ExecutableRef};
pub use error::{PadError, Result};
pub use lang::{
    CommandTemplate, LanguageId, LanguageProfile, RunnerSpec, TemplateArg, ToolchainRegistry,
};
pub use run::{ExecutionResult, Runner};
pub use session::{Phase, Session};
pub use workspace::WorkspaceManager;
