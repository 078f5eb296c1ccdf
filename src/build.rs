//! The build stage: write source text into the workspace and drive the
//! language's compile step (or interpreter probe) to a classified result.

use crate::error::{PadError, Result};
use crate::exec::{self, CapturedOutput, ExecRequest, ExitKind};
use crate::lang::{LanguageId, RunnerSpec, ToolchainRegistry};
use crate::workspace::WorkspaceManager;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default bound on a single compile step. A toolchain that runs longer is
/// killed and the attempt reported as failed.
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Terminal classification of one build attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    /// Toolchain accepted the source; an artifact is ready to run.
    #[serde(rename = "success")]
    Success,
    /// Toolchain ran and rejected the source (or was killed on timeout).
    #[serde(rename = "compile_failed")]
    CompileFailed,
    /// Compiler or interpreter executable is absent from the system.
    #[serde(rename = "tool_missing")]
    ToolMissing,
    /// Workspace or process launch failed below the toolchain level.
    #[serde(rename = "io_failed")]
    IoFailed,
}

/// Reference to a runnable artifact produced by a successful build.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ExecutableRef {
    /// Compiled native binary.
    #[serde(rename = "native")]
    Native { path: PathBuf },
    /// Class name resolved against a classpath directory.
    #[serde(rename = "jvm_class")]
    JvmClass {
        class_name: String,
        classpath: PathBuf,
    },
    /// Interpreter command applied to the source file itself.
    #[serde(rename = "interpreted")]
    Interpreted {
        interpreter: String,
        script: PathBuf,
    },
}

impl ExecutableRef {
    /// Argv that launches the artifact.
    pub fn argv(&self) -> Vec<String> {
        match self {
            ExecutableRef::Native { path } => vec![path.to_string_lossy().to_string()],
            ExecutableRef::JvmClass {
                class_name,
                classpath,
            } => vec![
                "java".to_string(),
                "-cp".to_string(),
                classpath.to_string_lossy().to_string(),
                class_name.clone(),
            ],
            ExecutableRef::Interpreted {
                interpreter,
                script,
            } => vec![interpreter.clone(), script.to_string_lossy().to_string()],
        }
    }
}

/// One edit-compile-run cycle, created fresh for every compile request and
/// immutable from the moment the build starts.
///
/// All paths and command lines are resolved at creation, so a unit can be
/// handed to a worker thread without consulting the registry again.
#[derive(Clone, Debug)]
pub struct CompilationUnit {
    pub language: LanguageId,
    /// Snapshot of the editor text this unit was built from.
    pub source_text: String,
    /// Process-unique basename; doubles as the Java class name.
    pub basename: String,
    pub source_path: PathBuf,
    pub artifact_path: PathBuf,
    /// The language's workspace directory, also the run cwd.
    pub workdir: PathBuf,
    /// Rendered compile argv; `None` for interpreted languages.
    pub compile_argv: Option<Vec<String>>,
    /// Toolchain presence probe argv.
    pub probe_argv: Vec<String>,
    /// Launch rule for the artifact.
    pub runner: RunnerSpec,
}

impl CompilationUnit {
    /// The artifact reference a successful build of this unit yields.
    pub fn executable_ref(&self) -> ExecutableRef {
        match &self.runner {
            RunnerSpec::NativeBinary => ExecutableRef::Native {
                path: self.artifact_path.clone(),
            },
            RunnerSpec::JvmClass => ExecutableRef::JvmClass {
                class_name: self.basename.clone(),
                classpath: self.workdir.clone(),
            },
            RunnerSpec::Interpreter { command } => ExecutableRef::Interpreted {
                interpreter: command.clone(),
                script: self.source_path.clone(),
            },
        }
    }
}

/// Outcome of one build attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildResult {
    pub status: BuildStatus,
    /// Captured compiler stderr, missing-tool message, or system error.
    /// On success this holds any compiler warnings.
    pub diagnostic: String,
    /// Present exactly when `status` is [`BuildStatus::Success`].
    pub executable: Option<ExecutableRef>,
    pub wall_time_ms: u64,
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Success
    }

    fn failed(status: BuildStatus, diagnostic: String, started: Instant) -> Self {
        Self {
            status,
            diagnostic,
            executable: None,
            wall_time_ms: elapsed_ms(started),
        }
    }
}

/// Writes source files and drives compile/probe commands to a
/// [`BuildResult`].
#[derive(Clone)]
pub struct Builder {
    registry: Arc<ToolchainRegistry>,
    workspace: WorkspaceManager,
    /// Wall-clock bound applied to compile and probe commands.
    pub compile_timeout: Duration,
}

impl Builder {
    pub fn new(registry: Arc<ToolchainRegistry>, workspace: WorkspaceManager) -> Self {
        Self {
            registry,
            workspace,
            compile_timeout: DEFAULT_COMPILE_TIMEOUT,
        }
    }

    /// Validate the input and write it to a fresh workspace file.
    ///
    /// Empty (or whitespace-only) source fails fast with
    /// [`PadError::EmptyInput`] before any filesystem work. Filesystem
    /// failures surface as [`PadError::Io`]; the session layer folds them
    /// into an [`BuildStatus::IoFailed`] result.
    pub fn prepare(&self, language: LanguageId, source_text: &str) -> Result<CompilationUnit> {
        if source_text.trim().is_empty() {
            return Err(PadError::EmptyInput);
        }
        let profile = self.registry.lookup(language)?;

        let workdir = self.workspace.ensure_directory(language)?;
        let basename = self.workspace.new_unique_basename();
        let source_path = self
            .workspace
            .source_path(language, &basename, &profile.extension);
        let artifact_path = match &profile.runner {
            RunnerSpec::NativeBinary => self.workspace.native_artifact_path(language, &basename),
            RunnerSpec::JvmClass => self.workspace.class_artifact_path(language, &basename),
            RunnerSpec::Interpreter { .. } => source_path.clone(),
        };

        fs::write(&source_path, source_text).map_err(|e| {
            PadError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "failed to write source file {}: {}",
                    source_path.display(),
                    e
                ),
            ))
        })?;
        debug!(
            "wrote {} bytes of {} source to {}",
            source_text.len(),
            language,
            source_path.display()
        );

        let compile_argv = profile
            .compile
            .as_ref()
            .map(|template| template.render(&source_path, &artifact_path));

        Ok(CompilationUnit {
            language,
            source_text: source_text.to_string(),
            basename,
            source_path,
            artifact_path,
            workdir,
            compile_argv,
            probe_argv: profile.probe.clone(),
            runner: profile.runner.clone(),
        })
    }

    /// Run the unit's compile step, or its interpreter probe when the
    /// language has none, and classify the outcome.
    pub fn build(&self, unit: &CompilationUnit, cancel: Option<Arc<AtomicBool>>) -> BuildResult {
        let started = Instant::now();
        let result = match &unit.compile_argv {
            Some(argv) => self.run_compile(unit, argv, cancel, started),
            None => self.run_probe(unit, cancel, started),
        };
        info!(
            "build of {} unit {} -> {:?} in {}ms",
            unit.language, unit.basename, result.status, result.wall_time_ms
        );
        result
    }

    fn run_compile(
        &self,
        unit: &CompilationUnit,
        argv: &[String],
        cancel: Option<Arc<AtomicBool>>,
        started: Instant,
    ) -> BuildResult {
        let tool = argv.first().cloned().unwrap_or_default();
        let mut req = ExecRequest::new(argv.to_vec());
        req.cwd = Some(unit.workdir.clone());
        req.timeout = Some(self.compile_timeout);
        req.cancel = cancel;

        let captured = match exec::run_captured(req) {
            Ok(captured) => captured,
            Err(e) => return spawn_failure(&tool, &e, started),
        };

        match captured.outcome {
            ExitKind::TimedOut => {
                let mut diagnostic = format!(
                    "compiler did not finish within {:?} and was killed",
                    self.compile_timeout
                );
                if !captured.stderr.trim().is_empty() {
                    diagnostic.push('\n');
                    diagnostic.push_str(&captured.stderr);
                }
                BuildResult::failed(BuildStatus::CompileFailed, diagnostic, started)
            }
            ExitKind::Cancelled => BuildResult::failed(
                BuildStatus::CompileFailed,
                "compilation cancelled".to_string(),
                started,
            ),
            ExitKind::Exited if captured.exit_code == Some(0) => BuildResult {
                status: BuildStatus::Success,
                diagnostic: captured.stderr,
                executable: Some(unit.executable_ref()),
                wall_time_ms: elapsed_ms(started),
            },
            ExitKind::Exited => BuildResult::failed(
                BuildStatus::CompileFailed,
                compile_diagnostic(&captured),
                started,
            ),
        }
    }

    fn run_probe(
        &self,
        unit: &CompilationUnit,
        cancel: Option<Arc<AtomicBool>>,
        started: Instant,
    ) -> BuildResult {
        let tool = unit.probe_argv.first().cloned().unwrap_or_default();
        let mut req = ExecRequest::new(unit.probe_argv.clone());
        req.timeout = Some(self.compile_timeout);
        req.cancel = cancel;

        let captured = match exec::run_captured(req) {
            Ok(captured) => captured,
            Err(e) => return spawn_failure(&tool, &e, started),
        };

        match captured.outcome {
            ExitKind::Exited if captured.exit_code == Some(0) => BuildResult {
                status: BuildStatus::Success,
                diagnostic: String::new(),
                executable: Some(unit.executable_ref()),
                wall_time_ms: elapsed_ms(started),
            },
            ExitKind::Exited => BuildResult::failed(
                BuildStatus::ToolMissing,
                format!("{} failed its version probe: {}", tool, compile_diagnostic(&captured)),
                started,
            ),
            _ => BuildResult::failed(
                BuildStatus::ToolMissing,
                format!("{} did not respond to a version probe", tool),
                started,
            ),
        }
    }
}

/// Classify a failure to launch the toolchain process at all.
fn spawn_failure(tool: &str, e: &std::io::Error, started: Instant) -> BuildResult {
    if e.kind() == std::io::ErrorKind::NotFound {
        BuildResult::failed(
            BuildStatus::ToolMissing,
            format!("{} not found on this system", tool),
            started,
        )
    } else {
        BuildResult::failed(
            BuildStatus::IoFailed,
            format!("failed to launch {}: {}", tool, e),
            started,
        )
    }
}

/// Best available diagnostic text: stderr, then stdout, then the exit
/// description.
fn compile_diagnostic(captured: &CapturedOutput) -> String {
    if !captured.stderr.trim().is_empty() {
        captured.stderr.clone()
    } else if !captured.stdout.trim().is_empty() {
        captured.stdout.clone()
    } else {
        match (captured.exit_code, captured.signal) {
            (Some(code), _) => format!("compiler exited with status {}", code),
            (None, Some(signal)) => format!("compiler terminated by signal {}", signal),
            (None, None) => "compiler terminated abnormally".to_string(),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
