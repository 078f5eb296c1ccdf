//! Session state machine sequencing build and run stages.
//!
//! A session owns the current [`CompilationUnit`] lineage for one editor
//! context. Compile and run execute on background worker threads reporting
//! over a channel; [`Session::poll`] folds finished work back into the
//! session state. Every compile supersedes the one before it: the stale
//! worker's child is killed and its late events are fenced off by an epoch
//! counter, so at most one build artifact is ever live.

use crate::build::{BuildResult, BuildStatus, Builder, CompilationUnit};
use crate::error::{PadError, Result};
use crate::lang::{LanguageId, ToolchainRegistry};
use crate::run::{ExecutionResult, Runner};
use crate::workspace::WorkspaceManager;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// UI-facing lifecycle phase of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// No build attempted since creation, reset, or language switch.
    #[serde(rename = "idle")]
    Idle,
    /// Source snapshot written; compile about to start.
    #[serde(rename = "source_written")]
    SourceWritten,
    /// Compile or probe in flight.
    #[serde(rename = "compiling")]
    Compiling,
    #[serde(rename = "compile_failed")]
    CompileFailed,
    #[serde(rename = "tool_missing")]
    ToolMissing,
    #[serde(rename = "io_failed")]
    IoFailed,
    /// Build succeeded; run is enabled.
    #[serde(rename = "compiled_ready")]
    CompiledReady,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "run_completed")]
    RunCompleted,
    /// The artifact could not be launched; re-run and re-compile both stay
    /// available.
    #[serde(rename = "run_error")]
    RunError,
}

/// Completion notices from worker threads, tagged with the epoch of the
/// unit they belong to.
enum SessionEvent {
    BuildFinished {
        epoch: u64,
        result: BuildResult,
    },
    RunFinished {
        epoch: u64,
        result: Result<ExecutionResult>,
    },
}

/// A worker thread and the handle needed to stop waiting on it.
struct InFlight {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// One editor/language context: state machine, current unit, and results.
pub struct Session {
    language: LanguageId,
    builder: Builder,
    runner: Runner,
    phase: Phase,
    /// Identifies the live CompilationUnit; bumped on every supersede.
    epoch: u64,
    unit: Option<CompilationUnit>,
    last_build: Option<BuildResult>,
    last_run: Option<ExecutionResult>,
    run_diagnostic: Option<String>,
    inflight: Option<InFlight>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
}

impl Session {
    /// Session over an injected registry and workspace.
    pub fn new(
        language: LanguageId,
        registry: Arc<ToolchainRegistry>,
        workspace: WorkspaceManager,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let builder = Builder::new(registry, workspace);
        Self {
            language,
            builder,
            runner: Runner::new(),
            phase: Phase::Idle,
            epoch: 0,
            unit: None,
            last_build: None,
            last_run: None,
            run_diagnostic: None,
            inflight: None,
            events_tx,
            events_rx,
        }
    }

    /// Session with the stock toolchains, rooted at `output_base`.
    pub fn with_builtin(language: LanguageId, output_base: PathBuf) -> Self {
        Self::new(
            language,
            Arc::new(ToolchainRegistry::builtin()),
            WorkspaceManager::new(output_base),
        )
    }

    pub fn language(&self) -> LanguageId {
        self.language
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether `run()` is currently legal.
    pub fn run_enabled(&self) -> bool {
        matches!(
            self.phase,
            Phase::CompiledReady | Phase::RunCompleted | Phase::RunError
        )
    }

    pub fn last_build(&self) -> Option<&BuildResult> {
        self.last_build.as_ref()
    }

    pub fn last_run(&self) -> Option<&ExecutionResult> {
        self.last_run.as_ref()
    }

    /// Bound applied to compile steps started after this call.
    pub fn set_compile_timeout(&mut self, timeout: Duration) {
        self.builder.compile_timeout = timeout;
    }

    /// Bound applied to runs started after this call; `None` is unbounded.
    pub fn set_run_timeout(&mut self, timeout: Option<Duration>) {
        self.runner.run_timeout = timeout;
    }

    /// Switch the active language. Any in-flight work is cancelled, the
    /// current unit and artifact are discarded, and the session returns to
    /// [`Phase::Idle`]: an artifact built for one language is never
    /// runnable under another.
    pub fn set_language(&mut self, language: LanguageId) {
        if language == self.language {
            return;
        }
        debug!("switching language {} -> {}", self.language, language);
        self.supersede();
        self.language = language;
    }

    /// Start compiling `source_text`, superseding any in-flight work.
    ///
    /// On return the session is in [`Phase::Compiling`] (or a terminal
    /// failure phase if workspace setup failed); completion arrives via
    /// [`poll`](Self::poll). Empty input and unknown languages fail fast
    /// with no filesystem or process side effects.
    pub fn compile(&mut self, source_text: &str) -> Result<()> {
        self.supersede();

        let unit = match self.builder.prepare(self.language, source_text) {
            Ok(unit) => unit,
            Err(PadError::Io(e)) => {
                self.last_build = Some(BuildResult {
                    status: BuildStatus::IoFailed,
                    diagnostic: e.to_string(),
                    executable: None,
                    wall_time_ms: 0,
                });
                self.phase = Phase::IoFailed;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.phase = Phase::SourceWritten;
        self.unit = Some(unit.clone());
        self.spawn_compile(unit);
        Ok(())
    }

    /// Start running the current artifact.
    ///
    /// Legal only when [`run_enabled`](Self::run_enabled): otherwise
    /// [`PadError::NotReady`], or [`PadError::Busy`] while a run is
    /// already in flight. Completion arrives via [`poll`](Self::poll).
    pub fn run(&mut self) -> Result<()> {
        if !self.run_enabled() {
            return Err(if self.phase == Phase::Running {
                PadError::Busy
            } else {
                PadError::NotReady
            });
        }
        let workdir = match &self.unit {
            Some(unit) => unit.workdir.clone(),
            None => return Err(PadError::NotReady),
        };
        let executable = match self.last_build.as_ref().and_then(|b| b.executable.clone()) {
            Some(executable) => executable,
            None => return Err(PadError::NotReady),
        };

        self.last_run = None;
        self.run_diagnostic = None;
        self.spawn_run(executable, workdir);
        Ok(())
    }

    /// Stop the in-flight compile or run and kill its child process.
    ///
    /// Cancelling a run keeps the built artifact: the session returns to
    /// [`Phase::CompiledReady`]. Cancelling a compile discards the unit
    /// and returns to [`Phase::Idle`].
    pub fn cancel(&mut self) {
        if self.inflight.is_none() {
            return;
        }
        let was_running = self.phase == Phase::Running;
        self.abandon_inflight();
        self.epoch += 1;
        if was_running {
            self.last_run = None;
            self.run_diagnostic = None;
            self.phase = Phase::CompiledReady;
        } else {
            self.unit = None;
            self.last_build = None;
            self.phase = Phase::Idle;
        }
    }

    /// Drain worker events and fold them into the session state. Returns
    /// true when the phase or results changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            changed |= self.apply(event);
        }
        changed
    }

    /// Compile and block until the build settles, polling internally.
    pub fn compile_and_wait(&mut self, source_text: &str) -> Result<BuildResult> {
        self.compile(source_text)?;
        self.wait_while(Phase::Compiling);
        self.last_build.clone().ok_or(PadError::NotReady)
    }

    /// Run and block until the program finishes, polling internally.
    pub fn run_and_wait(&mut self) -> Result<ExecutionResult> {
        self.run()?;
        self.wait_while(Phase::Running);
        match self.phase {
            Phase::RunCompleted => self.last_run.clone().ok_or(PadError::NotReady),
            Phase::RunError => Err(PadError::Run(
                self.run_diagnostic
                    .clone()
                    .unwrap_or_else(|| "run failed".to_string()),
            )),
            _ => Err(PadError::Run("run was interrupted".to_string())),
        }
    }

    /// Status string for the UI layer.
    pub fn status_line(&self) -> String {
        let build_diag = self
            .last_build
            .as_ref()
            .map(|b| b.diagnostic.as_str())
            .unwrap_or("");
        match self.phase {
            Phase::Idle => "Ready".to_string(),
            Phase::SourceWritten | Phase::Compiling => "Compiling".to_string(),
            Phase::CompileFailed => format!("Compilation failed:\n{}", build_diag),
            Phase::ToolMissing => format!("Toolchain missing: {}", build_diag),
            Phase::IoFailed => format!("Workspace error: {}", build_diag),
            Phase::CompiledReady => "Compilation successful".to_string(),
            Phase::Running => "Running".to_string(),
            Phase::RunCompleted => self
                .last_run
                .as_ref()
                .map(|r| r.transcript.clone())
                .unwrap_or_default(),
            Phase::RunError => format!(
                "Execution failed: {}",
                self.run_diagnostic.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    /// Discard the current unit and all results, cancelling in-flight
    /// work. The next event epoch starts here.
    fn supersede(&mut self) {
        self.abandon_inflight();
        self.epoch += 1;
        self.unit = None;
        self.last_build = None;
        self.last_run = None;
        self.run_diagnostic = None;
        self.phase = Phase::Idle;
    }

    /// Kill the in-flight child (if any) and reclaim its worker thread.
    /// Does not touch the epoch; callers decide how stale events are
    /// fenced.
    fn abandon_inflight(&mut self) {
        if let Some(flight) = self.inflight.take() {
            flight.cancel.store(true, Ordering::Relaxed);
            if flight.handle.join().is_err() {
                warn!("session worker thread panicked");
            }
        }
    }

    /// Reclaim the worker that just reported an event.
    fn finish_flight(&mut self) {
        if let Some(flight) = self.inflight.take() {
            if flight.handle.join().is_err() {
                warn!("session worker thread panicked");
            }
        }
    }

    fn spawn_compile(&mut self, unit: CompilationUnit) {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let epoch = self.epoch;
        let tx = self.events_tx.clone();
        let builder = self.builder.clone();

        let handle = thread::spawn(move || {
            let result = builder.build(&unit, Some(flag));
            let _ = tx.send(SessionEvent::BuildFinished { epoch, result });
        });

        self.phase = Phase::Compiling;
        self.inflight = Some(InFlight { cancel, handle });
    }

    fn spawn_run(&mut self, executable: crate::build::ExecutableRef, workdir: PathBuf) {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let epoch = self.epoch;
        let tx = self.events_tx.clone();
        let runner = self.runner.clone();

        let handle = thread::spawn(move || {
            let result = runner.run(&executable, &workdir, Some(flag));
            let _ = tx.send(SessionEvent::RunFinished { epoch, result });
        });

        self.phase = Phase::Running;
        self.inflight = Some(InFlight { cancel, handle });
    }

    fn apply(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::BuildFinished { epoch, result } => {
                if epoch != self.epoch {
                    debug!("discarding superseded build result (epoch {})", epoch);
                    return false;
                }
                self.finish_flight();
                self.phase = match result.status {
                    BuildStatus::Success => Phase::CompiledReady,
                    BuildStatus::CompileFailed => Phase::CompileFailed,
                    BuildStatus::ToolMissing => Phase::ToolMissing,
                    BuildStatus::IoFailed => Phase::IoFailed,
                };
                self.last_build = Some(result);
                true
            }
            SessionEvent::RunFinished { epoch, result } => {
                if epoch != self.epoch {
                    debug!("discarding superseded run result (epoch {})", epoch);
                    return false;
                }
                self.finish_flight();
                match result {
                    Ok(run) => {
                        self.phase = Phase::RunCompleted;
                        self.last_run = Some(run);
                    }
                    Err(e) => {
                        self.phase = Phase::RunError;
                        self.run_diagnostic = Some(match e {
                            PadError::Run(msg) => msg,
                            other => other.to_string(),
                        });
                    }
                }
                true
            }
        }
    }

    fn wait_while(&mut self, phase: Phase) {
        while self.phase == phase {
            if !self.poll() {
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // A dropped session must not leave a child process behind.
        self.abandon_inflight();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{CommandTemplate, LanguageProfile, RunnerSpec, TemplateArg};
    use std::time::Instant;
    use tempfile::TempDir;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    /// Interpreted fake language backed by `sh`.
    fn sh_profile(id: LanguageId) -> LanguageProfile {
        LanguageProfile {
            id,
            extension: "sh".to_string(),
            compile: None,
            probe: strings(&["sh", "-c", "true"]),
            runner: RunnerSpec::Interpreter {
                command: "sh".to_string(),
            },
        }
    }

    /// Compiled fake language whose "compiler" runs a shell one-liner.
    fn compiled_profile(id: LanguageId, script: &str) -> LanguageProfile {
        LanguageProfile {
            id,
            extension: "src".to_string(),
            compile: Some(CommandTemplate::new(vec![
                TemplateArg::Lit("sh".to_string()),
                TemplateArg::Lit("-c".to_string()),
                TemplateArg::Lit(script.to_string()),
            ])),
            probe: strings(&["sh", "-c", "true"]),
            runner: RunnerSpec::NativeBinary,
        }
    }

    fn session_with(profiles: Vec<LanguageProfile>, language: LanguageId, tmp: &TempDir) -> Session {
        Session::new(
            language,
            Arc::new(ToolchainRegistry::with_profiles(profiles)),
            WorkspaceManager::new(tmp.path().to_path_buf()),
        )
    }

    #[test]
    fn test_initial_state() {
        let tmp = TempDir::new().unwrap();
        let session = session_with(vec![sh_profile(LanguageId::Python)], LanguageId::Python, &tmp);
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.run_enabled());
        assert_eq!(session.status_line(), "Ready");
        assert_eq!(session.language(), LanguageId::Python);
    }

    #[test]
    fn test_empty_input_stays_idle() {
        let tmp = TempDir::new().unwrap();
        let mut session =
            session_with(vec![sh_profile(LanguageId::Python)], LanguageId::Python, &tmp);

        let err = session.compile("  \n\t ").unwrap_err();
        assert!(matches!(err, PadError::EmptyInput));
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.run_enabled());
    }

    #[test]
    fn test_run_before_compile_is_not_ready() {
        let tmp = TempDir::new().unwrap();
        let mut session =
            session_with(vec![sh_profile(LanguageId::Python)], LanguageId::Python, &tmp);

        let err = session.run().unwrap_err();
        assert!(matches!(err, PadError::NotReady));
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    #[cfg(unix)]
    fn test_full_cycle() {
        let tmp = TempDir::new().unwrap();
        let mut session =
            session_with(vec![sh_profile(LanguageId::Python)], LanguageId::Python, &tmp);

        let build = session.compile_and_wait("echo hello\n").unwrap();
        assert!(build.is_success());
        assert_eq!(session.phase(), Phase::CompiledReady);
        assert!(session.run_enabled());
        assert_eq!(session.status_line(), "Compilation successful");

        let run = session.run_and_wait().unwrap();
        assert_eq!(run.stdout, "hello\n");
        assert_eq!(run.exit_code, Some(0));
        assert_eq!(session.phase(), Phase::RunCompleted);
        assert_eq!(session.status_line(), "hello\n");
        // Re-run without recompiling stays legal.
        let run = session.run_and_wait().unwrap();
        assert_eq!(run.stdout, "hello\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_compile_failure_gates_run() {
        let tmp = TempDir::new().unwrap();
        let mut session = session_with(
            vec![compiled_profile(LanguageId::C, "echo broken >&2; exit 1")],
            LanguageId::C,
            &tmp,
        );

        let build = session.compile_and_wait("int main(){}").unwrap();
        assert_eq!(build.status, BuildStatus::CompileFailed);
        assert_eq!(session.phase(), Phase::CompileFailed);
        assert!(!session.run_enabled());
        assert!(session.status_line().contains("broken"));

        let err = session.run().unwrap_err();
        assert!(matches!(err, PadError::NotReady));
    }

    #[test]
    fn test_missing_tool_phase() {
        let tmp = TempDir::new().unwrap();
        let mut profile = compiled_profile(LanguageId::C, "true");
        profile.compile = Some(CommandTemplate::new(vec![
            TemplateArg::Lit("runpad-test-missing-cc".to_string()),
            TemplateArg::SourcePath,
        ]));
        let mut session = session_with(vec![profile], LanguageId::C, &tmp);

        let build = session.compile_and_wait("int main(){}").unwrap();
        assert_eq!(build.status, BuildStatus::ToolMissing);
        assert_eq!(session.phase(), Phase::ToolMissing);
        assert!(session.status_line().contains("runpad-test-missing-cc"));
        assert!(!session.run_enabled());
    }

    #[test]
    fn test_workspace_failure_is_io_failed() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("occupied");
        std::fs::write(&blocker, b"file, not dir").unwrap();

        let mut session = Session::new(
            LanguageId::Python,
            Arc::new(ToolchainRegistry::with_profiles(vec![sh_profile(
                LanguageId::Python,
            )])),
            WorkspaceManager::new(blocker),
        );

        let build = session.compile_and_wait("echo hi").unwrap();
        assert_eq!(build.status, BuildStatus::IoFailed);
        assert_eq!(session.phase(), Phase::IoFailed);
        assert!(session.status_line().starts_with("Workspace error"));
        assert!(!session.run_enabled());
    }

    #[test]
    #[cfg(unix)]
    fn test_second_compile_supersedes_first_artifact() {
        let tmp = TempDir::new().unwrap();
        let mut session =
            session_with(vec![sh_profile(LanguageId::Python)], LanguageId::Python, &tmp);

        session.compile_and_wait("echo first\n").unwrap();
        let run = session.run_and_wait().unwrap();
        assert_eq!(run.stdout, "first\n");

        session.compile_and_wait("echo second\n").unwrap();
        let run = session.run_and_wait().unwrap();
        assert_eq!(run.stdout, "second\n", "stale artifact must never run");
    }

    #[test]
    #[cfg(unix)]
    fn test_supersede_never_queues_behind_slow_compile() {
        let tmp = TempDir::new().unwrap();
        let mut session = session_with(
            vec![
                compiled_profile(LanguageId::C, "sleep 30"),
                sh_profile(LanguageId::Python),
            ],
            LanguageId::C,
            &tmp,
        );

        let started = Instant::now();
        session.compile("int main(){}").unwrap();
        assert_eq!(session.phase(), Phase::Compiling);

        // Switching language cancels the hung compile and kills its child.
        session.set_language(LanguageId::Python);
        assert_eq!(session.phase(), Phase::Idle);

        let build = session.compile_and_wait("echo quick\n").unwrap();
        assert!(build.is_success());
        let run = session.run_and_wait().unwrap();
        assert_eq!(run.stdout, "quick\n");
        assert!(
            started.elapsed() < Duration::from_secs(20),
            "superseded compile must not be waited on"
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_language_switch_clears_run_enabled() {
        let tmp = TempDir::new().unwrap();
        let mut session = session_with(
            vec![sh_profile(LanguageId::Python), sh_profile(LanguageId::C)],
            LanguageId::Python,
            &tmp,
        );

        session.compile_and_wait("echo hi\n").unwrap();
        assert!(session.run_enabled());

        session.set_language(LanguageId::C);
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.run_enabled());
        assert!(session.last_build().is_none());
        assert!(matches!(session.run().unwrap_err(), PadError::NotReady));
    }

    #[test]
    #[cfg(unix)]
    fn test_busy_and_cancel_during_run() {
        let tmp = TempDir::new().unwrap();
        let mut session =
            session_with(vec![sh_profile(LanguageId::Python)], LanguageId::Python, &tmp);

        session.compile_and_wait("sleep 30\n").unwrap();
        session.run().unwrap();
        assert_eq!(session.phase(), Phase::Running);

        let err = session.run().unwrap_err();
        assert!(matches!(err, PadError::Busy));

        let started = Instant::now();
        session.cancel();
        assert_eq!(session.phase(), Phase::CompiledReady);
        assert!(session.run_enabled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    #[cfg(unix)]
    fn test_launch_failure_is_run_error() {
        let tmp = TempDir::new().unwrap();
        // "Compiler" succeeds without producing the artifact, so the run
        // stage has nothing to launch.
        let mut session = session_with(
            vec![compiled_profile(LanguageId::C, "true")],
            LanguageId::C,
            &tmp,
        );

        session.compile_and_wait("int main(){}").unwrap();
        assert_eq!(session.phase(), Phase::CompiledReady);

        let err = session.run_and_wait().unwrap_err();
        assert!(matches!(err, PadError::Run(_)));
        assert_eq!(session.phase(), Phase::RunError);
        assert!(session.status_line().starts_with("Execution failed"));
        // Both re-run and a fresh compile remain available.
        assert!(session.run_enabled());
    }
}
