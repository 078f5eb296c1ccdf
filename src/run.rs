//! The run stage: execute a built artifact and capture its output.

use crate::build::ExecutableRef;
use crate::error::{PadError, Result};
use crate::exec::{self, ExecRequest};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one run of a built artifact. Immutable after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code, if the program exited normally.
    pub exit_code: Option<i32>,
    /// Terminating signal, if any (Unix only).
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Display text: stdout then stderr, or the literal `"No output"`.
    pub transcript: String,
    pub wall_time_ms: u64,
    /// True exactly when the program exited with code 0.
    pub success: bool,
}

/// Executes built artifacts inside their language workspace directory.
///
/// A non-zero exit from the user's program is a normal result, not an
/// error; only failure to launch the process at all is reported as
/// [`PadError::Run`].
#[derive(Clone, Debug, Default)]
pub struct Runner {
    /// Optional wall-clock bound; user programs run unbounded by default.
    pub run_timeout: Option<Duration>,
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch the artifact with `workdir` as its working directory, so the
    /// program's relative file access lands in the language workspace.
    pub fn run(
        &self,
        executable: &ExecutableRef,
        workdir: &Path,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<ExecutionResult> {
        let argv = executable.argv();
        let program = argv.first().cloned().unwrap_or_default();

        let mut req = ExecRequest::new(argv);
        req.cwd = Some(workdir.to_path_buf());
        req.timeout = self.run_timeout;
        req.cancel = cancel;
        req.inherit_stdin = true;

        let captured = exec::run_captured(req)
            .map_err(|e| PadError::Run(format!("failed to launch {}: {}", program, e)))?;

        info!(
            "run of {} finished with exit {:?} in {}ms",
            program,
            captured.exit_code,
            captured.wall_time.as_millis()
        );

        let transcript =
            compose_transcript(&captured.stdout, &captured.stderr, captured.truncated());
        Ok(ExecutionResult {
            exit_code: captured.exit_code,
            signal: captured.signal,
            success: captured.exit_code == Some(0),
            transcript,
            wall_time_ms: captured.wall_time.as_millis() as u64,
            stdout: captured.stdout,
            stderr: captured.stderr,
        })
    }
}

/// Concatenate the captured streams in display order. True interleaving is
/// not observable without a pty, so stdout comes first, then stderr; two
/// empty streams yield the literal `"No output"`.
fn compose_transcript(stdout: &str, stderr: &str, truncated: bool) -> String {
    let mut transcript = String::with_capacity(stdout.len() + stderr.len());
    transcript.push_str(stdout);
    transcript.push_str(stderr);
    if transcript.is_empty() {
        return "No output".to_string();
    }
    if truncated {
        transcript.push_str("\n[output truncated]");
    }
    transcript
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn script_ref(dir: &Path, name: &str, body: &str) -> ExecutableRef {
        let script = dir.join(name);
        fs::write(&script, body).unwrap();
        ExecutableRef::Interpreted {
            interpreter: "sh".to_string(),
            script,
        }
    }

    #[test]
    fn test_transcript_composition() {
        assert_eq!(compose_transcript("out\n", "err\n", false), "out\nerr\n");
        assert_eq!(compose_transcript("", "err\n", false), "err\n");
        assert_eq!(compose_transcript("", "", false), "No output");
        assert_eq!(
            compose_transcript("x", "", true),
            "x\n[output truncated]"
        );
        // Truncation never rewrites an empty transcript.
        assert_eq!(compose_transcript("", "", true), "No output");
    }

    #[test]
    #[cfg(unix)]
    fn test_run_captures_both_streams() {
        let tmp = TempDir::new().unwrap();
        let exec_ref = script_ref(tmp.path(), "both.sh", "echo hello\necho err >&2\n");

        let result = Runner::new().run(&exec_ref, tmp.path(), None).unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "err\n");
        assert_eq!(result.transcript, "hello\nerr\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_nonzero_exit_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let exec_ref = script_ref(tmp.path(), "fail.sh", "exit 5\n");

        let result = Runner::new().run(&exec_ref, tmp.path(), None).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(5));
        assert_eq!(result.transcript, "No output");
    }

    #[test]
    #[cfg(unix)]
    fn test_relative_paths_resolve_in_workdir() {
        let tmp = TempDir::new().unwrap();
        let exec_ref = script_ref(tmp.path(), "write.sh", "echo data > marker.txt\n");

        let result = Runner::new().run(&exec_ref, tmp.path(), None).unwrap();
        assert!(result.success);
        assert!(tmp.path().join("marker.txt").exists());
    }

    #[test]
    fn test_missing_artifact_is_run_error() {
        let tmp = TempDir::new().unwrap();
        let exec_ref = ExecutableRef::Native {
            path: tmp.path().join("deleted-artifact"),
        };

        let err = Runner::new().run(&exec_ref, tmp.path(), None).unwrap_err();
        assert!(matches!(err, PadError::Run(_)));
        assert!(err.to_string().contains("deleted-artifact"));
    }

    #[test]
    #[cfg(unix)]
    fn test_run_timeout_kills_program() {
        let tmp = TempDir::new().unwrap();
        let exec_ref = script_ref(tmp.path(), "hang.sh", "sleep 30\n");

        let runner = Runner {
            run_timeout: Some(Duration::from_millis(100)),
        };
        let started = std::time::Instant::now();
        let result = runner.run(&exec_ref, tmp.path(), None).unwrap();
        assert!(!result.success);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
