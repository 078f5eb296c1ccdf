//! Child process plumbing shared by the build and run stages.
//!
//! One entry point, [`run_captured`]: spawn an argv, collect both output
//! streams on reader threads with a byte cap, and poll the child until it
//! exits, times out, or is cancelled. Timeout and cancellation kill the
//! child before returning so no orphan keeps running.

use log::{debug, warn};
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Byte cap applied to each captured stream.
pub const STREAM_LIMIT: usize = 1024 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Why the wait loop stopped watching the child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitKind {
    /// Child exited on its own.
    Exited,
    /// Deadline passed; the child was killed.
    TimedOut,
    /// Cancellation flag was raised; the child was killed.
    Cancelled,
}

/// One child process invocation.
#[derive(Clone, Debug)]
pub struct ExecRequest {
    /// Program and arguments; `argv[0]` is the executable.
    pub argv: Vec<String>,
    /// Working directory for the child.
    pub cwd: Option<PathBuf>,
    /// Wall-clock deadline; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Raised by the owner to stop waiting and kill the child.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Pass the parent's stdin through to the child instead of closing it.
    pub inherit_stdin: bool,
}

impl ExecRequest {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            cwd: None,
            timeout: None,
            cancel: None,
            inherit_stdin: false,
        }
    }
}

/// Captured result of one child process invocation.
#[derive(Clone, Debug)]
pub struct CapturedOutput {
    /// Exit code, if the child exited normally.
    pub exit_code: Option<i32>,
    /// Terminating signal, if any (Unix only).
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub wall_time: Duration,
    pub outcome: ExitKind,
}

impl CapturedOutput {
    pub fn truncated(&self) -> bool {
        self.stdout_truncated || self.stderr_truncated
    }
}

/// Spawn the request and wait for it with bounded output capture.
///
/// Returns `Err` only when the child could not be spawned (missing
/// executable, permissions); everything after a successful spawn is
/// reported through [`CapturedOutput`].
pub fn run_captured(req: ExecRequest) -> std::io::Result<CapturedOutput> {
    if req.argv.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty command line",
        ));
    }

    let mut command = Command::new(&req.argv[0]);
    command
        .args(&req.argv[1..])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command.stdin(if req.inherit_stdin {
        Stdio::inherit()
    } else {
        Stdio::null()
    });
    if let Some(cwd) = &req.cwd {
        command.current_dir(cwd);
    }

    debug!("spawning {:?}", req.argv);
    let started = Instant::now();
    let mut child = command.spawn()?;

    let stdout_handle = child.stdout.take().map(|s| drain_stream(s, STREAM_LIMIT));
    let stderr_handle = child.stderr.take().map(|s| drain_stream(s, STREAM_LIMIT));

    let mut outcome = ExitKind::Exited;
    let status: ExitStatus = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }

        let cancelled = req
            .cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false);
        let timed_out = req
            .timeout
            .map(|limit| started.elapsed() >= limit)
            .unwrap_or(false);

        if cancelled || timed_out {
            outcome = if cancelled {
                ExitKind::Cancelled
            } else {
                ExitKind::TimedOut
            };
            if let Err(e) = child.kill() {
                warn!("failed to kill child {}: {}", child.id(), e);
            }
            break child.wait()?;
        }

        thread::sleep(POLL_INTERVAL);
    };

    let (stdout, stdout_truncated) = join_stream(stdout_handle);
    let (stderr, stderr_truncated) = join_stream(stderr_handle);

    Ok(CapturedOutput {
        exit_code: status.code(),
        signal: signal_of(&status),
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        wall_time: started.elapsed(),
        outcome,
    })
}

/// Read a stream to EOF on its own thread, keeping at most `limit` bytes.
///
/// Reading continues past the limit so the child never blocks on a full
/// pipe; excess bytes are discarded.
fn drain_stream<R: Read + Send + 'static>(stream: R, limit: usize) -> thread::JoinHandle<(Vec<u8>, bool)> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        let mut truncated = false;

        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if buffer.len() < limit {
                        let take = n.min(limit - buffer.len());
                        buffer.extend_from_slice(&chunk[..take]);
                        if take < n {
                            truncated = true;
                        }
                    } else {
                        truncated = true;
                    }
                }
                Err(_) => break,
            }
        }

        (buffer, truncated)
    })
}

fn join_stream(handle: Option<thread::JoinHandle<(Vec<u8>, bool)>>) -> (String, bool) {
    match handle {
        Some(handle) => {
            let (bytes, truncated) = handle.join().unwrap_or_default();
            (String::from_utf8_lossy(&bytes).to_string(), truncated)
        }
        None => (String::new(), false),
    }
}

fn signal_of(status: &ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    }
    #[cfg(not(unix))]
    {
        let _ = status;
        None
    }
}
