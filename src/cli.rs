//! Command-line front end over the session engine.
//!
//! The editor embeds [`Session`] directly; this binary exposes the same
//! pipeline for scripts and CI: build a source file, run it, and report
//! the outcome either as plain streams or as a stable JSON document.

use crate::build::{BuildResult, BuildStatus};
use crate::exec::{run_captured, ExecRequest};
use crate::lang::{LanguageId, ToolchainRegistry};
use crate::run::ExecutionResult;
use crate::session::{Phase, Session};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a program and immediately run it
    Run {
        /// Language to build for (c, cpp, java, python)
        #[arg(long, short)]
        language: String,
        /// Source file; reads stdin when omitted
        file: Option<PathBuf>,
        /// Directory that receives generated sources and artifacts
        #[arg(long, default_value = "Output")]
        workdir: PathBuf,
        /// Compile step timeout in seconds
        #[arg(long, default_value_t = 30)]
        compile_timeout: u64,
        /// Run timeout in seconds (unbounded when omitted)
        #[arg(long)]
        run_timeout: Option<u64>,
        /// Emit a JSON report instead of raw program output
        #[arg(long)]
        json: bool,
    },
    /// Build a program without running it
    Build {
        /// Language to build for (c, cpp, java, python)
        #[arg(long, short)]
        language: String,
        /// Source file; reads stdin when omitted
        file: Option<PathBuf>,
        /// Directory that receives generated sources and artifacts
        #[arg(long, default_value = "Output")]
        workdir: PathBuf,
        /// Compile step timeout in seconds
        #[arg(long, default_value_t = 30)]
        compile_timeout: u64,
        /// Emit a JSON report instead of a status line
        #[arg(long)]
        json: bool,
    },
    /// Probe every registered toolchain and report what is installed
    CheckToolchains {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List supported languages and their toolchains
    Languages {
        /// Emit the list as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Stable JSON report emitted by `run --json` and `build --json` (v1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportV1 {
    /// Schema version (always "1.0" for v1)
    pub schema_version: String,
    pub language: LanguageId,
    pub phase: Phase,
    pub build_status: BuildStatus,
    /// Compiler or probe diagnostic, when one was produced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// Launch failure message, when the run stage never started the program
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Combined display transcript ("No output" when the program printed
    /// nothing)
    pub transcript: String,
    pub compile_wall_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_wall_time_ms: Option<u64>,
}

impl ReportV1 {
    fn new(
        language: LanguageId,
        phase: Phase,
        build: &BuildResult,
        run: Option<&ExecutionResult>,
        run_error: Option<&str>,
    ) -> Self {
        Self {
            schema_version: "1.0".to_string(),
            language,
            phase,
            build_status: build.status,
            diagnostic: if build.diagnostic.is_empty() {
                None
            } else {
                Some(build.diagnostic.clone())
            },
            run_error: run_error.map(|s| s.to_string()),
            exit_code: run.and_then(|r| r.exit_code),
            signal: run.and_then(|r| r.signal),
            stdout: run.map(|r| r.stdout.clone()).unwrap_or_default(),
            stderr: run.map(|r| r.stderr.clone()).unwrap_or_default(),
            transcript: run.map(|r| r.transcript.clone()).unwrap_or_default(),
            compile_wall_time_ms: build.wall_time_ms,
            run_wall_time_ms: run.map(|r| r.wall_time_ms),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize report")
    }
}

/// Per-language row of the `check-toolchains` report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolchainStatus {
    pub language: LanguageId,
    pub tool: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Per-language row of the `languages` listing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub language: LanguageId,
    pub directory: String,
    pub extension: String,
    pub compiled: bool,
    pub tool: String,
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            language,
            file,
            workdir,
            compile_timeout,
            run_timeout,
            json,
        } => cmd_run(
            &language,
            file.as_deref(),
            workdir,
            compile_timeout,
            run_timeout,
            json,
        ),
        Commands::Build {
            language,
            file,
            workdir,
            compile_timeout,
            json,
        } => cmd_build(&language, file.as_deref(), workdir, compile_timeout, json),
        Commands::CheckToolchains { json } => cmd_check_toolchains(json),
        Commands::Languages { json } => cmd_languages(json),
    }
}

fn cmd_run(
    language: &str,
    file: Option<&Path>,
    workdir: PathBuf,
    compile_timeout: u64,
    run_timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let language: LanguageId = language.parse()?;
    let source = read_source(file)?;

    let mut session = Session::with_builtin(language, workdir);
    session.set_compile_timeout(Duration::from_secs(compile_timeout));
    session.set_run_timeout(run_timeout.map(Duration::from_secs));

    let build = session.compile_and_wait(&source)?;
    if !build.is_success() {
        emit_build_outcome(&session, &build, json)?;
        std::process::exit(1);
    }

    match session.run_and_wait() {
        Ok(run) => {
            if json {
                let report =
                    ReportV1::new(language, session.phase(), &build, Some(&run), None);
                println!("{}", report.to_json()?);
            } else {
                print!("{}", run.stdout);
                eprint!("{}", run.stderr);
            }
            // A program that exited non-zero is a completed run; forward
            // its code rather than treating it as a tool failure.
            let code = run.exit_code.unwrap_or(1);
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let report = ReportV1::new(
                    language,
                    session.phase(),
                    &build,
                    None,
                    Some(&e.to_string()),
                );
                println!("{}", report.to_json()?);
            } else {
                eprintln!("{}", session.status_line());
            }
            std::process::exit(1);
        }
    }
}

fn cmd_build(
    language: &str,
    file: Option<&Path>,
    workdir: PathBuf,
    compile_timeout: u64,
    json: bool,
) -> Result<()> {
    let language: LanguageId = language.parse()?;
    let source = read_source(file)?;

    let mut session = Session::with_builtin(language, workdir);
    session.set_compile_timeout(Duration::from_secs(compile_timeout));

    let build = session.compile_and_wait(&source)?;
    emit_build_outcome(&session, &build, json)?;
    if !build.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn emit_build_outcome(session: &Session, build: &BuildResult, json: bool) -> Result<()> {
    if json {
        let report = ReportV1::new(session.language(), session.phase(), build, None, None);
        println!("{}", report.to_json()?);
    } else if build.is_success() {
        println!("{}", session.status_line());
    } else {
        eprintln!("{}", session.status_line());
    }
    Ok(())
}

fn cmd_check_toolchains(json: bool) -> Result<()> {
    let registry = ToolchainRegistry::builtin();
    let mut rows = Vec::new();

    for profile in registry.list() {
        let tool = profile.tool_name().to_string();
        let mut req = ExecRequest::new(profile.probe.clone());
        req.timeout = Some(PROBE_TIMEOUT);
        let (found, version) = match run_captured(req) {
            Ok(output) if output.exit_code == Some(0) => {
                // Some toolchains print their version banner on stderr.
                let banner = if output.stdout.is_empty() {
                    &output.stderr
                } else {
                    &output.stdout
                };
                let first = banner.lines().next().unwrap_or("").trim().to_string();
                (true, if first.is_empty() { None } else { Some(first) })
            }
            Ok(output) => {
                debug!("probe for {} exited with {:?}", tool, output.exit_code);
                (false, None)
            }
            Err(e) => {
                debug!("probe for {} failed to launch: {}", tool, e);
                (false, None)
            }
        };
        rows.push(ToolchainStatus {
            language: profile.id,
            tool,
            found,
            version,
        });
    }

    let missing = rows.iter().filter(|r| !r.found).count();
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            let state = if row.found { "ok" } else { "missing" };
            match &row.version {
                Some(version) => {
                    println!("{:<8} {:<10} {:<8} {}", row.language, row.tool, state, version)
                }
                None => println!("{:<8} {:<10} {}", row.language, row.tool, state),
            }
        }
    }
    if missing > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_languages(json: bool) -> Result<()> {
    let registry = ToolchainRegistry::builtin();
    let rows: Vec<LanguageInfo> = registry
        .list()
        .into_iter()
        .map(|profile| LanguageInfo {
            language: profile.id,
            directory: profile.id.dir_name().to_string(),
            extension: profile.extension.clone(),
            compiled: profile.needs_compile(),
            tool: profile.tool_name().to_string(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            let kind = if row.compiled { "compiled" } else { "interpreted" };
            println!(
                "{:<8} {:<8} .{:<6} {:<12} {}",
                row.language, row.directory, row.extension, kind, row.tool
            );
        }
    }
    Ok(())
}

fn read_source(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read source from stdin")?;
            Ok(buf)
        }
    }
}
