// src/exec/runner.rs

//! Subprocess execution.
//!
//! Two modes are offered:
//! - [`CommandRunner::run`] streams the child's stdout/stderr line by line to
//!   our own stdout/stderr while it runs. Each stream has its own reader task,
//!   so ordering is preserved within a stream but not across them.
//! - [`CommandRunner::capture`] runs to completion and hands back the
//!   captured output for callers that need to parse it.
//!
//! Either way the working directory is pinned to the installation root, and a
//! program that cannot be found on `PATH` is rejected before anything is
//! spawned. A non-zero exit is returned as [`OpsError::CommandFailed`]; the
//! caller decides whether that is fatal.

use std::env;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::{OpsError, Result};

/// Boxed future type used at the trait seams so they stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Output of a command run in capture mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// All captured lines, stdout first.
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .map(str::to_string)
            .collect()
    }
}

/// Trait abstracting how external commands are executed.
///
/// Production code uses [`SystemRunner`]; tests provide implementations that
/// record invocations without spawning processes.
pub trait CommandRunner: Send + Sync {
    /// Resolve `program` to an executable path, if it exists.
    fn locate(&self, program: &str) -> Option<PathBuf>;

    /// Run `program` with `args`, streaming its output.
    fn run<'a>(&'a self, program: &'a str, args: &'a [String]) -> BoxFuture<'a, Result<()>>;

    /// Run `program` with `args` and return its captured output.
    fn capture<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
    ) -> BoxFuture<'a, Result<CapturedOutput>>;
}

/// Runner that spawns real processes with `tokio::process`.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    workdir: PathBuf,
}

impl SystemRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn resolve(&self, program: &str) -> Result<PathBuf> {
        self.locate(program)
            .ok_or_else(|| OpsError::MissingExecutable(program.to_string()))
    }

    async fn run_streaming(&self, program: &str, args: &[String]) -> Result<()> {
        let path = self.resolve(program)?;
        debug!(program, ?args, workdir = ?self.workdir, "starting process");

        let mut child = Command::new(&path)
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning `{program}`"))?;

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, Stream::Stdout)));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, Stream::Stderr)));

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for `{program}`"))?;

        // Drain whatever is still buffered before reporting.
        for handle in [stdout, stderr].into_iter().flatten() {
            if let Err(e) = handle.await {
                warn!(program, error = %e, "output forwarder ended abnormally");
            }
        }

        debug!(program, code = ?status.code(), success = status.success(), "process exited");

        if status.success() {
            Ok(())
        } else {
            println!("[-] Error from `{program}`: {status}");
            Err(OpsError::CommandFailed {
                program: program.to_string(),
                args: args.to_vec(),
                code: status.code(),
            })
        }
    }

    async fn run_captured(&self, program: &str, args: &[String]) -> Result<CapturedOutput> {
        let path = self.resolve(program)?;
        debug!(program, ?args, "capturing process output");

        let output = Command::new(&path)
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("running `{program}`"))?;

        if !output.status.success() {
            return Err(OpsError::CommandFailed {
                program: program.to_string(),
                args: args.to_vec(),
                code: output.status.code(),
            });
        }

        Ok(CapturedOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl CommandRunner for SystemRunner {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        find_in_path(program, env::var_os("PATH").as_deref())
    }

    fn run<'a>(&'a self, program: &'a str, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.run_streaming(program, args))
    }

    fn capture<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
    ) -> BoxFuture<'a, Result<CapturedOutput>> {
        Box::pin(self.run_captured(program, args))
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

async fn forward_lines<R>(reader: R, stream: Stream)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match stream {
            Stream::Stdout => println!("{line}"),
            Stream::Stderr => eprintln!("{line}"),
        }
    }
}

/// Search a `PATH`-style list of directories for an executable file.
///
/// Names containing a path separator are checked directly.
pub fn find_in_path(program: &str, path_var: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = path_var?;
    env::split_paths(path_var)
        .flat_map(|dir| executable_names(program).map(move |name| dir.join(name)))
        .find(|p| is_executable(p))
}

#[cfg(windows)]
fn executable_names(program: &str) -> impl Iterator<Item = String> + '_ {
    [String::new(), ".exe".to_string(), ".cmd".to_string()]
        .into_iter()
        .map(move |ext| format!("{program}{ext}"))
}

#[cfg(not(windows))]
fn executable_names(program: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(program.to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
