use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ghostctl::errors::{OpsError, Result};
use ghostctl::exec::{BoxFuture, CapturedOutput, CommandRunner};

/// Backup volume mount point the fake database unit uses.
pub const FAKE_BACKUP_PATH: &str = "/backups";

/// A fake command runner that:
/// - records every invocation as a single command line
/// - fails invocations matching scripted patterns
/// - answers capture calls with scripted output
/// - simulates compose `cp` and the database unit's `backup`/`restore`
///   actions against a directory tree standing in for the units' filesystems
///   (`<units_dir>/<service>/<absolute path>`).
pub struct FakeRunner {
    workdir: PathBuf,
    units_dir: PathBuf,
    available: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
    outputs: Mutex<Vec<(String, String)>>,
}

impl FakeRunner {
    /// `docker` is on the fake PATH; nothing else is.
    pub fn new(workdir: impl Into<PathBuf>, units_dir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            units_dir: units_dir.into(),
            available: Mutex::new(HashSet::from(["docker".to_string()])),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_program(self, program: &str) -> Self {
        self.available.lock().unwrap().insert(program.to_string());
        self
    }

    pub fn without_program(self, program: &str) -> Self {
        self.available.lock().unwrap().remove(program);
        self
    }

    /// Any invocation whose command line contains `pattern` exits with 1.
    pub fn fail_when(self, pattern: &str) -> Self {
        self.failures.lock().unwrap().push(pattern.to_string());
        self
    }

    /// Capture calls whose command line contains `pattern` print `stdout`.
    pub fn respond(self, pattern: &str, stdout: &str) -> Self {
        self.outputs
            .lock()
            .unwrap()
            .push((pattern.to_string(), stdout.to_string()));
        self
    }

    /// Recorded command lines, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded compose actions (everything after `-f <descriptor>`).
    pub fn compose_actions(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|line| line.split_once(" -f ").map(|(_, rest)| rest.to_string()))
            .filter_map(|rest| rest.split_once(' ').map(|(_, action)| action.to_string()))
            .collect()
    }

    /// Host path backing `path` inside the fake unit `service`.
    pub fn unit_path(&self, service: &str, path: &str) -> PathBuf {
        self.units_dir
            .join(service)
            .join(path.trim_start_matches('/'))
    }

    fn execute(&self, program: &str, args: &[String]) -> Result<CapturedOutput> {
        let line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().unwrap().push(line.clone());

        if !self.available.lock().unwrap().contains(program) {
            return Err(OpsError::MissingExecutable(program.to_string()));
        }

        let failed = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|pattern| line.contains(pattern.as_str()));
        if failed {
            return Err(self.failure(program, args));
        }

        if let Some(action) = compose_action(program, args) {
            self.simulate(program, args, action)?;
        }

        let stdout = self
            .outputs
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();

        Ok(CapturedOutput {
            stdout,
            stderr: String::new(),
        })
    }

    fn simulate(&self, program: &str, args: &[String], action: &[String]) -> Result<()> {
        let words = action.iter().map(String::as_str).collect::<Vec<_>>();
        match words.as_slice() {
            ["cp", rest @ ..] => {
                let paths = rest
                    .iter()
                    .filter(|w| !w.starts_with("--"))
                    .collect::<Vec<_>>();
                let [src, dst] = paths.as_slice() else {
                    return Err(self.failure(program, args));
                };
                let src = self.resolve(src);
                let dst = self.resolve(dst);
                if !src.exists() {
                    return Err(self.failure(program, args));
                }
                let target = match (dst.is_dir(), src.file_name()) {
                    (true, Some(name)) => dst.join(name),
                    _ => dst,
                };
                copy_tree(&src, &target)?;
            }
            ["run", "--rm", service, "backup"] => {
                let volume = self.unit_path(service, FAKE_BACKUP_PATH);
                fs::create_dir_all(&volume)?;
                let count = fs::read_dir(&volume)?.count();
                fs::write(
                    volume.join(format!("backup_{count}.sql.gz")),
                    b"fake database dump",
                )?;
            }
            ["run", "--rm", service, "restore", dump] => {
                let file = self.unit_path(service, FAKE_BACKUP_PATH).join(dump);
                if !file.is_file() {
                    return Err(self.failure(program, args));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// `service:/path` maps into the units dir; anything else is relative to
    /// the working directory.
    fn resolve(&self, spec: &str) -> PathBuf {
        match spec.split_once(':') {
            Some((service, path)) if !service.is_empty() && !service.contains('/') => {
                self.unit_path(service, path)
            }
            _ => self.workdir.join(spec),
        }
    }

    fn failure(&self, program: &str, args: &[String]) -> OpsError {
        OpsError::CommandFailed {
            program: program.to_string(),
            args: args.to_vec(),
            code: Some(1),
        }
    }
}

/// Arguments after `[compose] -f <descriptor>`, if this is a compose call.
fn compose_action<'a>(program: &str, args: &'a [String]) -> Option<&'a [String]> {
    let rest = match (program, args.first().map(String::as_str)) {
        ("docker", Some("compose")) => &args[1..],
        ("docker-compose", _) => args,
        _ => return None,
    };
    match rest {
        [flag, _descriptor, action @ ..] if flag == "-f" => Some(action),
        _ => None,
    }
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    if src.is_dir() {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        // `fs::copy` carries the permission bits over.
        fs::copy(src, dst)?;
    }
    Ok(())
}

impl CommandRunner for FakeRunner {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.available
            .lock()
            .unwrap()
            .contains(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }

    fn run<'a>(&'a self, program: &'a str, args: &'a [String]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.execute(program, args).map(|_| ()) })
    }

    fn capture<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
    ) -> BoxFuture<'a, Result<CapturedOutput>> {
        Box::pin(async move { self.execute(program, args) })
    }
}
