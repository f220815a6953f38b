//! External program invocation
//!
//! Building, simulating, version control and mail all happen in child
//! processes. Environment changes are collected in an [`EnvOverrides`] and
//! applied to the one `Command` they belong to; the parent environment is
//! never mutated.
//!
//! There are no timeouts: a hung child blocks the caller until it exits.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::debug;
use crate::error::{ErrorKind, RegressError, Result};

/// Ordered environment overrides for one child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    vars: Vec<(String, String)>,
}

impl EnvOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing an earlier override in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge `other` on top of `self`.
    pub fn extend(&mut self, other: &EnvOverrides) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }

    /// Put `dirs` in front of a search-path variable. The current value comes
    /// from an earlier override or else the parent environment.
    pub fn prepend_path(&mut self, key: &str, dirs: &[PathBuf]) {
        let mut entries: Vec<OsString> = dirs.iter().map(|d| d.clone().into_os_string()).collect();
        let current = match self.get(key) {
            Some(v) => Some(OsString::from(v)),
            None => std::env::var_os(key),
        };
        if let Some(current) = current {
            entries.extend(std::env::split_paths(&current).map(PathBuf::into_os_string));
        }
        let joined = join_search_path(&entries);
        self.set(key, joined);
    }

    pub fn apply(&self, cmd: &mut Command) {
        for (k, v) in self.iter() {
            cmd.env(k, v);
        }
    }
}

/// Join directories with the platform list separator.
pub fn join_search_path<P: AsRef<Path>>(dirs: &[P]) -> String {
    let sep = if cfg!(windows) { ";" } else { ":" };
    dirs.iter()
        .map(|d| d.as_ref().to_string_lossy().to_string())
        .filter(|d| !d.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Outcome of a finished child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub success: bool,
    pub code: Option<i32>,
    /// Collected output; empty when output was not captured
    pub text: String,
}

impl Captured {
    fn from_status(status: ExitStatus, text: String) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
            text,
        }
    }
}

/// A program together with leading arguments, e.g. `sdk-regress run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub path: PathBuf,
    pub args: Vec<String>,
}

impl Program {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    /// This executable re-invoked with a subcommand.
    pub fn current_exe(subcommand: &str) -> Result<Self> {
        let path = std::env::current_exe()?;
        Ok(Self {
            path,
            args: vec![subcommand.to_string()],
        })
    }

    pub fn invocation(&self) -> Invocation {
        Invocation::new(&self.path).args(self.args.iter().cloned())
    }
}

/// One external command to run.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: EnvOverrides,
    stdin: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: EnvOverrides::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, overrides: &EnvOverrides) -> Self {
        self.env.extend(overrides);
        self
    }

    /// Feed a file to the child's stdin.
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Command line for progress messages.
    pub fn display(&self) -> String {
        let mut line = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') || arg.is_empty() {
                line.push_str(&format!("'{}'", arg));
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    fn command(&self) -> Result<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }
        self.env.apply(&mut cmd);
        if let Some(ref path) = self.stdin {
            let file = File::open(path).map_err(|e| {
                RegressError::from(e).with_path(path).with_command(self.display())
            })?;
            cmd.stdin(file);
        }
        debug!(command = %self.display(), "spawning");
        Ok(cmd)
    }

    fn spawn_error(&self, e: std::io::Error) -> RegressError {
        RegressError::new(
            ErrorKind::Spawn,
            format!("failed to execute '{}': {}", self.program.display(), e),
        )
    }

    /// Run with inherited stdio.
    pub fn status(&self) -> Result<Captured> {
        let status = self.command()?.status().map_err(|e| self.spawn_error(e))?;
        Ok(Captured::from_status(status, String::new()))
    }

    /// Run with inherited stdio; non-zero exit is an error.
    pub fn check(&self) -> Result<()> {
        let done = self.status()?;
        if done.success {
            Ok(())
        } else {
            Err(RegressError::process_failed(self.display(), done.code))
        }
    }

    /// Run to completion, collecting stdout followed by stderr.
    pub fn capture(&self) -> Result<Captured> {
        let mut cmd = self.command()?;
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        if self.stdin.is_none() {
            cmd.stdin(Stdio::null());
        }
        let output = cmd.output().map_err(|e| self.spawn_error(e))?;
        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(Captured::from_status(output.status, text))
    }

    /// Read stdout line by line while the child runs. Each line is echoed
    /// when `echo` is set and the whole text is kept. stderr is inherited.
    pub fn stream(&self, echo: bool) -> Result<Captured> {
        let mut cmd = self.command()?;
        cmd.stdout(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;

        let read = match child.stdout.take() {
            Some(stdout) => read_lines(stdout, echo),
            None => Ok(String::new()),
        };
        if read.is_err() {
            let _ = child.kill();
        }
        let status = child.wait()?;
        let text = read.map_err(|e| RegressError::from(e).with_command(self.display()))?;
        Ok(Captured::from_status(status, text))
    }

    /// Write `input` to the child's stdin, close it and wait. The child is
    /// waited for even when the write fails; a failed exit wins over the
    /// write error.
    pub fn feed(&self, input: &[u8]) -> Result<Captured> {
        let mut cmd = self.command()?;
        cmd.stdin(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;

        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(input),
            None => Ok(()),
        };
        let status = child.wait()?;
        let done = Captured::from_status(status, String::new());
        match written {
            Err(e) if done.success => Err(RegressError::from(e).with_command(self.display())),
            _ => Ok(done),
        }
    }

    /// Redirect stdout and stderr into `log`, appending or truncating.
    pub fn to_log(&self, log: &Path, append: bool) -> Result<Captured> {
        if let Some(parent) = log.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(log)
            .map_err(|e| RegressError::from(e).with_path(log))?;
        let err_file = file.try_clone()?;

        let mut cmd = self.command()?;
        cmd.stdout(file).stderr(err_file);
        let status = cmd.status().map_err(|e| self.spawn_error(e))?;
        Ok(Captured::from_status(status, String::new()))
    }
}

/// Collect `reader` line by line, echoing each line when asked.
fn read_lines(reader: impl Read, echo: bool) -> std::io::Result<String> {
    let mut reader = BufReader::new(reader);
    let mut text = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(text);
        }
        let line = String::from_utf8_lossy(&buf);
        if echo {
            print!("{}", line);
        }
        text.push_str(&line);
    }
}
