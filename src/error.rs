//! Regression errors

use std::fmt;
use std::path::PathBuf;

/// The kind of regression error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid option, path or variant
    Config,
    /// Regression catalogue file does not exist
    CatalogueMissing,
    /// External program could not be started
    Spawn,
    /// External program ran but exited non-zero
    ProcessFailed,
    /// Report could not be handed to the mail transfer agent
    Mail,
    /// IO error
    Io,
}

/// A regression error with optional path/command context
#[derive(Debug)]
pub struct RegressError {
    pub kind: ErrorKind,
    pub message: String,
    pub path: Option<PathBuf>,
    pub command: Option<String>,
}

impl RegressError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            command: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_command(mut self, cmd: impl Into<String>) -> Self {
        self.command = Some(cmd.into());
        self
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn catalogue_missing(path: impl Into<PathBuf>) -> Self {
        Self::new(ErrorKind::CatalogueMissing, "regression catalogue not found").with_path(path)
    }

    pub fn process_failed(cmd: impl Into<String>, code: Option<i32>) -> Self {
        let message = match code {
            Some(c) => format!("exit code {}", c),
            None => "terminated by signal".to_string(),
        };
        Self::new(ErrorKind::ProcessFailed, message).with_command(cmd)
    }

    pub fn is_config(&self) -> bool {
        matches!(self.kind, ErrorKind::Config | ErrorKind::CatalogueMissing)
    }
}

impl fmt::Display for RegressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref cmd) = self.command {
            write!(f, "{}: ", cmd)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(ref path) = self.path {
            write!(f, " ({})", path.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for RegressError {}

impl From<std::io::Error> for RegressError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RegressError>;
