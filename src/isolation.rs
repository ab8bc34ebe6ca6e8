use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::process::{Child, Command};

use crate::config::ConfigError;

/// Set to `1` in the environment of an isolated child process.
pub const ISOLATED_CHILD_ENV: &str = "PGQ_WORKER_ISOLATED_CHILD";

/// Where a worker runs its jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationMode {
    /// Every job runs in the worker's own process
    #[default]
    InProcess,
    /// Every work cycle runs in a fresh child process, so a job that crashes
    /// or leaks only takes its child down
    Subprocess,
}

impl FromStr for IsolationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in_process" | "inline" => Ok(IsolationMode::InProcess),
            "subprocess" | "fork" => Ok(IsolationMode::Subprocess),
            _ => Err(ConfigError::InvalidValue {
                name: "PGQ_ISOLATION",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationMode::InProcess => f.write_str("in_process"),
            IsolationMode::Subprocess => f.write_str("subprocess"),
        }
    }
}

/// Whether this process was spawned as an isolated child.
pub fn is_isolated_child() -> bool {
    std::env::var(ISOLATED_CHILD_ENV).is_ok_and(|value| value == "1")
}

/// The command an isolating worker spawns for each work cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ChildCommand {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        ChildCommand {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The running executable, with the arguments it was started with.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(ChildCommand {
            program: std::env::current_exe()?,
            args: std::env::args_os().skip(1).collect(),
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub(crate) fn spawn(&self) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .env(ISOLATED_CHILD_ENV, "1")
            .kill_on_drop(true)
            .spawn()
    }
}
