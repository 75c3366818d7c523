//! # Tool Process
//!
//! The external catalog tool is reached through two small traits so the
//! transcoder can run against a real child process or a scripted one in tests.

use crate::errors::ProcessError;
use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{info, warn};

/// The byte stream produced on the tool's standard output.
pub type ToolOutput = Box<dyn AsyncRead + Send + Unpin>;

/// How a tool process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub success: bool,
}

impl ExitReport {
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            success: code == 0,
        }
    }

    pub fn signalled() -> Self {
        Self {
            code: None,
            success: false,
        }
    }
}

impl From<ExitStatus> for ExitReport {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
        }
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "signal"),
        }
    }
}

/// A running instance of the catalog tool.
#[async_trait]
pub trait ToolProcess: Send {
    /// Hands over standard output. Returns `None` on every call after the first.
    fn take_stdout(&mut self) -> Option<ToolOutput>;

    /// Forcibly terminates the process without waiting for it to exit.
    fn kill(&mut self) -> Result<(), ProcessError>;

    /// Waits for the process to exit and reaps it.
    async fn wait(&mut self) -> Result<ExitReport, ProcessError>;
}

/// Starts catalog tool processes, one per request.
#[async_trait]
pub trait ToolLauncher: Send + Sync + Debug {
    /// The program name, used in log lines and startup errors.
    fn program(&self) -> &str;

    async fn launch(&self) -> Result<Box<dyn ToolProcess>, ProcessError>;
}

/// Launches the real `exiftool` binary (or a configured substitute) from `PATH`.
#[derive(Debug, Clone)]
pub struct ExifToolLauncher {
    program: String,
    args: Vec<String>,
}

impl ExifToolLauncher {
    pub const DEFAULT_PROGRAM: &'static str = "exiftool";
    pub const DEFAULT_ARGS: &'static [&'static str] = &["-listx"];

    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl Default for ExifToolLauncher {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_PROGRAM,
            Self::DEFAULT_ARGS.iter().map(|a| a.to_string()).collect(),
        )
    }
}

#[async_trait]
impl ToolLauncher for ExifToolLauncher {
    fn program(&self) -> &str {
        &self.program
    }

    async fn launch(&self) -> Result<Box<dyn ToolProcess>, ProcessError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        info!(program = %self.program, pid = ?child.id(), "Started catalog tool");

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(self.program.clone(), stderr));
        }

        Ok(Box::new(ChildProcess { child }))
    }
}

/// Tool diagnostics are logged, never sent to the client.
async fn forward_stderr(program: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => warn!(program = %program, "stderr: {line}"),
            Ok(None) => break,
            Err(e) => {
                warn!(program = %program, "Failed to read stderr: {e}");
                break;
            }
        }
    }
}

struct ChildProcess {
    child: Child,
}

#[async_trait]
impl ToolProcess for ChildProcess {
    fn take_stdout(&mut self) -> Option<ToolOutput> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as ToolOutput)
    }

    fn kill(&mut self) -> Result<(), ProcessError> {
        self.child.start_kill().map_err(ProcessError::Kill)
    }

    async fn wait(&mut self) -> Result<ExitReport, ProcessError> {
        self.child
            .wait()
            .await
            .map(ExitReport::from)
            .map_err(ProcessError::Wait)
    }
}
