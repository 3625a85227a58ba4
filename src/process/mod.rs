//! External process execution.
//!
//! Every git and build-tool invocation goes through a [`ProcessRunner`]. A
//! command is described as data ([`CommandSpec`]), always carries a timeout,
//! and comes back as captured output. The pipeline tests substitute a
//! scripted runner so they never touch real tools.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// Errors that prevent a command from producing an exit status.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started (missing binary, bad cwd, ...).
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting for the program or reading its output failed.
    #[error("failed waiting for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran longer than its timeout and was killed.
    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },
}

/// A command to run: program, arguments, working directory, timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    /// Creates a spec for `program` with the given timeout.
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout,
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

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program and arguments joined for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A zero-exit output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        CommandOutput {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The most useful text for a failure report: stderr when non-empty,
    /// otherwise stdout.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }

    /// Short description of how the process exited.
    pub fn exit_description(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Executes commands.
pub trait ProcessRunner: Send + Sync + 'static {
    /// Runs the command to completion (or timeout), capturing its output.
    ///
    /// A non-zero exit is not an error at this level; callers inspect
    /// [`CommandOutput::success`].
    fn run(
        &self,
        spec: CommandSpec,
    ) -> impl Future<Output = Result<CommandOutput, ProcessError>> + Send;
}

/// Runs commands as real child processes on the tokio runtime.
///
/// Each command gets its own process group. When it finishes or times out
/// the whole group is killed, so nothing it started in the background can
/// keep writing to the working tree while the next job runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    fn run(
        &self,
        spec: CommandSpec,
    ) -> impl Future<Output = Result<CommandOutput, ProcessError>> + Send {
        async move {
            let command = spec.display();
            debug!(command = %command, cwd = ?spec.cwd, "Running command");

            let mut cmd = tokio::process::Command::new(&spec.program);
            cmd.args(&spec.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            #[cfg(unix)]
            cmd.process_group(0);
            if let Some(dir) = &spec.cwd {
                cmd.current_dir(dir);
            }
            for (key, value) in &spec.env {
                cmd.env(key, value);
            }

            let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
                command: command.clone(),
                source,
            })?;
            let pid = child.id();
            let mut stdout = child.stdout.take();
            let mut stderr = child.stderr.take();

            let finished = tokio::time::timeout(spec.timeout, async {
                tokio::try_join!(
                    child.wait(),
                    read_pipe(stdout.as_mut()),
                    read_pipe(stderr.as_mut()),
                )
            })
            .await;
            kill_process_group(&mut child, pid).await;

            match finished {
                Ok(Ok((status, stdout, stderr))) => Ok(CommandOutput {
                    code: status.code(),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                }),
                Ok(Err(source)) => Err(ProcessError::Wait { command, source }),
                Err(_) => {
                    warn!(command = %command, timeout_secs = spec.timeout.as_secs(), "Command timed out");
                    Err(ProcessError::TimedOut {
                        command,
                        timeout: spec.timeout,
                    })
                }
            }
        }
    }
}

async fn read_pipe<P: AsyncRead + Unpin>(pipe: Option<&mut P>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Kills the child's process group and reaps the child.
async fn kill_process_group(child: &mut tokio::process::Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) {
            match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                // The group is already empty.
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pgid, error = %e, "Failed to kill process group"),
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if child.id().is_some() {
        let _ = child.start_kill();
        if let Err(e) = child.wait().await {
            debug!(error = %e, "Failed to reap killed command");
        }
    }
}
