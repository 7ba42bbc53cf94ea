// src/system/executor.rs

use std::collections::HashMap;
use std::path::Path;
use std::process::{Child, Command as StdCommand, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    #[error("Command '{command}' timed out after {seconds}s.")]
    TimedOut { command: String, seconds: u64 },
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// How a process is launched.
#[derive(Debug, Clone, Copy)]
pub struct SpawnOptions<'a> {
    pub cwd: &'a Path,
    pub env: &'a HashMap<String, String>,
    /// Run `program` as a command line through the platform shell; `args` are
    /// appended to it.
    pub shell: bool,
    /// Kill the process once this elapses.
    pub timeout: Option<Duration>,
}

/// Output of a process whose stdout was captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub exit_code: i32,
    pub stdout: String,
}

/// The process-execution collaborator. A non-zero exit is reported through the
/// returned code, not as an error.
pub trait Spawner: Send + Sync {
    /// Runs a process to completion with inherited stdout/stderr.
    fn spawn(
        &self,
        program: &str,
        args: &[String],
        options: &SpawnOptions<'_>,
    ) -> Result<i32, ExecutionError>;

    /// Runs a process to completion and captures its stdout.
    fn capture(
        &self,
        program: &str,
        args: &[String],
        options: &SpawnOptions<'_>,
    ) -> Result<CapturedOutput, ExecutionError>;
}

/// The real `Spawner`, backed by `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpawner;

impl SystemSpawner {
    fn build_command(
        program: &str,
        args: &[String],
        options: &SpawnOptions<'_>,
    ) -> Result<StdCommand, ExecutionError> {
        let clean_cwd = dunce::simplified(options.cwd);
        let mut command = if options.shell {
            let line = shell_line(program, args)?;
            let mut command = if cfg!(target_os = "windows") {
                let mut c = StdCommand::new("cmd");
                c.arg("/C");
                c
            } else {
                let mut c = StdCommand::new("sh");
                c.arg("-c");
                c
            };
            command.arg(line);
            command
        } else {
            let mut command = StdCommand::new(program);
            command.args(args);
            command
        };
        command.current_dir(clean_cwd).envs(options.env);
        Ok(command)
    }

    fn describe(program: &str, args: &[String]) -> String {
        if args.is_empty() {
            program.to_string()
        } else {
            format!("{} {}", program, args.join(" "))
        }
    }
}

impl Spawner for SystemSpawner {
    fn spawn(
        &self,
        program: &str,
        args: &[String],
        options: &SpawnOptions<'_>,
    ) -> Result<i32, ExecutionError> {
        if program.trim().is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }
        let description = Self::describe(program, args);
        log::debug!("Spawning: {}", description);

        let child = Self::build_command(program, args, options)?
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ExecutionError::CommandFailed(description.clone(), e))?;

        let status = wait_with_timeout(child, options.timeout, &description)?;
        Ok(exit_code(status))
    }

    fn capture(
        &self,
        program: &str,
        args: &[String],
        options: &SpawnOptions<'_>,
    ) -> Result<CapturedOutput, ExecutionError> {
        if program.trim().is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }
        let description = Self::describe(program, args);
        log::debug!("Capturing: {}", description);

        let output = Self::build_command(program, args, options)?
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| ExecutionError::CommandFailed(description.clone(), e))?;

        let stdout = String::from_utf8(output.stdout).map_err(|e| {
            ExecutionError::InvalidUtf8Output {
                command: description,
                source: e,
            }
        })?;
        Ok(CapturedOutput {
            exit_code: exit_code(output.status),
            stdout,
        })
    }
}

/// The line handed to the shell: `program` verbatim, each argument quoted.
fn shell_line(program: &str, args: &[String]) -> Result<String, ExecutionError> {
    let mut line = program.to_string();
    for arg in args {
        let quoted = shlex::try_quote(arg).map_err(|_| ExecutionError::CommandParse(arg.clone()))?;
        line.push(' ');
        line.push_str(&quoted);
    }
    Ok(line)
}

/// Splits a command line into program and arguments, shell-style.
pub fn split_command_line(line: &str) -> Result<(String, Vec<String>), ExecutionError> {
    let mut parts = shlex::split(line.trim())
        .ok_or_else(|| ExecutionError::CommandParse(line.to_string()))?
        .into_iter();
    let program = parts.next().ok_or(ExecutionError::EmptyCommand)?;
    Ok((program, parts.collect()))
}

/// Non-blocking wait loop so a timeout can kill the child.
fn wait_with_timeout(
    mut child: Child,
    timeout: Option<Duration>,
    description: &str,
) -> Result<ExitStatus, ExecutionError> {
    let Some(timeout) = timeout else {
        return child
            .wait()
            .map_err(|e| ExecutionError::CommandFailed(description.to_string(), e));
    };

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if started.elapsed() >= timeout {
                    log::debug!(
                        "Timeout reached, killing child process (PID: {})...",
                        child.id()
                    );
                    if let Err(e) = child.kill() {
                        log::warn!("Failed to kill child process {}: {}", child.id(), e);
                    }
                    child.wait().ok();
                    return Err(ExecutionError::TimedOut {
                        command: description.to_string(),
                        seconds: timeout.as_secs(),
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                return Err(ExecutionError::CommandFailed(description.to_string(), e));
            }
        }
    }
}

/// Processes killed by a signal have no code; they count as failure (-1).
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
