use std::ffi::{OsStr, OsString};
use std::process::Command;

use crate::error::{Result, RotatorError};

/// Captured result of an external program
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

fn join_args(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `program` to completion and capture its output.
///
/// Only a failure to start the program is an error; the exit code is left
/// for the caller to judge.
pub fn run<I, S>(program: &str, args: I) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    tracing::debug!(program, args = %join_args(&args), "running");

    let output = Command::new(program)
        .args(&args)
        .output()
        .map_err(|source| RotatorError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let result = CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if !result.stdout.is_empty() {
        tracing::debug!(program, stdout = %result.stdout);
    }
    if !result.stderr.is_empty() {
        tracing::debug!(program, stderr = %result.stderr);
    }

    Ok(result)
}

/// Like [`run`], but a non-zero exit is an error
pub fn run_checked<I, S>(program: &str, args: I) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    let output = run(program, &args)?;
    if output.success() {
        Ok(output)
    } else {
        Err(RotatorError::CommandFailed {
            program: program.to_string(),
            args: join_args(&args),
            code: output.code,
            stderr: output.stderr,
        })
    }
}
