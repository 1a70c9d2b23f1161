//! The local subprocess driver: runs a command string via a POSIX shell, or
//! an `inline` script materialized to a scoped temporary executable.

use std::io::Write;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use cmdgate_core::{Command, DriverError, Environment};
use tokio::io::AsyncWriteExt;
use tokio::process::Command as ProcessCommand;
use tracing::debug;

use crate::driver::{Driver, Output, Streams};

/// Executes `/bin/sh -c <command>`, or an inline script written to a
/// temporary file and run directly. The environment is the host process's
/// environment extended with the supplied pairs; later pairs shadow
/// earlier ones with the same key, matching POSIX shell semantics.
pub struct LocalDriver;

#[async_trait]
impl Driver for LocalDriver {
    async fn execute(
        &self,
        command: &Command,
        env: &Environment,
        streams: Streams,
    ) -> Result<Output, DriverError> {
        if command.uses_inline() {
            run_inline(command, env, streams).await
        } else {
            run_command_string(command, env, streams).await
        }
    }
}

async fn run_command_string(
    command: &Command,
    env: &Environment,
    streams: Streams,
) -> Result<Output, DriverError> {
    let child = ProcessCommand::new("/bin/sh")
        .arg("-c")
        .arg(&command.command)
        .envs(env.to_envp())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    run_to_completion(child, streams.stdin).await
}

async fn run_inline(
    command: &Command,
    env: &Environment,
    streams: Streams,
) -> Result<Output, DriverError> {
    let mut script = tempfile::NamedTempFile::new()?;
    script.write_all(command.inline.as_bytes())?;
    script.flush()?;
    mark_executable(script.path())?;

    let path = script.path().to_path_buf();
    let child = ProcessCommand::new(&path)
        .envs(env.to_envp())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // `script` (the NamedTempFile) is unlinked when dropped here, which
    // happens on every exit path of this function including early `?`
    // returns from `run_to_completion`.
    let result = run_to_completion(child, streams.stdin).await;
    drop(script);
    result
}

#[cfg(unix)]
fn mark_executable(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777))
}

#[cfg(not(unix))]
fn mark_executable(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

async fn run_to_completion(
    mut child: tokio::process::Child,
    stdin: Bytes,
) -> Result<Output, DriverError> {
    if let Some(mut child_stdin) = child.stdin.take() {
        child_stdin.write_all(&stdin).await?;
        drop(child_stdin);
    }

    let output = child.wait_with_output().await?;
    let status = output.status.code().map(i64::from).unwrap_or(-1);
    if status != 0 {
        debug!(status, "stage exited with non-zero status");
    }
    Ok(Output {
        status,
        stdout: Bytes::from(output.stdout),
        stderr: Bytes::from(output.stderr),
    })
}
