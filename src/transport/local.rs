//! Local execution: bash scripts with captured output, and child processes
//! that inherit the terminal.

use super::ExecOutput;
use crate::error::{AutomateError, Result};
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Run a script with `bash`, feeding it on stdin and capturing output.
/// `env` entries are added to the inherited environment.
pub async fn exec_local<K, V>(script: &str, env: impl IntoIterator<Item = (K, V)>) -> Result<ExecOutput>
where
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    let bash = Path::new("bash");
    let mut child = Command::new(bash)
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AutomateError::io(bash, e))?;

    // stdin is fed while stdout/stderr drain, so neither side fills a pipe.
    let stdin = child.stdin.take();
    let feed = async move {
        let Some(mut stdin) = stdin else {
            return Ok(());
        };
        match stdin.write_all(script.as_bytes()).await {
            // bash may exit before reading the whole script
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    fed.map_err(|e| AutomateError::io(bash, e))?;
    let output = output.map_err(|e| AutomateError::io(bash, e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Spawn `program` with inherited stdio and wait for its exit code.
pub async fn run_inherited<A, K, V>(
    program: &Path,
    args: impl IntoIterator<Item = A>,
    env: impl IntoIterator<Item = (K, V)>,
) -> Result<i32>
where
    A: AsRef<OsStr>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    debug!(program = %program.display(), "spawning");
    let status = Command::new(program)
        .args(args)
        .envs(env)
        .status()
        .await
        .map_err(|e| AutomateError::io(program, e))?;
    Ok(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_ENV: [(&str, &str); 0] = [];

    #[tokio::test]
    async fn test_local_echo() {
        let out = exec_local("echo hello", NO_ENV).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_local_failure_code() {
        let out = exec_local("exit 42", NO_ENV).await.unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, 42);
    }

    #[tokio::test]
    async fn test_local_env_and_stderr() {
        let out = exec_local("echo \"$GREETING\"; echo err >&2", [("GREETING", "hi there")])
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hi there");
        assert!(out.stderr.contains("err"));
    }

    #[tokio::test]
    async fn test_local_large_script_with_large_output() {
        let line = format!("echo {}\n", "x".repeat(60));
        let script = line.repeat(8_000);
        assert!(script.len() > 256 * 1024);

        let out = exec_local(&script, NO_ENV).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.lines().count(), 8_000);
    }

    #[tokio::test]
    async fn test_local_early_exit_ignores_unread_script() {
        let script = format!("exit 5\n{}", "echo never\n".repeat(50_000));
        let out = exec_local(&script, NO_ENV).await.unwrap();
        assert_eq!(out.exit_code, 5);
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_local_signal_killed() {
        let out = exec_local("kill -9 $$", NO_ENV).await.unwrap();
        assert_eq!(out.exit_code, -1);
    }

    #[tokio::test]
    async fn test_run_inherited_exit_code() {
        let code = run_inherited(Path::new("bash"), ["-c", "exit 7"], NO_ENV).await.unwrap();
        assert_eq!(code, 7);
    }

    #[tokio::test]
    async fn test_run_inherited_missing_program() {
        let err = run_inherited(Path::new("/definitely/not/here"), ["x"], NO_ENV)
            .await
            .unwrap_err();
        assert!(matches!(err, AutomateError::Io { .. }));
    }
}
