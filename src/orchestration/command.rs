//! Process execution wrappers
//!
//! `run_checked` is for operations whose failure must propagate.
//! `best_effort` wraps anything that may fail without consequence: the
//! failure is logged and handed back as a warning string instead.

use crate::error::{CachePipeError, CachePipeResult};
use std::future::Future;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run `program args...` to completion and capture its output.
///
/// Fails only when the process cannot be spawned; a non-zero exit is
/// reported through `CommandOutput::code` for the caller to judge.
pub async fn run_checked(program: &str, args: &[String]) -> CachePipeResult<CommandOutput> {
    let rendered = render(program, args);
    debug!("Executing: {}", rendered);

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| CachePipeError::command_failed(rendered, e))?;

    Ok(CommandOutput {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Await `op`, turning any failure into a logged warning.
///
/// Returns the value on success, or the warning text on failure.
pub async fn best_effort<T, F>(label: &str, op: F) -> Result<T, String>
where
    F: Future<Output = CachePipeResult<T>>,
{
    match op.await {
        Ok(value) => Ok(value),
        Err(e) => {
            let message = format!("{}: {}", label, e);
            warn!("{}", message);
            Err(message)
        }
    }
}

/// Run a command that must exit 0, failing with `CommandExecution` otherwise
pub async fn run_success(program: &str, args: &[String]) -> CachePipeResult<CommandOutput> {
    let output = run_checked(program, args).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(CachePipeError::command_exec(render(program, args), output.stderr))
    }
}

pub(crate) fn render(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn run_checked_reports_exit_code() {
        let out = run_checked("sh", &args(&["-c", "echo hi; exit 3"])).await.unwrap();
        assert_eq!(out.code, 3);
        assert_eq!(out.stdout.trim(), "hi");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn run_checked_fails_to_spawn_missing_binary() {
        let err = run_checked("/nonexistent/tool", &[]).await.unwrap_err();
        assert!(matches!(err, CachePipeError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn run_success_rejects_nonzero() {
        let err = run_success("sh", &args(&["-c", "echo nope 1>&2; exit 1"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn dropped_command_is_killed() {
        let temp = tempfile::TempDir::new().unwrap();
        let marker = temp.path().join("finished");
        let script = format!("sleep 1; touch {}", marker.display());

        let attempt = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            run_checked("sh", &args(&["-c", &script])),
        )
        .await;
        assert!(attempt.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn best_effort_swallows_failure() {
        let result = best_effort("chown cache", run_success("false", &[])).await;
        let warning = result.unwrap_err();
        assert!(warning.starts_with("chown cache:"));

        let ok = best_effort("true", run_success("true", &[])).await;
        assert!(ok.is_ok());
    }
}
