//! Subprocess orchestration for external tools
//!
//! - `command`: mandatory vs best-effort process execution
//! - `runtime`: container runtime CLI (docker or podman)
//! - `runner`: the containerized build invocation

pub mod command;
mod runner;
mod runtime;

pub use command::{best_effort, run_checked, CommandOutput};
pub use runner::{BuildOutput, BuildRequest, BuildRunner};
pub use runtime::{CliRuntime, ContainerRuntime};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

/// Keep the last `max_lines` lines of combined output for diagnostics.
pub(crate) fn output_tail(lines: &[String], max_lines: usize) -> String {
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Lines are split on raw bytes and decoded lossily, so invalid UTF-8 in
/// tool output never ends a stream early. Returns all collected lines,
/// interleaved in arrival order. A standalone async function (not behind
/// `async_trait`) to avoid lifetime issues with the `dyn Fn` callback.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(&str) + Send + Sync),
) -> Vec<String> {
    let mut all_output = Vec::new();
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return all_output;
    };

    let mut stderr_reader = BufReader::new(stderr).split(b'\n');
    let mut stdout_reader = BufReader::new(stdout).split(b'\n');

    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        let (segment, from_stderr) = tokio::select! {
            segment = stderr_reader.next_segment(), if !stderr_done => (segment, true),
            segment = stdout_reader.next_segment(), if !stdout_done => (segment, false),
        };

        let finished = match segment {
            Ok(Some(bytes)) => {
                let line = decode_line(&bytes);
                on_output(&line);
                all_output.push(line);
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!("Reading build output failed: {}", e);
                true
            }
        };
        if finished {
            if from_stderr {
                stderr_done = true;
            } else {
                stdout_done = true;
            }
        }
    }

    all_output
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_lines() {
        let lines: Vec<String> = (1..=5).map(|i| format!("line {}", i)).collect();
        assert_eq!(output_tail(&lines, 2), "line 4\nline 5");
        assert_eq!(output_tail(&lines, 10).lines().count(), 5);
        assert_eq!(output_tail(&[], 3), "");
    }

    #[tokio::test]
    async fn stream_collects_both_streams() {
        let mut child = tokio::process::Command::new("sh")
            .args(["-c", "echo out; echo err 1>&2"])
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .unwrap();

        let seen = std::sync::Mutex::new(0usize);
        let lines = stream_child_output(&mut child, &|_| *seen.lock().unwrap() += 1).await;
        child.wait().await.unwrap();

        assert_eq!(lines.len(), 2);
        assert!(lines.contains(&"out".to_string()));
        assert!(lines.contains(&"err".to_string()));
        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[test]
    fn decode_line_replaces_invalid_bytes() {
        assert_eq!(decode_line(b"caf\xe9"), "caf\u{fffd}");
        assert_eq!(decode_line(b"done\r"), "done");
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_end_stream() {
        let mut child = tokio::process::Command::new("sh")
            .args(["-c", "printf 'caf\\351\\n'; echo 'Sstate summary: Wanted 100 Found 80 Missed 20'"])
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .unwrap();

        let lines = stream_child_output(&mut child, &|_| {}).await;
        child.wait().await.unwrap();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("caf"));
        assert_eq!(lines[1], "Sstate summary: Wanted 100 Found 80 Missed 20");
    }
}
