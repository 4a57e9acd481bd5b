//! Containerized build invocation
//!
//! Mounts the extracted cache directories into a throwaway container and
//! runs the build target there, streaming output as it arrives.

use super::runtime::ContainerRuntime;
use super::{output_tail, stream_child_output};
use crate::config::{BuildConfig, ContainerConfig};
use crate::error::{CachePipeError, CachePipeResult};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Everything needed to launch one build
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub target: String,
    pub image: String,
    /// Host path of the downloads cache, as the runtime expects it
    pub downloads_volume: String,
    /// Host path of the shared-state cache, as the runtime expects it
    pub sstate_volume: String,
    pub downloads_mount: String,
    pub sstate_mount: String,
    pub env: Vec<(String, String)>,
    pub init_script: String,
    pub build_dir: String,
    pub timeout: Duration,
    pub tail_lines: usize,
    pub container_name: String,
    /// Wipe the build directory's `tmp/` before building
    pub clean_tmp: bool,
}

impl BuildRequest {
    pub fn from_config(
        container: &ContainerConfig,
        build: &BuildConfig,
        downloads_volume: String,
        sstate_volume: String,
        container_name: String,
    ) -> Self {
        let mut env = vec![
            ("BB_NUMBER_THREADS".to_string(), container.threads.to_string()),
            (
                "PARALLEL_MAKE".to_string(),
                format!("-j {}", container.parallel_make),
            ),
            ("MACHINE".to_string(), container.machine.clone()),
        ];
        for (k, v) in &container.extra_env {
            env.push((k.clone(), v.clone()));
        }

        Self {
            target: build.target.clone(),
            image: container.image.clone(),
            downloads_volume,
            sstate_volume,
            downloads_mount: container.downloads_mount.clone(),
            sstate_mount: container.sstate_mount.clone(),
            env,
            init_script: container.init_script.clone(),
            build_dir: container.build_dir.clone(),
            timeout: Duration::from_secs(build.timeout_secs),
            tail_lines: build.tail_lines,
            container_name,
            clean_tmp: false,
        }
    }

    /// Same build for another target, under another container name
    pub fn for_target(&self, target: &str, container_name: String) -> Self {
        Self {
            target: target.to_string(),
            container_name,
            ..self.clone()
        }
    }

    pub fn with_clean_tmp(mut self, clean: bool) -> Self {
        self.clean_tmp = clean;
        self
    }

    /// Shell script run inside the container
    pub fn script(&self) -> String {
        let clean = if self.clean_tmp {
            format!("rm -rf {}/tmp\n", self.build_dir)
        } else {
            String::new()
        };
        format!(
            "set -eo pipefail\n\
             source {init} {dir}\n\
             {clean}\
             echo \"DL_DIR = \\\"{dl}\\\"\" >> conf/local.conf\n\
             echo \"SSTATE_DIR = \\\"{ss}\\\"\" >> conf/local.conf\n\
             echo \"BB_NUMBER_THREADS = \\\"${{BB_NUMBER_THREADS}}\\\"\" >> conf/local.conf\n\
             echo \"PARALLEL_MAKE = \\\"${{PARALLEL_MAKE}}\\\"\" >> conf/local.conf\n\
             echo \"MACHINE = \\\"${{MACHINE}}\\\"\" >> conf/local.conf\n\
             bitbake {target}\n",
            init = self.init_script,
            dir = self.build_dir,
            dl = self.downloads_mount,
            ss = self.sstate_mount,
            clean = clean,
            target = self.target,
        )
    }

    /// Arguments passed to the runtime CLI
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.container_name.clone(),
            "-v".to_string(),
            format!("{}:{}", self.downloads_volume, self.downloads_mount),
            "-v".to_string(),
            format!("{}:{}", self.sstate_volume, self.sstate_mount),
        ];
        for (k, v) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", k, v));
        }
        args.push(self.image.clone());
        args.push("/bin/bash".to_string());
        args.push("-c".to_string());
        args.push(self.script());
        args
    }
}

/// Result of a build that ran to completion with exit code 0
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub exit_code: i32,
    pub lines: Vec<String>,
    pub duration: Duration,
}

impl BuildOutput {
    /// Combined output as a single log text
    pub fn log(&self) -> String {
        self.lines.join("\n")
    }
}

/// Launches builds through a container runtime
pub struct BuildRunner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl BuildRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Run the build, calling `on_line` for every output line.
    ///
    /// Fails with `BuildTimeout` when the limit expires (partial output is
    /// discarded) and with `BuildFailure` carrying the output tail on a
    /// non-zero exit.
    pub async fn run(
        &self,
        request: &BuildRequest,
        on_line: &(dyn Fn(&str) + Send + Sync),
    ) -> CachePipeResult<BuildOutput> {
        let args = request.run_args();
        info!(
            "Building {} in {} (timeout {}s)",
            request.target,
            request.image,
            request.timeout.as_secs()
        );
        debug!("Build container: {}", request.container_name);

        let started = Instant::now();
        let mut child = Command::new(self.runtime.program())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CachePipeError::command_failed(format!("{} run", self.runtime.program()), e)
            })?;

        let run = async {
            let lines = stream_child_output(&mut child, on_line).await;
            let status = child.wait().await;
            (lines, status)
        };

        let outcome = tokio::time::timeout(request.timeout, run).await;
        let (lines, status) = match outcome {
            Ok(done) => done,
            Err(_) => {
                warn!(
                    "Build of {} exceeded {}s, stopping container",
                    request.target,
                    request.timeout.as_secs()
                );
                self.abort(&mut child, &request.container_name).await;
                return Err(CachePipeError::BuildTimeout {
                    target: request.target.clone(),
                    timeout_secs: request.timeout.as_secs(),
                });
            }
        };

        let status = status.map_err(|e| {
            CachePipeError::command_failed(format!("{} run", self.runtime.program()), e)
        })?;
        let duration = started.elapsed();
        let exit_code = status.code().unwrap_or(-1);

        if exit_code != 0 {
            return Err(CachePipeError::BuildFailure {
                target: request.target.clone(),
                code: exit_code,
                tail: output_tail(&lines, request.tail_lines),
            });
        }

        info!(
            "Build of {} finished in {:.1} minutes",
            request.target,
            duration.as_secs_f64() / 60.0
        );
        Ok(BuildOutput {
            exit_code,
            lines,
            duration,
        })
    }

    /// Kill the local client process and remove the container by name
    pub async fn abort(&self, child: &mut tokio::process::Child, container_name: &str) {
        if let Err(e) = child.kill().await {
            debug!("Build process already gone: {}", e);
        }
        self.remove(container_name).await;
    }

    /// Force-remove the build container, logging failures
    pub async fn remove(&self, container_name: &str) {
        if let Err(e) = self.runtime.remove_container(container_name).await {
            warn!("Could not remove container {}: {}", container_name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::CliRuntime;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn request(timeout: Duration) -> BuildRequest {
        let container = ContainerConfig::default();
        let build = BuildConfig {
            timeout_secs: timeout.as_secs(),
            tail_lines: 2,
            ..BuildConfig::default()
        };
        BuildRequest::from_config(
            &container,
            &build,
            "/w/downloads".to_string(),
            "/w/sstate-cache".to_string(),
            "cachepipe-build-test".to_string(),
        )
    }

    fn fake_runtime(dir: &std::path::Path, body: &str) -> Arc<dyn ContainerRuntime> {
        let script = dir.join("fake-runtime");
        std::fs::write(&script, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        Arc::new(CliRuntime::new(script.to_string_lossy()))
    }

    #[test]
    fn run_args_mount_caches_and_set_env() {
        let args = request(Duration::from_secs(60)).run_args();

        assert_eq!(&args[..4], &["run", "--rm", "--name", "cachepipe-build-test"]);
        assert!(args.contains(&"/w/downloads:/opt/yocto/downloads".to_string()));
        assert!(args.contains(&"/w/sstate-cache:/opt/yocto/sstate-cache".to_string()));
        assert!(args.contains(&"BB_NUMBER_THREADS=4".to_string()));
        assert!(args.contains(&"PARALLEL_MAKE=-j 4".to_string()));
        assert!(args.contains(&"MACHINE=qemux86-64".to_string()));

        let script = args.last().unwrap();
        assert!(script.starts_with("set -eo pipefail"));
        assert!(script.contains("source /opt/poky/oe-init-build-env /tmp/test-build"));
        assert!(script.contains("DL_DIR = \\\"/opt/yocto/downloads\\\""));
        assert!(script.trim_end().ends_with("bitbake core-image-minimal"));
    }

    #[test]
    fn clean_request_wipes_build_tmp() {
        let base = request(Duration::from_secs(60));
        assert!(!base.script().contains("rm -rf"));

        let clean = base
            .for_target("core-image-base", "cachepipe-bench-1".to_string())
            .with_clean_tmp(true);
        let script = clean.script();
        assert!(script.contains("source /opt/poky/oe-init-build-env /tmp/test-build\nrm -rf /tmp/test-build/tmp\n"));
        assert!(script.trim_end().ends_with("bitbake core-image-base"));
        assert_eq!(clean.run_args()[3], "cachepipe-bench-1");
        assert_eq!(clean.image, base.image);
    }

    #[test]
    fn extra_env_is_appended() {
        let mut container = ContainerConfig::default();
        container
            .extra_env
            .insert("SSTATE_MIRRORS".to_string(), "".to_string());
        let req = BuildRequest::from_config(
            &container,
            &BuildConfig::default(),
            "a".to_string(),
            "b".to_string(),
            "n".to_string(),
        );
        assert_eq!(req.env.len(), 4);
        assert_eq!(req.env[3].0, "SSTATE_MIRRORS");
    }

    #[tokio::test]
    async fn successful_build_collects_output() {
        let temp = TempDir::new().unwrap();
        let runtime = fake_runtime(
            temp.path(),
            "echo 'Sstate summary: Wanted 10 Found 8 Missed 2'\necho done\n",
        );
        let runner = BuildRunner::new(runtime);

        let output = runner
            .run(&request(Duration::from_secs(30)), &|_| {})
            .await
            .unwrap();

        assert_eq!(output.exit_code, 0);
        assert!(output.log().contains("Wanted 10 Found 8"));
    }

    #[tokio::test]
    async fn failed_build_reports_tail() {
        let temp = TempDir::new().unwrap();
        let runtime = fake_runtime(
            temp.path(),
            "echo one\necho two\necho three\n[ \"$1\" = rm ] && exit 0\nexit 1\n",
        );
        let runner = BuildRunner::new(runtime);

        let err = runner
            .run(&request(Duration::from_secs(30)), &|_| {})
            .await
            .unwrap_err();

        match err {
            CachePipeError::BuildFailure { code, tail, .. } => {
                assert_eq!(code, 1);
                assert_eq!(tail, "two\nthree");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_build_times_out_and_removes_container() {
        let temp = TempDir::new().unwrap();
        let removed = temp.path().join("removed.log");
        let runtime = fake_runtime(
            temp.path(),
            &format!(
                "[ \"$1\" = rm ] && {{ echo \"$@\" >> '{}'; exit 0; }}\necho started\nexec sleep 30\n",
                removed.display()
            ),
        );
        let runner = BuildRunner::new(runtime);

        let started = Instant::now();
        let err = runner
            .run(&request(Duration::from_secs(1)), &|_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, CachePipeError::BuildTimeout { timeout_secs: 1, .. }));
        assert!(started.elapsed() < Duration::from_secs(20));
        let log = std::fs::read_to_string(&removed).unwrap();
        assert_eq!(log.trim(), "rm -f cachepipe-build-test");
    }

    #[tokio::test]
    async fn non_utf8_output_keeps_summary_lines() {
        let temp = TempDir::new().unwrap();
        let runtime = fake_runtime(
            temp.path(),
            "printf 'caf\\351\\n'\necho 'Sstate summary: Wanted 100 Found 80 Missed 20'\n",
        );
        let runner = BuildRunner::new(runtime);

        let output = runner
            .run(&request(Duration::from_secs(30)), &|_| {})
            .await
            .unwrap();

        assert_eq!(output.lines.len(), 2);
        let metrics = crate::analysis::BuildLogAnalyzer::parse(&output.log());
        assert_eq!(metrics.hit_rate_percent, 80.0);
    }

    #[tokio::test]
    async fn non_utf8_output_is_fully_drained() {
        let temp = TempDir::new().unwrap();
        let runtime = fake_runtime(
            temp.path(),
            "printf '\\377\\n'\ni=0\nwhile [ $i -lt 5000 ]; do echo \"line $i of build output\"; i=$((i+1)); done\n",
        );
        let runner = BuildRunner::new(runtime);

        let output = runner
            .run(&request(Duration::from_secs(20)), &|_| {})
            .await
            .unwrap();

        assert_eq!(output.lines.len(), 5001);
        assert_eq!(output.lines[5000], "line 4999 of build output");
    }
}
