//! Container runtime abstraction
//!
//! The build only needs a handful of runtime operations, all of which
//! docker and podman expose through the same CLI verbs.

use super::command::{render, run_checked};
use crate::error::{CachePipeError, CachePipeResult};
use async_trait::async_trait;
use tracing::{debug, info};

/// Abstract container runtime interface
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check if the runtime CLI responds
    async fn is_available(&self) -> CachePipeResult<bool>;

    /// Version string reported by the runtime
    async fn version(&self) -> CachePipeResult<String>;

    /// Check if an image is present locally
    async fn image_exists(&self, image: &str) -> CachePipeResult<bool>;

    /// Pull an image from its registry
    async fn pull(&self, image: &str) -> CachePipeResult<()>;

    /// Force-remove a container by name; absent containers are not an error
    async fn remove_container(&self, name: &str) -> CachePipeResult<()>;

    /// Executable used to launch containers
    fn program(&self) -> &str;
}

/// Runtime driven through a docker-compatible CLI
#[derive(Debug, Clone)]
pub struct CliRuntime {
    program: String,
}

impl CliRuntime {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn exec(&self, args: &[&str]) -> CachePipeResult<super::CommandOutput> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        run_checked(&self.program, &args).await
    }
}

impl Default for CliRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn is_available(&self) -> CachePipeResult<bool> {
        match self.exec(&["--version"]).await {
            Ok(output) => Ok(output.success()),
            Err(CachePipeError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn version(&self) -> CachePipeResult<String> {
        let output = self.exec(&["--version"]).await?;
        if output.success() {
            Ok(output.stdout.trim().to_string())
        } else {
            Err(CachePipeError::command_exec(
                render(&self.program, &["--version".to_string()]),
                output.stderr,
            ))
        }
    }

    async fn image_exists(&self, image: &str) -> CachePipeResult<bool> {
        let output = self.exec(&["image", "inspect", image]).await?;
        Ok(output.success())
    }

    async fn pull(&self, image: &str) -> CachePipeResult<()> {
        info!("Pulling image: {}", image);

        let output = self.exec(&["pull", image]).await?;
        if output.success() {
            Ok(())
        } else {
            Err(CachePipeError::Prerequisite(format!(
                "could not pull {}: {}",
                image, output.stderr
            )))
        }
    }

    async fn remove_container(&self, name: &str) -> CachePipeResult<()> {
        debug!("Removing container: {}", name);

        let output = self.exec(&["rm", "-f", name]).await?;
        if output.success() || output.stderr.to_lowercase().contains("no such container") {
            Ok(())
        } else {
            Err(CachePipeError::command_exec(
                format!("{} rm -f {}", self.program, name),
                output.stderr,
            ))
        }
    }

    fn program(&self) -> &str {
        &self.program
    }
}
