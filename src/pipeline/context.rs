//! Run-scoped state shared by every stage

use super::stage::{PipelineState, StageLedger};
use crate::config::Config;
use crate::error::CachePipeResult;
use crate::orchestration::{CliRuntime, ContainerRuntime};
use crate::platform::PlatformProbe;
use crate::ui::UiContext;
use crate::workspace::{CacheFileSet, WorkspaceLayout};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Everything one pipeline run reads and accumulates
pub struct PipelineContext {
    pub config: Config,
    pub layout: WorkspaceLayout,
    pub files: CacheFileSet,
    pub probe: PlatformProbe,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub ui: UiContext,
    pub ledger: StageLedger,
    pub state: PipelineState,
    pub started_at: DateTime<Local>,
    /// Name given to the build container, so it can be removed on abort
    pub container_name: String,
    /// Explicit results file; a timestamped name is used when unset
    pub results_path: Option<PathBuf>,
}

impl PipelineContext {
    pub fn new(config: Config, ui: UiContext) -> CachePipeResult<Self> {
        let runtime: Arc<dyn ContainerRuntime> =
            Arc::new(CliRuntime::new(config.container.runtime.clone()));
        Self::with_runtime(config, ui, runtime)
    }

    /// Build a context around an explicit runtime implementation
    pub fn with_runtime(
        config: Config,
        ui: UiContext,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> CachePipeResult<Self> {
        let layout = WorkspaceLayout::new(&config.workspace.path)?;
        let files = CacheFileSet::from_config(&config.remote)?;
        let short = Uuid::new_v4().simple().to_string();

        Ok(Self {
            config,
            layout,
            files,
            probe: PlatformProbe::detect(),
            runtime,
            ui,
            ledger: StageLedger::new(),
            state: PipelineState::Init,
            started_at: Local::now(),
            container_name: format!("cachepipe-build-{}", &short[..12]),
            results_path: None,
        })
    }

    pub fn with_results_path(mut self, path: Option<PathBuf>) -> Self {
        self.results_path = path;
        self
    }

    /// Where the results record will be written
    pub fn results_file(&self) -> PathBuf {
        self.results_file_named("cache_test_results")
    }

    /// Explicit results path, or `<prefix>_<timestamp>.json`
    pub fn results_file_named(&self, prefix: &str) -> PathBuf {
        self.results_path.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "{}_{}.json",
                prefix,
                self.started_at.format("%Y%m%d_%H%M%S")
            ))
        })
    }
}
