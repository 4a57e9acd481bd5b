//! Extraction of cache archives and permission normalization

use crate::error::{CachePipeError, CachePipeResult};
use crate::orchestration::command::{best_effort, run_checked, run_success};
use crate::platform::PlatformProbe;
use crate::workspace::WorkspaceLayout;
use serde::Serialize;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

const MB: f64 = 1024.0 * 1024.0;

/// Extracts archives with the external tar tool
#[derive(Debug, Clone)]
pub struct CacheExtractor {
    tar: String,
    probe: PlatformProbe,
}

impl CacheExtractor {
    /// Use `tar_override` when set, else the probed tar binary
    pub fn new(probe: PlatformProbe, tar_override: Option<&str>) -> Self {
        let tar = tar_override
            .map(str::to_string)
            .unwrap_or_else(|| probe.tar_binary());
        Self { tar, probe }
    }

    pub fn tar(&self) -> &str {
        &self.tar
    }

    /// Fully extract `archive` into `dest`
    pub async fn extract(&self, archive: &Path, dest: &Path) -> CachePipeResult<()> {
        info!("Extracting {} into {}", archive.display(), dest.display());
        let args = vec![
            "-xzf".to_string(),
            archive.display().to_string(),
            "-C".to_string(),
            dest.display().to_string(),
        ];

        let output = run_checked(&self.tar, &args).await?;
        if !output.success() {
            return Err(CachePipeError::Extraction {
                archive: archive.to_path_buf(),
                code: output.code,
                stderr: output.stderr,
            });
        }
        Ok(())
    }

    /// Extract, then delete the source archive unless `keep` is set.
    ///
    /// The archive is only removed once the tool reported success for it.
    pub async fn extract_and_remove(
        &self,
        archive: &Path,
        dest: &Path,
        keep: bool,
    ) -> CachePipeResult<()> {
        self.extract(archive, dest).await?;
        if keep {
            debug!("Keeping {}", archive.display());
            return Ok(());
        }
        fs::remove_file(archive)
            .await
            .map_err(|e| CachePipeError::io(format!("removing {}", archive.display()), e))?;
        debug!("Removed {}", archive.display());
        Ok(())
    }

    /// Open up each directory tree for the container process.
    ///
    /// Every failure is tolerated; the returned list holds one warning per
    /// command that did not succeed.
    pub async fn normalize_permissions(&self, dirs: &[&Path]) -> Vec<String> {
        let mut warnings = Vec::new();
        for dir in dirs {
            for cmd in self.probe.permission_commands(dir) {
                let label = if cmd.ownership {
                    format!("ownership change skipped ({})", cmd.display())
                } else {
                    format!("permission change failed ({})", cmd.display())
                };
                if let Err(warning) = best_effort(&label, run_success(&cmd.program, &cmd.args)).await
                {
                    warnings.push(warning);
                }
            }
        }
        warnings
    }
}

/// File counts and sizes of the extracted cache directories
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub downloads_files: u64,
    pub downloads_size_mb: f64,
    pub sstate_files: u64,
    /// `*.siginfo` task signatures
    pub sstate_signatures: u64,
    /// `*.tgz` build-state objects
    pub sstate_objects: u64,
    pub sstate_objects_size_mb: f64,
}

#[derive(Default)]
struct Tally {
    files: u64,
    bytes: u64,
    signatures: u64,
    objects: u64,
    object_bytes: u64,
}

/// Walk both cache directories and count what they hold.
///
/// Missing directories count as empty.
pub async fn cache_stats(layout: &WorkspaceLayout) -> CachePipeResult<CacheStats> {
    let downloads = layout.downloads_dir().to_path_buf();
    let sstate = layout.sstate_dir().to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut dl = Tally::default();
        walk(&downloads, &mut dl)?;
        let mut ss = Tally::default();
        walk(&sstate, &mut ss)?;

        Ok(CacheStats {
            downloads_files: dl.files,
            downloads_size_mb: dl.bytes as f64 / MB,
            sstate_files: ss.files,
            sstate_signatures: ss.signatures,
            sstate_objects: ss.objects,
            sstate_objects_size_mb: ss.object_bytes as f64 / MB,
        })
    })
    .await
    .map_err(|e| CachePipeError::Internal(format!("stats task failed: {}", e)))?
}

fn walk(dir: &Path, tally: &mut Tally) -> CachePipeResult<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(CachePipeError::io(format!("reading {}", dir.display()), e)),
    };

    for entry in entries {
        let entry = entry.map_err(|e| CachePipeError::io(format!("reading {}", dir.display()), e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| CachePipeError::io(format!("inspecting {}", entry.path().display()), e))?;

        if file_type.is_dir() {
            walk(&entry.path(), tally)?;
        } else if file_type.is_file() {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let name = entry.file_name();
            let name = name.to_string_lossy();
            tally.files += 1;
            tally.bytes += size;
            if name.ends_with(".siginfo") {
                tally.signatures += 1;
            } else if name.ends_with(".tgz") {
                tally.objects += 1;
                tally.object_bytes += size;
            }
        }
    }
    Ok(())
}
