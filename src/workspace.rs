//! Workspace layout and the declared set of cache objects

use crate::config::schema::RemoteConfig;
use crate::error::{CachePipeError, CachePipeResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Subdirectory holding fetched source tarballs
pub const DOWNLOADS_DIR: &str = "downloads";

/// Subdirectory holding shared-state build outputs
pub const SSTATE_DIR: &str = "sstate-cache";

/// File name of the reassembled downloads archive
pub const REASSEMBLED_ARCHIVE: &str = "full-downloads-cache.tar.gz";

/// The two cache roles carried by a release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheRole {
    Downloads,
    BuildState,
}

impl CacheRole {
    pub fn subdir(&self) -> &'static str {
        match self {
            Self::Downloads => DOWNLOADS_DIR,
            Self::BuildState => SSTATE_DIR,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Downloads => "downloads",
            Self::BuildState => "sstate",
        }
    }
}

/// Objects making up one cache release
///
/// Split parts are concatenated in declared order; any other order yields
/// an unreadable archive.
#[derive(Debug, Clone, Serialize)]
pub struct CacheFileSet {
    downloads_parts: Vec<String>,
    sstate: String,
    info: Option<String>,
}

impl CacheFileSet {
    pub fn new(
        downloads_parts: Vec<String>,
        sstate: impl Into<String>,
        info: Option<String>,
    ) -> CachePipeResult<Self> {
        if downloads_parts.is_empty() {
            return Err(CachePipeError::Internal(
                "cache file set needs at least one downloads part".to_string(),
            ));
        }
        let sstate = sstate.into();
        if sstate.trim().is_empty() {
            return Err(CachePipeError::Internal(
                "cache file set needs a build-state archive name".to_string(),
            ));
        }
        Ok(Self {
            downloads_parts,
            sstate,
            info,
        })
    }

    pub fn from_config(remote: &RemoteConfig) -> CachePipeResult<Self> {
        Self::new(
            remote.downloads_parts.clone(),
            remote.sstate.clone(),
            remote.info.clone().filter(|name| !name.is_empty()),
        )
    }

    pub fn downloads_parts(&self) -> &[String] {
        &self.downloads_parts
    }

    pub fn sstate(&self) -> &str {
        &self.sstate
    }

    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    /// Objects whose absence aborts the run, in fetch order
    pub fn mandatory(&self) -> impl Iterator<Item = &str> {
        self.downloads_parts
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.sstate.as_str()))
    }
}

/// Root directory owning one cache directory per role
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceLayout {
    root: PathBuf,
    downloads: PathBuf,
    sstate: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl AsRef<Path>) -> CachePipeResult<Self> {
        let root = std::path::absolute(root.as_ref()).map_err(|e| {
            CachePipeError::io(
                format!("resolving workspace {}", root.as_ref().display()),
                e,
            )
        })?;
        Ok(Self {
            downloads: root.join(DOWNLOADS_DIR),
            sstate: root.join(SSTATE_DIR),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads
    }

    pub fn sstate_dir(&self) -> &Path {
        &self.sstate
    }

    pub fn cache_dir(&self, role: CacheRole) -> &Path {
        match role {
            CacheRole::Downloads => &self.downloads,
            CacheRole::BuildState => &self.sstate,
        }
    }

    /// Local path of a fetched object
    pub fn object_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn reassembled_archive(&self) -> PathBuf {
        self.root.join(REASSEMBLED_ARCHIVE)
    }

    /// Create the root and both cache directories
    pub async fn create(&self) -> CachePipeResult<()> {
        for dir in [&self.root, &self.downloads, &self.sstate] {
            fs::create_dir_all(dir).await.map_err(|e| {
                CachePipeError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }
        Ok(())
    }

    /// Remove archives and text files left at the root by an earlier run
    pub async fn clean_transient(&self) -> CachePipeResult<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| CachePipeError::io("reading workspace directory", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CachePipeError::io("reading workspace entry", e))?
        {
            let path = entry.path();
            if !path.is_file() || !is_transient(&path) {
                continue;
            }
            debug!("Removing stale file {}", path.display());
            fs::remove_file(&path).await.map_err(|e| {
                CachePipeError::io(format!("removing {}", path.display()), e)
            })?;
            removed += 1;
        }
        Ok(removed)
    }
}

fn is_transient(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    name.contains(".tar.gz") || name.ends_with(".txt")
}
