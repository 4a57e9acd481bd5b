//! Streaming download of release objects
//!
//! Objects are fetched with a blocking `ureq` agent on the blocking pool,
//! so large transfers never stall the async runtime. Bytes go straight to
//! disk; the full size need not be known up front.

use crate::error::{CachePipeError, CachePipeResult};
use crate::ui::TransferProgress;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const CHUNK_SIZE: usize = 64 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Raises the flag when the awaiting future goes away, so the blocking
/// transfer stops at its next chunk instead of running to completion.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// A successfully written object
#[derive(Debug, Clone)]
pub struct FetchedObject {
    pub name: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

/// Downloads named objects from `<base_url>/<name>`
#[derive(Clone)]
pub struct ArchiveFetcher {
    agent: ureq::Agent,
    base_url: String,
    checksums: BTreeMap<String, String>,
}

impl ArchiveFetcher {
    /// Create a fetcher; `response_timeout` bounds the wait for response
    /// headers. Body transfer is never time-limited.
    pub fn new(base_url: impl Into<String>, response_timeout: Option<Duration>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .timeout_recv_response(response_timeout)
            .build()
            .into();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            checksums: BTreeMap::new(),
        }
    }

    /// Expected SHA-256 digests, keyed by object name
    pub fn with_checksums(mut self, checksums: BTreeMap<String, String>) -> Self {
        self.checksums = checksums
            .into_iter()
            .map(|(name, digest)| (name, digest.to_lowercase()))
            .collect();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn object_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    /// Check that the base location answers with a status below 400
    pub async fn probe(&self) -> bool {
        let agent = self.agent.clone();
        let url = self.base_url.clone();
        tokio::task::spawn_blocking(move || match agent.head(&url).call() {
            Ok(_) => true,
            Err(e) => {
                debug!("Probe of {} failed: {}", url, e);
                false
            }
        })
        .await
        .unwrap_or(false)
    }

    /// Stream `name` into `dest_dir/name`, overwriting any existing file
    pub async fn fetch(
        &self,
        name: &str,
        dest_dir: &Path,
        progress: TransferProgress,
    ) -> CachePipeResult<FetchedObject> {
        let agent = self.agent.clone();
        let url = self.object_url(name);
        let path = dest_dir.join(name);
        let object = name.to_string();
        let expected = self.checksums.get(name).cloned();

        info!("Downloading {}...", name);
        let task_path = path.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let _cancel_guard = CancelOnDrop(cancelled.clone());
        let result = tokio::task::spawn_blocking(move || {
            download_blocking(&agent, &url, &object, &task_path, progress, &cancelled)
        })
        .await
        .map_err(|e| CachePipeError::Internal(format!("download task failed: {}", e)))?;

        let fetched = match result {
            Ok(fetched) => fetched,
            Err(e) => {
                // The partial file of this object is useless; earlier objects stay
                if path.exists() {
                    discard_partial(&path);
                }
                return Err(e);
            }
        };

        if let Some(expected) = expected {
            if fetched.sha256 != expected {
                return Err(CachePipeError::ChecksumMismatch {
                    object: fetched.name,
                    expected,
                    actual: fetched.sha256,
                });
            }
            debug!("Checksum verified for {}", fetched.name);
        }

        info!(
            "Downloaded {} ({}MB)",
            fetched.name,
            fetched.bytes / (1024 * 1024)
        );
        Ok(fetched)
    }
}

fn download_blocking(
    agent: &ureq::Agent,
    url: &str,
    object: &str,
    path: &Path,
    mut progress: TransferProgress,
    cancelled: &AtomicBool,
) -> CachePipeResult<FetchedObject> {
    let response = agent.get(url).call().map_err(|e| match e {
        ureq::Error::StatusCode(code) => CachePipeError::transfer(object, format!("HTTP {}", code)),
        other => CachePipeError::transfer(object, other.to_string()),
    })?;

    if cancelled.load(Ordering::Relaxed) {
        debug!("Download of {} cancelled before transfer", object);
        return Err(CachePipeError::Interrupted);
    }

    if let Some(total) = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        progress.set_total(total);
    }

    let file = File::create(path)
        .map_err(|e| CachePipeError::io(format!("creating {}", path.display()), e))?;
    let mut writer = BufWriter::new(file);
    let mut reader = response.into_body().into_reader();
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    loop {
        if cancelled.load(Ordering::Relaxed) {
            drop(writer);
            discard_partial(path);
            debug!("Download of {} cancelled after {} bytes", object, written);
            return Err(CachePipeError::Interrupted);
        }
        let n = reader
            .read(&mut buf)
            .map_err(|e| CachePipeError::transfer(object, format!("read failed: {}", e)))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .map_err(|e| CachePipeError::io(format!("writing {}", path.display()), e))?;
        hasher.update(&buf[..n]);
        let previous = written;
        written += n as u64;
        progress.update(previous, written);
    }

    writer
        .flush()
        .map_err(|e| CachePipeError::io(format!("flushing {}", path.display()), e))?;
    progress.finish();

    Ok(FetchedObject {
        name: object.to_string(),
        path: path.to_path_buf(),
        bytes: written,
        sha256: hex::encode(hasher.finalize()),
    })
}

fn discard_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Could not remove partial {}: {}", path.display(), e);
    }
}
