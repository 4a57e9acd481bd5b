//! Reassembly of split archives and list-only verification

use crate::error::{CachePipeError, CachePipeResult};
use flate2::read::GzDecoder;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Outcome of opening an archive in list-only mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArchiveCheck {
    pub ok: bool,
    /// Entries listed before the archive ended or failed
    pub entries: usize,
}

/// Concatenates ordered split parts into one archive
pub struct ArchiveAssembler;

impl ArchiveAssembler {
    /// Write `parts` consecutively into `output`, deleting each part once consumed.
    ///
    /// A missing part aborts with `Reassembly`; whatever was written so far
    /// stays on disk for diagnosis. Returns the size of the output.
    pub async fn reassemble(parts: &[PathBuf], output: &Path) -> CachePipeResult<u64> {
        info!(
            "Reassembling {} part(s) into {}",
            parts.len(),
            output.display()
        );

        let mut out = fs::File::create(output)
            .await
            .map_err(|e| CachePipeError::io(format!("creating {}", output.display()), e))?;
        let mut total = 0u64;

        for part in parts {
            let mut input = match fs::File::open(part).await {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(CachePipeError::Reassembly {
                        output: output.to_path_buf(),
                        part: part.clone(),
                    });
                }
                Err(e) => {
                    return Err(CachePipeError::io(format!("opening {}", part.display()), e));
                }
            };

            let copied = tokio::io::copy(&mut input, &mut out).await.map_err(|e| {
                CachePipeError::io(format!("appending {} to {}", part.display(), output.display()), e)
            })?;
            drop(input);
            total += copied;
            debug!("Appended {} ({} bytes)", part.display(), copied);

            fs::remove_file(part)
                .await
                .map_err(|e| CachePipeError::io(format!("removing {}", part.display()), e))?;
        }

        tokio::io::AsyncWriteExt::flush(&mut out)
            .await
            .map_err(|e| CachePipeError::io(format!("flushing {}", output.display()), e))?;

        Ok(total)
    }

    /// Open a gzip-compressed tar archive in list-only mode.
    ///
    /// Never fails: unreadable, truncated or corrupted archives yield
    /// `ok == false`. The gzip trailer is checked too, so damage past the
    /// last tar header is still detected.
    pub async fn verify_archive(path: &Path) -> ArchiveCheck {
        let owned = path.to_path_buf();
        let check = tokio::task::spawn_blocking(move || list_entries(&owned))
            .await
            .unwrap_or_else(|e| Err((0, format!("verification task failed: {}", e))));

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match check {
            Ok(entries) => {
                info!("{}: {} entries", name, entries);
                ArchiveCheck { ok: true, entries }
            }
            Err((entries, reason)) => {
                warn!("{}: corrupted archive after {} entries - {}", name, entries, reason);
                ArchiveCheck { ok: false, entries }
            }
        }
    }
}

fn list_entries(path: &Path) -> Result<usize, (usize, String)> {
    let file = File::open(path).map_err(|e| (0, e.to_string()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let mut count = 0;

    let entries = archive.entries().map_err(|e| (0, e.to_string()))?;
    for entry in entries {
        entry.map_err(|e| (count, e.to_string()))?;
        count += 1;
    }

    // Drain padding and the gzip trailer so the CRC is validated
    let mut decoder = archive.into_inner();
    io::copy(&mut decoder, &mut io::sink()).map_err(|e| (count, e.to_string()))?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn write_archive(path: &Path, files: &[(&str, &[u8])]) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_parts(dir: &Path, contents: &[&[u8]]) -> Vec<PathBuf> {
        contents
            .iter()
            .enumerate()
            .map(|(i, data)| {
                let path = dir.join(format!("blob.part{}", i));
                std::fs::write(&path, data).unwrap();
                path
            })
            .collect()
    }

    #[tokio::test]
    async fn reassemble_concatenates_in_order_and_removes_parts() {
        let temp = TempDir::new().unwrap();
        let parts = write_parts(temp.path(), &[b"one-", b"two-", b"three-", b"four"]);
        let output = temp.path().join("blob");

        let size = ArchiveAssembler::reassemble(&parts, &output).await.unwrap();

        assert_eq!(size, 18);
        assert_eq!(std::fs::read(&output).unwrap(), b"one-two-three-four");
        assert!(parts.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn reassembly_is_order_sensitive() {
        let temp = TempDir::new().unwrap();
        let data: [&[u8]; 4] = [b"AAAA", b"BBBB", b"CCCC", b"DDDD"];

        let ordered = write_parts(temp.path(), &data);
        let good = temp.path().join("good");
        ArchiveAssembler::reassemble(&ordered, &good).await.unwrap();

        let mut shuffled = write_parts(temp.path(), &data);
        shuffled.swap(0, 2);
        let bad = temp.path().join("bad");
        ArchiveAssembler::reassemble(&shuffled, &bad).await.unwrap();

        assert_ne!(std::fs::read(good).unwrap(), std::fs::read(bad).unwrap());
    }

    #[tokio::test]
    async fn missing_part_fails_and_keeps_partial_output() {
        let temp = TempDir::new().unwrap();
        let mut parts = write_parts(temp.path(), &[b"first", b"second"]);
        parts.insert(1, temp.path().join("blob.partmissing"));
        let output = temp.path().join("blob");

        let err = ArchiveAssembler::reassemble(&parts, &output).await.unwrap_err();

        match err {
            CachePipeError::Reassembly { part, .. } => {
                assert_eq!(part, temp.path().join("blob.partmissing"))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(std::fs::read(&output).unwrap(), b"first");
        assert!(parts[2].exists());
    }

    #[tokio::test]
    async fn verify_counts_entries_of_valid_archive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ok.tar.gz");
        write_archive(
            &path,
            &[
                ("downloads/a.tar.xz", b"aaa"),
                ("downloads/b.tar.xz", b"bbbb"),
                ("downloads/c.done", b""),
            ],
        );

        let check = ArchiveAssembler::verify_archive(&path).await;
        assert_eq!(check, ArchiveCheck { ok: true, entries: 3 });
    }

    #[tokio::test]
    async fn verify_rejects_truncated_archive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cut.tar.gz");
        let payload = vec![7u8; 64 * 1024];
        write_archive(&path, &[("sstate-cache/x.tgz", &payload), ("sstate-cache/y", b"y")]);

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(!ArchiveAssembler::verify_archive(&path).await.ok);
    }

    #[tokio::test]
    async fn verify_rejects_corrupted_archive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.tar.gz");
        let payload: Vec<u8> = (0..32 * 1024).map(|i| (i % 251) as u8).collect();
        write_archive(&path, &[("sstate-cache/x.tgz", &payload)]);

        let mut bytes = std::fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        for b in &mut bytes[mid..mid + 16] {
            *b ^= 0xA5;
        }
        std::fs::write(&path, &bytes).unwrap();

        assert!(!ArchiveAssembler::verify_archive(&path).await.ok);
    }

    #[tokio::test]
    async fn verify_rejects_non_archive_and_missing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plain.txt");
        std::fs::write(&path, b"this is not gzip").unwrap();

        assert!(!ArchiveAssembler::verify_archive(&path).await.ok);
        assert!(!ArchiveAssembler::verify_archive(&temp.path().join("nope")).await.ok);
    }
}
