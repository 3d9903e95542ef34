//! Durable on-disk signer store.
//!
//! One opaque binary file per keep at
//! `<data_dir>/<keep_address>/membership_<N>`, `N` being this member's
//! index in the canonical group ordering. Writes go through a temp file,
//! fsync, rename, and a directory sync, so a signer either exists intact or
//! not at all. On startup every file is decoded and verified; a corrupt
//! file fails that keep only.

use std::io;
use std::path::{Path, PathBuf};
use tess_core::KeepId;
use tess_ecdsa::{Signer, SignerCodecError};
use tracing::{debug, warn};

/// Errors from the signer store.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Filesystem failure.
    #[error("storage i/o failed at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The signer failed to encode or its read-back failed to verify.
    #[error("signer codec failure: {0}")]
    Codec(#[from] SignerCodecError),

    /// No signer is stored for the keep.
    #[error("no signer stored for keep {keep}")]
    NotFound {
        /// The keep looked up.
        keep: KeepId,
    },
}

fn io_err(path: &Path, source: io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// File-per-keep signer storage rooted at one data directory.
#[derive(Debug, Clone)]
pub struct SignerStore {
    data_dir: PathBuf,
}

impl SignerStore {
    /// Store rooted at `data_dir`; the directory is created on first write.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn keep_dir(&self, keep: &KeepId) -> PathBuf {
        self.data_dir.join(keep.as_str())
    }

    fn membership_file(&self, keep: &KeepId, index: usize) -> PathBuf {
        self.keep_dir(keep).join(format!("membership_{index}"))
    }

    /// Persist a signer durably. Returns only after the bytes and the
    /// directory entry have been synced to stable storage.
    pub async fn save(&self, signer: &Signer) -> Result<(), PersistenceError> {
        let keep = signer.group.keep_id().clone();
        let index = signer.group.this_member_index();
        let bytes = signer.to_bytes()?;
        let dir = self.keep_dir(&keep);
        let path = self.membership_file(&keep, index);

        tokio::task::spawn_blocking(move || write_durably(&dir, &path, &bytes))
            .await
            .map_err(|e| {
                io_err(
                    &self.data_dir,
                    io::Error::new(io::ErrorKind::Other, e.to_string()),
                )
            })??;
        debug!(keep = %keep, index, "signer persisted");
        Ok(())
    }

    /// Load one keep's signer, verifying it decodes.
    pub async fn load(&self, keep: &KeepId) -> Result<Signer, PersistenceError> {
        let dir = self.keep_dir(keep);
        let entry = first_membership_file(&dir).ok_or_else(|| PersistenceError::NotFound {
            keep: keep.clone(),
        })?;
        let bytes = tokio::fs::read(&entry).await.map_err(|e| io_err(&entry, e))?;
        Ok(Signer::from_bytes(&bytes)?)
    }

    /// Scan the store and return every decodable signer.
    ///
    /// Corruption is confined: an undecodable file is logged and skipped so
    /// the rest of the operator continues.
    pub async fn load_all(&self) -> Result<Vec<Signer>, PersistenceError> {
        let mut signers = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(signers),
            Err(e) => return Err(io_err(&self.data_dir, e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_err(&self.data_dir, e))?
        {
            let path = entry.path();
            if !path.is_dir() || path.file_name().is_some_and(|n| n == "archive") {
                continue;
            }
            let keep = KeepId::new(entry.file_name().to_string_lossy().to_string());
            match self.load(&keep).await {
                Ok(signer) => {
                    if *signer.group.keep_id() != keep {
                        warn!(keep = %keep, "signer file names a different keep, skipping");
                        continue;
                    }
                    signers.push(signer);
                }
                Err(e) => {
                    warn!(keep = %keep, error = %e, "skipping unreadable signer");
                }
            }
        }
        Ok(signers)
    }

    /// Move a closed keep's directory under `archive/`.
    pub async fn archive(&self, keep: &KeepId) -> Result<(), PersistenceError> {
        let from = self.keep_dir(keep);
        let archive_dir = self.data_dir.join("archive");
        tokio::fs::create_dir_all(&archive_dir)
            .await
            .map_err(|e| io_err(&archive_dir, e))?;
        let to = archive_dir.join(keep.as_str());
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| io_err(&from, e))?;
        debug!(keep = %keep, "signer archived");
        Ok(())
    }
}

/// Temp file + fsync + rename + directory sync.
fn write_durably(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    use std::io::Write;

    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
        file.write_all(bytes).map_err(|e| io_err(&tmp, e))?;
        file.sync_all().map_err(|e| io_err(&tmp, e))?;
    }
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    let dir_handle = std::fs::File::open(dir).map_err(|e| io_err(dir, e))?;
    dir_handle.sync_all().map_err(|e| io_err(dir, e))?;
    Ok(())
}

fn first_membership_file(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("membership_") && !n.ends_with(".tmp"))
        })
        .collect();
    files.sort();
    files.into_iter().next()
}
