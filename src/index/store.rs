//! On-disk index + manifest pair.
//!
//! The index file (`skill_index.bin`) holds a fixed header followed by the
//! normalized rows as little-endian `f32`. The manifest (`skills.json`) is a
//! JSON array of skill names; entry `i` names index row `i`.
//!
//! Header layout (64 bytes):
//!
//! | bytes | field |
//! |-------|-------|
//! | 0..4   | magic `SKIX` |
//! | 4..8   | format version (`u32`) |
//! | 8..16  | row count (`u64`) |
//! | 16..24 | dimension (`u64`) |
//! | 24..32 | build time, unix millis (`i64`) |
//! | 32..64 | SHA-256 of the manifest bytes |
//!
//! Both files are written into a fresh staging directory and then renamed into
//! place, index first, with the previous index parked in staging until the
//! manifest rename succeeds. Staging directories left by an interrupted save
//! are swept on the next one. The manifest digest in the header ties the two together:
//! a pair that was not written by the same [`ArtifactStore::save`] fails to load
//! with [`ArtifactError::Mismatch`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::FlatIndex;

pub const INDEX_FILE: &str = "skill_index.bin";
pub const MANIFEST_FILE: &str = "skills.json";

const MAGIC: &[u8; 4] = b"SKIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 64;
const STAGING_PREFIX: &str = ".staging-";
const PARKED_INDEX_FILE: &str = "previous.bin";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact missing: {}", .0.display())]
    Missing(PathBuf),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest is not a JSON array of strings: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("index file is corrupt: {0}")]
    Corrupt(String),
    #[error("index and manifest do not belong together: {0}")]
    Mismatch(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
    move |source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ArtifactError::Missing(path.to_path_buf())
        } else {
            ArtifactError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Summary of a persisted pair.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactMeta {
    pub rows: usize,
    pub dimension: usize,
    pub built_at: DateTime<Utc>,
    pub manifest_digest: String,
}

/// A validated index with its manifest.
#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub index: FlatIndex,
    pub manifest: Vec<String>,
    pub meta: ArtifactMeta,
}

struct IndexHeader {
    rows: usize,
    dimension: usize,
    built_at_ms: i64,
    manifest_digest: [u8; 32],
}

fn encode_index(index: &FlatIndex, built_at_ms: i64, manifest_digest: &[u8; 32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + index.rows().len() * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(index.len() as u64).to_le_bytes());
    out.extend_from_slice(&(index.dimension() as u64).to_le_bytes());
    out.extend_from_slice(&built_at_ms.to_le_bytes());
    out.extend_from_slice(manifest_digest);
    // logical iteration order is row-major regardless of memory layout
    for value in index.rows().iter() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn read_array<const N: usize>(bytes: &[u8], at: usize) -> Result<[u8; N], ArtifactError> {
    bytes
        .get(at..at + N)
        .and_then(|slice| <[u8; N]>::try_from(slice).ok())
        .ok_or_else(|| ArtifactError::Corrupt(format!("truncated header at byte {at}")))
}

fn decode_index(bytes: &[u8]) -> Result<(IndexHeader, Array2<f32>), ArtifactError> {
    if read_array::<4>(bytes, 0)? != *MAGIC {
        return Err(ArtifactError::Corrupt("bad magic".into()));
    }
    let version = u32::from_le_bytes(read_array(bytes, 4)?);
    if version != FORMAT_VERSION {
        return Err(ArtifactError::Corrupt(format!("unsupported format version {version}")));
    }
    let rows = u64::from_le_bytes(read_array(bytes, 8)?) as usize;
    let dimension = u64::from_le_bytes(read_array(bytes, 16)?) as usize;
    let built_at_ms = i64::from_le_bytes(read_array(bytes, 24)?);
    let manifest_digest: [u8; 32] = read_array(bytes, 32)?;

    let body = &bytes[HEADER_LEN..];
    let expected = rows
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| ArtifactError::Corrupt("row count overflow".into()))?;
    if body.len() != expected {
        return Err(ArtifactError::Corrupt(format!(
            "expected {expected} bytes of vector data, found {}",
            body.len()
        )));
    }

    let data: Vec<f32> = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let matrix = Array2::from_shape_vec((rows, dimension), data)
        .map_err(|e| ArtifactError::Corrupt(e.to_string()))?;

    Ok((
        IndexHeader {
            rows,
            dimension,
            built_at_ms,
            manifest_digest,
        },
        matrix,
    ))
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let mut file = fs::File::create(path).map_err(io_error(path))?;
    file.write_all(bytes).map_err(io_error(path))?;
    file.sync_all().map_err(io_error(path))?;
    Ok(())
}

fn restore_index(parked: &Path, index_path: &Path) {
    if let Err(e) = fs::rename(parked, index_path) {
        tracing::error!(
            path = %index_path.display(),
            error = %e,
            "failed to restore previous index"
        );
    }
}

fn built_at(ms: i64) -> Result<DateTime<Utc>, ArtifactError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ArtifactError::Corrupt(format!("invalid build timestamp {ms}")))
}

/// Fixed, paired locations for the index and manifest inside one directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Replace the persisted pair with `index` and `manifest`.
    ///
    /// On error the previous pair is left as it was. The old index is parked
    /// in the staging directory while the new files are renamed in, and moved
    /// back if the manifest rename fails.
    pub fn save(
        &self,
        index: &FlatIndex,
        manifest: &[String],
    ) -> Result<ArtifactMeta, ArtifactError> {
        if index.len() != manifest.len() {
            return Err(ArtifactError::Mismatch(format!(
                "{} index rows but {} manifest entries",
                index.len(),
                manifest.len()
            )));
        }

        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        self.sweep_stale_staging();

        let staging = self.dir.join(format!("{STAGING_PREFIX}{}", uuid::Uuid::now_v7()));
        fs::create_dir(&staging).map_err(io_error(&staging))?;

        let result = self
            .write_staged(&staging, index, manifest)
            .and_then(|meta| self.commit(&staging).map(|()| meta));

        if let Err(e) = fs::remove_dir_all(&staging) {
            tracing::warn!(
                path = %staging.display(),
                error = %e,
                "failed to clean staging directory"
            );
        }

        if result.is_ok() {
            tracing::info!(
                index = %self.index_path().display(),
                manifest = %self.manifest_path().display(),
                rows = index.len(),
                "saved index and manifest"
            );
        }
        result
    }

    /// Remove staging directories left behind by interrupted saves.
    fn sweep_stale_staging(&self) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            if !entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                continue;
            }
            let path = entry.path();
            match fs::remove_dir_all(&path) {
                Ok(()) => tracing::info!(path = %path.display(), "removed stale staging directory"),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to remove stale staging directory"
                ),
            }
        }
    }

    fn write_staged(
        &self,
        staging: &Path,
        index: &FlatIndex,
        manifest: &[String],
    ) -> Result<ArtifactMeta, ArtifactError> {
        let manifest_bytes = serde_json::to_vec_pretty(manifest)?;
        let digest: [u8; 32] = Sha256::digest(&manifest_bytes).into();
        let built_at_ms = Utc::now().timestamp_millis();

        write_synced(&staging.join(INDEX_FILE), &encode_index(index, built_at_ms, &digest))?;
        write_synced(&staging.join(MANIFEST_FILE), &manifest_bytes)?;

        Ok(ArtifactMeta {
            rows: index.len(),
            dimension: index.dimension(),
            built_at: built_at(built_at_ms)?,
            manifest_digest: hex::encode(digest),
        })
    }

    /// Move the staged pair into place, index first.
    fn commit(&self, staging: &Path) -> Result<(), ArtifactError> {
        let index_path = self.index_path();
        let manifest_path = self.manifest_path();
        let parked = staging.join(PARKED_INDEX_FILE);

        let had_previous = match fs::rename(&index_path, &parked) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(io_error(&index_path)(e)),
        };

        if let Err(e) = fs::rename(staging.join(INDEX_FILE), &index_path) {
            if had_previous {
                restore_index(&parked, &index_path);
            }
            return Err(io_error(&index_path)(e));
        }

        if let Err(e) = fs::rename(staging.join(MANIFEST_FILE), &manifest_path) {
            if had_previous {
                restore_index(&parked, &index_path);
            } else if let Err(e) = fs::remove_file(&index_path) {
                tracing::error!(
                    path = %index_path.display(),
                    error = %e,
                    "failed to remove unpaired index"
                );
            }
            return Err(io_error(&manifest_path)(e));
        }

        Ok(())
    }

    /// Read and validate the persisted pair.
    pub fn load(&self) -> Result<LoadedArtifacts, ArtifactError> {
        let index_path = self.index_path();
        let manifest_path = self.manifest_path();
        let index_bytes = fs::read(&index_path).map_err(io_error(&index_path))?;
        let manifest_bytes = fs::read(&manifest_path).map_err(io_error(&manifest_path))?;

        let (header, rows) = decode_index(&index_bytes)?;
        let digest: [u8; 32] = Sha256::digest(&manifest_bytes).into();
        if digest != header.manifest_digest {
            return Err(ArtifactError::Mismatch(
                "manifest digest differs from the one recorded in the index".into(),
            ));
        }

        let manifest: Vec<String> = serde_json::from_slice(&manifest_bytes)?;
        if manifest.len() != header.rows {
            return Err(ArtifactError::Mismatch(format!(
                "{} index rows but {} manifest entries",
                header.rows,
                manifest.len()
            )));
        }

        let meta = ArtifactMeta {
            rows: header.rows,
            dimension: header.dimension,
            built_at: built_at(header.built_at_ms)?,
            manifest_digest: hex::encode(header.manifest_digest),
        };

        Ok(LoadedArtifacts {
            index: FlatIndex::from_normalized(rows),
            manifest,
            meta,
        })
    }
}
