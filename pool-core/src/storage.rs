//! Snapshot storage on the local filesystem
//!
//! # Layout
//!
//! One file per pool and value type, `<symbol>-<pool-hex>.snap`, with the
//! symbol lowercased and anything outside `[a-z0-9]` written as `_`:
//!
//! ```text
//! ┌────────────┬──────────────┬─────────────────────────────┐
//! │ magic (4)  │ sha256 (32)  │ bincode(PoolSnapshot)       │
//! └────────────┴──────────────┴─────────────────────────────┘
//! ```
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! reader sees either the previous snapshot or the new one.

use crate::{
    crypto::hash_bytes,
    pool::PoolSnapshot,
    types::PoolId,
    Error, Result,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 4] = b"PSN1";
const HEADER_LEN: usize = MAGIC.len() + 32;
const EXTENSION: &str = "snap";

/// Directory of pool snapshots
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open or create the snapshot directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        tracing::info!("Opened snapshot store at {:?}", dir);

        Ok(Self { dir })
    }

    /// Directory holding the snapshots
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, value_type: &str, pool: PoolId) -> PathBuf {
        let symbol: String = value_type
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        self.dir
            .join(format!("{}-{}.{}", symbol, pool.address().to_hex(), EXTENSION))
    }

    /// Persist `snapshot`, replacing any earlier one for the pool
    pub fn save(&self, snapshot: &PoolSnapshot) -> Result<()> {
        let body = bincode::serialize(snapshot)?;
        let checksum = hash_bytes(&body);

        let path = self.path_for(&snapshot.value_type, snapshot.pool);
        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(MAGIC)?;
            file.write_all(&checksum)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        tracing::debug!(
            pool = %snapshot.pool,
            value_type = %snapshot.value_type,
            balance = snapshot.balance,
            bytes = body.len(),
            "Snapshot saved"
        );

        Ok(())
    }

    /// Load the `value_type` snapshot for `pool`
    pub fn load(&self, value_type: &str, pool: PoolId) -> Result<PoolSnapshot> {
        let path = self.path_for(value_type, pool);
        if !path.exists() {
            return Err(Error::NotFound(format!("{} snapshot for {}", value_type, pool)));
        }

        let snapshot = Self::read(&path)?;
        if snapshot.pool != pool || snapshot.value_type != value_type {
            return Err(Error::Corrupt(format!(
                "{:?} holds {} pool {}, expected {} pool {}",
                path, snapshot.value_type, snapshot.pool, value_type, pool
            )));
        }
        Ok(snapshot)
    }

    /// Load every snapshot in the directory, ordered by value type then pool
    pub fn load_all(&self) -> Result<Vec<PoolSnapshot>> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            snapshots.push(Self::read(&path)?);
        }
        snapshots.sort_by(|a, b| (&a.value_type, a.pool).cmp(&(&b.value_type, b.pool)));
        Ok(snapshots)
    }

    /// Delete the `value_type` snapshot for `pool`; returns whether one existed
    pub fn remove(&self, value_type: &str, pool: PoolId) -> Result<bool> {
        match fs::remove_file(self.path_for(value_type, pool)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read(path: &Path) -> Result<PoolSnapshot> {
        let bytes = fs::read(path)?;
        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(Error::Corrupt(format!("{:?}: bad header", path)));
        }

        let (header, body) = bytes.split_at(HEADER_LEN);
        let expected = &header[MAGIC.len()..];
        let actual = hash_bytes(body);
        if expected != actual.as_slice() {
            return Err(Error::Corrupt(format!(
                "{:?}: checksum {} does not match {}",
                path,
                hex::encode(actual),
                hex::encode(expected)
            )));
        }

        Ok(bincode::deserialize(body)?)
    }
}
